use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::commands::completion::CompletionFence;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// 二值 fence，每次提交 command list 时 signal 一个
///
/// 回收之后 reset 并放回 fence 池
///
/// # Destroy
/// 需要手动调用 `destroy`
pub struct GfxFence {
    fence: vk::Fence,
    device: Arc<GfxDevice>,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: Arc<GfxDevice>, signaled: bool, debug_name: &str) -> Self {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .unwrap_or_else(|e| panic!("Could not create fence {debug_name}: {e:?}"));

        let fence = Self { fence, device };
        fence.device.set_debug_name(&fence, debug_name);
        fence
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    #[inline]
    pub fn reset(&self) {
        if let Err(e) = unsafe { self.device.reset_fences(std::slice::from_ref(&self.fence)) } {
            log::error!("Could not reset fence: {:?}", e);
        }
    }
}

impl CompletionFence for GfxFence {
    fn wait(&self, timeout: Duration) -> bool {
        let timeout_ns = timeout.as_nanos().min(u64::MAX as u128) as u64;
        match unsafe { self.device.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) } {
            Ok(()) => true,
            Err(vk::Result::TIMEOUT) => false,
            Err(e) => {
                // device lost 之后无法再等到 fence，直接视为完成
                log::error!("Could not wait for fence: {:?}", e);
                true
            }
        }
    }
}
