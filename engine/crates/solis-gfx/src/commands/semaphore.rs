use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::commands::frame_sync::TimelineFence;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// 二值 semaphore，用于 swapchain 的 acquire 与 present
///
/// # Destroy
/// 需要手动 destroy
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    device: Arc<GfxDevice>,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: Arc<GfxDevice>, debug_name: &str) -> Self {
        let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .unwrap_or_else(|e| panic!("Could not create semaphore {debug_name}: {e:?}"));

        let semaphore = Self { semaphore, device };
        semaphore.device.set_debug_name(&semaphore, debug_name);
        semaphore
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}

/// timeline semaphore，作为每个 frame slot 的 frame fence
pub struct GfxTimelineSemaphore {
    semaphore: vk::Semaphore,
    device: Arc<GfxDevice>,
}

// 创建与销毁
impl GfxTimelineSemaphore {
    pub fn new(device: Arc<GfxDevice>, initial_value: u64, debug_name: &str) -> Self {
        let mut timeline_type_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let timeline_semaphore_ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_type_ci);
        let semaphore = unsafe { device.create_semaphore(&timeline_semaphore_ci, None) }
            .unwrap_or_else(|e| panic!("Could not create timeline semaphore {debug_name}: {e:?}"));

        let semaphore = Self { semaphore, device };
        semaphore.device.set_debug_name(&semaphore, debug_name);
        semaphore
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

// getters
impl GfxTimelineSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl TimelineFence for GfxTimelineSemaphore {
    fn completed_value(&self) -> u64 {
        unsafe { self.device.get_semaphore_counter_value(self.semaphore) }.unwrap_or_else(|e| {
            log::error!("Could not query timeline semaphore value: {:?}", e);
            u64::MAX
        })
    }

    fn wait_for_value(&self, value: u64, timeout: Duration) -> bool {
        let timeout_ns = timeout.as_nanos().min(u64::MAX as u128) as u64;
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(std::slice::from_ref(&self.semaphore))
            .values(std::slice::from_ref(&value));
        match unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => true,
            Err(vk::Result::TIMEOUT) => false,
            Err(e) => {
                log::error!("Could not wait for timeline semaphore: {:?}", e);
                true
            }
        }
    }
}

impl DebugType for GfxTimelineSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxTimelineSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}
