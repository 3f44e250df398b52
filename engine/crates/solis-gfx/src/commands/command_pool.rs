use std::sync::Arc;

use ash::vk;

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
///
/// 使用 RESET_COMMAND_BUFFER 创建，回收后的 command buffer 可以单独重新录制
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family_index: u32,

    /// 已经回收、可以重新录制的 command buffer
    free_buffers: Vec<GfxCommandBuffer>,

    device: Arc<GfxDevice>,
    debug_name: String,
    destroyed: bool,
}

// new & init
impl GfxCommandPool {
    pub fn new(device: Arc<GfxDevice>, queue_family_index: u32, debug_name: &str) -> Self {
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .unwrap_or_else(|e| panic!("Could not create command pool {debug_name}: {e:?}"));

        let command_pool = Self {
            handle: pool,
            queue_family_index,
            free_buffers: Vec::new(),
            device,
            debug_name: debug_name.to_string(),
            destroyed: false,
        };
        command_pool.device.set_debug_name(&command_pool, debug_name);
        command_pool
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_buffers.len()
    }
}

// tools
impl GfxCommandPool {
    /// 优先复用已经回收的 command buffer
    pub fn acquire(&mut self, debug_name: &str) -> GfxCommandBuffer {
        match self.free_buffers.pop() {
            Some(mut cmd) => {
                cmd.rename(debug_name);
                cmd
            }
            None => GfxCommandBuffer::new(self.device.clone(), self.handle, debug_name),
        }
    }

    /// GPU 执行完毕之后调用，command buffer 回到 initial 状态
    pub fn recycle(&mut self, cmd: GfxCommandBuffer) {
        debug_assert_eq!(cmd.pool_handle(), self.handle, "command buffer returned to the wrong pool");
        if let Err(e) =
            unsafe { self.device.reset_command_buffer(cmd.vk_handle(), vk::CommandBufferResetFlags::empty()) }
        {
            log::error!("Could not reset command buffer in pool {}: {:?}", self.debug_name, e);
            return;
        }
        self.free_buffers.push(cmd);
    }
}

// destroy
impl GfxCommandPool {
    /// 销毁 pool 时，其中的 command buffer 一起被释放
    pub fn destroy(mut self) {
        self.free_buffers.clear();
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
        self.destroyed = true;
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "CommandPool {} must be destroyed manually.", self.debug_name);
    }
}
