use std::ffi::CString;
use std::sync::{Arc, Mutex};

use ash::vk;
use itertools::Itertools;

use crate::commands::submit_info::GfxSubmitInfo;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::foundation::physical_device::GfxQueueFamily;

/// Vulkan queue 的封装
///
/// vkQueueSubmit 与 vkQueuePresentKHR 要求外部同步，所以所有对 queue 的访问都经过 `submit_lock`
pub struct GfxQueue {
    handle: vk::Queue,
    queue_family: GfxQueueFamily,

    submit_lock: Mutex<()>,
    device: Arc<GfxDevice>,
}

// new & init
impl GfxQueue {
    pub fn new(device: Arc<GfxDevice>, queue_family: GfxQueueFamily, queue_index: u32, debug_name: &str) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family.queue_family_index, queue_index) };
        let queue = Self {
            handle,
            queue_family,
            submit_lock: Mutex::new(()),
            device,
        };
        queue.device.set_debug_name(&queue, debug_name);
        queue
    }
}

// getters
impl GfxQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family(&self) -> &GfxQueueFamily {
        &self.queue_family
    }
}

// tools
impl GfxQueue {
    pub fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<vk::Fence>) {
        let _span = tracy_client::span!("GfxQueue::submit");

        let submit_infos = batches.iter().map(|b| b.submit_info()).collect_vec();
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) =
            unsafe { self.device.queue_submit2(self.handle, &submit_infos, fence.unwrap_or(vk::Fence::null())) }
        {
            log::error!("Could not submit to queue {}: {:?}", self.queue_family.name, e);
        }
    }

    /// 返回值与 `vkQueuePresentKHR` 一致：`Ok(true)` 表示 suboptimal
    pub fn present(&self, present_info: &vk::PresentInfoKHR) -> ash::prelude::VkResult<bool> {
        let _span = tracy_client::span!("GfxQueue::present");

        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { self.device.swapchain().queue_present(self.handle, present_info) }
    }

    pub fn wait_idle(&self) {
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = unsafe { self.device.queue_wait_idle(self.handle) } {
            log::error!("Could not wait for queue {}: {:?}", self.queue_family.name, e);
        }
    }

    /// 用于 RenderDoc / Nsight 等工具的捕获范围
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let name = CString::new(label_name).unwrap_or_default();
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            self.device.debug_utils().queue_begin_debug_utils_label(
                self.handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    pub fn end_label(&self) {
        let _guard = self.submit_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            self.device.debug_utils().queue_end_debug_utils_label(self.handle);
        }
    }
}

impl DebugType for GfxQueue {
    fn debug_type_name() -> &'static str {
        "GfxQueue"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
