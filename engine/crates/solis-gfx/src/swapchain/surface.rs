use ash::vk;

use crate::foundation::debug_messenger::DebugType;

/// 窗口对应的 surface，在 swapchain 之前创建，随 swapchain 一起销毁
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
    pdevice: vk::PhysicalDevice,
}

impl GfxSurface {
    /// 创建失败是致命错误
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> Self {
        let surface_pf = ash::khr::surface::Instance::new(entry, instance);
        let surface =
            unsafe { ash_window::create_surface(entry, instance, raw_display_handle, raw_window_handle, None) }
                .unwrap_or_else(|e| panic!("Could not create the window surface: {e:?}"));

        GfxSurface {
            handle: surface,
            pf: surface_pf,
            pdevice,
        }
    }
}

// getters
impl GfxSurface {
    pub fn get_capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        unsafe { self.pf.get_physical_device_surface_capabilities(self.pdevice, self.handle) }
            .unwrap_or_else(|e| panic!("Could not query surface capabilities: {e:?}"))
    }

    pub fn supports_present(&self, queue_family_index: u32) -> bool {
        unsafe { self.pf.get_physical_device_surface_support(self.pdevice, queue_family_index, self.handle) }
            .unwrap_or(false)
    }

    /// 优先使用 B8G8R8A8_UNORM + SRGB_NONLINEAR，否则使用第一个
    pub fn choose_format(&self) -> vk::SurfaceFormatKHR {
        let formats =
            unsafe { self.pf.get_physical_device_surface_formats(self.pdevice, self.handle) }.unwrap_or_default();
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        if formats.iter().any(|f| f.format == preferred.format && f.color_space == preferred.color_space) {
            return preferred;
        }
        formats.first().copied().unwrap_or_else(|| panic!("Surface reports no supported formats"))
    }

    /// 不支持请求的模式时退回 FIFO，FIFO 总是可用
    pub fn choose_present_mode(&self, requested: vk::PresentModeKHR) -> vk::PresentModeKHR {
        let modes = unsafe { self.pf.get_physical_device_surface_present_modes(self.pdevice, self.handle) }
            .unwrap_or_default();
        if modes.contains(&requested) {
            requested
        } else {
            log::warn!("Present mode {:?} is not supported, falling back to FIFO", requested);
            vk::PresentModeKHR::FIFO
        }
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
