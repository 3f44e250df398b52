use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;

use crate::commands::queue::GfxQueue;
use crate::commands::semaphore::GfxSemaphore;
use crate::foundation::device::GfxDevice;
use crate::swapchain::surface::GfxSurface;

pub struct GfxRenderSwapchain {
    surface: GfxSurface,
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_index: usize,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    requested_image_count: u32,
    swapchain_extent: vk::Extent2D,

    device: Arc<GfxDevice>,
}

// new & init
impl GfxRenderSwapchain {
    /// `requested_image_count` 一般等于 frames in flight 的数量，会被 clamp 到 surface 支持的范围
    pub fn new(
        device: Arc<GfxDevice>,
        surface: GfxSurface,
        present_mode: vk::PresentModeKHR,
        requested_image_count: u32,
        window_physical_extent: vk::Extent2D,
    ) -> Self {
        let _span = tracy_client::span!("GfxRenderSwapchain::new");

        let surface_format = surface.choose_format();
        let present_mode = surface.choose_present_mode(present_mode);

        let mut swapchain = Self {
            surface,
            swapchain_handle: vk::SwapchainKHR::null(),
            swapchain_images: vec![],
            swapchain_image_index: 0,
            surface_format,
            present_mode,
            requested_image_count,
            swapchain_extent: vk::Extent2D::default(),
            device,
        };
        swapchain.build(window_physical_extent);
        swapchain
    }

    /// 创建新的 swapchain，旧的 swapchain 作为 old_swapchain 传入之后销毁
    fn build(&mut self, window_physical_extent: vk::Extent2D) {
        let surface_capabilities = self.surface.get_capabilities();

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height
        );

        let image_count = Self::calculate_image_count(&surface_capabilities, self.requested_image_count);
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(self.swapchain_handle);

        let swapchain_handle = unsafe { self.device.swapchain().create_swapchain(&create_info, None) }
            .unwrap_or_else(|e| panic!("Could not create the swapchain: {e:?}"));
        self.device.set_object_debug_name(swapchain_handle, "main");

        if !self.swapchain_handle.is_null() {
            unsafe { self.device.swapchain().destroy_swapchain(self.swapchain_handle, None) };
        }

        self.swapchain_handle = swapchain_handle;
        self.swapchain_images = unsafe { self.device.swapchain().get_swapchain_images(swapchain_handle) }
            .unwrap_or_else(|e| panic!("Could not get the swapchain images: {e:?}"));
        self.swapchain_image_index = 0;
        self.swapchain_extent = extent;
        log::info!("swapchain has {} images (requested {})", self.swapchain_images.len(), image_count);
    }

    /// 窗口大小变化之后调用，调用者需要保证旧的 swapchain image 不再被使用
    pub fn recreate(&mut self, window_physical_extent: vk::Extent2D) {
        let _span = tracy_client::span!("GfxRenderSwapchain::recreate");
        self.build(window_physical_extent);
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn present_images(&self) -> &[vk::Image] {
        &self.swapchain_images
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.swapchain_image_index
    }

    #[inline]
    pub fn current_image(&self) -> vk::Image {
        self.swapchain_images[self.swapchain_image_index]
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface(&self) -> &GfxSurface {
        &self.surface
    }
}

// tools
impl GfxRenderSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
        let count = requested.max(surface_capabilities.min_image_count);
        if surface_capabilities.max_image_count == 0 {
            count
        } else {
            count.min(surface_capabilities.max_image_count)
        }
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    ///
    /// return:
    /// - `Some(need_recreate)`: 成功获取 image，suboptimal 时需要重建
    /// - `None`: swapchain 已经过期，没有获取到 image，semaphore 不会被 signal
    pub fn acquire_next_image(&mut self, semaphore: &GfxSemaphore, timeout: u64) -> Option<bool> {
        let _span = tracy_client::span!("GfxRenderSwapchain::acquire_next_image");
        let result = unsafe {
            self.device.swapchain().acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                self.swapchain_image_index = image_index as usize;
                Some(is_suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                None
            }
            Err(e) => {
                panic!("failed to acquire next swapchain image: {:?}", e);
            }
        }
    }

    /// return: need recreate
    pub fn present_image(&self, queue: &GfxQueue, wait_semaphores: &[vk::Semaphore]) -> bool {
        let image_indices = [self.swapchain_image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        match queue.present(&present_info) {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", self.swapchain_image_index);
                }
                is_suboptimal
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                true
            }
            Err(e) => {
                panic!("failed to present swapchain image: {:?}", e);
            }
        }
    }
}

// destroy
impl GfxRenderSwapchain {
    /// surface 随 swapchain 一起销毁
    pub fn destroy(mut self) {
        unsafe {
            self.device.swapchain().destroy_swapchain(self.swapchain_handle, None);
        }
        self.swapchain_handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.swapchain_handle.is_null(), "GfxRenderSwapchain must be destroyed manually.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface_when_fixed() {
        let caps = capabilities((1280, 720), 2, 8);
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(&caps, vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_extent_clamped_to_window_when_free() {
        let caps = capabilities((0xFFFFFFFF, 0xFFFFFFFF), 2, 8);
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(&caps, vk::Extent2D {
            width: 8000,
            height: 600,
        });
        assert_eq!((extent.width, extent.height), (4096, 600));
    }

    #[test]
    fn test_image_count_clamped() {
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&capabilities((1, 1), 2, 8), 3), 3);
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&capabilities((1, 1), 4, 8), 3), 4);
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&capabilities((1, 1), 1, 2), 3), 2);
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&capabilities((1, 1), 1, 0), 16), 16);
    }
}
