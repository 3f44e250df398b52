use std::sync::Arc;

use ash::vk;
use vk_mem::Alloc;

use crate::commands::resource_state::ResourceState;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::foundation::mem_allocator::GfxMemAllocator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ImageUsage {
    SampledImage,
    RenderTarget,
    DepthStencil,
    UnorderedAccess,
    /// 从数据文件中读到的未知用途
    #[serde(other)]
    Unknown,
}

impl ImageUsage {
    pub fn vk_usage(self) -> vk::ImageUsageFlags {
        use vk::ImageUsageFlags as F;
        match self {
            // make_image_opaque 会以 storage image 的方式写入
            Self::SampledImage => F::SAMPLED | F::STORAGE | F::TRANSFER_SRC | F::TRANSFER_DST,
            Self::RenderTarget => F::COLOR_ATTACHMENT | F::SAMPLED | F::TRANSFER_SRC | F::TRANSFER_DST,
            Self::DepthStencil => F::DEPTH_STENCIL_ATTACHMENT | F::SAMPLED,
            Self::UnorderedAccess => F::STORAGE | F::SAMPLED | F::TRANSFER_SRC | F::TRANSFER_DST,
            Self::Unknown => F::SAMPLED | F::TRANSFER_SRC | F::TRANSFER_DST,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    Rgba8,
    Rgba32F,
    Depth32,
    Depth24Stencil8,
    R32F,
    Rg16F,
}

impl ImageFormat {
    #[inline]
    pub fn vk_format(self) -> vk::Format {
        match self {
            Self::Rgba8 => vk::Format::R8G8B8A8_UNORM,
            Self::Rgba32F => vk::Format::R32G32B32A32_SFLOAT,
            Self::Depth32 => vk::Format::D32_SFLOAT,
            Self::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
            Self::R32F => vk::Format::R32_SFLOAT,
            Self::Rg16F => vk::Format::R16G16_SFLOAT,
        }
    }

    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32 | Self::Depth24Stencil8)
    }

    /// 用于 barrier 的 aspect
    #[inline]
    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            Self::Depth32 => vk::ImageAspectFlags::DEPTH,
            Self::Depth24Stencil8 => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    /// 每个像素的字节数
    #[inline]
    pub fn pixel_size(self) -> usize {
        match self {
            Self::Rgba8 | Self::Depth32 | Self::Depth24Stencil8 | Self::R32F | Self::Rg16F => 4,
            Self::Rgba32F => 16,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ImageCreateInfo {
    pub name: String,
    pub usage: ImageUsage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    #[serde(default = "ImageCreateInfo::default_depth")]
    pub depth: u32,
    /// 窗口大小变化时是否跟随调整
    #[serde(default)]
    pub enable_resizing: bool,
}

impl ImageCreateInfo {
    pub fn new(name: impl Into<String>, usage: ImageUsage, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            usage,
            format,
            width,
            height,
            depth: 1,
            enable_resizing: false,
        }
    }

    fn default_depth() -> u32 {
        1
    }
}

/// image 被创建之后，第一次使用之前所处的状态
pub fn initial_state_for_usage(name: &str, usage: ImageUsage) -> ResourceState {
    match usage {
        ImageUsage::RenderTarget => ResourceState::RenderTarget,
        ImageUsage::SampledImage => ResourceState::ShaderResource,
        ImageUsage::DepthStencil => ResourceState::DepthWrite,
        ImageUsage::UnorderedAccess => ResourceState::UnorderedAccess,
        ImageUsage::Unknown => {
            log::warn!("Unrecognized usage for image {}, defaulting to the common resource state", name);
            ResourceState::Common
        }
    }
}

/// 由 VMA 分配的 image，附带一个默认的 image view
///
/// 创建时 layout 为 UNDEFINED，由 RenderDevice 在下一次提交前转换到初始状态
pub struct GfxImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
    view: vk::ImageView,

    extent: vk::Extent3D,
    format: ImageFormat,
    usage: ImageUsage,
    initial_state: ResourceState,

    name: String,

    device: Arc<GfxDevice>,
    allocator: Arc<GfxMemAllocator>,
}
// new & init
impl GfxImage {
    /// 失败时返回 None
    pub fn new(device: Arc<GfxDevice>, allocator: Arc<GfxMemAllocator>, info: &ImageCreateInfo) -> Option<Self> {
        let _span = tracy_client::span!("GfxImage::new");

        let image_type = if info.depth > 1 { vk::ImageType::TYPE_3D } else { vk::ImageType::TYPE_2D };
        let image_ci = vk::ImageCreateInfo {
            image_type,
            format: info.format.vk_format(),
            extent: vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: info.depth.max(1),
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: info.usage.vk_usage(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            // 这里只能是 UNDEFINED 或者 PREINITIALIZED
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = match unsafe { allocator.create_image(&image_ci, &alloc_ci) } {
            Ok(created) => created,
            Err(e) => {
                log::error!("Could not create image {}: {:?}", info.name, e);
                return None;
            }
        };

        // 采样 depth stencil 时只使用 depth aspect
        let view_aspect = if info.format.is_depth() { vk::ImageAspectFlags::DEPTH } else { info.format.aspect() };
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(if info.depth > 1 { vk::ImageViewType::TYPE_3D } else { vk::ImageViewType::TYPE_2D })
            .format(info.format.vk_format())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: view_aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                log::error!("Could not create the view of image {}: {:?}", info.name, e);
                unsafe { allocator.destroy_image(image, &mut allocation) };
                return None;
            }
        };

        device.set_object_debug_name(image, format!("Image::{}", info.name));
        device.set_object_debug_name(view, format!("ImageView::{}", info.name));
        Some(Self {
            handle: image,
            allocation,
            view,
            extent: image_ci.extent,
            format: info.format,
            usage: info.usage,
            initial_state: initial_state_for_usage(&info.name, info.usage),
            name: info.name.clone(),
            device,
            allocator,
        })
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.format.aspect()
    }

    #[inline]
    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    #[inline]
    pub fn initial_state(&self) -> ResourceState {
        self.initial_state
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        log::debug!("Destroying image {}", self.name);
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_for_usage() {
        assert_eq!(initial_state_for_usage("rt", ImageUsage::RenderTarget), ResourceState::RenderTarget);
        assert_eq!(initial_state_for_usage("tex", ImageUsage::SampledImage), ResourceState::ShaderResource);
        assert_eq!(initial_state_for_usage("depth", ImageUsage::DepthStencil), ResourceState::DepthWrite);
        assert_eq!(initial_state_for_usage("uav", ImageUsage::UnorderedAccess), ResourceState::UnorderedAccess);
        assert_eq!(initial_state_for_usage("odd", ImageUsage::Unknown), ResourceState::Common);
    }

    #[test]
    fn test_unknown_usage_from_data() {
        let info: ImageCreateInfo = serde_json::from_str(
            r#"{"name": "noise", "usage": "Volumetric", "format": "Rgba8", "width": 4, "height": 4}"#,
        )
        .unwrap();
        assert_eq!(info.usage, ImageUsage::Unknown);
        assert_eq!(info.depth, 1);
        assert!(!info.enable_resizing);
    }

    #[test]
    fn test_format_properties() {
        assert!(ImageFormat::Depth32.is_depth());
        assert!(!ImageFormat::Rgba32F.is_depth());
        assert_eq!(ImageFormat::Rgba32F.pixel_size(), 16);
        assert_eq!(
            ImageFormat::Depth24Stencil8.aspect(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(ImageFormat::Rgba8.vk_format(), vk::Format::R8G8B8A8_UNORM);
    }
}
