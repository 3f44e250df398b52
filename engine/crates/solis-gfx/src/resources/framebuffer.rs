use ash::vk;

use crate::descriptors::descriptor_allocator::DescriptorHandle;

/// attachment 在 render pass 开始时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttachmentAccess {
    #[default]
    Clear,
    Preserve,
    Discard,
}

impl AttachmentAccess {
    #[inline]
    pub fn load_op(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Clear => vk::AttachmentLoadOp::CLEAR,
            Self::Preserve => vk::AttachmentLoadOp::LOAD,
            Self::Discard => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderPassAccess {
    pub color_load: AttachmentAccess,
    pub depth_load: AttachmentAccess,
}

/// 一组 render target 以及可选的 depth target
///
/// view 存放在 RenderDevice 的 RTV/DSV heap 中，通过 `RenderDevice::destroy_framebuffer` 释放
pub struct Framebuffer {
    pub(crate) rtv_handles: Vec<DescriptorHandle>,
    pub(crate) dsv_handle: Option<DescriptorHandle>,

    render_target_views: Vec<vk::ImageView>,
    color_formats: Vec<vk::Format>,
    depth_view: Option<vk::ImageView>,
    depth_format: Option<vk::Format>,

    width: u32,
    height: u32,
}

// new & init
impl Framebuffer {
    pub(crate) fn new(
        rtv_handles: Vec<DescriptorHandle>,
        render_target_views: Vec<vk::ImageView>,
        color_formats: Vec<vk::Format>,
        depth: Option<(DescriptorHandle, vk::ImageView, vk::Format)>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            rtv_handles,
            dsv_handle: depth.map(|(handle, _, _)| handle),
            render_target_views,
            color_formats,
            depth_view: depth.map(|(_, view, _)| view),
            depth_format: depth.map(|(_, _, format)| format),
            width,
            height,
        }
    }
}

// getters
impl Framebuffer {
    #[inline]
    pub fn render_target_views(&self) -> &[vk::ImageView] {
        &self.render_target_views
    }

    #[inline]
    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.depth_view
    }

    #[inline]
    pub fn color_formats(&self) -> &[vk::Format] {
        &self.color_formats
    }

    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}

// tools
impl Framebuffer {
    pub fn color_attachments(&self, access: AttachmentAccess) -> Vec<vk::RenderingAttachmentInfo<'static>> {
        self.render_target_views
            .iter()
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .image_view(*view)
                    .load_op(access.load_op())
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: [0_f32, 0_f32, 0_f32, 1_f32],
                        },
                    })
            })
            .collect()
    }

    pub fn depth_attachment(&self, access: AttachmentAccess) -> Option<vk::RenderingAttachmentInfo<'static>> {
        self.depth_view.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .image_view(view)
                .load_op(access.load_op())
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        // reversed-z：0 表示无限远
                        depth: 0_f32,
                        stencil: 0,
                    },
                })
        })
    }
}

/// 检查所有 target 的大小是否一致，不一致时只记录错误
///
/// 返回第一个 target 的大小
pub fn validate_framebuffer_sizes(sizes: &[(u32, u32)]) -> Option<(u32, u32)> {
    let (w0, h0) = *sizes.first()?;
    for (i, (w, h)) in sizes.iter().enumerate().skip(1) {
        if (*w, *h) != (w0, h0) {
            log::error!("Render target {} has size {}x{}, expected {}x{}", i, w, h, w0, h0);
        }
    }
    Some((w0, h0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sizes() {
        assert_eq!(validate_framebuffer_sizes(&[]), None);
        assert_eq!(validate_framebuffer_sizes(&[(800, 600), (800, 600)]), Some((800, 600)));
        // 不一致时仍然使用第一个 target 的大小
        assert_eq!(validate_framebuffer_sizes(&[(800, 600), (400, 300)]), Some((800, 600)));
    }

    #[test]
    fn test_framebuffer_needs_a_target() {
        // create_framebuffer 在没有任何 target 时不创建 framebuffer
        assert!(validate_framebuffer_sizes(&[]).is_none());
        // 只有 depth target 也是合法的
        assert_eq!(validate_framebuffer_sizes(&[(256, 128)]), Some((256, 128)));
    }

    #[test]
    fn test_load_ops() {
        assert_eq!(AttachmentAccess::Clear.load_op(), vk::AttachmentLoadOp::CLEAR);
        assert_eq!(AttachmentAccess::Preserve.load_op(), vk::AttachmentLoadOp::LOAD);
        assert_eq!(AttachmentAccess::Discard.load_op(), vk::AttachmentLoadOp::DONT_CARE);
    }
}
