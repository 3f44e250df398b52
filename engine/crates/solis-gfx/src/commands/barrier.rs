use ash::vk;

use crate::commands::resource_state::ResourceState;
use crate::resources::buffer::GfxBuffer;
use crate::resources::image::GfxImage;

/// 便捷创建 image memory barrier 的结构体
#[derive(Clone, Copy)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::empty(),
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'_> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    ///
    /// 根据前后两个资源状态同时设置 stage、access 以及 layout
    #[inline]
    pub fn state_transfer(self, before: ResourceState, after: ResourceState) -> Self {
        let before = before.mask();
        let after = after.mask();
        self.src_mask(before.stage, before.access)
            .dst_mask(after.stage, after.access)
            .layout_transfer(before.layout, after.layout)
    }

    /// builder
    /// layer 和 miplevel 都使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

#[derive(Clone, Copy)]
pub struct GfxBufferBarrier {
    inner: vk::BufferMemoryBarrier2<'static>,
}

impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            inner: vk::BufferMemoryBarrier2 {
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            },
        }
    }
}

impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::BufferMemoryBarrier2<'_> {
        &self.inner
    }

    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    #[inline]
    pub fn state_transfer(self, before: ResourceState, after: ResourceState) -> Self {
        let before = before.mask();
        let after = after.mask();
        self.src_mask(before.stage, before.access).dst_mask(after.stage, after.access)
    }

    #[inline]
    pub fn buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.inner.buffer = buffer;
        self.inner.offset = offset;
        self.inner.size = size;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionTarget {
    Buffer(vk::Buffer),
    Image { image: vk::Image, aspect: vk::ImageAspectFlags },
}

/// 一个资源从 `before` 状态到 `after` 状态的转换
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub target: TransitionTarget,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl Transition {
    #[inline]
    pub fn buffer(buffer: &GfxBuffer, before: ResourceState, after: ResourceState) -> Self {
        Self {
            target: TransitionTarget::Buffer(buffer.vk_buffer()),
            before,
            after,
        }
    }

    #[inline]
    pub fn image(image: &GfxImage, before: ResourceState, after: ResourceState) -> Self {
        Self::raw_image(image.vk_image(), image.aspect(), before, after)
    }

    /// 用于不由 `GfxImage` 管理的 image，例如 swapchain image
    #[inline]
    pub fn raw_image(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        before: ResourceState,
        after: ResourceState,
    ) -> Self {
        Self {
            target: TransitionTarget::Image { image, aspect },
            before,
            after,
        }
    }

    /// 将一组 transition 拆分为 buffer barrier 与 image barrier
    pub fn split(transitions: &[Transition]) -> (Vec<GfxBufferBarrier>, Vec<GfxImageBarrier>) {
        let mut buffer_barriers = Vec::new();
        let mut image_barriers = Vec::new();
        for transition in transitions {
            match transition.target {
                TransitionTarget::Buffer(buffer) => buffer_barriers.push(
                    GfxBufferBarrier::new()
                        .buffer(buffer, 0, vk::WHOLE_SIZE)
                        .state_transfer(transition.before, transition.after),
                ),
                TransitionTarget::Image { image, aspect } => image_barriers.push(
                    GfxImageBarrier::new()
                        .image(image)
                        .image_aspect_flag(aspect)
                        .state_transfer(transition.before, transition.after),
                ),
            }
        }
        (buffer_barriers, image_barriers)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_split_transitions() {
        let transitions = [
            Transition::raw_image(
                vk::Image::from_raw(1),
                vk::ImageAspectFlags::COLOR,
                ResourceState::Present,
                ResourceState::RenderTarget,
            ),
            Transition {
                target: TransitionTarget::Buffer(vk::Buffer::from_raw(2)),
                before: ResourceState::VertexAndConstantBuffer,
                after: ResourceState::CopyDest,
            },
        ];

        let (buffers, images) = Transition::split(&transitions);
        assert_eq!(buffers.len(), 1);
        assert_eq!(images.len(), 1);

        let image = images[0].inner();
        assert_eq!(image.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(image.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(image.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(image.dst_access_mask, ResourceState::RenderTarget.mask().access);

        let buffer = buffers[0].inner();
        assert_eq!(buffer.buffer.as_raw(), 2);
        assert_eq!(buffer.size, vk::WHOLE_SIZE);
        assert_eq!(buffer.dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    }
}
