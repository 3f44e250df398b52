use ash::vk;

/// 资源在 GPU 上所处的使用状态
///
/// 每个状态对应一组 (pipeline stage, access mask, image layout)，
/// barrier 通过前后两个状态生成
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Undefined,
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    NonPixelShaderResource,
    PixelShaderResource,
    ShaderResource,
    CopyDest,
    CopySource,
    Present,
    GenericRead,
    IndirectArgument,
    AccelerationStructure,
}

/// 某个状态下的同步范围
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateMask {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// buffer 会忽略该字段
    pub layout: vk::ImageLayout,
}

impl ResourceState {
    pub fn mask(self) -> StateMask {
        use vk::AccessFlags2 as A;
        use vk::PipelineStageFlags2 as S;

        let (stage, access, layout) = match self {
            Self::Undefined => (S::TOP_OF_PIPE, A::NONE, vk::ImageLayout::UNDEFINED),
            Self::Common => (S::ALL_COMMANDS, A::MEMORY_READ | A::MEMORY_WRITE, vk::ImageLayout::GENERAL),
            Self::VertexAndConstantBuffer => (
                S::VERTEX_INPUT | S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::VERTEX_ATTRIBUTE_READ | A::UNIFORM_READ,
                vk::ImageLayout::GENERAL,
            ),
            Self::IndexBuffer => (S::INDEX_INPUT, A::INDEX_READ, vk::ImageLayout::GENERAL),
            Self::RenderTarget => (
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::UnorderedAccess => (
                S::COMPUTE_SHADER | S::FRAGMENT_SHADER,
                A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
                vk::ImageLayout::GENERAL,
            ),
            Self::DepthWrite => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthRead => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS | S::FRAGMENT_SHADER,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::SHADER_SAMPLED_READ,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),
            Self::NonPixelShaderResource => (
                S::VERTEX_SHADER | S::COMPUTE_SHADER,
                A::SHADER_SAMPLED_READ | A::SHADER_STORAGE_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::PixelShaderResource => {
                (S::FRAGMENT_SHADER, A::SHADER_SAMPLED_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            }
            Self::ShaderResource => (
                S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::SHADER_SAMPLED_READ | A::SHADER_STORAGE_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::CopyDest => (S::ALL_TRANSFER, A::TRANSFER_WRITE, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            Self::CopySource => (S::ALL_TRANSFER, A::TRANSFER_READ, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            // 与 acquire semaphore 的等待阶段 (ALL_COMMANDS) 衔接
            Self::Present => (S::ALL_COMMANDS, A::NONE, vk::ImageLayout::PRESENT_SRC_KHR),
            Self::GenericRead => (S::ALL_COMMANDS, A::MEMORY_READ, vk::ImageLayout::GENERAL),
            Self::IndirectArgument => (S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, vk::ImageLayout::GENERAL),
            Self::AccelerationStructure => (
                S::ACCELERATION_STRUCTURE_BUILD_KHR | S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
                A::ACCELERATION_STRUCTURE_READ_KHR | A::ACCELERATION_STRUCTURE_WRITE_KHR,
                vk::ImageLayout::GENERAL,
            ),
        };

        StateMask { stage, access, layout }
    }

    /// 该状态下 GPU 是否可能写入资源
    #[inline]
    pub fn is_write(self) -> bool {
        const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
            vk::AccessFlags2::MEMORY_WRITE.as_raw()
                | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
                | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
        );
        self.mask().access.intersects(WRITE_ACCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_layouts() {
        assert_eq!(ResourceState::Undefined.mask().layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(ResourceState::RenderTarget.mask().layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(ResourceState::DepthWrite.mask().layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(ResourceState::CopyDest.mask().layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(ResourceState::CopySource.mask().layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(ResourceState::Present.mask().layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(ResourceState::ShaderResource.mask().layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(ResourceState::UnorderedAccess.mask().layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_write_states() {
        assert!(ResourceState::RenderTarget.is_write());
        assert!(ResourceState::CopyDest.is_write());
        assert!(ResourceState::UnorderedAccess.is_write());
        assert!(!ResourceState::ShaderResource.is_write());
        assert!(!ResourceState::CopySource.is_write());
        assert!(!ResourceState::IndexBuffer.is_write());
        assert!(!ResourceState::Undefined.is_write());
    }

    #[test]
    fn test_buffer_states_use_expected_stages() {
        let index = ResourceState::IndexBuffer.mask();
        assert_eq!(index.stage, vk::PipelineStageFlags2::INDEX_INPUT);
        assert_eq!(index.access, vk::AccessFlags2::INDEX_READ);

        let vertex = ResourceState::VertexAndConstantBuffer.mask();
        assert!(vertex.stage.contains(vk::PipelineStageFlags2::VERTEX_INPUT));
        assert!(vertex.access.contains(vk::AccessFlags2::UNIFORM_READ));
    }
}
