use std::mem::offset_of;

use ash::vk;

/// 场景中所有静态 mesh 共用的顶点格式
#[repr(C)]
#[derive(Clone, Debug, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StandardVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// RGBA8
    pub color: u32,
    pub material_idx: u32,
    pub texcoord: [f32; 2],
}

impl Default for StandardVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            color: 0xFFFF_FFFF,
            material_idx: 0,
            texcoord: [0.0; 2],
        }
    }
}

/// 顶点在 vertex buffer 中的布局
pub trait GfxVertexLayout {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription>;

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription>;

    /// 整个 buffer 的大小
    fn buffer_size(vertex_cnt: usize) -> usize;

    /// position 属性的 stride，构建 BLAS 时使用
    fn pos_stride() -> u32;

    /// position 属性在 buffer 中的偏移量
    fn pos_offset() -> vk::DeviceSize;
}

/// 单个交错 binding，4 个 attribute：position，normal，color，texcoord
pub struct StandardVertexLayout;

impl GfxVertexLayout for StandardVertexLayout {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<StandardVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            // positions
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(StandardVertex, position) as u32,
            },
            // normals
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(StandardVertex, normal) as u32,
            },
            // colors
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: offset_of!(StandardVertex, color) as u32,
            },
            // texcoords
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(StandardVertex, texcoord) as u32,
            },
        ]
    }

    fn buffer_size(vertex_cnt: usize) -> usize {
        vertex_cnt * size_of::<StandardVertex>()
    }

    fn pos_stride() -> u32 {
        size_of::<StandardVertex>() as u32
    }

    fn pos_offset() -> vk::DeviceSize {
        offset_of!(StandardVertex, position) as vk::DeviceSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_vertex_layout() {
        assert_eq!(size_of::<StandardVertex>(), 40);

        let offsets = StandardVertexLayout::vertex_input_attributes().iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
        assert_eq!(StandardVertexLayout::vertex_input_bindings()[0].stride, 40);
        assert_eq!(StandardVertex::default().color, 0xFFFF_FFFF);
    }
}
