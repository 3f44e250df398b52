use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::descriptors::bind_group::{
    DescriptorTableDescriptorDescription, DescriptorTableHandle, DescriptorType, RootDescriptorDescription,
};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// push constant 的布局：3 个 u32
pub const CAMERA_INDEX_OFFSET: u32 = 0;
pub const MATERIAL_INDEX_OFFSET: u32 = 4;
pub const MODEL_MATRIX_INDEX_OFFSET: u32 = 8;
pub const PUSH_CONSTANT_SIZE: u32 = 12;

pub const CAMERAS_ROOT_DESCRIPTOR: &str = "cameras";
pub const MATERIAL_BUFFER_ROOT_DESCRIPTOR: &str = "material_buffer";
pub const LIGHTS_ROOT_DESCRIPTOR: &str = "lights";
pub const PER_FRAME_DATA_ROOT_DESCRIPTOR: &str = "per_frame_data";
pub const MODEL_MATRICES_ROOT_DESCRIPTOR: &str = "model_matrices";
pub const RAYTRACING_SCENE_ROOT_DESCRIPTOR: &str = "raytracing_scene";
pub const TEXTURES_TABLE: &str = "textures";

/// textures 这个 descriptor table 所在的 root parameter
pub const TEXTURES_TABLE_ROOT_INDEX: u32 = 6;

/// 标准 root descriptor：(名字, binding, 类型, 在 set 1 中的 Vulkan 类型)
pub fn standard_root_descriptor_table(
    raytracing: bool,
) -> Vec<(&'static str, u32, DescriptorType, vk::DescriptorType)> {
    let mut table = vec![
        (CAMERAS_ROOT_DESCRIPTOR, 0, DescriptorType::ShaderResource, vk::DescriptorType::STORAGE_BUFFER),
        (MATERIAL_BUFFER_ROOT_DESCRIPTOR, 1, DescriptorType::ShaderResource, vk::DescriptorType::STORAGE_BUFFER),
        (LIGHTS_ROOT_DESCRIPTOR, 2, DescriptorType::ShaderResource, vk::DescriptorType::STORAGE_BUFFER),
        (PER_FRAME_DATA_ROOT_DESCRIPTOR, 3, DescriptorType::ConstantBuffer, vk::DescriptorType::UNIFORM_BUFFER),
        (MODEL_MATRICES_ROOT_DESCRIPTOR, 4, DescriptorType::ShaderResource, vk::DescriptorType::STORAGE_BUFFER),
    ];
    if raytracing {
        table.push((
            RAYTRACING_SCENE_ROOT_DESCRIPTOR,
            5,
            DescriptorType::ShaderResource,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        ));
    }
    table
}

pub fn standard_root_descriptors(raytracing: bool) -> HashMap<String, RootDescriptorDescription> {
    standard_root_descriptor_table(raytracing)
        .into_iter()
        .map(|(name, index, ty, _)| (name.to_string(), RootDescriptorDescription { index, ty }))
        .collect()
}

pub fn standard_descriptor_table_descriptors() -> HashMap<String, DescriptorTableDescriptorDescription> {
    HashMap::from([(
        TEXTURES_TABLE.to_string(),
        DescriptorTableDescriptorDescription {
            ty: DescriptorType::ShaderResource,
            heap_offset: 0,
        },
    )])
}

pub fn standard_descriptor_table_handles() -> HashMap<u32, DescriptorTableHandle> {
    HashMap::from([(TEXTURES_TABLE_ROOT_INDEX, DescriptorTableHandle { heap_offset: 0 })])
}

/// 所有 pipeline 共用的 pipeline layout
///
/// - set 0: bindless resource heap（包含 static sampler）
/// - set 1: push descriptor，对应 root descriptor
/// - push constant: camera index，material index，model matrix index
pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    root_descriptor_set_layout: vk::DescriptorSetLayout,

    device: Arc<GfxDevice>,
    destroyed: bool,
}

// new & init
impl GfxPipelineLayout {
    /// 创建失败是致命错误
    pub fn new_standard(device: Arc<GfxDevice>, resource_heap_layout: vk::DescriptorSetLayout) -> Self {
        let _span = tracy_client::span!("GfxPipelineLayout::new_standard");

        let bindings = standard_root_descriptor_table(device.raytracing_enabled())
            .into_iter()
            .map(|(_, binding, _, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(ty)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect_vec();
        let root_descriptor_set_layout = unsafe {
            device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default()
                    .bindings(&bindings)
                    .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR),
                None,
            )
        }
        .unwrap_or_else(|e| panic!("Could not create the root descriptor set layout: {e:?}"));

        let set_layouts = [resource_heap_layout, root_descriptor_set_layout];
        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        };
        let handle = unsafe {
            device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default()
                    .set_layouts(&set_layouts)
                    .push_constant_ranges(std::slice::from_ref(&push_constant_range)),
                None,
            )
        }
        .unwrap_or_else(|e| panic!("Could not create the standard pipeline layout: {e:?}"));

        let layout = Self {
            handle,
            root_descriptor_set_layout,
            device,
            destroyed: false,
        };
        layout.device.set_debug_name(&layout, "standard");
        layout
    }
}

// getters
impl GfxPipelineLayout {
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn root_descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.root_descriptor_set_layout
    }
}

// destroy
impl GfxPipelineLayout {
    pub fn destroy(mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
            self.device.destroy_descriptor_set_layout(self.root_descriptor_set_layout, None);
        }
        self.destroyed = true;
    }
}
impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "GfxPipelineLayout must be destroyed manually.");
    }
}
impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::descriptors::bind_group::{BufferBinding, RootBinding, root_descriptor_vk_type};

    #[test]
    fn test_layout_types_match_bind_group_resolution() {
        let binding = RootBinding::Buffer(BufferBinding {
            buffer: vk::Buffer::from_raw(1),
            offset: 0,
            range: vk::WHOLE_SIZE,
        });
        for (name, _, ty, vk_ty) in standard_root_descriptor_table(false) {
            assert_eq!(root_descriptor_vk_type(ty, &binding), vk_ty, "{name}");
        }
    }

    #[test]
    fn test_raytracing_scene_only_with_raytracing() {
        assert!(!standard_root_descriptors(false).contains_key(RAYTRACING_SCENE_ROOT_DESCRIPTOR));
        let descriptors = standard_root_descriptors(true);
        assert_eq!(descriptors[RAYTRACING_SCENE_ROOT_DESCRIPTOR].index, 5);
        assert_eq!(descriptors[PER_FRAME_DATA_ROOT_DESCRIPTOR].ty, DescriptorType::ConstantBuffer);
    }

    #[test]
    fn test_table_does_not_collide_with_root_descriptors() {
        let handles = standard_descriptor_table_handles();
        for desc in standard_root_descriptors(true).values() {
            assert!(!handles.contains_key(&desc.index));
        }
        assert_eq!(standard_descriptor_table_descriptors()[TEXTURES_TABLE].heap_offset, 0);
    }

    #[test]
    fn test_push_constant_layout() {
        let offsets = [CAMERA_INDEX_OFFSET, MATERIAL_INDEX_OFFSET, MODEL_MATRIX_INDEX_OFFSET];
        assert!(offsets.iter().all(|o| o + 4 <= PUSH_CONSTANT_SIZE));
        assert_eq!(offsets.iter().unique().count(), 3);
    }
}
