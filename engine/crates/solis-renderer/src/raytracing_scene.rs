//! 由静态 mesh 的 BLAS 组成的 TLAS
//!
//! 物体加入场景之后只标记 dirty，在下一次渲染时重新构建整个 TLAS

use ash::vk;
use itertools::Itertools;
use solis_gfx::commands::command_list::ComputeCommandList;
use solis_gfx::raytracing::acceleration::GfxAcceleration;
use solis_gfx::raytracing::raytracing_structs::{RaytracingInstanceMask, TriangleGeometryDesc, pack_instance};
use solis_gfx::render_device::RenderDevice;
use solis_gfx::resources::buffer::GfxBuffer;
use solis_gfx::resources::mesh_data_store::Mesh;
use solis_gfx::resources::vertex::{GfxVertexLayout, StandardVertexLayout};
use solis_render_interface::components::RaytracingObjectComponent;
use solis_render_interface::handles::RaytracableGeometryHandle;

const INDEX_SIZE: u32 = size_of::<u32>() as u32;

/// mesh 在共享 vertex/index buffer 中对应的三角形 geometry
///
/// mesh 的 index 已经加上了 `first_vertex`，因此 vertex 地址从 buffer 起始位置开始
pub fn mesh_geometry(
    vertex_buffer_address: vk::DeviceAddress,
    index_buffer_address: vk::DeviceAddress,
    mesh: &Mesh,
) -> TriangleGeometryDesc {
    TriangleGeometryDesc {
        vertex_address: vertex_buffer_address + StandardVertexLayout::pos_offset(),
        vertex_stride: StandardVertexLayout::pos_stride() as vk::DeviceSize,
        max_vertex: (mesh.first_vertex + mesh.num_vertices).saturating_sub(1),
        index_address: index_buffer_address,
        primitive_count: mesh.num_indices / 3,
        primitive_offset: mesh.first_index * INDEX_SIZE,
    }
}

/// 每个物体一个 instance，引用不存在的 geometry 的物体会被跳过
pub fn build_instances(
    objects: &[RaytracingObjectComponent],
    blas_address: impl Fn(RaytracableGeometryHandle) -> Option<vk::DeviceAddress>,
) -> Vec<vk::AccelerationStructureInstanceKHR> {
    objects
        .iter()
        .filter_map(|object| {
            let Some(address) = blas_address(object.geometry) else {
                log::warn!("Raytracing object references unknown geometry {}", object.geometry);
                return None;
            };
            Some(pack_instance(address, object.material.index, RaytracingInstanceMask::OPAQUE))
        })
        .collect()
}

pub struct RaytracingScene {
    buffer: GfxAcceleration,
}

impl RaytracingScene {
    #[inline]
    pub fn acceleration(&self) -> &GfxAcceleration {
        &self.buffer
    }

    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.buffer.handle()
    }
}

#[derive(Default)]
pub struct RaytracingSceneBuilder {
    geometries: Vec<GfxAcceleration>,
    objects: Vec<RaytracingObjectComponent>,
    scene: Option<RaytracingScene>,
    dirty: bool,
}

// new & init
impl RaytracingSceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl RaytracingSceneBuilder {
    #[inline]
    pub fn scene(&self) -> Option<&RaytracingScene> {
        self.scene.as_ref()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }

    #[inline]
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }
}

// tools
impl RaytracingSceneBuilder {
    /// 所有 mesh 组成一个 BLAS，每个 mesh 一个 geometry
    pub fn create_raytracing_geometry(
        &mut self,
        device: &RenderDevice,
        vertex_buffer: &GfxBuffer,
        index_buffer: &GfxBuffer,
        meshes: &[Mesh],
        cmds: &mut ComputeCommandList,
    ) -> Option<RaytracableGeometryHandle> {
        let _span = tracy_client::span!("RaytracingSceneBuilder::create_raytracing_geometry");
        let vertex_address = vertex_buffer.device_address();
        let index_address = index_buffer.device_address();
        let geometries = meshes.iter().map(|mesh| mesh_geometry(vertex_address, index_address, mesh)).collect_vec();

        let handle = RaytracableGeometryHandle::new(self.geometries.len() as u32);
        let blas = GfxAcceleration::build_blas(device, &geometries, cmds, &format!("blas-{}", handle.index))?;
        self.geometries.push(blas);
        log::debug!("Created raytracing geometry {} with {} meshes", handle, meshes.len());
        Some(handle)
    }

    pub fn add_raytracing_objects_to_scene(&mut self, objects: &[RaytracingObjectComponent]) {
        self.objects.extend_from_slice(objects);
        self.dirty = true;
    }

    /// 旧的 TLAS 由 command list 持有，在 GPU 执行完毕之后销毁
    pub fn rebuild_raytracing_scene(&mut self, device: &RenderDevice, cmds: &mut ComputeCommandList) {
        let _span = tracy_client::span!("RaytracingSceneBuilder::rebuild_raytracing_scene");
        self.dirty = false;

        let instances = build_instances(&self.objects, |geometry| {
            self.geometries.get(geometry.index as usize).map(GfxAcceleration::device_address)
        });
        if instances.is_empty() {
            log::debug!("No raytracing instances, skipping the TLAS rebuild");
            return;
        }

        let Some(tlas) = GfxAcceleration::build_tlas(device, &instances, cmds, "raytracing-scene") else {
            log::error!("Could not build the raytracing scene with {} instances", instances.len());
            return;
        };
        log::debug!("Rebuilt the raytracing scene with {} instances", instances.len());

        if let Some(old) = self.scene.replace(RaytracingScene { buffer: tlas }) {
            cmds.retain_acceleration(old.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solis_render_interface::handles::StandardMaterialHandle;

    #[test]
    fn test_mesh_geometry_offsets() {
        let mesh = Mesh {
            first_vertex: 24,
            num_vertices: 8,
            first_index: 36,
            num_indices: 12,
        };
        let desc = mesh_geometry(0x1000, 0x8000, &mesh);

        assert_eq!(desc.vertex_address, 0x1000);
        assert_eq!(desc.vertex_stride, 40);
        assert_eq!(desc.max_vertex, 31);
        assert_eq!(desc.index_address, 0x8000);
        assert_eq!(desc.primitive_count, 4);
        assert_eq!(desc.primitive_offset, 36 * 4);
    }

    #[test]
    fn test_instances_skip_unknown_geometry() {
        let objects = [
            RaytracingObjectComponent {
                geometry: RaytracableGeometryHandle::new(0),
                material: StandardMaterialHandle::new(7),
            },
            RaytracingObjectComponent {
                geometry: RaytracableGeometryHandle::new(5),
                material: StandardMaterialHandle::new(8),
            },
        ];
        let addresses = [0xAA00_u64];
        let instances = build_instances(&objects, |g| addresses.get(g.index as usize).copied());

        assert_eq!(instances.len(), 1);
        let instance = &instances[0];
        assert_eq!(instance.instance_custom_index_and_mask.low_24(), 7);
        assert_eq!(instance.instance_custom_index_and_mask.high_8(), RaytracingInstanceMask::OPAQUE.bits());
        assert_eq!(unsafe { instance.acceleration_structure_reference.device_handle }, 0xAA00);
    }
}
