use ash::vk;
use itertools::Itertools;

use crate::commands::barrier::Transition;
use crate::commands::command_list::{RenderCommandList, ResourceCommandList};
use crate::commands::resource_state::ResourceState;
use crate::render_device::RenderDevice;
use crate::resources::buffer::GfxBuffer;
use crate::resources::vertex::{GfxVertexLayout, StandardVertex, StandardVertexLayout};

const VERTEX_STRIDE: vk::DeviceSize = size_of::<StandardVertex>() as vk::DeviceSize;
const INDEX_SIZE: vk::DeviceSize = size_of::<u32>() as vk::DeviceSize;

/// mesh 在共享 vertex/index buffer 中的位置
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mesh {
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub first_index: u32,
    pub num_indices: u32,
}

/// 共享 buffer 上只增不减的分配游标
#[derive(Debug)]
pub struct MeshArena {
    vertex_capacity: vk::DeviceSize,
    index_capacity: vk::DeviceSize,

    next_free_vertex_byte: vk::DeviceSize,
    next_vertex_offset: u32,
    next_index_offset: u32,
}

impl MeshArena {
    /// 容量以字节为单位
    pub fn new(vertex_capacity: vk::DeviceSize, index_capacity: vk::DeviceSize) -> Self {
        Self {
            vertex_capacity,
            index_capacity,
            next_free_vertex_byte: 0,
            next_vertex_offset: 0,
            next_index_offset: 0,
        }
    }

    pub fn can_fit(&self, num_vertices: usize, num_indices: usize) -> bool {
        let vertex_end = self.next_free_vertex_byte + num_vertices as vk::DeviceSize * VERTEX_STRIDE;
        let index_end = (self.next_index_offset as vk::DeviceSize + num_indices as vk::DeviceSize) * INDEX_SIZE;
        vertex_end <= self.vertex_capacity && index_end <= self.index_capacity
    }

    /// 空间不足时返回 None，游标不变
    pub fn reserve(&mut self, num_vertices: usize, num_indices: usize) -> Option<Mesh> {
        if !self.can_fit(num_vertices, num_indices) {
            log::error!(
                "Mesh with {} vertices and {} indices does not fit in the mesh store ({} of {} vertex bytes, {} of {} index bytes used)",
                num_vertices,
                num_indices,
                self.next_free_vertex_byte,
                self.vertex_capacity,
                self.next_index_offset as vk::DeviceSize * INDEX_SIZE,
                self.index_capacity
            );
            return None;
        }

        let mesh = Mesh {
            first_vertex: self.next_vertex_offset,
            num_vertices: num_vertices as u32,
            first_index: self.next_index_offset,
            num_indices: num_indices as u32,
        };
        self.next_free_vertex_byte += num_vertices as vk::DeviceSize * VERTEX_STRIDE;
        self.next_vertex_offset += num_vertices as u32;
        self.next_index_offset += num_indices as u32;
        Some(mesh)
    }

    #[inline]
    pub fn next_free_vertex_byte(&self) -> vk::DeviceSize {
        self.next_free_vertex_byte
    }

    #[inline]
    pub fn next_vertex_offset(&self) -> u32 {
        self.next_vertex_offset
    }

    #[inline]
    pub fn next_index_offset(&self) -> u32 {
        self.next_index_offset
    }
}

/// 相对于第一个顶点的 index 转换为 buffer 中的绝对 index
pub fn offset_indices(indices: &[u32], vertex_base: u32) -> Vec<u32> {
    indices.iter().map(|i| i + vertex_base).collect_vec()
}

/// vertex buffer 中一个 attribute 所在的子区间
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttributeBinding {
    pub location: u32,
    pub offset: vk::DeviceSize,
    pub stride: vk::DeviceSize,
    pub format: vk::Format,
}

/// 所有静态 mesh 共享的 vertex buffer 和 index buffer
///
/// mesh 只能在 `begin_adding_meshes` 和 `end_adding_meshes` 之间添加，添加后不会被移除
pub struct MeshDataStore {
    vertex_buffer: GfxBuffer,
    index_buffer: GfxBuffer,
    arena: MeshArena,

    adding_meshes: bool,
}

// new & init
impl MeshDataStore {
    pub fn new(vertex_buffer: GfxBuffer, index_buffer: GfxBuffer) -> Self {
        let arena = MeshArena::new(vertex_buffer.size(), index_buffer.size());
        Self {
            vertex_buffer,
            index_buffer,
            arena,
            adding_meshes: false,
        }
    }
}

// getters
impl MeshDataStore {
    #[inline]
    pub fn vertex_buffer(&self) -> &GfxBuffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &GfxBuffer {
        &self.index_buffer
    }

    #[inline]
    pub fn arena(&self) -> &MeshArena {
        &self.arena
    }

    /// 单个交错 binding 中各个 attribute 的位置
    pub fn vertex_bindings(&self) -> Vec<VertexAttributeBinding> {
        StandardVertexLayout::vertex_input_attributes()
            .iter()
            .map(|attr| VertexAttributeBinding {
                location: attr.location,
                offset: attr.offset as vk::DeviceSize,
                stride: VERTEX_STRIDE,
                format: attr.format,
            })
            .collect()
    }
}

// tools
impl MeshDataStore {
    pub fn begin_adding_meshes(&mut self, cmds: &ResourceCommandList) {
        debug_assert!(!self.adding_meshes, "begin_adding_meshes called twice");
        cmds.resource_barrier(&[
            Transition::buffer(&self.vertex_buffer, ResourceState::VertexAndConstantBuffer, ResourceState::CopyDest),
            Transition::buffer(&self.index_buffer, ResourceState::IndexBuffer, ResourceState::CopyDest),
        ]);
        self.adding_meshes = true;
    }

    /// 通过 staging buffer 上传，staging buffer 在 command list 执行完毕之后回到 pool 中
    ///
    /// 空间不足或者无法获取 staging buffer 时返回 None
    pub fn add_mesh(
        &mut self,
        device: &mut RenderDevice,
        vertices: &[StandardVertex],
        indices: &[u32],
        cmds: &mut ResourceCommandList,
    ) -> Option<Mesh> {
        let _span = tracy_client::span!("MeshDataStore::add_mesh");
        debug_assert!(self.adding_meshes, "add_mesh must be called between begin_adding_meshes and end_adding_meshes");
        if !self.adding_meshes {
            log::error!("add_mesh called outside of begin_adding_meshes/end_adding_meshes");
        }

        log::debug!("Adding mesh with {} vertices and {} indices", vertices.len(), indices.len());
        if !self.arena.can_fit(vertices.len(), indices.len()) {
            // reserve 负责输出错误
            return self.arena.reserve(vertices.len(), indices.len());
        }

        let vertex_bytes = vertices.len() as vk::DeviceSize * VERTEX_STRIDE;
        let index_bytes = indices.len() as vk::DeviceSize * INDEX_SIZE;
        let staging = device.get_staging_buffer(vertex_bytes + index_bytes)?;

        let mesh = self.arena.reserve(vertices.len(), indices.len())?;
        let indices = offset_indices(indices, mesh.first_vertex);

        staging.write_pod(0, vertices);
        staging.write_pod(vertex_bytes, &indices);

        cmds.copy_buffer_region(
            &self.vertex_buffer,
            mesh.first_vertex as vk::DeviceSize * VERTEX_STRIDE,
            &staging,
            0,
            vertex_bytes,
        );
        cmds.copy_buffer_region(
            &self.index_buffer,
            mesh.first_index as vk::DeviceSize * INDEX_SIZE,
            &staging,
            vertex_bytes,
            index_bytes,
        );
        cmds.retain_staging_buffer(staging);

        Some(mesh)
    }

    pub fn end_adding_meshes(&mut self, cmds: &ResourceCommandList) {
        debug_assert!(self.adding_meshes, "end_adding_meshes called without begin_adding_meshes");
        cmds.resource_barrier(&[
            Transition::buffer(&self.vertex_buffer, ResourceState::CopyDest, ResourceState::VertexAndConstantBuffer),
            Transition::buffer(&self.index_buffer, ResourceState::CopyDest, ResourceState::IndexBuffer),
        ]);
        self.adding_meshes = false;
    }

    /// - command type: state
    /// - supported queue types: graphics
    pub fn bind_to_command_list(&self, cmds: &RenderCommandList) {
        let cmd = cmds.command_buffer();
        cmd.cmd_bind_vertex_buffers(0, std::slice::from_ref(&self.vertex_buffer.vk_buffer()), &[0]);
        cmd.cmd_bind_index_buffer(self.index_buffer.vk_buffer(), 0, vk::IndexType::UINT32);
        cmd.cmd_set_primitive_topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    }
}

// destroy
impl MeshDataStore {
    /// buffer 在下一次提交的 command list 执行完毕之后销毁
    pub fn destroy(self, device: &mut RenderDevice) {
        device.schedule_buffer_destruction(self.vertex_buffer);
        device.schedule_buffer_destruction(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_cursors_advance() {
        let mut arena = MeshArena::new(VERTEX_STRIDE * 100, INDEX_SIZE * 300);

        let first = arena.reserve(4, 6).unwrap();
        assert_eq!(
            first,
            Mesh {
                first_vertex: 0,
                num_vertices: 4,
                first_index: 0,
                num_indices: 6
            }
        );

        let second = arena.reserve(24, 36).unwrap();
        assert_eq!(second.first_vertex, 4);
        assert_eq!(second.first_index, 6);
        assert_eq!(arena.next_free_vertex_byte(), 28 * VERTEX_STRIDE);
        assert_eq!(arena.next_vertex_offset(), 28);
        assert_eq!(arena.next_index_offset(), 42);
    }

    #[test]
    fn test_arena_overflow_keeps_cursors() {
        let mut arena = MeshArena::new(VERTEX_STRIDE * 8, INDEX_SIZE * 12);
        arena.reserve(4, 6).unwrap();

        assert!(arena.reserve(5, 6).is_none());
        assert!(arena.reserve(4, 7).is_none());
        assert_eq!(arena.next_vertex_offset(), 4);
        assert_eq!(arena.next_index_offset(), 6);

        // 恰好填满
        assert!(arena.reserve(4, 6).is_some());
        assert!(!arena.can_fit(1, 0));
    }

    #[test]
    fn test_indices_offset_by_vertex_base() {
        assert_eq!(offset_indices(&[0, 1, 2, 2, 3, 0], 4), vec![4, 5, 6, 6, 7, 4]);
        assert_eq!(offset_indices(&[], 10), Vec::<u32>::new());
    }

    #[test]
    fn test_second_mesh_indices_follow_first_mesh() {
        let mut arena = MeshArena::new(VERTEX_STRIDE * 100, INDEX_SIZE * 100);
        let first = arena.reserve(10, 3).unwrap();
        let second = arena.reserve(3, 3).unwrap();

        assert_eq!(offset_indices(&[0, 1, 2], second.first_vertex), vec![10, 11, 12]);

        // 两个 mesh 的 vertex 区间和 index 区间互不重叠
        assert_eq!(first.first_vertex + first.num_vertices, second.first_vertex);
        assert_eq!(first.first_index + first.num_indices, second.first_index);
        assert_eq!(arena.next_free_vertex_byte(), 13 * VERTEX_STRIDE);
    }
}
