//! 每个 frame in flight 各自拥有一份的 upload buffer
//!
//! CPU 在第 N 帧写入 `buffers[frame_idx]` 时，GPU 可能仍在读取其他帧的 buffer

use std::sync::atomic::{AtomicU32, Ordering};

use ash::vk;
use glam::Mat4;
use itertools::Itertools;
use solis_gfx::render_device::RenderDevice;
use solis_gfx::resources::buffer::{BufferCreateInfo, BufferUsage, GfxBuffer};
use solis_render_interface::components::{CameraComponent, TransformComponent};
use solis_render_interface::gpu_data::CameraMatrices;

pub struct PerFrameBuffers {
    buffers: Vec<GfxBuffer>,
}

// new & init
impl PerFrameBuffers {
    /// 任意一个 buffer 创建失败时返回 None
    pub fn new(device: &RenderDevice, name: &str, size: vk::DeviceSize) -> Option<Self> {
        let buffers = (0..device.num_frames())
            .map(|frame_idx| {
                device.create_buffer(&BufferCreateInfo {
                    name: format!("{name}-{frame_idx}"),
                    usage: BufferUsage::ConstantBuffer,
                    size,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { buffers })
    }
}

// getters
impl PerFrameBuffers {
    #[inline]
    pub fn get(&self, frame_idx: usize) -> &GfxBuffer {
        &self.buffers[frame_idx]
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffers.first().map_or(0, GfxBuffer::size)
    }
}

// update
impl PerFrameBuffers {
    /// 超出 buffer 大小的部分会被截断
    pub fn write_bytes(&self, frame_idx: usize, bytes: &[u8]) {
        let buffer = self.get(frame_idx);
        let len = bytes.len().min(buffer.size() as usize);
        if len < bytes.len() {
            log::error!(
                "Writing {} bytes into {} which only holds {} bytes",
                bytes.len(),
                buffer.name(),
                buffer.size()
            );
        }
        buffer.write_bytes(0, &bytes[..len]);
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, frame_idx: usize, data: &[T]) {
        self.write_bytes(frame_idx, bytemuck::cast_slice(data));
    }
}

/// 相机矩阵在 CPU 端的副本，以 `CameraComponent::idx` 为索引
pub struct CameraMatrixTable {
    matrices: Vec<CameraMatrices>,
}

impl CameraMatrixTable {
    pub fn new(max_num_cameras: usize) -> Self {
        Self {
            matrices: vec![CameraMatrices::default(); max_num_cameras],
        }
    }

    #[inline]
    pub fn matrices(&self) -> &[CameraMatrices] {
        &self.matrices
    }

    #[inline]
    pub fn get(&self, camera_idx: u32) -> Option<&CameraMatrices> {
        self.matrices.get(camera_idx as usize)
    }

    /// 上一帧的矩阵保存到 previous 中，再计算新的矩阵
    ///
    /// 相机索引越界时返回 false
    pub fn update(&mut self, transform: &TransformComponent, camera: &CameraComponent) -> bool {
        let Some(matrices) = self.matrices.get_mut(camera.idx as usize) else {
            log::error!("Camera index {} exceeds the {} camera slots", camera.idx, self.matrices.len());
            return false;
        };
        matrices.copy_matrices_to_previous();
        matrices.calculate_view_matrix(transform);
        matrices.calculate_projection_matrix(camera);
        true
    }
}

pub struct CameraMatrixBuffer {
    table: CameraMatrixTable,
    device_buffers: PerFrameBuffers,
}

// new & init
impl CameraMatrixBuffer {
    pub fn new(device: &RenderDevice, max_num_cameras: u32) -> Option<Self> {
        let table = CameraMatrixTable::new(max_num_cameras as usize);
        let device_buffers =
            PerFrameBuffers::new(device, "camera-matrices", size_of_val(table.matrices()) as vk::DeviceSize)?;
        Some(Self { table, device_buffers })
    }
}

// getters
impl CameraMatrixBuffer {
    #[inline]
    pub fn table(&self) -> &CameraMatrixTable {
        &self.table
    }

    #[inline]
    pub fn get_device_buffer(&self, frame_idx: usize) -> &GfxBuffer {
        self.device_buffers.get(frame_idx)
    }
}

// update
impl CameraMatrixBuffer {
    #[inline]
    pub fn set_camera_matrices(&mut self, transform: &TransformComponent, camera: &CameraComponent) -> bool {
        self.table.update(transform, camera)
    }

    pub fn upload(&self, frame_idx: usize) {
        let _span = tracy_client::span!("CameraMatrixBuffer::upload");
        self.device_buffers.write_pod(frame_idx, self.table.matrices());
    }
}

/// 在一帧内分配 model matrix 的位置，多个线程可以同时分配
pub struct MatrixCursor {
    next: AtomicU32,
    capacity: u32,
}

impl MatrixCursor {
    pub fn new(capacity: u32) -> Self {
        Self {
            next: AtomicU32::new(0),
            capacity,
        }
    }

    /// 容量用尽时返回 None
    pub fn next(&self) -> Option<u32> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        (idx < self.capacity).then_some(idx)
    }

    /// 本帧已经分配的数量
    #[inline]
    pub fn count(&self) -> u32 {
        self.next.load(Ordering::Relaxed).min(self.capacity)
    }

    #[inline]
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

/// 每一帧的 model matrix 数组，在 `begin_frame` 时清空
pub struct ModelMatrixBuffers {
    buffers: PerFrameBuffers,
    cursors: Vec<MatrixCursor>,
}

// new & init
impl ModelMatrixBuffers {
    pub fn new(device: &RenderDevice, max_model_matrices: u32) -> Option<Self> {
        let buffers = PerFrameBuffers::new(
            device,
            "model-matrices",
            max_model_matrices as vk::DeviceSize * size_of::<Mat4>() as vk::DeviceSize,
        )?;
        let cursors = (0..device.num_frames()).map(|_| MatrixCursor::new(max_model_matrices)).collect_vec();
        Some(Self { buffers, cursors })
    }
}

// getters
impl ModelMatrixBuffers {
    #[inline]
    pub fn get(&self, frame_idx: usize) -> &GfxBuffer {
        self.buffers.get(frame_idx)
    }

    #[inline]
    pub fn count(&self, frame_idx: usize) -> u32 {
        self.cursors[frame_idx].count()
    }
}

// update
impl ModelMatrixBuffers {
    /// 返回矩阵在本帧数组中的索引，容量用尽时记录错误并返回 0
    pub fn add(&self, transform: &TransformComponent, frame_idx: usize) -> u32 {
        let Some(idx) = self.cursors[frame_idx].next() else {
            log::error!("Model matrix buffer for frame {} is full", frame_idx);
            return 0;
        };
        let matrix = transform.to_matrix();
        self.buffers
            .get(frame_idx)
            .write_pod(idx as vk::DeviceSize * size_of::<Mat4>() as vk::DeviceSize, std::slice::from_ref(&matrix));
        idx
    }

    #[inline]
    pub fn reset(&self, frame_idx: usize) {
        self.cursors[frame_idx].reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::sync::Arc;

    #[test]
    fn test_cursor_stops_at_capacity() {
        let cursor = MatrixCursor::new(2);
        assert_eq!(cursor.next(), Some(0));
        assert_eq!(cursor.next(), Some(1));
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.count(), 2);

        cursor.reset();
        assert_eq!(cursor.count(), 0);
        assert_eq!(cursor.next(), Some(0));
    }

    #[test]
    fn test_cursor_is_unique_across_threads() {
        let cursor = Arc::new(MatrixCursor::new(1000));
        let handles = (0..4)
            .map(|_| {
                let cursor = cursor.clone();
                std::thread::spawn(move || (0..100).filter_map(|_| cursor.next()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();

        let mut all = handles.into_iter().flat_map(|h| h.join().unwrap()).collect::<Vec<_>>();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_camera_table_keeps_previous_matrices() {
        let mut table = CameraMatrixTable::new(2);
        let camera = CameraComponent::default();

        let first = TransformComponent {
            location: Vec3::new(0.0, 0.0, 5.0),
            ..Default::default()
        };
        assert!(table.update(&first, &camera));
        let first_view = table.get(0).unwrap().view;

        let second = TransformComponent {
            location: Vec3::new(1.0, 0.0, 5.0),
            ..Default::default()
        };
        assert!(table.update(&second, &camera));
        let matrices = table.get(0).unwrap();
        assert_eq!(matrices.previous_view, first_view);
        assert_ne!(matrices.view, first_view);

        // 第二个相机没有被修改
        assert_eq!(table.get(1).unwrap().view, Mat4::IDENTITY);
    }

    #[test]
    fn test_camera_index_out_of_range() {
        let mut table = CameraMatrixTable::new(1);
        let camera = CameraComponent {
            idx: 3,
            ..Default::default()
        };
        assert!(!table.update(&TransformComponent::default(), &camera));
    }
}
