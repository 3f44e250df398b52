//! Ray Tracing 所需的加速结构
//!
//! 构建命令录制到 command list 中，scratch buffer 以及 instance buffer 由 command list 持有，
//! 在 GPU 执行完毕之后释放

use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_list::ComputeCommandList;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::raytracing::raytracing_structs::TriangleGeometryDesc;
use crate::render_device::RenderDevice;
use crate::resources::buffer::{BufferCreateInfo, BufferUsage, GfxBuffer};

pub struct GfxAcceleration {
    acceleration_structure: vk::AccelerationStructureKHR,
    buffer: GfxBuffer,
    ty: vk::AccelerationStructureTypeKHR,
    device: Arc<GfxDevice>,
}
impl DebugType for GfxAcceleration {
    fn debug_type_name() -> &'static str {
        "GfxAcceleration"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.acceleration_structure
    }
}
// new & init
impl GfxAcceleration {
    /// 录制 blas 的构建命令
    ///
    /// 每个 geometry 对应共享 vertex/index buffer 中的一个 mesh
    ///
    /// # 构建过程
    ///
    /// 1. 查询构建 blas 所需的尺寸
    /// 2. 创建 blas 和 scratch buffer
    /// 3. 录制构建命令，以及 build -> read 的 barrier
    pub fn build_blas(
        device: &RenderDevice,
        geometries: &[TriangleGeometryDesc],
        cmds: &mut ComputeCommandList,
        debug_name: &str,
    ) -> Option<Self> {
        let _span = tracy_client::span!("GfxAcceleration::build_blas");
        if geometries.is_empty() {
            log::error!("Can not build BLAS {} without geometry", debug_name);
            return None;
        }

        let vk_geometries = geometries.iter().map(TriangleGeometryDesc::geometry).collect_vec();
        let range_infos = geometries.iter().map(TriangleGeometryDesc::range).collect_vec();
        let max_primitives = geometries.iter().map(|g| g.primitive_count).collect_vec();

        // 使用部分完整的 AccelerationStructureBuildGeometryInfo 来查询所需的资源大小
        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .geometries(&vk_geometries)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD);

        let size_info = Self::query_build_sizes(device.gfx_device(), &build_geometry_info, &max_primitives);
        let acceleration = Self::new(
            device,
            size_info.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            debug_name,
        )?;
        let scratch_buffer = Self::scratch_buffer(device, size_info.build_scratch_size, debug_name)?;

        // 填充 build geometry info 的剩余部分
        build_geometry_info.dst_acceleration_structure = acceleration.acceleration_structure;
        build_geometry_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch_buffer.device_address(),
        };

        cmds.build_acceleration_structure(&build_geometry_info, &range_infos);
        Self::build_to_read_barrier(cmds);
        cmds.retain_buffer(scratch_buffer);

        Some(acceleration)
    }

    /// 录制 tlas 的构建命令
    ///
    /// instance 数据写入 upload 内存中的 instance buffer
    pub fn build_tlas(
        device: &RenderDevice,
        instances: &[vk::AccelerationStructureInstanceKHR],
        cmds: &mut ComputeCommandList,
        debug_name: &str,
    ) -> Option<Self> {
        let _span = tracy_client::span!("GfxAcceleration::build_tlas");

        let instance_buffer = GfxBuffer::new(
            device.gfx_device(),
            device.allocator().clone(),
            &BufferCreateInfo {
                name: format!("{debug_name}-instance-buffer"),
                usage: BufferUsage::StagingBuffer,
                size: size_of_val(instances) as vk::DeviceSize,
            },
            Some(16),
        )?;
        // vk::AccelerationStructureInstanceKHR 没有实现 Pod，直接按字节写入
        let instance_bytes =
            unsafe { std::slice::from_raw_parts(instances.as_ptr().cast::<u8>(), size_of_val(instances)) };
        instance_buffer.write_bytes(0, instance_bytes);

        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    // true: data 是 &[&vk::AccelerationStructureInstanceKHR]
                    // false: data 是 &[vk::AccelerationStructureInstanceKHR]
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_buffer.device_address(),
                    }),
            });
        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(instances.len() as u32);

        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .geometries(std::slice::from_ref(&geometry));

        let size_info =
            Self::query_build_sizes(device.gfx_device(), &build_geometry_info, &[instances.len() as u32]);
        let acceleration = Self::new(
            device,
            size_info.acceleration_structure_size,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            debug_name,
        )?;
        let scratch_buffer = Self::scratch_buffer(device, size_info.build_scratch_size, debug_name)?;

        // 补全剩下的 build info
        build_geometry_info.dst_acceleration_structure = acceleration.acceleration_structure;
        build_geometry_info.scratch_data.device_address = scratch_buffer.device_address();

        cmds.build_acceleration_structure(&build_geometry_info, std::slice::from_ref(&range_info));
        Self::build_to_read_barrier(cmds);
        cmds.retain_buffer(scratch_buffer);
        cmds.retain_buffer(instance_buffer);

        Some(acceleration)
    }

    /// 创建 AccelerationStructure 以及 buffer
    fn new(
        device: &RenderDevice,
        size: vk::DeviceSize,
        ty: vk::AccelerationStructureTypeKHR,
        debug_name: &str,
    ) -> Option<Self> {
        let buffer = GfxBuffer::new(
            device.gfx_device(),
            device.allocator().clone(),
            &BufferCreateInfo {
                name: format!("{debug_name}-buffer"),
                usage: BufferUsage::RaytracingAccelerationStructure,
                size,
            },
            None,
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default() //
            .ty(ty)
            .size(size)
            .buffer(buffer.vk_buffer());

        let acceleration_structure =
            match unsafe { device.gfx_device().acceleration_structure().create_acceleration_structure(&create_info, None) }
            {
                Ok(handle) => handle,
                Err(e) => {
                    log::error!("Could not create acceleration structure {}: {:?}", debug_name, e);
                    return None;
                }
            };

        let acceleration = Self {
            acceleration_structure,
            buffer,
            ty,
            device: device.gfx_device().clone(),
        };
        acceleration.device.set_debug_name(&acceleration, debug_name);
        Some(acceleration)
    }

    fn query_build_sizes(
        device: &GfxDevice,
        build_geometry_info: &vk::AccelerationStructureBuildGeometryInfoKHR,
        max_primitives: &[u32],
    ) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
        let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            device.acceleration_structure().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                build_geometry_info,
                max_primitives, // 每一个 geometry 里面的最大 primitive 数量
                &mut size_info,
            );
        }
        size_info
    }

    /// scratch buffer 的起始地址需要满足 minAccelerationStructureScratchOffsetAlignment
    fn scratch_buffer(device: &RenderDevice, size: vk::DeviceSize, debug_name: &str) -> Option<GfxBuffer> {
        GfxBuffer::new(
            device.gfx_device(),
            device.allocator().clone(),
            &BufferCreateInfo {
                name: format!("{debug_name}-scratch-buffer"),
                usage: BufferUsage::UnorderedAccess,
                size,
            },
            Some(device.acceleration_scratch_alignment() as vk::DeviceSize),
        )
    }

    /// 后续的 tlas 构建以及 ray query 会读取构建结果
    fn build_to_read_barrier(cmds: &ComputeCommandList) {
        cmds.command_buffer().memory_barrier(std::slice::from_ref(
            &vk::MemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
                .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
                .dst_stage_mask(
                    vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR
                        | vk::PipelineStageFlags2::ALL_GRAPHICS
                        | vk::PipelineStageFlags2::COMPUTE_SHADER,
                )
                .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR),
        ));
    }
}
// getters
impl GfxAcceleration {
    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.acceleration_structure
    }

    #[inline]
    pub fn ty(&self) -> vk::AccelerationStructureTypeKHR {
        self.ty
    }

    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        unsafe {
            self.device.acceleration_structure().get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default()
                    .acceleration_structure(self.acceleration_structure),
            )
        }
    }
}
// destroy
impl GfxAcceleration {
    #[inline]
    pub fn destroy(self) {
        // drop
    }
}
impl Drop for GfxAcceleration {
    fn drop(&mut self) {
        unsafe {
            self.device.acceleration_structure().destroy_acceleration_structure(self.acceleration_structure, None);
        }
    }
}
