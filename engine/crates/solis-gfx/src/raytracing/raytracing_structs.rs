use ash::vk;

bitflags::bitflags! {
    /// TLAS instance 的 mask，shader 中通过 cull mask 选择参与求交的物体
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RaytracingInstanceMask: u8 {
        const OPAQUE = 0x01;
        const TRANSPARENT = 0x02;
        const LIGHT_SOURCE = 0x10;
    }
}

/// instance custom index 的有效位数
pub const MATERIAL_INDEX_BITS: u32 = 24;
pub const MAX_MATERIAL_INDEX: u32 = (1 << MATERIAL_INDEX_BITS) - 1;

/// 3x4 行主序的单位矩阵
pub const IDENTITY_TRANSFORM: vk::TransformMatrixKHR = vk::TransformMatrixKHR {
    matrix: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
};

/// 生成一个 TLAS instance
///
/// custom index 中保存 material index，只有低 24 位有效
pub fn pack_instance(
    blas_address: vk::DeviceAddress,
    material_index: u32,
    mask: RaytracingInstanceMask,
) -> vk::AccelerationStructureInstanceKHR {
    if material_index > MAX_MATERIAL_INDEX {
        log::error!(
            "Material index {} does not fit in {} bits, the instance will reference the wrong material",
            material_index,
            MATERIAL_INDEX_BITS
        );
    }

    vk::AccelerationStructureInstanceKHR {
        transform: IDENTITY_TRANSFORM,
        instance_custom_index_and_mask: vk::Packed24_8::new(material_index & MAX_MATERIAL_INDEX, mask.bits()),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            0,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: blas_address,
        },
    }
}

/// 一个 mesh 在 BLAS 中对应的三角形 geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriangleGeometryDesc {
    pub vertex_address: vk::DeviceAddress,
    pub vertex_stride: vk::DeviceSize,
    /// 顶点 buffer 中最大的顶点下标
    pub max_vertex: u32,
    pub index_address: vk::DeviceAddress,
    pub primitive_count: u32,
    /// 以字节为单位，相对于 index buffer 起始位置
    pub primitive_offset: u32,
}

impl TriangleGeometryDesc {
    pub fn geometry(&self) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: self.vertex_address,
                    })
                    .vertex_stride(self.vertex_stride)
                    .max_vertex(self.max_vertex)
                    .index_type(vk::IndexType::UINT32)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: self.index_address,
                    }),
            })
    }

    #[inline]
    pub fn range(&self) -> vk::AccelerationStructureBuildRangeInfoKHR {
        vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(self.primitive_count)
            .primitive_offset(self.primitive_offset)
            .first_vertex(0)
            .transform_offset(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_packs_material_and_mask() {
        let instance = pack_instance(0xABCD_0000, 42, RaytracingInstanceMask::OPAQUE);
        assert_eq!(instance.instance_custom_index_and_mask.low_24(), 42);
        assert_eq!(instance.instance_custom_index_and_mask.high_8(), 0x01);
        assert_eq!(unsafe { instance.acceleration_structure_reference.device_handle }, 0xABCD_0000);
        assert_eq!(instance.transform.matrix, IDENTITY_TRANSFORM.matrix);
    }

    #[test]
    fn test_material_index_truncated_to_24_bits() {
        let instance = pack_instance(0, MAX_MATERIAL_INDEX + 5, RaytracingInstanceMask::OPAQUE);
        assert_eq!(instance.instance_custom_index_and_mask.low_24(), 4);

        let instance = pack_instance(0, MAX_MATERIAL_INDEX, RaytracingInstanceMask::LIGHT_SOURCE);
        assert_eq!(instance.instance_custom_index_and_mask.low_24(), MAX_MATERIAL_INDEX);
        assert_eq!(instance.instance_custom_index_and_mask.high_8(), 0x10);
    }

    #[test]
    fn test_geometry_range_uses_byte_offset() {
        let desc = TriangleGeometryDesc {
            vertex_address: 0x1000,
            vertex_stride: 40,
            max_vertex: 23,
            index_address: 0x2000,
            primitive_count: 12,
            primitive_offset: 6 * 4,
        };
        let range = desc.range();
        assert_eq!(range.primitive_count, 12);
        assert_eq!(range.primitive_offset, 24);
        assert_eq!(desc.geometry().geometry_type, vk::GeometryTypeKHR::TRIANGLES);
    }
}
