use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use vk_mem::Alloc;

use crate::commands::resource_state::ResourceState;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::foundation::mem_allocator::GfxMemAllocator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    StagingBuffer,
    IndexBuffer,
    VertexBuffer,
    ConstantBuffer,
    UnorderedAccess,
    IndirectCommands,
    RaytracingAccelerationStructure,
}

impl BufferUsage {
    /// staging buffer 和 constant buffer 放在 CPU 可写的 upload 内存中，并且持久映射
    #[inline]
    pub fn is_upload(self) -> bool {
        matches!(self, Self::StagingBuffer | Self::ConstantBuffer)
    }

    #[inline]
    pub fn initial_state(self) -> ResourceState {
        if self.is_upload() { ResourceState::GenericRead } else { ResourceState::Common }
    }

    /// 不允许 UNIFORM + SHADER_DEVICE_ADDRESS 的组合，constant buffer 不带 device address
    pub fn vk_usage(self, raytracing: bool) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;

        let as_input = if raytracing { F::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR } else { F::empty() };
        match self {
            Self::StagingBuffer => F::TRANSFER_SRC | F::SHADER_DEVICE_ADDRESS | as_input,
            Self::IndexBuffer => {
                F::INDEX_BUFFER | F::STORAGE_BUFFER | F::TRANSFER_DST | F::SHADER_DEVICE_ADDRESS | as_input
            }
            Self::VertexBuffer => {
                F::VERTEX_BUFFER | F::STORAGE_BUFFER | F::TRANSFER_DST | F::SHADER_DEVICE_ADDRESS | as_input
            }
            Self::ConstantBuffer => F::UNIFORM_BUFFER | F::STORAGE_BUFFER | F::TRANSFER_DST,
            Self::UnorderedAccess => F::STORAGE_BUFFER | F::TRANSFER_SRC | F::TRANSFER_DST | F::SHADER_DEVICE_ADDRESS,
            Self::IndirectCommands => F::INDIRECT_BUFFER | F::STORAGE_BUFFER | F::TRANSFER_DST | F::SHADER_DEVICE_ADDRESS,
            Self::RaytracingAccelerationStructure => {
                let as_storage =
                    if raytracing { F::ACCELERATION_STRUCTURE_STORAGE_KHR } else { F::empty() };
                as_storage | F::STORAGE_BUFFER | F::SHADER_DEVICE_ADDRESS
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct BufferCreateInfo {
    pub name: String,
    pub usage: BufferUsage,
    pub size: vk::DeviceSize,
}

/// 由 VMA 分配的 buffer，drop 时释放
///
/// 需要延迟销毁的 buffer 通过 `RenderDevice::schedule_buffer_destruction` 交给 command list 持有
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    usage: BufferUsage,

    /// upload 内存在创建时映射，直到销毁
    mapped_ptr: Option<NonNull<u8>>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    name: String,

    allocator: Arc<GfxMemAllocator>,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        log::trace!("Destroying buffer {}", self.name);
        unsafe {
            if self.mapped_ptr.is_some() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// new & init
impl GfxBuffer {
    /// 失败时返回 None，由调用者处理
    ///
    /// - alignment: 加速结构的 scratch buffer 等需要额外的起始地址对齐
    pub fn new(
        device: &GfxDevice,
        allocator: Arc<GfxMemAllocator>,
        create_info: &BufferCreateInfo,
        alignment: Option<vk::DeviceSize>,
    ) -> Option<Self> {
        let _span = tracy_client::span!("GfxBuffer::new");

        let vk_usage = create_info.usage.vk_usage(device.raytracing_enabled());
        let buffer_ci = vk::BufferCreateInfo::default().size(create_info.size.max(1)).usage(vk_usage);
        let alloc_ci = if create_info.usage.is_upload() {
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            }
        } else {
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            }
        };

        let created = unsafe {
            match alignment {
                Some(align) => allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align),
                None => allocator.create_buffer(&buffer_ci, &alloc_ci),
            }
        };
        let (buffer, mut allocation) = match created {
            Ok(created) => created,
            Err(e) => {
                log::error!("Could not create buffer {}: {:?}", create_info.name, e);
                return None;
            }
        };

        let mut mapped_ptr = None;
        if create_info.usage.is_upload() {
            match unsafe { allocator.map_memory(&mut allocation) } {
                Ok(ptr) => mapped_ptr = NonNull::new(ptr),
                Err(e) => {
                    log::error!("Could not create buffer {}: mapping failed with {:?}", create_info.name, e);
                    unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                    return None;
                }
            }
        }

        let device_addr = vk_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        });

        device.set_object_debug_name(buffer, format!("Buffer::{}", create_info.name));
        Some(Self {
            handle: buffer,
            allocation,
            size: create_info.size,
            usage: create_info.usage,
            mapped_ptr,
            device_addr,
            name: create_info.name.clone(),
            allocator,
        })
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn initial_state(&self) -> ResourceState {
        self.usage.initial_state()
    }

    #[inline]
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.mapped_ptr.map(NonNull::as_ptr)
    }

    /// constant buffer 没有 device address，此时返回 0
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_addr.unwrap_or_else(|| {
            log::error!("Buffer {} has no device address", self.name);
            0
        })
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式写入数据，只能用于 upload 内存
    pub fn write_bytes(&self, offset: vk::DeviceSize, bytes: &[u8]) {
        let Some(ptr) = self.mapped_ptr else {
            log::error!("Buffer {} is not mapped, can not write to it from the CPU", self.name);
            return;
        };
        let end = offset + bytes.len() as vk::DeviceSize;
        if end > self.size {
            log::error!(
                "Write of {} bytes at offset {} overflows buffer {} of size {}",
                bytes.len(),
                offset,
                self.name,
                self.size
            );
            return;
        }

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().add(offset as usize), bytes.len());
        }
        if let Err(e) = self.allocator.flush_allocation(&self.allocation, offset, bytes.len() as vk::DeviceSize) {
            log::error!("Could not flush buffer {}: {:?}", self.name, e);
        }
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) {
        self.write_bytes(offset, bytemuck::cast_slice(data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_class() {
        assert!(BufferUsage::StagingBuffer.is_upload());
        assert!(BufferUsage::ConstantBuffer.is_upload());
        assert!(!BufferUsage::VertexBuffer.is_upload());
        assert_eq!(BufferUsage::ConstantBuffer.initial_state(), ResourceState::GenericRead);
        assert_eq!(BufferUsage::IndexBuffer.initial_state(), ResourceState::Common);
        assert_eq!(BufferUsage::UnorderedAccess.initial_state(), ResourceState::Common);
    }

    #[test]
    fn test_device_address_usage() {
        let usages = [
            BufferUsage::StagingBuffer,
            BufferUsage::IndexBuffer,
            BufferUsage::VertexBuffer,
            BufferUsage::UnorderedAccess,
            BufferUsage::IndirectCommands,
            BufferUsage::RaytracingAccelerationStructure,
        ];
        for usage in usages {
            assert!(usage.vk_usage(false).contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS), "{usage:?}");
        }

        let constant = BufferUsage::ConstantBuffer.vk_usage(true);
        assert!(constant.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(!constant.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
    }

    #[test]
    fn test_raytracing_flags_only_when_enabled() {
        let flag = vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
        assert!(!BufferUsage::VertexBuffer.vk_usage(false).contains(flag));
        assert!(BufferUsage::VertexBuffer.vk_usage(true).contains(flag));
        assert!(
            BufferUsage::RaytracingAccelerationStructure
                .vk_usage(true)
                .contains(vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR)
        );
    }
}
