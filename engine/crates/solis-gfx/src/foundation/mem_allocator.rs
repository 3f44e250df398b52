use std::ops::Deref;

use ash::vk;

/// VMA 封装
///
/// 资源通过 `Arc<GfxMemAllocator>` 持有 allocator，在自身 drop 时归还内存
pub struct GfxMemAllocator {
    inner: vk_mem::Allocator,
}

impl GfxMemAllocator {
    /// vma 需要引用 Instance 以及 Device，并且在 vma 的生命周期内这两者必须有效，
    /// 因此需要在 device 创建完成之后再创建
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> Self {
        let _span = tracy_client::span!("GfxMemAllocator::new");

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;

        let vma = unsafe { vk_mem::Allocator::new(vma_ci) }
            .unwrap_or_else(|e| panic!("Could not create the memory allocator: {e:?}"));

        Self { inner: vma }
    }
}

impl Deref for GfxMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
