use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::descriptors::descriptor_allocator::{DescriptorAllocator, DescriptorHandle};
use crate::descriptors::sampler::GfxSampler;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// bindless set 中各个数组的 binding
pub const SAMPLED_IMAGE_BINDING: u32 = 0;
pub const STORAGE_IMAGE_BINDING: u32 = 1;
pub const STORAGE_BUFFER_BINDING: u32 = 2;
pub const STATIC_SAMPLER_BINDING: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapArray {
    SampledImage,
    StorageImage,
    StorageBuffer,
}

impl HeapArray {
    #[inline]
    pub fn binding(self) -> u32 {
        match self {
            Self::SampledImage => SAMPLED_IMAGE_BINDING,
            Self::StorageImage => STORAGE_IMAGE_BINDING,
            Self::StorageBuffer => STORAGE_BUFFER_BINDING,
        }
    }

    #[inline]
    pub fn vk_descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapResource {
    Image(vk::ImageView),
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
}

/// 写入 bindless heap 某个数组某个槽位的 descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub array: HeapArray,
    pub index: u32,
    pub resource: HeapResource,
}

/// shader 可见的 bindless resource heap
///
/// 一个 UPDATE_AFTER_BIND + PARTIALLY_BOUND 的 descriptor set，包含：
/// - binding 0: sampled image 数组
/// - binding 1: storage image 数组
/// - binding 2: storage buffer 数组
/// - binding 3: immutable sampler (point, linear, aniso x8)
pub struct GfxResourceHeap {
    pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    set: vk::DescriptorSet,
    samplers: Vec<GfxSampler>,

    sampled_images: DescriptorAllocator,
    storage_images: DescriptorAllocator,
    storage_buffers: DescriptorAllocator,

    device: Arc<GfxDevice>,
    destroyed: bool,
}

// new & init
impl GfxResourceHeap {
    /// 创建失败是致命错误
    pub fn new(device: Arc<GfxDevice>, capacity: u32) -> Self {
        let _span = tracy_client::span!("GfxResourceHeap::new");

        let samplers = GfxSampler::standard_samplers(&device).into_iter().collect_vec();
        let sampler_handles = samplers.iter().map(GfxSampler::handle).collect_vec();

        let array_binding = |binding: u32, ty: vk::DescriptorType| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(capacity)
                .stage_flags(vk::ShaderStageFlags::ALL)
        };
        let bindings = [
            array_binding(SAMPLED_IMAGE_BINDING, vk::DescriptorType::SAMPLED_IMAGE),
            array_binding(STORAGE_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE),
            array_binding(STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
            vk::DescriptorSetLayoutBinding::default()
                .binding(STATIC_SAMPLER_BINDING)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .descriptor_count(sampler_handles.len() as u32)
                .stage_flags(vk::ShaderStageFlags::ALL)
                .immutable_samplers(&sampler_handles),
        ];
        let array_flags = vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING;
        let binding_flags = [array_flags, array_flags, array_flags, vk::DescriptorBindingFlags::empty()];
        let mut binding_flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let set_layout = unsafe {
            device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default()
                    .bindings(&bindings)
                    .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
                    .push_next(&mut binding_flags_ci),
                None,
            )
        }
        .unwrap_or_else(|e| panic!("Could not create the resource heap layout: {e:?}"));

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: capacity,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: capacity,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: capacity,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: sampler_handles.len() as u32,
            },
        ];
        let pool = unsafe {
            device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .pool_sizes(&pool_sizes)
                    .max_sets(1)
                    .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND),
                None,
            )
        }
        .unwrap_or_else(|e| panic!("Could not create the resource heap pool: {e:?}"));

        let set = unsafe {
            device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(pool)
                    .set_layouts(std::slice::from_ref(&set_layout)),
            )
        }
        .unwrap_or_else(|e| panic!("Could not allocate the resource heap set: {e:?}"))[0];

        device.set_object_debug_name(set_layout, "DescriptorSetLayout::resource-heap");
        device.set_object_debug_name(set, "DescriptorSet::resource-heap");
        log::info!("created resource heap with {} descriptors per array", capacity);

        Self {
            pool,
            set_layout,
            set,
            samplers,
            sampled_images: DescriptorAllocator::new("sampled images", capacity),
            storage_images: DescriptorAllocator::new("storage images", capacity),
            storage_buffers: DescriptorAllocator::new("storage buffers", capacity),
            device,
            destroyed: false,
        }
    }
}

// getters
impl GfxResourceHeap {
    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    #[inline]
    pub fn allocator_mut(&mut self, array: HeapArray) -> &mut DescriptorAllocator {
        match array {
            HeapArray::SampledImage => &mut self.sampled_images,
            HeapArray::StorageImage => &mut self.storage_images,
            HeapArray::StorageBuffer => &mut self.storage_buffers,
        }
    }

    #[inline]
    pub fn allocator(&self, array: HeapArray) -> &DescriptorAllocator {
        match array {
            HeapArray::SampledImage => &self.sampled_images,
            HeapArray::StorageImage => &self.storage_images,
            HeapArray::StorageBuffer => &self.storage_buffers,
        }
    }

    /// 可以被 bind group builder 持有的写入句柄
    #[inline]
    pub fn writer(&self) -> ResourceHeapWriter {
        ResourceHeapWriter {
            device: self.device.clone(),
            set: self.set,
        }
    }
}

// destroy
impl GfxResourceHeap {
    pub fn destroy(mut self) {
        unsafe {
            // set 随 pool 一起释放
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
        std::mem::take(&mut self.samplers).into_iter().for_each(GfxSampler::destroy);
        self.destroyed = true;
    }
}
impl Drop for GfxResourceHeap {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "GfxResourceHeap must be destroyed manually.");
    }
}
impl DebugType for GfxResourceHeap {
    fn debug_type_name() -> &'static str {
        "GfxResourceHeap"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.set
    }
}

/// 向 bindless set 写入 descriptor
#[derive(Clone)]
pub struct ResourceHeapWriter {
    device: Arc<GfxDevice>,
    set: vk::DescriptorSet,
}

impl ResourceHeapWriter {
    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn write(&self, writes: &[DescriptorWrite]) {
        let _span = tracy_client::span!("ResourceHeapWriter::write");
        if writes.is_empty() {
            return;
        }

        // 先收集所有 info，保证 WriteDescriptorSet 引用的地址在 update 期间有效
        let image_infos = writes
            .iter()
            .map(|w| match w.resource {
                HeapResource::Image(view) => vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view,
                    image_layout: match w.array {
                        HeapArray::StorageImage => vk::ImageLayout::GENERAL,
                        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                },
                HeapResource::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();
        let buffer_infos = writes
            .iter()
            .map(|w| match w.resource {
                HeapResource::Buffer { buffer, offset, range } => vk::DescriptorBufferInfo { buffer, offset, range },
                HeapResource::Image(_) => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .enumerate()
            .filter_map(|(i, w)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(w.array.binding())
                    .dst_array_element(w.index)
                    .descriptor_type(w.array.vk_descriptor_type());
                match (w.array, w.resource) {
                    (HeapArray::StorageBuffer, HeapResource::Buffer { .. }) => {
                        Some(write.buffer_info(std::slice::from_ref(&buffer_infos[i])))
                    }
                    (HeapArray::SampledImage | HeapArray::StorageImage, HeapResource::Image(_)) => {
                        Some(write.image_info(std::slice::from_ref(&image_infos[i])))
                    }
                    _ => {
                        log::error!("Descriptor write {:?} does not match the heap array it targets", w);
                        None
                    }
                }
            })
            .collect_vec();

        unsafe {
            self.device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

/// 不对 shader 可见的 view heap，对应 render target view 和 depth stencil view
///
/// 槽位中存放由 heap 持有的 image view，释放槽位时销毁 view
pub struct GfxViewHeap {
    allocator: DescriptorAllocator,
    views: Vec<vk::ImageView>,

    device: Arc<GfxDevice>,
    destroyed: bool,
}

impl GfxViewHeap {
    pub fn new(device: Arc<GfxDevice>, name: &str, capacity: u32) -> Self {
        Self {
            allocator: DescriptorAllocator::new(name, capacity),
            views: vec![vk::ImageView::null(); capacity as usize],
            device,
            destroyed: false,
        }
    }

    /// heap 接管 view 的所有权
    pub fn insert(&mut self, view: vk::ImageView) -> DescriptorHandle {
        let handle = self.allocator.acquire();
        self.views[handle.index() as usize] = view;
        handle
    }

    #[inline]
    pub fn view(&self, handle: DescriptorHandle) -> vk::ImageView {
        self.views[handle.index() as usize]
    }

    pub fn release(&mut self, handle: DescriptorHandle) {
        let view = std::mem::replace(&mut self.views[handle.index() as usize], vk::ImageView::null());
        if view != vk::ImageView::null() {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.allocator.release(handle);
    }

    #[inline]
    pub fn allocated_count(&self) -> u32 {
        self.allocator.allocated_count()
    }

    pub fn destroy(mut self) {
        for view in self.views.drain(..).filter(|v| *v != vk::ImageView::null()) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.destroyed = true;
    }
}
impl Drop for GfxViewHeap {
    fn drop(&mut self) {
        debug_assert!(self.destroyed, "GfxViewHeap must be destroyed manually.");
    }
}
