use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use ash::vk;
use itertools::Itertools;

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::descriptors::descriptor_heap::{DescriptorWrite, HeapArray, HeapResource, ResourceHeapWriter};
use crate::resources::buffer::GfxBuffer;
use crate::resources::image::GfxImage;

/// root signature 中 root parameter 的最大数量
pub const MAX_ROOT_PARAMETERS: usize = 64;
/// root descriptor 的 index 上限
pub const MAX_ROOT_DESCRIPTORS: u32 = 32;

/// root descriptor 所在的 push descriptor set
pub const ROOT_DESCRIPTOR_SET: u32 = 1;
/// bindless heap 所在的 set
pub const RESOURCE_HEAP_SET: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootDescriptorDescription {
    pub index: u32,
    pub ty: DescriptorType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorTableDescriptorDescription {
    pub ty: DescriptorType,
    /// 在 bindless 数组中的位置
    pub heap_offset: u32,
}

/// descriptor table 在 bindless 数组中的起始位置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorTableHandle {
    pub heap_offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

impl BufferBinding {
    #[inline]
    pub fn whole(buffer: &GfxBuffer) -> Self {
        Self {
            buffer: buffer.vk_buffer(),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBinding {
    pub view: vk::ImageView,
}

impl ImageBinding {
    #[inline]
    pub fn of(image: &GfxImage) -> Self {
        Self { view: image.view() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootBinding {
    Buffer(BufferBinding),
    Image(ImageBinding),
    AccelerationStructure(vk::AccelerationStructureKHR),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RootParameter {
    #[default]
    Empty,
    Descriptor {
        ty: DescriptorType,
        binding: RootBinding,
    },
    Table {
        handle: DescriptorTableHandle,
    },
}

/// root descriptor 对应的 Vulkan descriptor 类型
pub fn root_descriptor_vk_type(ty: DescriptorType, binding: &RootBinding) -> vk::DescriptorType {
    match (ty, binding) {
        (_, RootBinding::AccelerationStructure(_)) => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        (DescriptorType::ConstantBuffer, RootBinding::Buffer(_)) => vk::DescriptorType::UNIFORM_BUFFER,
        (_, RootBinding::Buffer(_)) => vk::DescriptorType::STORAGE_BUFFER,
        (DescriptorType::UnorderedAccess, RootBinding::Image(_)) => vk::DescriptorType::STORAGE_IMAGE,
        (_, RootBinding::Image(_)) => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

#[inline]
fn image_layout_for(ty: DescriptorType) -> vk::ImageLayout {
    match ty {
        DescriptorType::UnorderedAccess => vk::ImageLayout::GENERAL,
        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

#[inline]
fn image_array_for(ty: DescriptorType) -> HeapArray {
    match ty {
        DescriptorType::UnorderedAccess => HeapArray::StorageImage,
        _ => HeapArray::SampledImage,
    }
}

/// 构建完成后不可修改的资源绑定
pub struct BindGroup {
    root_parameters: [RootParameter; MAX_ROOT_PARAMETERS],
    descriptor_writes: Vec<DescriptorWrite>,
    unbound_slots: Vec<String>,
    heap_set: Option<vk::DescriptorSet>,
}

// getters
impl BindGroup {
    #[inline]
    pub fn root_parameters(&self) -> &[RootParameter; MAX_ROOT_PARAMETERS] {
        &self.root_parameters
    }

    #[inline]
    pub fn root_parameter(&self, index: u32) -> RootParameter {
        self.root_parameters[index as usize]
    }

    #[inline]
    pub fn descriptor_writes(&self) -> &[DescriptorWrite] {
        &self.descriptor_writes
    }

    /// 声明了却没有绑定资源的槽位
    #[inline]
    pub fn unbound_slots(&self) -> &[String] {
        &self.unbound_slots
    }
}

// bind
impl BindGroup {
    pub fn bind_to_graphics_signature(&self, cmd: &GfxCommandBuffer, layout: vk::PipelineLayout) {
        let _span = tracy_client::span!("BindGroup::bind_to_graphics_signature");
        self.bind(cmd, vk::PipelineBindPoint::GRAPHICS, layout);
    }

    pub fn bind_to_compute_signature(&self, cmd: &GfxCommandBuffer, layout: vk::PipelineLayout) {
        let _span = tracy_client::span!("BindGroup::bind_to_compute_signature");
        self.bind(cmd, vk::PipelineBindPoint::COMPUTE, layout);
    }

    fn bind(&self, cmd: &GfxCommandBuffer, bind_point: vk::PipelineBindPoint, layout: vk::PipelineLayout) {
        if let Some(set) = self.heap_set {
            cmd.cmd_bind_descriptor_sets(bind_point, layout, RESOURCE_HEAP_SET, std::slice::from_ref(&set));
        }

        let descriptors = self
            .root_parameters
            .iter()
            .enumerate()
            .filter_map(|(idx, param)| match *param {
                RootParameter::Descriptor { ty, binding } => Some((idx as u32, ty, binding)),
                _ => None,
            })
            .collect_vec();
        if descriptors.is_empty() {
            return;
        }

        // 所有 info 先落到 Vec 中，保证 write 引用的地址有效
        let buffer_infos = descriptors
            .iter()
            .map(|(_, _, binding)| match binding {
                RootBinding::Buffer(b) => vk::DescriptorBufferInfo {
                    buffer: b.buffer,
                    offset: b.offset,
                    range: b.range,
                },
                _ => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();
        let image_infos = descriptors
            .iter()
            .map(|(_, ty, binding)| match binding {
                RootBinding::Image(i) => vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: i.view,
                    image_layout: image_layout_for(*ty),
                },
                _ => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();
        let accel_handles = descriptors
            .iter()
            .map(|(_, _, binding)| match binding {
                RootBinding::AccelerationStructure(h) => *h,
                _ => vk::AccelerationStructureKHR::null(),
            })
            .collect_vec();
        let mut accel_writes = accel_handles
            .iter()
            .map(|h| {
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(std::slice::from_ref(h))
            })
            .collect_vec();

        let writes = descriptors
            .iter()
            .zip(accel_writes.iter_mut())
            .enumerate()
            .map(|(i, ((idx, ty, binding), accel_write))| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_binding(*idx)
                    .descriptor_type(root_descriptor_vk_type(*ty, binding));
                match binding {
                    RootBinding::Buffer(_) => write.buffer_info(std::slice::from_ref(&buffer_infos[i])),
                    RootBinding::Image(_) => write.image_info(std::slice::from_ref(&image_infos[i])),
                    RootBinding::AccelerationStructure(_) => write.descriptor_count(1).push_next(accel_write),
                }
            })
            .collect_vec();

        cmd.cmd_push_descriptor_set(bind_point, layout, ROOT_DESCRIPTOR_SET, &writes);
    }
}

/// 按名字收集资源，最终解析为 root parameter 以及 bindless heap 的写入
#[derive(Clone)]
pub struct BindGroupBuilder {
    root_descriptors: HashMap<String, RootDescriptorDescription>,
    descriptor_table_descriptors: HashMap<String, DescriptorTableDescriptorDescription>,
    descriptor_table_handles: HashMap<u32, DescriptorTableHandle>,
    validation: bool,

    bound_buffers: HashMap<String, BufferBinding>,
    bound_images: HashMap<String, Vec<ImageBinding>>,
    bound_acceleration_structures: HashMap<String, vk::AccelerationStructureKHR>,
    /// 内容由调用者直接写入 heap 的 descriptor table，build 时不再写入
    resident_tables: HashSet<String>,

    heap: Option<ResourceHeapWriter>,
    /// 已经输出过警告的空槽位，同一个 builder 多次 build 时只警告一次
    warned_slots: RefCell<HashSet<String>>,
}

// new & init
impl BindGroupBuilder {
    pub fn new(
        root_descriptors: HashMap<String, RootDescriptorDescription>,
        descriptor_table_descriptors: HashMap<String, DescriptorTableDescriptorDescription>,
        descriptor_table_handles: HashMap<u32, DescriptorTableHandle>,
        validation: bool,
    ) -> Self {
        Self {
            root_descriptors,
            descriptor_table_descriptors,
            descriptor_table_handles,
            validation,
            bound_buffers: HashMap::new(),
            bound_images: HashMap::new(),
            bound_acceleration_structures: HashMap::new(),
            resident_tables: HashSet::new(),
            heap: None,
            warned_slots: RefCell::new(HashSet::new()),
        }
    }

    /// build 时将 descriptor table 的内容写入该 heap
    #[inline]
    pub fn with_heap(mut self, heap: ResourceHeapWriter) -> Self {
        self.heap = Some(heap);
        self
    }
}

// setters
impl BindGroupBuilder {
    #[inline]
    pub fn set_buffer(&mut self, name: &str, buffer: &GfxBuffer) -> &mut Self {
        self.set_buffer_binding(name, BufferBinding::whole(buffer))
    }

    #[inline]
    pub fn set_image(&mut self, name: &str, image: &GfxImage) -> &mut Self {
        self.set_image_binding(name, ImageBinding::of(image))
    }

    pub fn set_image_array(&mut self, name: &str, images: &[&GfxImage]) -> &mut Self {
        let bindings = images.iter().map(|image| ImageBinding::of(image)).collect_vec();
        self.set_image_array_bindings(name, bindings)
    }

    pub fn set_buffer_binding(&mut self, name: &str, binding: BufferBinding) -> &mut Self {
        if self.check_declared(name) {
            self.bound_images.remove(name);
            self.bound_buffers.insert(name.to_string(), binding);
        }
        self
    }

    #[inline]
    pub fn set_image_binding(&mut self, name: &str, binding: ImageBinding) -> &mut Self {
        self.set_image_array_bindings(name, vec![binding])
    }

    pub fn set_image_array_bindings(&mut self, name: &str, bindings: Vec<ImageBinding>) -> &mut Self {
        if bindings.is_empty() {
            if self.validation {
                panic!("Can not bind an empty image array to {}", name);
            }
            log::error!("Ignoring an empty image array bound to {}", name);
            return self;
        }
        if self.check_declared(name) {
            self.bound_buffers.remove(name);
            self.resident_tables.remove(name);
            self.bound_images.insert(name.to_string(), bindings);
        }
        self
    }

    pub fn set_acceleration_structure(&mut self, name: &str, handle: vk::AccelerationStructureKHR) -> &mut Self {
        if self.check_declared(name) {
            self.bound_acceleration_structures.insert(name.to_string(), handle);
        }
        self
    }

    /// 标记一个 descriptor table 的内容已经常驻在 heap 中，build 时既不写入也不视为空槽位
    pub fn mark_table_resident(&mut self, name: &str) -> &mut Self {
        if !self.descriptor_table_descriptors.contains_key(name) {
            if self.validation {
                panic!("{} is not a descriptor table", name);
            }
            log::error!("Ignoring resident mark on {}, it is not a descriptor table", name);
            return self;
        }
        self.bound_images.remove(name);
        self.resident_tables.insert(name.to_string());
        self
    }

    /// 未声明的名字在开启 validation 时是致命错误，否则忽略
    fn check_declared(&self, name: &str) -> bool {
        let declared =
            self.root_descriptors.contains_key(name) || self.descriptor_table_descriptors.contains_key(name);
        if !declared {
            if self.validation {
                panic!("Bind group has no slot named {}", name);
            }
            log::debug!("Ignoring binding for undeclared slot {}", name);
        }
        declared
    }
}

// build
impl BindGroupBuilder {
    /// 已经输出过警告的空槽位数量
    #[inline]
    pub fn num_unbound_warnings(&self) -> usize {
        self.warned_slots.borrow().len()
    }

    fn warn_unbound(&self, kind: &str, name: &str) {
        if self.warned_slots.borrow_mut().insert(name.to_string()) {
            log::warn!("No resources bound to {} {}", kind, name);
        }
    }

    pub fn build(&self) -> BindGroup {
        let _span = tracy_client::span!("BindGroupBuilder::build");

        let mut root_parameters = [RootParameter::Empty; MAX_ROOT_PARAMETERS];
        let mut used = [false; MAX_ROOT_PARAMETERS];
        let mut unbound_slots = Vec::new();

        for (&idx, &handle) in &self.descriptor_table_handles {
            assert!(
                (idx as usize) < MAX_ROOT_PARAMETERS,
                "May not have more than {} descriptor tables in a single bind group",
                MAX_ROOT_PARAMETERS
            );
            root_parameters[idx as usize] = RootParameter::Table { handle };
            used[idx as usize] = true;
        }

        // 按 index 排序，保证日志以及 unbound 列表稳定
        for (name, desc) in self.root_descriptors.iter().sorted_by_key(|(_, d)| d.index) {
            let idx = desc.index;
            assert!(
                idx < MAX_ROOT_DESCRIPTORS,
                "May not have more than {} root descriptors in a single bind group",
                MAX_ROOT_DESCRIPTORS
            );
            assert!(!used[idx as usize], "Root parameter index {} already used", idx);
            used[idx as usize] = true;

            let binding = if let Some(buffer) = self.bound_buffers.get(name) {
                Some(RootBinding::Buffer(*buffer))
            } else if let Some(images) = self.bound_images.get(name) {
                if images.len() != 1 {
                    if self.validation {
                        panic!("May only bind a single image to root descriptor {}", name);
                    }
                    log::error!("May only bind a single image to root descriptor {}, using the first one", name);
                }
                images.first().map(|image| RootBinding::Image(*image))
            } else {
                self.bound_acceleration_structures.get(name).map(|h| RootBinding::AccelerationStructure(*h))
            };

            match binding {
                Some(binding) => root_parameters[idx as usize] = RootParameter::Descriptor { ty: desc.ty, binding },
                None => {
                    self.warn_unbound("root descriptor", name);
                    unbound_slots.push(name.clone());
                }
            }
        }

        let mut descriptor_writes = Vec::new();
        for (name, desc) in self.descriptor_table_descriptors.iter().sorted_by_key(|(_, d)| d.heap_offset) {
            if let Some(images) = self.bound_images.get(name) {
                let array = image_array_for(desc.ty);
                descriptor_writes.extend(images.iter().enumerate().map(|(i, image)| DescriptorWrite {
                    array,
                    index: desc.heap_offset + i as u32,
                    resource: HeapResource::Image(image.view),
                }));
            } else if let Some(buffer) = self.bound_buffers.get(name) {
                descriptor_writes.push(DescriptorWrite {
                    array: HeapArray::StorageBuffer,
                    index: desc.heap_offset,
                    resource: HeapResource::Buffer {
                        buffer: buffer.buffer,
                        offset: buffer.offset,
                        range: buffer.range,
                    },
                });
            } else if !self.resident_tables.contains(name) {
                self.warn_unbound("descriptor table entry", name);
                unbound_slots.push(name.clone());
            }
        }

        if let Some(heap) = &self.heap {
            heap.write(&descriptor_writes);
        }

        BindGroup {
            root_parameters,
            descriptor_writes,
            unbound_slots,
            heap_set: self.heap.as_ref().map(ResourceHeapWriter::set),
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn buffer(raw: u64) -> BufferBinding {
        BufferBinding {
            buffer: vk::Buffer::from_raw(raw),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    fn image(raw: u64) -> ImageBinding {
        ImageBinding {
            view: vk::ImageView::from_raw(raw),
        }
    }

    fn root(entries: &[(&str, u32, DescriptorType)]) -> HashMap<String, RootDescriptorDescription> {
        entries.iter().map(|(name, index, ty)| (name.to_string(), RootDescriptorDescription { index: *index, ty: *ty })).collect()
    }

    fn builder(validation: bool) -> BindGroupBuilder {
        let tables = HashMap::from([(
            "textures".to_string(),
            DescriptorTableDescriptorDescription {
                ty: DescriptorType::ShaderResource,
                heap_offset: 10,
            },
        )]);
        let handles = HashMap::from([(6, DescriptorTableHandle { heap_offset: 0 })]);
        BindGroupBuilder::new(
            root(&[
                ("cameras", 0, DescriptorType::ShaderResource),
                ("per_frame_data", 3, DescriptorType::ConstantBuffer),
                ("output", 4, DescriptorType::UnorderedAccess),
            ]),
            tables,
            handles,
            validation,
        )
    }

    #[test]
    fn test_root_descriptors_resolve() {
        let mut b = builder(true);
        b.set_buffer_binding("cameras", buffer(1))
            .set_buffer_binding("per_frame_data", buffer(2))
            .set_image_binding("output", image(3))
            .set_image_array_bindings("textures", vec![image(4)]);
        let group = b.build();

        assert_eq!(
            group.root_parameter(0),
            RootParameter::Descriptor {
                ty: DescriptorType::ShaderResource,
                binding: RootBinding::Buffer(buffer(1))
            }
        );
        assert_eq!(
            group.root_parameter(6),
            RootParameter::Table {
                handle: DescriptorTableHandle { heap_offset: 0 }
            }
        );
        assert_eq!(group.root_parameter(1), RootParameter::Empty);
        assert!(group.unbound_slots().is_empty());

        let RootParameter::Descriptor { ty, binding } = group.root_parameter(3) else {
            panic!("expected a root descriptor");
        };
        assert_eq!(root_descriptor_vk_type(ty, &binding), vk::DescriptorType::UNIFORM_BUFFER);
        let RootParameter::Descriptor { ty, binding } = group.root_parameter(4) else {
            panic!("expected a root descriptor");
        };
        assert_eq!(root_descriptor_vk_type(ty, &binding), vk::DescriptorType::STORAGE_IMAGE);
    }

    #[test]
    fn test_table_writes_are_consecutive() {
        let mut b = builder(true);
        b.set_image_array_bindings("textures", vec![image(7), image(8), image(9)]);
        let group = b.build();

        let writes = group.descriptor_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes.iter().map(|w| w.index).collect_vec(), vec![10, 11, 12]);
        assert!(writes.iter().all(|w| w.array == HeapArray::SampledImage));
        assert_eq!(writes[2].resource, HeapResource::Image(vk::ImageView::from_raw(9)));
    }

    #[test]
    fn test_unbound_slots_warn_once() {
        let mut b = builder(true);
        b.set_buffer_binding("cameras", buffer(1));
        let group = b.build();

        assert_eq!(group.unbound_slots(), &["per_frame_data".to_string(), "output".to_string(), "textures".to_string()]);
        assert_eq!(group.root_parameter(3), RootParameter::Empty);
        assert!(group.descriptor_writes().is_empty());
        assert_eq!(b.num_unbound_warnings(), 3);
    }

    #[test]
    fn test_single_unbound_slot_reported_and_warned_once() {
        let mut b = builder(true);
        b.set_buffer_binding("cameras", buffer(1))
            .set_image_binding("output", image(3))
            .set_image_array_bindings("textures", vec![image(4)]);

        let group = b.build();
        assert_eq!(group.unbound_slots().len(), 1);
        assert_eq!(group.unbound_slots(), &["per_frame_data".to_string()]);
        assert_eq!(b.num_unbound_warnings(), 1);

        // 再次 build 仍然报告空槽位，但不会重复警告
        let group = b.build();
        assert_eq!(group.unbound_slots(), &["per_frame_data".to_string()]);
        assert_eq!(b.num_unbound_warnings(), 1);

        // clone 出来的 builder 继承已警告的记录
        let cloned = b.clone();
        cloned.build();
        assert_eq!(cloned.num_unbound_warnings(), 1);
    }

    #[test]
    fn test_resident_table_is_bound_without_writes() {
        let mut b = builder(true);
        b.set_buffer_binding("cameras", buffer(1))
            .set_buffer_binding("per_frame_data", buffer(2))
            .set_image_binding("output", image(3))
            .mark_table_resident("textures");
        let group = b.build();

        assert!(group.unbound_slots().is_empty());
        assert!(group.descriptor_writes().is_empty());
        assert_eq!(
            group.root_parameter(6),
            RootParameter::Table {
                handle: DescriptorTableHandle { heap_offset: 0 }
            }
        );

        // 重新绑定后恢复写入
        b.set_image_array_bindings("textures", vec![image(7)]);
        assert_eq!(b.build().descriptor_writes().len(), 1);
    }

    #[test]
    #[should_panic(expected = "not a descriptor table")]
    fn test_resident_mark_on_root_descriptor_panics_with_validation() {
        builder(true).mark_table_resident("cameras");
    }

    #[test]
    #[should_panic(expected = "no slot named")]
    fn test_undeclared_name_panics_with_validation() {
        builder(true).set_buffer_binding("missing", buffer(1));
    }

    #[test]
    fn test_undeclared_name_ignored_without_validation() {
        let mut b = builder(false);
        b.set_buffer_binding("missing", buffer(1));
        let group = b.build();
        assert!(group.root_parameters().iter().all(|p| !matches!(
            p,
            RootParameter::Descriptor {
                binding: RootBinding::Buffer(_),
                ..
            }
        )));
    }

    #[test]
    #[should_panic(expected = "empty image array")]
    fn test_empty_image_array_panics_with_validation() {
        builder(true).set_image_array_bindings("textures", Vec::new());
    }

    #[test]
    fn test_root_image_array_uses_first_without_validation() {
        let mut b = builder(false);
        b.set_image_array_bindings("output", vec![image(5), image(6)]);
        let group = b.build();
        assert_eq!(
            group.root_parameter(4),
            RootParameter::Descriptor {
                ty: DescriptorType::UnorderedAccess,
                binding: RootBinding::Image(image(5))
            }
        );
    }

    #[test]
    #[should_panic(expected = "already used")]
    fn test_duplicate_root_index_is_fatal() {
        let b = BindGroupBuilder::new(
            root(&[("a", 2, DescriptorType::ShaderResource), ("b", 2, DescriptorType::ShaderResource)]),
            HashMap::new(),
            HashMap::new(),
            false,
        );
        b.build();
    }

    #[test]
    #[should_panic(expected = "already used")]
    fn test_root_descriptor_on_table_index_is_fatal() {
        let b = BindGroupBuilder::new(
            root(&[("a", 6, DescriptorType::ShaderResource)]),
            HashMap::new(),
            HashMap::from([(6, DescriptorTableHandle { heap_offset: 0 })]),
            false,
        );
        b.build();
    }

    #[test]
    #[should_panic(expected = "root descriptors")]
    fn test_root_descriptor_index_limit() {
        BindGroupBuilder::new(root(&[("a", 32, DescriptorType::ConstantBuffer)]), HashMap::new(), HashMap::new(), false)
            .build();
    }

    #[test]
    #[should_panic(expected = "descriptor tables")]
    fn test_table_index_limit() {
        BindGroupBuilder::new(
            HashMap::new(),
            HashMap::new(),
            HashMap::from([(64, DescriptorTableHandle { heap_offset: 0 })]),
            false,
        )
        .build();
    }

    #[test]
    fn test_acceleration_structure_root_descriptor() {
        let mut b = BindGroupBuilder::new(
            root(&[("raytracing_scene", 5, DescriptorType::ShaderResource)]),
            HashMap::new(),
            HashMap::new(),
            true,
        );
        b.set_acceleration_structure("raytracing_scene", vk::AccelerationStructureKHR::from_raw(42));
        let group = b.build();
        let RootParameter::Descriptor { ty, binding } = group.root_parameter(5) else {
            panic!("expected a root descriptor");
        };
        assert_eq!(root_descriptor_vk_type(ty, &binding), vk::DescriptorType::ACCELERATION_STRUCTURE_KHR);
    }
}
