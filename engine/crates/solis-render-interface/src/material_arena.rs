//! 可以存放多种材质类型的字节数组
//!
//! 每种类型都把整个 arena 看作自己的数组：新分配的位置按照类型的大小对齐，
//! shader 使用 `offset / size_of::<T>()` 作为索引

use std::any::TypeId;
use std::collections::HashMap;

use crate::handles::MaterialHandle;

/// 存储单元，保证 arena 起始地址按 16 字节对齐
#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Block([u8; 16]);
unsafe impl bytemuck::Zeroable for Block {}
unsafe impl bytemuck::Pod for Block {}

const MAX_ALIGNMENT: usize = align_of::<Block>();

pub struct MaterialArena {
    blocks: Vec<Block>,
    capacity: usize,
    num_allocated_bytes: usize,

    /// 每种类型各自的空闲位置（字节偏移）
    free_offsets: HashMap<TypeId, Vec<u32>>,
}

// new & init
impl MaterialArena {
    /// `capacity`：字节数
    pub fn new(capacity: usize) -> Self {
        let num_blocks = capacity.div_ceil(size_of::<Block>());
        Self {
            blocks: vec![Block([0; 16]); num_blocks],
            capacity,
            num_allocated_bytes: 0,
            free_offsets: HashMap::new(),
        }
    }
}

// getters
impl MaterialArena {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 已经分配出去的字节数，包含对齐产生的空洞
    #[inline]
    pub fn num_allocated_bytes(&self) -> usize {
        self.num_allocated_bytes
    }

    /// 需要上传到 GPU 的数据
    #[inline]
    pub fn data(&self) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..self.num_allocated_bytes]
    }
}

// tools
impl MaterialArena {
    /// 满足 `size_of::<T>()` 以及 `align_of::<T>()` 的对齐要求
    #[inline]
    pub fn material_alignment<T>() -> usize {
        lcm(size_of::<T>(), align_of::<T>())
    }

    /// 优先复用同类型已经释放的位置，arena 用尽时返回 None
    pub fn get_next_free_material<T: bytemuck::Pod>(&mut self) -> Option<MaterialHandle<T>> {
        let _span = tracy_client::span!("MaterialArena::get_next_free_material");
        if size_of::<T>() == 0 || align_of::<T>() > MAX_ALIGNMENT {
            log::error!(
                "Material type {} with size {} and alignment {} can not be stored in the material arena",
                std::any::type_name::<T>(),
                size_of::<T>(),
                align_of::<T>()
            );
            return None;
        }

        if let Some(offset) = self.free_offsets.get_mut(&TypeId::of::<T>()).and_then(Vec::pop) {
            log::trace!("Reusing material slot at byte {} for {}", offset, std::any::type_name::<T>());
            return Some(MaterialHandle::from_offset(offset));
        }

        let alignment = Self::material_alignment::<T>();
        let offset = self.num_allocated_bytes.next_multiple_of(alignment);
        let end = offset + size_of::<T>();
        if end > self.capacity {
            log::error!(
                "Material arena exhausted: can not allocate {} bytes for {} ({} of {} bytes used)",
                size_of::<T>(),
                std::any::type_name::<T>(),
                self.num_allocated_bytes,
                self.capacity
            );
            return None;
        }

        log::trace!(
            "Allocating a material of size {} at byte {}, {} bytes were already allocated",
            size_of::<T>(),
            offset,
            self.num_allocated_bytes
        );
        self.num_allocated_bytes = end;
        Some(MaterialHandle::from_offset(offset as u32))
    }

    /// 分配一个位置并写入材质
    pub fn create_material<T: bytemuck::Pod>(&mut self, material: T) -> Option<MaterialHandle<T>> {
        let handle = self.get_next_free_material::<T>()?;
        *self.get(handle) = material;
        Some(handle)
    }

    pub fn get<T: bytemuck::Pod>(&mut self, handle: MaterialHandle<T>) -> &mut T {
        let offset = handle.offset() as usize;
        let bytes = bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks);
        bytemuck::from_bytes_mut(&mut bytes[offset..offset + size_of::<T>()])
    }

    pub fn get_ref<T: bytemuck::Pod>(&self, handle: MaterialHandle<T>) -> &T {
        let offset = handle.offset() as usize;
        let bytes = bytemuck::cast_slice::<Block, u8>(&self.blocks);
        bytemuck::from_bytes(&bytes[offset..offset + size_of::<T>()])
    }

    /// 释放的位置只会被同类型的材质复用
    pub fn free<T: bytemuck::Pod>(&mut self, handle: MaterialHandle<T>) {
        let free_list = self.free_offsets.entry(TypeId::of::<T>()).or_default();
        if free_list.contains(&handle.offset()) {
            log::warn!("Material {:?} freed twice", handle);
            return;
        }
        free_list.push(handle.offset());
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 { 0 } else { a / gcd(a, b) * b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Small {
        value: u32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Wide {
        values: [u32; 3],
    }

    #[test]
    fn test_lcm_alignment() {
        assert_eq!(MaterialArena::material_alignment::<Small>(), 4);
        assert_eq!(MaterialArena::material_alignment::<Wide>(), 12);
        assert_eq!(MaterialArena::material_alignment::<glam::Vec4>(), 16);
        assert_eq!(lcm(6, 4), 12);
    }

    #[test]
    fn test_mixed_types_never_overlap() {
        let mut arena = MaterialArena::new(1024);
        let a = arena.create_material(Small { value: 1 }).unwrap();
        let b = arena.create_material(Wide { values: [2, 3, 4] }).unwrap();
        let c = arena.create_material(Small { value: 5 }).unwrap();

        assert_eq!(a.offset(), 0);
        // 4 对齐到 12
        assert_eq!(b.offset(), 12);
        assert_eq!(b.index(), 1);
        assert_eq!(c.offset(), 24);
        assert_eq!(c.index(), 6);

        let ranges = [
            (a.offset(), a.offset() + 4),
            (b.offset(), b.offset() + 12),
            (c.offset(), c.offset() + 4),
        ];
        for (i, lhs) in ranges.iter().enumerate() {
            for rhs in &ranges[i + 1..] {
                assert!(lhs.1 <= rhs.0 || rhs.1 <= lhs.0, "{:?} overlaps {:?}", lhs, rhs);
            }
        }

        assert_eq!(*arena.get_ref(a), Small { value: 1 });
        assert_eq!(*arena.get_ref(b), Wide { values: [2, 3, 4] });
        assert_eq!(arena.data().len(), 28);
        assert_eq!(&arena.data()[24..28], &5u32.to_ne_bytes());
    }

    #[test]
    fn test_free_list_is_per_type() {
        let mut arena = MaterialArena::new(1024);
        let small = arena.get_next_free_material::<Small>().unwrap();
        let wide = arena.get_next_free_material::<Wide>().unwrap();
        arena.free(small);

        // 另一种类型不会复用 small 的位置
        let other_wide = arena.get_next_free_material::<Wide>().unwrap();
        assert_ne!(other_wide, wide);
        assert_ne!(other_wide.offset(), small.offset());

        let reused = arena.get_next_free_material::<Small>().unwrap();
        assert_eq!(reused, small);

        arena.get(reused).value = 42;
        assert_eq!(arena.get_ref(small).value, 42);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut arena = MaterialArena::new(32);
        assert!(arena.get_next_free_material::<Wide>().is_some());
        assert!(arena.get_next_free_material::<Wide>().is_some());
        // 24 + 12 > 32
        assert!(arena.get_next_free_material::<Wide>().is_none());
        assert_eq!(arena.num_allocated_bytes(), 24);
        assert!(arena.get_next_free_material::<Small>().is_some());
    }
}
