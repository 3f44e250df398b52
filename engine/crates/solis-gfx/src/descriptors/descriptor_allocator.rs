/// descriptor heap 中的一个槽位
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorHandle(pub u32);

impl DescriptorHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// 在固定容量的 descriptor heap 上分配槽位
///
/// 优先复用 free list 中最近释放的槽位，否则移动游标
pub struct DescriptorAllocator {
    name: String,
    capacity: u32,
    next_free_descriptor: u32,
    available_handles: Vec<DescriptorHandle>,
}

impl DescriptorAllocator {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            next_free_descriptor: 0,
            available_handles: Vec::new(),
        }
    }

    /// heap 用尽是致命错误
    pub fn acquire(&mut self) -> DescriptorHandle {
        if let Some(handle) = self.available_handles.pop() {
            return handle;
        }

        assert!(
            self.next_free_descriptor < self.capacity,
            "Descriptor heap {} is full ({} descriptors)",
            self.name,
            self.capacity
        );
        let handle = DescriptorHandle(self.next_free_descriptor);
        self.next_free_descriptor += 1;
        handle
    }

    /// 从游标处分配一段连续的槽位，用于 descriptor table 与 image 数组，不会使用 free list
    pub fn acquire_range(&mut self, count: u32) -> DescriptorHandle {
        assert!(
            self.next_free_descriptor + count <= self.capacity,
            "Descriptor heap {} can not fit {} more descriptors ({} of {} used)",
            self.name,
            count,
            self.next_free_descriptor,
            self.capacity
        );
        let handle = DescriptorHandle(self.next_free_descriptor);
        self.next_free_descriptor += count;
        handle
    }

    /// 不检查越界以及重复释放
    #[inline]
    pub fn release(&mut self, handle: DescriptorHandle) {
        self.available_handles.push(handle);
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 当前正在使用的槽位数量
    #[inline]
    pub fn allocated_count(&self) -> u32 {
        self.next_free_descriptor.saturating_sub(self.available_handles.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advances() {
        let mut allocator = DescriptorAllocator::new("test", 4);
        assert_eq!(allocator.acquire(), DescriptorHandle(0));
        assert_eq!(allocator.acquire(), DescriptorHandle(1));
        assert_eq!(allocator.allocated_count(), 2);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut allocator = DescriptorAllocator::new("test", 8);
        let a = allocator.acquire();
        let b = allocator.acquire();
        let _c = allocator.acquire();

        allocator.release(a);
        allocator.release(b);
        assert_eq!(allocator.allocated_count(), 1);

        assert_eq!(allocator.acquire(), b);
        assert_eq!(allocator.acquire(), a);
        assert_eq!(allocator.acquire(), DescriptorHandle(3));
    }

    #[test]
    fn test_range_ignores_free_list() {
        let mut allocator = DescriptorAllocator::new("test", 16);
        let a = allocator.acquire();
        allocator.release(a);

        let range = allocator.acquire_range(4);
        assert_eq!(range, DescriptorHandle(1));
        assert_eq!(allocator.acquire(), a);
        assert_eq!(allocator.acquire(), DescriptorHandle(5));
    }

    #[test]
    fn test_released_slot_reused_at_capacity() {
        let mut allocator = DescriptorAllocator::new("test", 2);
        let a = allocator.acquire();
        let _b = allocator.acquire();
        allocator.release(a);
        assert_eq!(allocator.acquire(), a);
    }

    #[test]
    #[should_panic(expected = "is full")]
    fn test_overflow_is_fatal() {
        let mut allocator = DescriptorAllocator::new("test", 2);
        allocator.acquire();
        allocator.acquire();
        allocator.acquire();
    }

    #[test]
    #[should_panic]
    fn test_range_overflow_is_fatal() {
        let mut allocator = DescriptorAllocator::new("test", 4);
        allocator.acquire_range(5);
    }
}
