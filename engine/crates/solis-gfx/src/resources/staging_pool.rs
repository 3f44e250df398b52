use ash::vk;

use crate::resources::buffer::GfxBuffer;

/// 可以按照字节大小挑选的资源
pub trait SizedResource {
    fn byte_size(&self) -> vk::DeviceSize;
}

impl SizedResource for GfxBuffer {
    #[inline]
    fn byte_size(&self) -> vk::DeviceSize {
        self.size()
    }
}

/// 空闲 staging buffer 的池子
///
/// 取用时选择能够容纳请求的最小 buffer；没有合适的 buffer 时由调用者按照 [`StagingPool::next_name`] 创建新的
pub struct StagingPool<B: SizedResource> {
    free_buffers: Vec<B>,
    next_idx: u32,
}

impl<B: SizedResource> Default for StagingPool<B> {
    fn default() -> Self {
        Self {
            free_buffers: Vec::new(),
            next_idx: 0,
        }
    }
}

impl<B: SizedResource> StagingPool<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// best-fit
    pub fn take(&mut self, num_bytes: vk::DeviceSize) -> Option<B> {
        let best = self
            .free_buffers
            .iter()
            .enumerate()
            .filter(|(_, buffer)| buffer.byte_size() >= num_bytes)
            .min_by_key(|(_, buffer)| buffer.byte_size())
            .map(|(idx, _)| idx)?;
        Some(self.free_buffers.swap_remove(best))
    }

    /// 新建 staging buffer 时使用的名字
    pub fn next_name(&mut self) -> String {
        let name = format!("Staging Buffer {}", self.next_idx);
        self.next_idx += 1;
        name
    }

    #[inline]
    pub fn give_back(&mut self, buffer: B) {
        self.free_buffers.push(buffer);
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_buffers.len()
    }

    pub fn drain(&mut self) -> Vec<B> {
        std::mem::take(&mut self.free_buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeBuffer(vk::DeviceSize);

    impl SizedResource for FakeBuffer {
        fn byte_size(&self) -> vk::DeviceSize {
            self.0
        }
    }

    #[test]
    fn test_best_fit() {
        let mut pool = StagingPool::new();
        pool.give_back(FakeBuffer(1024));
        pool.give_back(FakeBuffer(64));
        pool.give_back(FakeBuffer(256));

        assert_eq!(pool.take(100), Some(FakeBuffer(256)));
        assert_eq!(pool.take(64), Some(FakeBuffer(64)));
        assert_eq!(pool.take(2048), None);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_names_are_sequential() {
        let mut pool = StagingPool::<FakeBuffer>::new();
        assert_eq!(pool.next_name(), "Staging Buffer 0");
        assert_eq!(pool.next_name(), "Staging Buffer 1");
    }

    #[test]
    fn test_drain_empties_pool() {
        let mut pool = StagingPool::new();
        pool.give_back(FakeBuffer(8));
        pool.give_back(FakeBuffer(16));
        assert_eq!(pool.drain().len(), 2);
        assert_eq!(pool.take(1), None);
    }
}
