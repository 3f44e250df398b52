//! 纹理数组的注册表
//!
//! 纹理的位置就是 [`TextureHandle`] 的 index。销毁的纹理先进入延迟销毁的 ring，
//! 经过 `num_frames` 帧之后才归还 image 并回收 index。
//! 内容发生变化的 index 会被记录下来，渲染器只需要重写这些纹理数组槽位。

use std::collections::HashMap;

use crate::handles::TextureHandle;

struct ImageSlot<T> {
    name: String,
    image: T,
}

struct RetiredImage<T> {
    handle: TextureHandle,
    image: T,
}

pub struct ImageRegistry<T> {
    slots: Vec<Option<ImageSlot<T>>>,
    name_to_index: HashMap<String, u32>,
    free_indices: Vec<u32>,
    /// 自上次 [`ImageRegistry::take_changed_indices`] 以来新增或者回收的 index
    changed_indices: Vec<u32>,

    /// 以 frame count 为 key 的 ring，长度为 frames in flight 的数量
    retire_ring: Vec<Vec<RetiredImage<T>>>,
}

// new & init
impl<T> ImageRegistry<T> {
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "ImageRegistry needs at least one frame in flight");
        Self {
            slots: Vec::new(),
            name_to_index: HashMap::new(),
            free_indices: Vec::new(),
            changed_indices: Vec::new(),
            retire_ring: (0..num_frames).map(|_| Vec::new()).collect(),
        }
    }
}

// getters
impl<T> ImageRegistry<T> {
    /// 纹理数组的长度，包含空位
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.retire_ring.len()
    }

    pub fn handle_of(&self, name: &str) -> Option<TextureHandle> {
        self.name_to_index.get(name).copied().map(TextureHandle::new)
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&T> {
        self.slots.get(handle.index as usize)?.as_ref().map(|slot| &slot.image)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.handle_of(name).and_then(|handle| self.get(handle))
    }

    pub fn name_of(&self, handle: TextureHandle) -> Option<&str> {
        self.slots.get(handle.index as usize)?.as_ref().map(|slot| slot.name.as_str())
    }

    /// 按 index 顺序遍历，空位为 None
    pub fn iter_slots(&self) -> impl Iterator<Item = Option<&T>> {
        self.slots.iter().map(|slot| slot.as_ref().map(|slot| &slot.image))
    }

    /// 等待销毁的 image 数量
    pub fn num_retired(&self) -> usize {
        self.retire_ring.iter().map(Vec::len).sum()
    }
}

// tools
impl<T> ImageRegistry<T> {
    /// 优先使用空闲的 index；重名时新的纹理覆盖名字的映射
    pub fn insert(&mut self, name: &str, image: T) -> TextureHandle {
        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };

        if let Some(old) = self.name_to_index.insert(name.to_string(), index) {
            log::warn!("Image name {} already used by texture {}, the name now refers to texture {}", name, old, index);
        }
        self.slots[index as usize] = Some(ImageSlot {
            name: name.to_string(),
            image,
        });
        self.changed_indices.push(index);
        TextureHandle::new(index)
    }

    /// 纹理立即从名字表中移除，image 在 `num_frames` 帧之后通过 [`Self::collect_expired`] 返回
    pub fn schedule_destruction(&mut self, handle: TextureHandle, frame_count: u64) {
        let Some(slot) = self.slots.get_mut(handle.index as usize).and_then(Option::take) else {
            log::warn!("Scheduling destruction of {} which does not exist", handle);
            return;
        };

        if self.name_to_index.get(&slot.name) == Some(&handle.index) {
            self.name_to_index.remove(&slot.name);
        }
        log::debug!("Scheduling destruction of texture {} ({}) at frame {}", slot.name, handle, frame_count);
        let ring_idx = self.ring_index(frame_count);
        self.retire_ring[ring_idx].push(RetiredImage {
            handle,
            image: slot.image,
        });
    }

    /// 每一帧开始时调用，返回 `num_frames` 帧之前销毁的 image，其 index 回到空闲列表中
    pub fn collect_expired(&mut self, frame_count: u64) -> Vec<T> {
        let ring_idx = self.ring_index(frame_count);
        let expired = std::mem::take(&mut self.retire_ring[ring_idx]);

        expired
            .into_iter()
            .map(|retired| {
                self.free_indices.push(retired.handle.index);
                self.changed_indices.push(retired.handle.index);
                retired.image
            })
            .collect()
    }

    /// 返回排序去重后的变化 index，并清空记录
    pub fn take_changed_indices(&mut self) -> Vec<u32> {
        let mut changed = std::mem::take(&mut self.changed_indices);
        changed.sort_unstable();
        changed.dedup();
        changed
    }

    /// 销毁时不再需要等待 GPU，返回所有的 image
    pub fn drain_all(&mut self) -> Vec<T> {
        self.name_to_index.clear();
        self.free_indices.clear();
        self.changed_indices.clear();

        let mut images: Vec<T> = self.slots.drain(..).flatten().map(|slot| slot.image).collect();
        for ring in &mut self.retire_ring {
            images.extend(ring.drain(..).map(|retired| retired.image));
        }
        images
    }

    #[inline]
    fn ring_index(&self, frame_count: u64) -> usize {
        (frame_count % self.retire_ring.len() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FakeImage(&'static str);

    #[test]
    fn test_name_lookup() {
        let mut registry = ImageRegistry::new(3);
        let pink = registry.insert("pink", FakeImage("pink"));
        let noise = registry.insert("noise", FakeImage("noise"));

        assert_eq!(pink, TextureHandle::new(0));
        assert_eq!(noise, TextureHandle::new(1));
        assert_eq!(registry.handle_of("noise"), Some(noise));
        assert_eq!(registry.get_by_name("pink"), Some(&FakeImage("pink")));
        assert_eq!(registry.name_of(noise), Some("noise"));
        assert!(registry.handle_of("missing").is_none());
    }

    #[test]
    fn test_index_reused_only_after_ring_expires() {
        let mut registry = ImageRegistry::new(3);
        registry.insert("a", FakeImage("a"));
        let b = registry.insert("b", FakeImage("b"));

        // 第 10 帧销毁
        assert!(registry.collect_expired(10).is_empty());
        registry.schedule_destruction(b, 10);
        assert!(registry.handle_of("b").is_none());
        assert!(registry.get(b).is_none());

        // 在 ring 回到同一个位置之前，index 不会被复用
        assert!(registry.collect_expired(11).is_empty());
        let c = registry.insert("c", FakeImage("c"));
        assert_eq!(c, TextureHandle::new(2));
        assert!(registry.collect_expired(12).is_empty());
        assert_eq!(registry.num_retired(), 1);

        assert_eq!(registry.collect_expired(13), vec![FakeImage("b")]);
        let d = registry.insert("d", FakeImage("d"));
        assert_eq!(d, b);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_changed_indices_track_inserts_and_expiry() {
        let mut registry = ImageRegistry::new(2);
        registry.insert("a", FakeImage("a"));
        let b = registry.insert("b", FakeImage("b"));
        registry.insert("b", FakeImage("b2"));
        assert_eq!(registry.take_changed_indices(), vec![0, 1, 2]);
        assert!(registry.take_changed_indices().is_empty());

        // 销毁本身不改变纹理数组，旧的 image 在 ring 到期之前仍然可以被 GPU 读取
        registry.schedule_destruction(b, 4);
        assert!(registry.take_changed_indices().is_empty());
        assert!(registry.collect_expired(5).is_empty());
        assert!(registry.take_changed_indices().is_empty());

        assert_eq!(registry.collect_expired(6), vec![FakeImage("b")]);
        let reused = registry.insert("c", FakeImage("c"));
        assert_eq!(reused, b);
        // 同一帧内回收后又被复用的 index 只出现一次
        assert_eq!(registry.take_changed_indices(), vec![1]);
        assert_eq!(registry.get(reused), Some(&FakeImage("c")));
    }

    #[test]
    fn test_iter_slots_and_drain() {
        let mut registry = ImageRegistry::new(2);
        registry.insert("a", FakeImage("a"));
        let b = registry.insert("b", FakeImage("b"));
        registry.insert("c", FakeImage("c"));
        registry.schedule_destruction(b, 0);

        let slots = registry.iter_slots().collect::<Vec<_>>();
        assert_eq!(slots, vec![Some(&FakeImage("a")), None, Some(&FakeImage("c"))]);

        let all = registry.drain_all();
        assert_eq!(all.len(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.num_retired(), 0);
    }

    #[test]
    fn test_duplicate_name_points_to_newest() {
        let mut registry = ImageRegistry::new(2);
        let old = registry.insert("target", FakeImage("old"));
        let new = registry.insert("target", FakeImage("new"));
        assert_eq!(registry.handle_of("target"), Some(new));

        // 销毁旧纹理不会影响新纹理的名字
        registry.schedule_destruction(old, 0);
        assert_eq!(registry.handle_of("target"), Some(new));
    }
}
