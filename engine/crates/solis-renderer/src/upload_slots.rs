//! 上传纹理时临时占用的 storage image 槽位
//!
//! 槽位随记录上传命令的 command list 一起释放：completion function 把槽位发送回来，
//! 渲染器在每一帧开始时通过 `drain` 把它们还给 allocator。

use crossbeam_channel::{Receiver, Sender};

pub struct UploadSlotRecycler<T> {
    released_tx: Sender<T>,
    released_rx: Receiver<T>,
}

// new & init
impl<T: 'static> UploadSlotRecycler<T> {
    pub fn new() -> Self {
        let (released_tx, released_rx) = crossbeam_channel::unbounded();
        Self {
            released_tx,
            released_rx,
        }
    }
}

impl<T: 'static> Default for UploadSlotRecycler<T> {
    fn default() -> Self {
        Self::new()
    }
}

// tools
impl<T: 'static> UploadSlotRecycler<T> {
    /// 返回的函数需要注册为 command list 的 completion function
    pub fn release_on_completion(&self, slots: Vec<T>) -> impl FnOnce() + 'static {
        let tx = self.released_tx.clone();
        move || {
            for slot in slots {
                if tx.send(slot).is_err() {
                    log::warn!("Upload slot recycler is gone, dropping a released slot");
                }
            }
        }
    }

    /// 非阻塞地取回所有 command list 已经执行完毕的槽位
    #[inline]
    pub fn drain(&self) -> Vec<T> {
        self.released_rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_return_only_after_completion() {
        let recycler = UploadSlotRecycler::new();

        // 在第 0 帧记录的上传，command list 完成之前无论经过多少帧都不会归还
        let on_complete = recycler.release_on_completion(vec![4u32, 5]);
        for _ in 0..4 {
            assert!(recycler.drain().is_empty());
        }

        on_complete();
        assert_eq!(recycler.drain(), vec![4, 5]);
        assert!(recycler.drain().is_empty());
    }

    #[test]
    fn test_lists_complete_independently() {
        let recycler = UploadSlotRecycler::new();
        let first = recycler.release_on_completion(vec![0u32, 1]);
        let second = recycler.release_on_completion(vec![2u32, 3]);

        second();
        assert_eq!(recycler.drain(), vec![2, 3]);
        first();
        assert_eq!(recycler.drain(), vec![0, 1]);
    }
}
