use std::time::Duration;

/// 值单调递增的 fence，例如 timeline semaphore
pub trait TimelineFence {
    fn completed_value(&self) -> u64;

    /// 最多等待 `timeout`，返回 fence 是否已经到达 `value`
    fn wait_for_value(&self, value: u64, timeout: Duration) -> bool;
}

/// 每个 frame slot 一个 timeline fence
///
/// slot 被复用之前，必须等待上一次使用该 slot 时 signal 的值
pub struct FrameFences<F: TimelineFence> {
    fences: Vec<F>,
    /// 每个 slot 最近一次提交时 signal 的值
    values: Vec<u64>,
    wait_timeout: Duration,
}

// new & init
impl<F: TimelineFence> FrameFences<F> {
    pub fn new(fences: Vec<F>, wait_timeout: Duration) -> Self {
        assert!(!fences.is_empty(), "FrameFences needs at least one frame slot");
        let values = vec![0; fences.len()];
        Self {
            fences,
            values,
            wait_timeout,
        }
    }
}

// getters
impl<F: TimelineFence> FrameFences<F> {
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.fences.len()
    }

    /// 帧计数与 frame slot 的对应关系
    #[inline]
    pub fn slot_for_frame(&self, frame_count: u64) -> usize {
        (frame_count % self.fences.len() as u64) as usize
    }

    #[inline]
    pub fn fence(&self, slot: usize) -> &F {
        &self.fences[slot]
    }

    #[inline]
    pub fn value(&self, slot: usize) -> u64 {
        self.values[slot]
    }
}

// tools
impl<F: TimelineFence> FrameFences<F> {
    /// 阻塞直到 slot 上一次提交的工作完成
    pub fn wait_for_slot(&self, slot: usize) {
        let _span = tracy_client::span!("FrameFences::wait_for_slot");

        let value = self.values[slot];
        if self.fences[slot].completed_value() >= value {
            return;
        }
        while !self.fences[slot].wait_for_value(value, self.wait_timeout) {
            log::warn!("Waited {:?} for frame slot {} to reach {}, still waiting", self.wait_timeout, slot, value);
        }
    }

    /// 为 slot 分配下一个需要 signal 的值
    #[inline]
    pub fn advance(&mut self, slot: usize) -> u64 {
        self.values[slot] += 1;
        self.values[slot]
    }

    pub fn wait_all(&self) {
        (0..self.fences.len()).for_each(|slot| self.wait_for_slot(slot));
    }

    pub fn into_fences(self) -> Vec<F> {
        self.fences
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Instant;

    use super::*;

    #[derive(Clone, Default)]
    struct FakeTimeline {
        value: Arc<AtomicU64>,
    }
    impl TimelineFence for FakeTimeline {
        fn completed_value(&self) -> u64 {
            self.value.load(Ordering::Acquire)
        }
        fn wait_for_value(&self, value: u64, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if self.completed_value() >= value {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            self.completed_value() >= value
        }
    }

    #[test]
    fn test_slot_for_frame() {
        let fences = FrameFences::new(vec![FakeTimeline::default(); 3], Duration::from_millis(5));
        assert_eq!(fences.slot_for_frame(0), 0);
        assert_eq!(fences.slot_for_frame(4), 1);
        assert_eq!(fences.slot_for_frame(5), 2);
    }

    #[test]
    fn test_unused_slot_does_not_block() {
        let fences = FrameFences::new(vec![FakeTimeline::default(); 2], Duration::from_millis(5));
        fences.wait_for_slot(0);
        fences.wait_all();
    }

    #[test]
    fn test_wait_blocks_until_signaled() {
        let timeline = FakeTimeline::default();
        let mut fences = FrameFences::new(vec![timeline.clone(), FakeTimeline::default()], Duration::from_millis(5));

        let value = fences.advance(0);
        assert_eq!(value, 1);

        let signaled = Arc::new(AtomicBool::new(false));
        let signaler = {
            let signaled = signaled.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                signaled.store(true, Ordering::Release);
                timeline.value.store(value, Ordering::Release);
            })
        };

        fences.wait_for_slot(0);
        assert!(signaled.load(Ordering::Acquire));
        signaler.join().unwrap();

        // 另一个 slot 不受影响
        fences.wait_for_slot(1);
        assert_eq!(fences.advance(0), 2);
    }
}
