use std::time::{Duration, Instant};

/// 帧序号与 frames in flight 中的位置
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    num_frames: usize,
    /// 每秒最多渲染的帧数
    frame_limit: f32,

    start_time: Instant,
    last_frame_time: Instant,
    delta_time: Duration,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64, num_frames: usize, frame_limit: f32) -> Self {
        assert!(num_frames > 0, "FrameCounter needs at least one frame in flight");
        let now = Instant::now();
        Self {
            frame_id: init_frame_id,
            num_frames,
            frame_limit,
            start_time: now,
            last_frame_time: now,
            delta_time: Duration::ZERO,
        }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);

        let now = Instant::now();
        self.delta_time = now - self.last_frame_time;
        self.last_frame_time = now;
    }

    /// 距离上一帧的时间小于 frame limit 对应的间隔时返回 false
    pub fn should_render(&self) -> bool {
        if self.frame_limit <= 0.0 {
            return true;
        }
        self.last_frame_time.elapsed() >= self.min_frame_interval()
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn frame_limit(&self) -> f32 {
        self.frame_limit
    }
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }
    /// 当前帧在 frames in flight 中的位置
    #[inline]
    pub fn frame_idx(&self) -> usize {
        Self::frame_idx_of(self.frame_id, self.num_frames)
    }
    #[inline]
    pub fn frame_idx_of(frame_id: u64, num_frames: usize) -> usize {
        (frame_id % num_frames as u64) as usize
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}-{}]", self.frame_id, self.frame_idx())
    }
    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }
    #[inline]
    pub fn time_since_start(&self) -> Duration {
        self.start_time.elapsed()
    }
    #[inline]
    pub fn min_frame_interval(&self) -> Duration {
        if self.frame_limit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.frame_limit as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_idx_cycles() {
        let mut counter = FrameCounter::new(1, 3, 0.0);
        let mut indices = vec![];
        for _ in 0..6 {
            indices.push(counter.frame_idx());
            counter.next_frame();
        }
        assert_eq!(indices, vec![1, 2, 0, 1, 2, 0]);
        assert_eq!(counter.frame_id(), 7);
        assert_eq!(counter.frame_name(), "[F7-1]");
    }

    #[test]
    fn test_frame_limit_interval() {
        let counter = FrameCounter::new(0, 2, 50.0);
        assert_eq!(counter.min_frame_interval(), Duration::from_millis(20));

        let unlimited = FrameCounter::new(0, 2, 0.0);
        assert_eq!(unlimited.min_frame_interval(), Duration::ZERO);
        assert!(unlimited.should_render());
    }
}
