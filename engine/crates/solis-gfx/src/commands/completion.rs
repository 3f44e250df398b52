use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use slotmap::SlotMap;

/// 可以被后台线程等待的 fence
pub trait CompletionFence: Send + 'static {
    /// 最多等待 `timeout`，返回 fence 是否已经 signaled
    fn wait(&self, timeout: Duration) -> bool;
}

/// 在后台线程中按提交顺序等待 fence
///
/// 主线程通过 `track` 发送 (fence, token)，worker 依次等待，
/// 完成后放入 done 队列，由主线程调用 `try_completed` 取回。
/// done 队列中的顺序与提交顺序一致。
pub struct CompletionTracker<F: CompletionFence, T: Send + 'static> {
    in_flight_tx: Option<Sender<(F, T)>>,
    done_rx: Receiver<(F, T)>,

    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

// new & init
impl<F: CompletionFence, T: Send + 'static> CompletionTracker<F, T> {
    /// `fence_wait_timeout` 是单次等待的超时时间，超时之后 worker 会继续重试
    pub fn new(fence_wait_timeout: Duration) -> Self {
        let (in_flight_tx, in_flight_rx) = crossbeam_channel::unbounded::<(F, T)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(F, T)>();
        let running = Arc::new(AtomicBool::new(true));

        let worker_running = running.clone();
        let worker = std::thread::Builder::new()
            .name("solis-completion".to_string())
            .spawn(move || Self::worker_loop(in_flight_rx, done_tx, worker_running, fence_wait_timeout))
            .unwrap_or_else(|e| panic!("Could not spawn the completion thread: {e}"));

        Self {
            in_flight_tx: Some(in_flight_tx),
            done_rx,
            running,
            worker: Some(worker),
        }
    }

    fn worker_loop(
        in_flight_rx: Receiver<(F, T)>,
        done_tx: Sender<(F, T)>,
        running: Arc<AtomicBool>,
        fence_wait_timeout: Duration,
    ) {
        let _span = tracy_client::span!("CompletionTracker::worker_loop");

        // sender 被 drop 之后，recv 仍然会先返回队列中剩余的元素
        while let Ok((fence, token)) = in_flight_rx.recv() {
            while !fence.wait(fence_wait_timeout) {
                if !running.load(Ordering::Acquire) {
                    log::warn!("Fence still unsignaled during shutdown, releasing its resources anyway");
                    break;
                }
                log::debug!("Waited {:?} for a fence, still waiting", fence_wait_timeout);
            }

            if done_tx.send((fence, token)).is_err() {
                break;
            }
        }

        log::info!("completion thread exited");
    }
}

// tools
impl<F: CompletionFence, T: Send + 'static> CompletionTracker<F, T> {
    #[inline]
    pub fn track(&self, fence: F, token: T) {
        if let Some(tx) = &self.in_flight_tx {
            if tx.send((fence, token)).is_err() {
                log::error!("completion thread is gone, submission will never be reclaimed");
            }
        }
    }

    /// 非阻塞地取回所有已经完成的提交
    #[inline]
    pub fn try_completed(&self) -> Vec<(F, T)> {
        self.done_rx.try_iter().collect()
    }
}

// destroy
impl<F: CompletionFence, T: Send + 'static> CompletionTracker<F, T> {
    /// 停止 worker 并返回尚未被取回的提交
    pub fn shutdown(mut self) -> Vec<(F, T)> {
        self.stop_worker();
        self.done_rx.try_iter().collect()
    }

    fn stop_worker(&mut self) {
        self.running.store(false, Ordering::Release);
        self.in_flight_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("completion thread panicked");
            }
        }
    }
}

impl<F: CompletionFence, T: Send + 'static> Drop for CompletionTracker<F, T> {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

slotmap::new_key_type! {
    pub struct SubmissionKey;
}

/// 已经提交、尚未回收的 command list
///
/// 只有 (fence, key) 会被发送到 worker 线程，`L` 本身停留在主线程，因此不需要 `Send`
pub struct InFlightSubmissions<F: CompletionFence, L> {
    tracker: CompletionTracker<F, SubmissionKey>,
    parked: SlotMap<SubmissionKey, L>,
}

impl<F: CompletionFence, L> InFlightSubmissions<F, L> {
    pub fn new(fence_wait_timeout: Duration) -> Self {
        Self {
            tracker: CompletionTracker::new(fence_wait_timeout),
            parked: SlotMap::with_key(),
        }
    }

    pub fn push(&mut self, fence: F, list: L) -> SubmissionKey {
        let key = self.parked.insert(list);
        self.tracker.track(fence, key);
        key
    }

    /// 按提交顺序返回所有 fence 已经 signaled 的提交
    pub fn reclaim(&mut self) -> Vec<(F, L)> {
        self.tracker
            .try_completed()
            .into_iter()
            .filter_map(|(fence, key)| self.parked.remove(key).map(|list| (fence, list)))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    /// 停止 worker，返回全部尚未回收的提交
    ///
    /// worker 已经处理过的按提交顺序排在前面，其余的 fence 无法取回，只返回 list
    pub fn shutdown(mut self) -> (Vec<(F, L)>, Vec<L>) {
        let finished = self
            .tracker
            .shutdown()
            .into_iter()
            .filter_map(|(fence, key)| self.parked.remove(key).map(|list| (fence, list)))
            .collect();
        let leftovers = self.parked.drain().map(|(_, list)| list).collect();
        (finished, leftovers)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    #[derive(Clone)]
    struct FakeFence {
        signaled: Arc<AtomicBool>,
    }
    impl FakeFence {
        fn new() -> Self {
            Self {
                signaled: Arc::new(AtomicBool::new(false)),
            }
        }
        fn signal(&self) {
            self.signaled.store(true, Ordering::Release);
        }
    }
    impl CompletionFence for FakeFence {
        fn wait(&self, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if self.signaled.load(Ordering::Acquire) {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            self.signaled.load(Ordering::Acquire)
        }
    }

    type Callback = Box<dyn FnOnce()>;

    /// 轮询直到回收到 `expected` 个提交或者超时
    fn reclaim_until(
        submissions: &mut InFlightSubmissions<FakeFence, Callback>,
        expected: usize,
    ) -> Vec<(FakeFence, Callback)> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reclaimed = Vec::new();
        while reclaimed.len() < expected && Instant::now() < deadline {
            reclaimed.extend(submissions.reclaim());
            std::thread::sleep(Duration::from_millis(2));
        }
        reclaimed
    }

    #[test]
    fn test_callbacks_run_once_in_submission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut submissions: InFlightSubmissions<FakeFence, Callback> =
            InFlightSubmissions::new(Duration::from_millis(20));

        let fences = (0..3).map(|_| FakeFence::new()).collect::<Vec<_>>();
        for (i, fence) in fences.iter().enumerate() {
            let log = log.clone();
            submissions.push(fence.clone(), Box::new(move || log.lock().unwrap().push(i)));
        }

        // 还没有 signal，不应该回收任何东西
        std::thread::sleep(Duration::from_millis(50));
        assert!(submissions.reclaim().is_empty());
        assert_eq!(submissions.len(), 3);

        for fence in &fences {
            fence.signal();
        }
        for (_, callback) in reclaim_until(&mut submissions, 3) {
            callback();
        }

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(submissions.is_empty());
        assert!(submissions.reclaim().is_empty());
    }

    #[test]
    fn test_later_fence_waits_for_earlier_one() {
        let mut submissions: InFlightSubmissions<FakeFence, Callback> =
            InFlightSubmissions::new(Duration::from_millis(10));
        let first = FakeFence::new();
        let second = FakeFence::new();
        submissions.push(first.clone(), Box::new(|| {}));
        submissions.push(second.clone(), Box::new(|| {}));

        second.signal();
        std::thread::sleep(Duration::from_millis(60));
        assert!(submissions.reclaim().is_empty());

        first.signal();
        let reclaimed = reclaim_until(&mut submissions, 2);
        assert_eq!(reclaimed.len(), 2);
        assert!(Arc::ptr_eq(&reclaimed[0].0.signaled, &first.signaled));
        assert!(Arc::ptr_eq(&reclaimed[1].0.signaled, &second.signaled));
    }

    #[test]
    fn test_wait_timeout_is_retried() {
        let mut submissions: InFlightSubmissions<FakeFence, Callback> =
            InFlightSubmissions::new(Duration::from_millis(5));
        let fence = FakeFence::new();
        submissions.push(fence.clone(), Box::new(|| {}));

        // 远超单次等待的超时时间
        std::thread::sleep(Duration::from_millis(80));
        fence.signal();

        assert_eq!(reclaim_until(&mut submissions, 1).len(), 1);
    }

    #[test]
    fn test_shutdown_returns_leftovers() {
        let mut submissions: InFlightSubmissions<FakeFence, Callback> =
            InFlightSubmissions::new(Duration::from_millis(5));
        submissions.push(FakeFence::new(), Box::new(|| {}));
        submissions.push(FakeFence::new(), Box::new(|| {}));

        let (finished, leftovers) = submissions.shutdown();
        assert_eq!(finished.len() + leftovers.len(), 2);
    }
}
