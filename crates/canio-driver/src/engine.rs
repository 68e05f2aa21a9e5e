//! 事件引擎（工作队列执行器）
//!
//! 一个可以被多个线程同时驱动（`run()`）的 FIFO 任务队列：
//!
//! - `post()` 投递任务，由任意一个正在 `run()` 的线程执行
//! - 持有 [`Work`] 令牌期间，队列为空时 `run()` 阻塞等待而不是返回
//! - `stop()` 让所有 `run()` 尽快返回，已排队的任务保留到 `restart()` 时丢弃
//! - 任务 panic 被捕获：引擎停止，捕获到 panic 的 `run()` 返回 [`EngineError::HandlerPanicked`]
//!
//! [`in_engine_thread()`] 可以判断当前代码是否运行在某个 `run()` 内部（例如分发回调中），
//! 此时不能阻塞等待该引擎的执行线程退出。

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    static PUMPING: Cell<bool> = const { Cell::new(false) };
}

/// 当前线程是否正在执行 [`Engine::run`]
pub fn in_engine_thread() -> bool {
    PUMPING.with(Cell::get)
}

struct PumpGuard {
    previous: bool,
}

impl PumpGuard {
    fn enter() -> Self {
        Self {
            previous: PUMPING.with(|p| p.replace(true)),
        }
    }
}

impl Drop for PumpGuard {
    fn drop(&mut self) {
        PUMPING.with(|p| p.set(self.previous));
    }
}

/// 引擎错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine handler panicked")]
    HandlerPanicked,
}

struct Queue {
    jobs: VecDeque<Job>,
    stopped: bool,
    outstanding_work: usize,
}

struct EngineInner {
    queue: Mutex<Queue>,
    cond: Condvar,
}

/// 事件引擎句柄（`clone()` 共享同一个队列）
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    stopped: false,
                    outstanding_work: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// 投递任务
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.inner.queue.lock();
        queue.jobs.push_back(Box::new(job));
        drop(queue);
        self.inner.cond.notify_one();
    }

    /// 在当前线程上执行任务，直到引擎停止或没有剩余工作
    ///
    /// 返回本线程执行的任务数。没有剩余工作（队列为空且没有 `Work` 令牌）时，
    /// 引擎进入停止状态。
    pub fn run(&self) -> Result<usize, EngineError> {
        let _pumping = PumpGuard::enter();
        let mut executed = 0;
        loop {
            let job = {
                let mut queue = self.inner.queue.lock();
                loop {
                    if queue.stopped {
                        return Ok(executed);
                    }
                    if let Some(job) = queue.jobs.pop_front() {
                        break job;
                    }
                    if queue.outstanding_work == 0 {
                        queue.stopped = true;
                        drop(queue);
                        self.inner.cond.notify_all();
                        return Ok(executed);
                    }
                    self.inner.cond.wait(&mut queue);
                }
            };

            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("Engine job panicked, stopping engine");
                self.stop();
                return Err(EngineError::HandlerPanicked);
            }
            executed += 1;
        }
    }

    /// 停止引擎，唤醒所有 `run()`
    pub fn stop(&self) {
        let mut queue = self.inner.queue.lock();
        if !queue.stopped {
            queue.stopped = true;
            debug!("Engine stopped ({} pending jobs)", queue.jobs.len());
        }
        drop(queue);
        self.inner.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.queue.lock().stopped
    }

    /// 清除停止标志并丢弃上一轮残留的任务
    pub fn restart(&self) {
        let mut queue = self.inner.queue.lock();
        let stale = queue.jobs.len();
        queue.jobs.clear();
        queue.stopped = false;
        if stale > 0 {
            debug!("Engine restarted, discarded {} stale jobs", stale);
        }
    }

    /// 获取保活令牌
    pub fn work(&self) -> Work {
        self.inner.queue.lock().outstanding_work += 1;
        Work {
            inner: self.inner.clone(),
        }
    }

    /// 排队中的任务数
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().jobs.len()
    }
}

/// 保活令牌：存在期间空队列不会让 `run()` 返回
#[must_use = "the engine runs out of work as soon as the token is dropped"]
pub struct Work {
    inner: Arc<EngineInner>,
}

impl Drop for Work {
    fn drop(&mut self) {
        let mut queue = self.inner.queue.lock();
        queue.outstanding_work -= 1;
        drop(queue);
        self.inner.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_run_without_work_returns() {
        let engine = Engine::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            engine.post(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(engine.run(), Ok(3));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(engine.is_stopped());
    }

    #[test]
    fn test_work_keeps_engine_alive() {
        let engine = Engine::new();
        let work = engine.work();

        let runner = engine.clone();
        let handle = thread::spawn(move || runner.run());

        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        let (tx, rx) = crossbeam_channel::bounded(1);
        engine.post(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        drop(work);
        assert_eq!(handle.join().unwrap(), Ok(1));
    }

    #[test]
    fn test_stop_wakes_all_runners() {
        let engine = Engine::new();
        let _work = engine.work();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let runner = engine.clone();
                thread::spawn(move || runner.run())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        engine.stop();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(0));
        }
    }

    #[test]
    fn test_stopped_engine_keeps_jobs_until_restart() {
        let engine = Engine::new();
        engine.stop();
        engine.post(|| {});
        assert_eq!(engine.run(), Ok(0));
        assert_eq!(engine.pending(), 1);

        engine.restart();
        assert!(!engine.is_stopped());
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn test_panicking_job_stops_engine() {
        let engine = Engine::new();
        let _work = engine.work();
        let after = Arc::new(AtomicUsize::new(0));

        engine.post(|| panic!("boom"));
        let after_clone = after.clone();
        engine.post(move || {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(engine.run(), Err(EngineError::HandlerPanicked));
        assert!(engine.is_stopped());
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_in_engine_thread() {
        assert!(!in_engine_thread());

        let engine = Engine::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let inside_clone = inside.clone();
        engine.post(move || {
            if in_engine_thread() {
                inside_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        engine.run().unwrap();

        assert_eq!(inside.load(Ordering::SeqCst), 1);
        assert!(!in_engine_thread());
    }

    #[test]
    fn test_jobs_run_in_fifo_order() {
        let engine = Engine::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            engine.post(move || order.lock().push(i));
        }
        engine.run().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }
}
