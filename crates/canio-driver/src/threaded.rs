//! 后台线程包装器
//!
//! [`ThreadedDriver`] 在独立的工作线程上执行被包装驱动的阻塞 `run()`。
//! `init()` 因此变成同步操作：打开设备、启动工作线程，再用 [`StateWaiter`]
//! 等待驱动进入 `Ready`。

use crate::dispatcher::Listener;
use crate::engine::in_engine_thread;
use crate::interface::{CommInterface, DriverInterface, FrameDelegate, StateDelegate, StateInterface};
use crate::state::{DriverState, State};
use crate::waiter::StateWaiter;
use canio_protocol::{Frame, Header};
use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 工作线程配置
#[derive(Debug, Clone)]
pub struct ThreadedConfig {
    /// `init()` 等待 `Ready` 的最长时间
    pub ready_timeout: Duration,
    /// 工作线程名
    pub thread_name: String,
}

impl Default for ThreadedConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(1),
            thread_name: "canio-driver".to_string(),
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    /// 工作线程退出时断开
    done: Receiver<()>,
}

/// 在后台线程上运行的驱动
///
/// # Example
///
/// ```no_run
/// use canio_can::SocketCanSocket;
/// use canio_driver::{AsyncDriver, DriverInterface, SocketTransport, ThreadedDriver};
///
/// let driver = ThreadedDriver::new(AsyncDriver::new(SocketTransport::new(SocketCanSocket::new())));
/// if driver.init("can0", false) {
///     // 帧在工作线程上分发
/// }
/// driver.shutdown();
/// ```
pub struct ThreadedDriver<D: DriverInterface> {
    driver: Arc<D>,
    config: ThreadedConfig,
    worker: Mutex<Option<Worker>>,
    last_init: Mutex<Option<(String, bool)>>,
}

impl<D: DriverInterface> ThreadedDriver<D> {
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, ThreadedConfig::default())
    }

    pub fn with_config(driver: D, config: ThreadedConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            worker: Mutex::new(None),
            last_init: Mutex::new(None),
        }
    }

    /// 被包装的驱动
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &ThreadedConfig {
        &self.config
    }

    /// 工作线程是否存在且尚未退出
    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// 阻塞直到工作线程退出，不请求 shutdown；线程句柄保留
    pub fn join(&self) {
        if in_engine_thread() {
            warn!("join() called from a driver callback would deadlock, ignoring");
            return;
        }
        let done = self.worker.lock().as_ref().map(|worker| worker.done.clone());
        if let Some(done) = done {
            // 只会在发送端被丢弃时返回
            let _ = done.recv();
        }
    }

    fn spawn_worker(&self) -> Option<Worker> {
        let driver = self.driver.clone();
        let (done_tx, done_rx) = bounded::<()>(0);

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let _done = done_tx;

                #[cfg(feature = "realtime")]
                {
                    use thread_priority::*;

                    match set_current_thread_priority(ThreadPriority::Max) {
                        Ok(_) => info!("Driver worker priority set to MAX (realtime)"),
                        Err(e) => warn!(
                            "Failed to set driver worker priority: {}. \
                            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                            e
                        ),
                    }
                }

                info!("Driver worker started");
                driver.run();
                info!("Driver worker finished");
            });

        match spawned {
            Ok(handle) => Some(Worker {
                handle,
                done: done_rx,
            }),
            Err(e) => {
                error!("Failed to spawn driver worker thread: {}", e);
                None
            },
        }
    }
}

impl<D: DriverInterface> StateInterface for ThreadedDriver<D> {
    fn state(&self) -> State {
        self.driver.state()
    }

    fn create_state_listener(&self, delegate: StateDelegate) -> Listener {
        self.driver.create_state_listener(delegate)
    }
}

impl<D: DriverInterface> CommInterface for ThreadedDriver<D> {
    fn send(&self, frame: &Frame) -> bool {
        self.driver.send(frame)
    }

    fn create_msg_listener(&self, delegate: FrameDelegate) -> Listener {
        self.driver.create_msg_listener(delegate)
    }

    fn create_msg_listener_for(&self, header: Header, delegate: FrameDelegate) -> Listener {
        self.driver.create_msg_listener_for(header, delegate)
    }
}

impl<D: DriverInterface> DriverInterface for ThreadedDriver<D> {
    /// 打开设备并启动工作线程，等待 `Ready`
    ///
    /// 工作线程已存在时不会重复启动，直接返回当前是否就绪。
    fn init(&self, device: &str, loopback: bool) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return self.driver.state().is_ready();
        }

        *self.last_init.lock() = Some((device.to_string(), loopback));
        if !self.driver.init(device, loopback) {
            return false;
        }

        // 先订阅再启动，`Ready` 通知不会丢失
        let waiter = StateWaiter::new(self.driver.as_ref());
        match self.spawn_worker() {
            Some(spawned) => *worker = Some(spawned),
            None => return false,
        }
        drop(worker);

        let ready = waiter.wait(DriverState::Ready, self.config.ready_timeout);
        if !ready {
            warn!(
                "Driver did not become ready within {:?} (state: {})",
                self.config.ready_timeout,
                waiter.latest()
            );
        }
        ready
    }

    /// 与 [`ThreadedDriver::join`] 相同
    fn run(&self) {
        self.join();
    }

    fn shutdown(&self) {
        self.driver.shutdown();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            // 在回调内部调用时，工作线程正等待当前线程所在的执行线程退出
            if worker.handle.thread().id() == thread::current().id() || in_engine_thread() {
                debug!("shutdown() called from a driver callback, not joining the worker");
                return;
            }
            if worker.handle.join().is_err() {
                error!("Driver worker thread panicked");
            }
        }
    }

    fn recover(&self) -> bool {
        if self.driver.state().is_ready() {
            return true;
        }

        let last = self.last_init.lock().clone();
        match last {
            Some((device, loopback)) => {
                info!("Recovering driver on '{}'", device);
                self.shutdown();
                self.init(&device, loopback)
            },
            None => {
                warn!("recover() called before init()");
                false
            },
        }
    }

    fn translate_error(&self, internal_error: u32) -> String {
        self.driver.translate_error(internal_error)
    }
}

impl<D: DriverInterface> Drop for ThreadedDriver<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
