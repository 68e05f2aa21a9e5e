//! 事件驱动的 CAN 驱动
//!
//! [`AsyncDriver`] 持有一个事件引擎和一个传输层：`run()` 在调用线程和一个辅助线程上
//! 同时执行引擎。读完成回调先同步分发帧，再挂起下一次读，因此任意时刻只有一个读或
//! 分发在进行，监听器按读取顺序收到帧。
//!
//! # 生命周期
//!
//! ```text
//! Closed --init()--> Open --run()--> Ready --shutdown()/读错误--> Open | Closed
//! ```
//!
//! 只有 `Ready` 状态接受 `send()`。读错误是 fail-stop 的：错误码被记录，读循环不再继续，
//! `run()` 返回。重新开始需要 `shutdown()` + `init()` + `run()`。
//!
//! # 并发约定
//!
//! 同一个实例同一时间只应有一个 `run()`。重叠的 `run()` 不会被拒绝，只会记录警告，
//! 见 [`AsyncDriver::active_runs`]。

use crate::dispatcher::{FilteredDispatcher, Listener};
use crate::engine::{Engine, EngineError};
use crate::interface::{CommInterface, DriverInterface, FrameDelegate, StateDelegate, StateInterface};
use crate::metrics::DriverMetrics;
use crate::state::{DriverState, ErrorCode, State, StateMachine};
use crate::transport::Transport;
use canio_can::CanError;
use canio_protocol::{Frame, Header, ID_MASK, describe_error_classes};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// 引擎辅助线程名
const ENGINE_THREAD_NAME: &str = "canio-engine";

struct DriverCore<T> {
    transport: T,
    engine: Engine,
    state: StateMachine,
    frames: FilteredDispatcher<u32, Frame>,
    /// init/cancel/close 互斥
    socket_lock: Mutex<()>,
    last_init: Mutex<Option<(String, bool)>>,
    metrics: Arc<DriverMetrics>,
    active_runs: AtomicUsize,
}

impl<T: Transport> DriverCore<T> {
    fn arm_read(self: &Arc<Self>) {
        let core: Weak<Self> = Arc::downgrade(self);
        self.transport.trigger_read_some(
            &self.engine,
            Box::new(move |result| {
                if let Some(core) = core.upgrade() {
                    core.frame_received(result);
                }
            }),
        );
    }

    fn frame_received(self: &Arc<Self>, result: Result<Frame, CanError>) {
        match result {
            Ok(frame) => {
                self.metrics.rx_frames.fetch_add(1, Ordering::Relaxed);
                if frame.is_error {
                    self.metrics.rx_error_frames.fetch_add(1, Ordering::Relaxed);
                    self.state.set_internal_error(frame.id & ID_MASK);
                }
                trace!("RX frame: {}", frame);

                // 分发完成后才挂起下一次读：帧按读取顺序送达，监听器不会并发执行
                self.frames.dispatch(&frame.key(), &frame);
                self.arm_read();
            },
            Err(e) => {
                self.metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                if matches!(e, CanError::Aborted) {
                    debug!("CAN read aborted");
                } else {
                    warn!("CAN read failed, stopping read loop: {}", e);
                }
                self.state.set_error_code(ErrorCode::from(&e));
                self.engine.stop();
            },
        }
    }

    /// 在当前线程上执行引擎
    ///
    /// 任务 panic 时中止传输层的读操作，让另一个执行线程上的阻塞读尽快返回。
    fn pump(&self) -> Result<usize, EngineError> {
        let result = self.engine.run();
        if result.is_err() {
            let _socket = self.socket_lock.lock();
            self.transport.cancel();
        }
        result
    }

    fn current_open_state(&self) -> DriverState {
        if self.transport.is_open() {
            DriverState::Open
        } else {
            DriverState::Closed
        }
    }
}

/// `run()` 计数，退出时递减
struct RunGuard<'a>(&'a AtomicUsize);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 事件驱动的 CAN 驱动
///
/// # Example
///
/// ```no_run
/// use canio_can::SocketCanSocket;
/// use canio_driver::{AsyncDriver, CommInterface, DriverInterface, Frame, SocketTransport};
/// use std::sync::Arc;
///
/// let driver = AsyncDriver::new(SocketTransport::new(SocketCanSocket::new()));
/// let _listener = driver.create_msg_listener(Arc::new(|frame: &Frame| println!("{}", frame)));
/// if driver.init("can0", false) {
///     driver.run();
/// }
/// ```
pub struct AsyncDriver<T: Transport> {
    core: Arc<DriverCore<T>>,
}

impl<T: Transport> AsyncDriver<T> {
    pub fn new(transport: T) -> Self {
        Self::with_metrics(transport, Arc::new(DriverMetrics::new()))
    }

    /// 使用外部共享的指标实例
    pub fn with_metrics(transport: T, metrics: Arc<DriverMetrics>) -> Self {
        Self {
            core: Arc::new(DriverCore {
                transport,
                engine: Engine::new(),
                state: StateMachine::new(),
                frames: FilteredDispatcher::new(),
                socket_lock: Mutex::new(()),
                last_init: Mutex::new(None),
                metrics,
                active_runs: AtomicUsize::new(0),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.core.transport
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.core.metrics
    }

    /// 当前正在执行的 `run()` 数量
    pub fn active_runs(&self) -> usize {
        self.core.active_runs.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.active_runs() > 0
    }
}

impl<T: Transport> StateInterface for AsyncDriver<T> {
    fn state(&self) -> State {
        self.core.state.state()
    }

    fn create_state_listener(&self, delegate: StateDelegate) -> Listener {
        self.core.state.create_listener(delegate)
    }
}

impl<T: Transport> CommInterface for AsyncDriver<T> {
    fn send(&self, frame: &Frame) -> bool {
        let metrics = &self.core.metrics;
        if !self.core.state.state().is_ready() {
            metrics.tx_rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Driver not ready, dropping frame 0x{:X}", frame.id);
            return false;
        }

        if self.core.transport.enqueue(frame) {
            metrics.tx_frames.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            metrics.tx_failed.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    fn create_msg_listener(&self, delegate: FrameDelegate) -> Listener {
        self.core.frames.create_listener(delegate)
    }

    fn create_msg_listener_for(&self, header: Header, delegate: FrameDelegate) -> Listener {
        self.core.frames.create_filtered_listener(header.key(), delegate)
    }
}

impl<T: Transport> DriverInterface for AsyncDriver<T> {
    /// 打开设备；`Ready` 且设备仍打开时不做任何事并返回 true
    ///
    /// `shutdown()` 已关闭设备、但 `run()` 尚未离开 `Ready` 时，会重新打开设备。
    fn init(&self, device: &str, loopback: bool) -> bool {
        let core = &self.core;
        if core.state.state().is_ready() && core.transport.is_open() {
            return true;
        }

        let _socket = core.socket_lock.lock();
        *core.last_init.lock() = Some((device.to_string(), loopback));
        match core.transport.init(device, loopback) {
            Ok(()) => {
                core.state.set_internal_error(0);
                core.state.set_error_code(ErrorCode::Success);
                core.state.set_driver_state(DriverState::Open);
                info!("CAN device '{}' opened (loopback={})", device, loopback);
                true
            },
            Err(e) => {
                error!("Failed to open CAN device '{}': {}", device, e);
                core.state.set_error_code(ErrorCode::from(&e));
                core.state.set_driver_state(DriverState::Closed);
                false
            },
        }
    }

    fn run(&self) {
        let core = &self.core;
        let active = core.active_runs.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = RunGuard(&core.active_runs);
        if active > 1 {
            warn!("Overlapping run() on the same driver ({} active)", active);
        }

        core.state.set_driver_state(core.current_open_state());

        if core.state.state().driver_state == DriverState::Open {
            core.engine.restart();
            let work = core.engine.work();
            core.state.set_driver_state(DriverState::Ready);

            let helper_core = core.clone();
            let helper = match thread::Builder::new()
                .name(ENGINE_THREAD_NAME.into())
                .spawn(move || helper_core.pump())
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Failed to spawn engine helper thread: {}", e);
                    None
                },
            };

            core.arm_read();
            debug!("Engine started");
            let mut result = core.pump();

            core.engine.stop();
            drop(work);
            if let Some(helper) = helper {
                match helper.join() {
                    Ok(helper_result) => {
                        if result.is_ok() {
                            result = helper_result;
                        }
                    },
                    Err(_) => {
                        error!("Engine helper thread panicked");
                        result = Err(EngineError::HandlerPanicked);
                    },
                }
            }
            debug!("Engine finished");

            if result.is_err() {
                core.state.set_error_code(ErrorCode::HandlerPanicked);
            }
            core.state.set_driver_state(core.current_open_state());
        }

        core.state.dispatch_current();
    }

    fn shutdown(&self) {
        let core = &self.core;
        {
            let _socket = core.socket_lock.lock();
            if core.transport.is_open() {
                core.transport.cancel();
                core.transport.close();
                info!("CAN device closed");
            }
        }
        core.engine.stop();
    }

    /// 未就绪时关闭并用上一次的参数重新打开，返回是否打开成功
    ///
    /// 不会启动读循环，需要再次调用 `run()`。
    fn recover(&self) -> bool {
        if self.state().is_ready() {
            return true;
        }

        let last = self.core.last_init.lock().clone();
        match last {
            Some((device, loopback)) => {
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
        describe_error_classes(internal_error)
    }
}

impl<T: Transport> Drop for AsyncDriver<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
