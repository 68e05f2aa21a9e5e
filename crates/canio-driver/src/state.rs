//! 驱动状态与状态机
//!
//! [`State`] 是驱动对外可观察的全部状态。[`StateMachine`] 在一把锁下修改它，
//! 只有值真正改变时才通知状态监听器，且通知在持锁期间同步完成，
//! 因此监听器观察到的状态序列与修改顺序严格一致。
//!
//! # 重入限制
//!
//! 状态监听器在状态锁内被调用，不能同步调用任何会再次获取该锁的方法
//! （`state()`、`set_*()`、驱动的 `init()`/`run()` 等），否则会死锁。

use crate::dispatcher::{Delegate, Listener, SimpleDispatcher};
use canio_can::{CanDeviceErrorKind, CanError};
use parking_lot::Mutex;
use std::fmt;

/// 驱动生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverState {
    /// 设备未打开
    #[default]
    Closed,
    /// 设备已打开，读循环未运行
    Open,
    /// 读循环运行中，可以发送
    Ready,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Closed => "closed",
            DriverState::Open => "open",
            DriverState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// 最近一次 I/O 失败的错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    Success,
    /// 操作被 `shutdown()` 中止
    Aborted,
    NotOpen,
    Timeout,
    BusOff,
    BufferOverflow,
    /// 原始 errno
    Os(i32),
    /// 没有 errno 的 IO 错误
    Io(std::io::ErrorKind),
    Device(CanDeviceErrorKind),
    /// 引擎上执行的回调 panic
    HandlerPanicked,
}

impl ErrorCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl From<&CanError> for ErrorCode {
    fn from(error: &CanError) -> Self {
        match error {
            CanError::Io(e) => match e.raw_os_error() {
                Some(errno) => ErrorCode::Os(errno),
                None => ErrorCode::Io(e.kind()),
            },
            CanError::Device(e) => ErrorCode::Device(e.kind),
            CanError::Timeout => ErrorCode::Timeout,
            CanError::BufferOverflow => ErrorCode::BufferOverflow,
            CanError::BusOff => ErrorCode::BusOff,
            CanError::NotStarted => ErrorCode::NotOpen,
            CanError::Aborted => ErrorCode::Aborted,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Success => f.write_str("success"),
            ErrorCode::Aborted => f.write_str("operation aborted"),
            ErrorCode::NotOpen => f.write_str("device not open"),
            ErrorCode::Timeout => f.write_str("timeout"),
            ErrorCode::BusOff => f.write_str("bus off"),
            ErrorCode::BufferOverflow => f.write_str("buffer overflow"),
            ErrorCode::Os(errno) => write!(f, "{}", std::io::Error::from_raw_os_error(*errno)),
            ErrorCode::Io(kind) => write!(f, "io error: {}", kind),
            ErrorCode::Device(kind) => write!(f, "device error: {:?}", kind),
            ErrorCode::HandlerPanicked => f.write_str("handler panicked"),
        }
    }
}

/// 驱动状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct State {
    pub driver_state: DriverState,
    pub error_code: ErrorCode,
    /// 设备报告的错误位（SocketCAN 错误帧的 error class）
    pub internal_error: u32,
}

impl State {
    pub fn is_ready(&self) -> bool {
        self.driver_state == DriverState::Ready
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (error: {}, internal: 0x{:08X})",
            self.driver_state, self.error_code, self.internal_error
        )
    }
}

/// 线程安全的驱动状态机
pub struct StateMachine {
    state: Mutex<State>,
    listeners: SimpleDispatcher<State>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            listeners: SimpleDispatcher::new(),
        }
    }

    /// 当前状态的一致快照
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn set_error_code(&self, error_code: ErrorCode) {
        self.update(|state| state.error_code = error_code);
    }

    pub fn set_internal_error(&self, internal_error: u32) {
        self.update(|state| state.internal_error = internal_error);
    }

    pub fn set_driver_state(&self, driver_state: DriverState) {
        self.update(|state| state.driver_state = driver_state);
    }

    /// 无条件发布当前状态
    pub fn dispatch_current(&self) {
        let state = self.state.lock();
        self.listeners.dispatch(&state);
    }

    pub fn create_listener(&self, delegate: Delegate<State>) -> Listener {
        self.listeners.create_listener(delegate)
    }

    fn update(&self, apply: impl FnOnce(&mut State)) {
        let mut state = self.state.lock();
        let previous = *state;
        apply(&mut state);
        if *state != previous {
            if state.driver_state != previous.driver_state {
                tracing::info!(
                    "Driver state: {} -> {}",
                    previous.driver_state,
                    state.driver_state
                );
            }
            self.listeners.dispatch(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canio_can::CanDeviceError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording(machine: &StateMachine) -> (Arc<Mutex<Vec<State>>>, Listener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let listener = machine.create_listener(Arc::new(move |s: &State| {
            seen_clone.lock().push(*s);
        }));
        (seen, listener)
    }

    #[test]
    fn test_default_state() {
        let state = State::default();
        assert_eq!(state.driver_state, DriverState::Closed);
        assert!(state.error_code.is_success());
        assert_eq!(state.internal_error, 0);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_identical_write_notifies_once() {
        let machine = StateMachine::new();
        let (seen, _listener) = recording(&machine);

        machine.set_driver_state(DriverState::Open);
        machine.set_driver_state(DriverState::Open);
        machine.set_error_code(ErrorCode::Success);
        machine.set_internal_error(0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].driver_state, DriverState::Open);
    }

    #[test]
    fn test_notification_carries_full_state() {
        let machine = StateMachine::new();
        machine.set_driver_state(DriverState::Ready);
        let (seen, _listener) = recording(&machine);

        machine.set_internal_error(0x40);

        let seen = seen.lock();
        assert_eq!(
            seen[0],
            State {
                driver_state: DriverState::Ready,
                error_code: ErrorCode::Success,
                internal_error: 0x40,
            }
        );
    }

    #[test]
    fn test_dispatch_current_is_unconditional() {
        let machine = StateMachine::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let _listener = machine.create_listener(Arc::new(move |_: &State| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        machine.dispatch_current();
        machine.dispatch_current();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notifications_are_ordered() {
        let machine = StateMachine::new();
        let (seen, _listener) = recording(&machine);

        machine.set_driver_state(DriverState::Open);
        machine.set_driver_state(DriverState::Ready);
        machine.set_error_code(ErrorCode::Timeout);
        machine.set_driver_state(DriverState::Open);

        let states: Vec<DriverState> = seen.lock().iter().map(|s| s.driver_state).collect();
        assert_eq!(
            states,
            vec![
                DriverState::Open,
                DriverState::Ready,
                DriverState::Ready,
                DriverState::Open
            ]
        );
    }

    #[test]
    fn test_error_code_from_can_error() {
        assert_eq!(ErrorCode::from(&CanError::Aborted), ErrorCode::Aborted);
        assert_eq!(ErrorCode::from(&CanError::NotStarted), ErrorCode::NotOpen);
        assert_eq!(ErrorCode::from(&CanError::BusOff), ErrorCode::BusOff);

        // ENODEV
        let os = CanError::Io(std::io::Error::from_raw_os_error(19));
        assert_eq!(ErrorCode::from(&os), ErrorCode::Os(19));

        let plain = CanError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert_eq!(
            ErrorCode::from(&plain),
            ErrorCode::Io(std::io::ErrorKind::Other)
        );

        let device = CanError::Device(CanDeviceError::new(CanDeviceErrorKind::Busy, "busy"));
        assert_eq!(
            ErrorCode::from(&device),
            ErrorCode::Device(CanDeviceErrorKind::Busy)
        );
    }

    #[test]
    fn test_display() {
        let state = State {
            driver_state: DriverState::Open,
            error_code: ErrorCode::BusOff,
            internal_error: 0x40,
        };
        assert_eq!(state.to_string(), "open (error: bus off, internal: 0x00000040)");
    }
}
