//! # canio CAN Socket Layer
//!
//! CAN 硬件抽象层，提供线程安全的阻塞式 socket 接口 [`CanSocket`]。
//!
//! 驱动层（`canio-driver`）在事件引擎上调度阻塞读，`cancel()` 负责唤醒正在进行的读操作，
//! 因此所有方法都只需要 `&self`，实现者自行保证内部同步。

use thiserror::Error;

pub use canio_protocol::{Frame, Header};

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanSocket;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockSocket;

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Device not started")]
    NotStarted,
    #[error("Operation aborted")]
    Aborted,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 设备不存在或无权限访问时重试没有意义
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 线程安全的阻塞式 CAN socket
///
/// # 契约
///
/// - `read_frame()` 阻塞直到收到一帧、发生错误或被 `cancel()`
/// - `cancel()` 之后（直到下一次 `open()`），进行中的和后续的读操作返回 [`CanError::Aborted`]
/// - `close()` 之后 `is_open()` 返回 false，读写返回 [`CanError::NotStarted`]
/// - `cancel()` 与进行中的 `read_frame()` 并发调用必须安全
pub trait CanSocket: Send + Sync + 'static {
    /// 打开设备（如果已打开，先关闭再重新打开）
    ///
    /// `loopback` 控制本机发送的帧是否回环到接收端。
    fn open(&self, device: &str, loopback: bool) -> Result<(), CanError>;

    fn is_open(&self) -> bool;

    /// 中止进行中的读操作
    fn cancel(&self);

    fn close(&self);

    /// 阻塞读取一帧（包括错误帧，`Frame::is_error` 为 true）
    fn read_frame(&self) -> Result<Frame, CanError>;

    /// 发送一帧（不阻塞等待总线确认）
    fn write_frame(&self, frame: &Frame) -> Result<(), CanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_error_display() {
        assert_eq!(CanError::Aborted.to_string(), "Operation aborted");
        assert_eq!(CanError::NotStarted.to_string(), "Device not started");

        let err = CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            "vcan9 missing",
        ));
        assert!(err.to_string().contains("NotFound"));
        assert!(err.to_string().contains("vcan9 missing"));
    }

    #[test]
    fn test_device_error_fatal() {
        assert!(CanDeviceError::new(CanDeviceErrorKind::NotFound, "").is_fatal());
        assert!(CanDeviceError::new(CanDeviceErrorKind::AccessDenied, "").is_fatal());
        assert!(!CanDeviceError::new(CanDeviceErrorKind::Busy, "").is_fatal());
        assert!(!CanDeviceError::from("plain message").is_fatal());
    }
}
