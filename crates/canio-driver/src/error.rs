//! 驱动层错误类型定义
//!
//! 驱动自身的操作（`init`/`run`/`send`/`shutdown`）通过 `State` 和布尔返回值报告失败，
//! 这里的错误只用于 [`DriverBuilder`](crate::DriverBuilder)。

use canio_can::CanError;
use thiserror::Error;

/// 驱动构造错误
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 层错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 设备打开失败（详细错误码见驱动状态）
    #[error("Failed to initialize CAN device '{device}'")]
    InitFailed { device: String },

    /// 设备已打开，但驱动未在超时时间内进入 Ready
    #[error("Operation timeout")]
    Timeout,

    /// 工作线程创建失败
    #[error("Failed to spawn driver thread: {0}")]
    ThreadSpawn(String),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use canio_can::CanError;

    #[test]
    fn test_driver_error_display() {
        let msg = DriverError::Can(CanError::BusOff).to_string();
        assert!(msg.contains("Bus off"), "Can error message: {}", msg);

        let msg = DriverError::InitFailed {
            device: "vcan9".to_string(),
        }
        .to_string();
        assert!(msg.contains("vcan9"), "InitFailed message: {}", msg);

        assert_eq!(DriverError::Timeout.to_string(), "Operation timeout");
    }

    #[test]
    fn test_driver_error_from_can_error() {
        let err: DriverError = CanError::NotStarted.into();
        assert!(matches!(err, DriverError::Can(CanError::NotStarted)));
    }
}
