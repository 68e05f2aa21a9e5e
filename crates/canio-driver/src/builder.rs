//! Builder 模式实现
//!
//! 提供链式构造已初始化的 [`ThreadedDriver`] 的便捷方式。

use crate::async_driver::AsyncDriver;
use crate::error::DriverError;
use crate::interface::{DriverInterface, StateInterface};
use crate::metrics::DriverMetrics;
use crate::state::DriverState;
use crate::threaded::{ThreadedConfig, ThreadedDriver};
use crate::transport::SocketTransport;
use canio_can::CanSocket;
#[cfg(target_os = "linux")]
use canio_can::SocketCanSocket;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 驱动配置
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// CAN 接口名（如 "can0"、"vcan0"）
    pub interface: String,
    /// 本机发送的帧是否回环到接收端
    pub loopback: bool,
    /// 等待 Ready 的超时时间
    pub ready_timeout: Duration,
    /// SocketCAN 读操作检查 cancel 的间隔
    pub poll_interval: Duration,
    /// 工作线程名
    pub thread_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let threaded = ThreadedConfig::default();
        Self {
            interface: "can0".to_string(),
            loopback: false,
            ready_timeout: threaded.ready_timeout,
            poll_interval: Duration::from_millis(10),
            thread_name: threaded.thread_name,
        }
    }
}

/// 驱动 Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use canio_driver::DriverBuilder;
/// use std::time::Duration;
///
/// let driver = DriverBuilder::new()
///     .interface("vcan0")
///     .loopback(true)
///     .ready_timeout(Duration::from_millis(500))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct DriverBuilder {
    config: DriverConfig,
    metrics: Option<Arc<DriverMetrics>>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有配置开始
    pub fn from_config(config: DriverConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// 设置 CAN 接口（默认 "can0"）
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.config.interface = interface.into();
        self
    }

    pub fn loopback(mut self, loopback: bool) -> Self {
        self.config.loopback = loopback;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// 只影响 [`DriverBuilder::build`] 创建的 SocketCAN socket
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// 使用外部共享的指标实例
    pub fn metrics(mut self, metrics: Arc<DriverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 构造 SocketCAN 驱动并初始化
    #[cfg(target_os = "linux")]
    pub fn build(
        self,
    ) -> Result<ThreadedDriver<AsyncDriver<SocketTransport<SocketCanSocket>>>, DriverError> {
        let socket = SocketCanSocket::with_poll_interval(self.config.poll_interval);
        self.build_with_socket(socket)
    }

    /// 使用指定的 socket 构造驱动并初始化
    ///
    /// 返回的驱动已处于 `Ready` 状态。
    pub fn build_with_socket<S: CanSocket>(
        self,
        socket: S,
    ) -> Result<ThreadedDriver<AsyncDriver<SocketTransport<S>>>, DriverError> {
        let DriverBuilder { config, metrics } = self;

        let transport = SocketTransport::new(socket);
        let driver = match metrics {
            Some(metrics) => AsyncDriver::with_metrics(transport, metrics),
            None => AsyncDriver::new(transport),
        };
        let threaded = ThreadedDriver::with_config(
            driver,
            ThreadedConfig {
                ready_timeout: config.ready_timeout,
                thread_name: config.thread_name.clone(),
            },
        );

        if threaded.init(&config.interface, config.loopback) {
            info!("CAN driver ready on '{}'", config.interface);
            return Ok(threaded);
        }

        let state = threaded.state();
        error!("CAN driver failed to start on '{}': {}", config.interface, state);
        let err = if state.driver_state == DriverState::Closed {
            DriverError::InitFailed {
                device: config.interface,
            }
        } else if state.error_code.is_success() && !threaded.is_worker_running() {
            DriverError::ThreadSpawn(config.thread_name)
        } else {
            DriverError::Timeout
        };
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::CommInterface;
    use canio_can::{Frame, MockSocket};

    #[test]
    fn test_config_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.interface, "can0");
        assert!(!config.loopback);
        assert_eq!(config.ready_timeout, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_builder_chain() {
        let builder = DriverBuilder::new()
            .interface("vcan3")
            .loopback(true)
            .ready_timeout(Duration::from_millis(200))
            .thread_name("test-worker");

        let config = builder.config();
        assert_eq!(config.interface, "vcan3");
        assert!(config.loopback);
        assert_eq!(config.ready_timeout, Duration::from_millis(200));
        assert_eq!(config.thread_name, "test-worker");
    }

    #[test]
    fn test_build_with_mock_socket() {
        let socket = MockSocket::new();
        let metrics = Arc::new(DriverMetrics::new());
        let driver = DriverBuilder::new()
            .interface("vcan0")
            .metrics(metrics.clone())
            .build_with_socket(socket.clone())
            .unwrap();

        assert!(driver.state().is_ready());
        assert!(driver.send(&Frame::new_standard(0x123, &[1])));
        assert_eq!(metrics.snapshot().tx_frames, 1);
        assert_eq!(socket.device().as_deref(), Some("vcan0"));

        driver.shutdown();
        assert_eq!(driver.state().driver_state, DriverState::Closed);
    }

    #[test]
    fn test_build_with_absent_device() {
        let result = DriverBuilder::new()
            .interface("vcan9")
            .build_with_socket(MockSocket::absent());

        match result {
            Err(DriverError::InitFailed { device }) => assert_eq!(device, "vcan9"),
            Err(other) => panic!("Expected InitFailed, got {:?}", other),
            Ok(_) => panic!("Expected InitFailed, got a driver"),
        }
    }
}
