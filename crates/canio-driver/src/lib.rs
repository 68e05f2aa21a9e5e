//! # canio 驱动层
//!
//! 通用的事件驱动 CAN 驱动框架：
//! - [`AsyncDriver`]：事件引擎上的连续读循环，帧扇出给监听器
//! - [`StateMachine`]：线程安全的驱动状态（Closed → Open → Ready，以及错误码跟踪）
//! - [`StateWaiter`]：带超时地阻塞等待目标状态
//! - [`ThreadedDriver`]：在后台线程上运行读循环，`init()` 同步等待就绪
//!
//! # 使用场景
//!
//! 大多数用户直接使用 [`DriverBuilder`] 构造一个已就绪的 [`ThreadedDriver`]。
//! 自定义设备只需实现 [`Transport`]（或更底层的 [`canio_can::CanSocket`]）。

mod async_driver;
mod builder;
pub mod dispatcher;
pub mod engine;
mod error;
pub mod interface;
pub mod metrics;
pub mod state;
mod threaded;
pub mod transport;
mod waiter;

pub use async_driver::AsyncDriver;
pub use builder::{DriverBuilder, DriverConfig};
pub use dispatcher::{Delegate, FilteredDispatcher, Listener, SimpleDispatcher};
pub use engine::{Engine, EngineError, Work, in_engine_thread};
pub use error::DriverError;
pub use interface::{CommInterface, DriverInterface, FrameDelegate, StateDelegate, StateInterface};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use state::{DriverState, ErrorCode, State, StateMachine};
pub use threaded::{ThreadedConfig, ThreadedDriver};
pub use transport::{ReadHandler, SocketTransport, Transport};
pub use waiter::StateWaiter;

pub use canio_can::{CanError, CanSocket};
pub use canio_protocol::{Frame, Header};
