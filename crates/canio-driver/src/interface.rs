//! 驱动对外接口
//!
//! 观察者通过这些 trait 订阅状态和帧，而不需要知道具体的驱动类型。
//! [`AsyncDriver`](crate::AsyncDriver) 与 [`ThreadedDriver`](crate::ThreadedDriver)
//! 都实现了全部三个 trait。

use crate::dispatcher::{Delegate, Listener};
use crate::state::State;
use canio_protocol::{Frame, Header};

/// 帧回调
pub type FrameDelegate = Delegate<Frame>;

/// 状态回调
pub type StateDelegate = Delegate<State>;

/// 可观察的驱动状态
pub trait StateInterface {
    fn state(&self) -> State;

    /// 每次状态真正改变时回调（以及 `run()` 结束时的一次无条件发布）
    fn create_state_listener(&self, delegate: StateDelegate) -> Listener;
}

/// 帧收发
pub trait CommInterface {
    /// 只有 `Ready` 状态下才会交给传输层；返回是否成功入队
    fn send(&self, frame: &Frame) -> bool;

    fn create_msg_listener(&self, delegate: FrameDelegate) -> Listener;

    /// 只接收 `header.key()` 相同的帧
    fn create_msg_listener_for(&self, header: Header, delegate: FrameDelegate) -> Listener;
}

/// 完整的驱动生命周期
pub trait DriverInterface: StateInterface + CommInterface + Send + Sync + 'static {
    /// 打开设备
    fn init(&self, device: &str, loopback: bool) -> bool;

    /// 阻塞运行读循环，直到 `shutdown()` 或发生 I/O 错误
    fn run(&self);

    /// 幂等；可以从任意线程（包括回调内部）调用
    fn shutdown(&self);

    /// 未就绪时用上一次 `init()` 的参数重新初始化，返回是否就绪
    fn recover(&self) -> bool;

    /// 把 `State::internal_error` 翻译为可读文本
    fn translate_error(&self, internal_error: u32) -> String;
}
