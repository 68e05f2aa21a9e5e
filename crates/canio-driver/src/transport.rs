//! 传输层契约
//!
//! [`AsyncDriver`](crate::AsyncDriver) 只通过 [`Transport`] 访问设备。
//! `trigger_read_some()` 每次只挂起一个读操作，完成时恰好调用一次回调。

use crate::engine::Engine;
use canio_can::{CanError, CanSocket};
use canio_protocol::Frame;
use std::sync::Arc;
use tracing::warn;

/// 读完成回调
pub type ReadHandler = Box<dyn FnOnce(Result<Frame, CanError>) + Send>;

/// 设备传输层
pub trait Transport: Send + Sync + 'static {
    fn init(&self, device: &str, loopback: bool) -> Result<(), CanError>;

    fn is_open(&self) -> bool;

    /// 中止进行中的读操作（之后的完成回调收到 `CanError::Aborted`）
    fn cancel(&self);

    fn close(&self);

    /// 挂起一个读操作，完成回调在 `engine` 的某个执行线程上调用
    fn trigger_read_some(&self, engine: &Engine, handler: ReadHandler);

    /// 发送一帧，返回是否成功入队
    fn enqueue(&self, frame: &Frame) -> bool;
}

/// 基于阻塞 [`CanSocket`] 的传输层
///
/// 每次 `trigger_read_some()` 在引擎上投递一个阻塞的 `read_frame()` 任务，
/// 该任务占用一个执行线程直到读完成，并在同一线程上调用完成回调。
pub struct SocketTransport<S> {
    socket: Arc<S>,
}

impl<S: CanSocket> SocketTransport<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket: Arc::new(socket),
        }
    }

    /// 与其他持有者共享同一个 socket
    pub fn from_arc(socket: Arc<S>) -> Self {
        Self { socket }
    }

    pub fn socket(&self) -> &Arc<S> {
        &self.socket
    }
}

impl<S: CanSocket> Transport for SocketTransport<S> {
    fn init(&self, device: &str, loopback: bool) -> Result<(), CanError> {
        self.socket.open(device, loopback)
    }

    fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    fn cancel(&self) {
        self.socket.cancel();
    }

    fn close(&self) {
        self.socket.close();
    }

    fn trigger_read_some(&self, engine: &Engine, handler: ReadHandler) {
        let socket = self.socket.clone();
        engine.post(move || handler(socket.read_frame()));
    }

    fn enqueue(&self, frame: &Frame) -> bool {
        match self.socket.write_frame(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write frame 0x{:X}: {}", frame.id, e);
                false
            },
        }
    }
}
