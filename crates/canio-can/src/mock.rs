//! Mock CAN socket（无硬件依赖）
//!
//! 用于驱动层测试：测试代码通过 [`MockSocket::inject_frame`] / [`MockSocket::inject_error`]
//! 模拟总线输入，通过 [`MockSocket::sent_frames`] 检查发送结果。
//! `MockSocket` 可以 `clone()`，所有副本共享同一个虚拟设备。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError, CanSocket, Frame};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::trace;

/// 读操作检查 cancel 标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct MockShared {
    open: AtomicBool,
    cancelled: AtomicBool,
    loopback: AtomicBool,
    device_present: AtomicBool,
    accept_writes: AtomicBool,
    open_count: AtomicUsize,
    device: Mutex<Option<String>>,
    sent: Mutex<Vec<Frame>>,
    input_tx: Sender<Result<Frame, CanError>>,
    input_rx: Receiver<Result<Frame, CanError>>,
}

/// 虚拟 CAN 设备
#[derive(Debug, Clone)]
pub struct MockSocket {
    shared: Arc<MockShared>,
}

impl Default for MockSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSocket {
    /// 创建一个存在的虚拟设备（写入默认成功）
    pub fn new() -> Self {
        let (input_tx, input_rx) = unbounded();
        Self {
            shared: Arc::new(MockShared {
                open: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                loopback: AtomicBool::new(false),
                device_present: AtomicBool::new(true),
                accept_writes: AtomicBool::new(true),
                open_count: AtomicUsize::new(0),
                device: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                input_tx,
                input_rx,
            }),
        }
    }

    /// 创建一个不存在的虚拟设备（`open()` 失败）
    pub fn absent() -> Self {
        let socket = Self::new();
        socket.set_device_present(false);
        socket
    }

    pub fn set_device_present(&self, present: bool) {
        self.shared.device_present.store(present, Ordering::Release);
    }

    /// 控制 `write_frame()` 是否成功（false 时返回 `BufferOverflow`）
    pub fn set_accept_writes(&self, accept: bool) {
        self.shared.accept_writes.store(accept, Ordering::Release);
    }

    /// 模拟总线上收到一帧
    pub fn inject_frame(&self, frame: Frame) {
        let _ = self.shared.input_tx.send(Ok(frame));
    }

    /// 模拟一次读错误
    pub fn inject_error(&self, error: CanError) {
        let _ = self.shared.input_tx.send(Err(error));
    }

    /// 已成功发送的帧（按发送顺序）
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.shared.sent.lock().clone()
    }

    /// 最近一次 `open()` 的设备名
    pub fn device(&self) -> Option<String> {
        self.shared.device.lock().clone()
    }

    pub fn loopback_enabled(&self) -> bool {
        self.shared.loopback.load(Ordering::Acquire)
    }

    /// 成功 `open()` 的次数
    pub fn open_count(&self) -> usize {
        self.shared.open_count.load(Ordering::Acquire)
    }
}

impl CanSocket for MockSocket {
    fn open(&self, device: &str, loopback: bool) -> Result<(), CanError> {
        if !self.shared.device_present.load(Ordering::Acquire) {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!("mock device '{}' is not present", device),
            )));
        }

        *self.shared.device.lock() = Some(device.to_string());
        self.shared.loopback.store(loopback, Ordering::Release);
        self.shared.cancelled.store(false, Ordering::Release);
        self.shared.open.store(true, Ordering::Release);
        self.shared.open_count.fetch_add(1, Ordering::AcqRel);
        trace!("Mock CAN device '{}' opened (loopback={})", device, loopback);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
    }

    fn read_frame(&self) -> Result<Frame, CanError> {
        loop {
            if self.shared.cancelled.load(Ordering::Acquire) {
                return Err(CanError::Aborted);
            }
            if !self.shared.open.load(Ordering::Acquire) {
                return Err(CanError::NotStarted);
            }

            match self.shared.input_rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                // shared 同时持有发送端，不会断开
                Err(RecvTimeoutError::Disconnected) => return Err(CanError::NotStarted),
            }
        }
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), CanError> {
        if !self.shared.open.load(Ordering::Acquire) {
            return Err(CanError::NotStarted);
        }
        if !self.shared.accept_writes.load(Ordering::Acquire) {
            return Err(CanError::BufferOverflow);
        }

        self.shared.sent.lock().push(*frame);
        if self.shared.loopback.load(Ordering::Acquire) {
            let _ = self.shared.input_tx.send(Ok(*frame));
        }
        Ok(())
    }
}
