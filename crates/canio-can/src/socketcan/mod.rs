//! SocketCAN socket 实现
//!
//! 基于 Linux SocketCAN 子系统的 [`CanSocket`] 实现。
//!
//! ## 特性
//!
//! - 支持标准帧、扩展帧和远程帧
//! - 接收所有错误帧（`CAN_RAW_ERR_FILTER`），交由驱动层记录为 `internal_error`
//! - `loopback` 控制本 socket 是否接收自己发送的帧（`CAN_RAW_RECV_OWN_MSGS`）
//! - 读操作通过 `poll` 分段等待，`cancel()` 在一个轮询周期内生效
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **接口配置**：波特率等配置由系统工具（`ip link`）完成，不在应用层设置

use crate::{CanDeviceError, CanDeviceErrorKind, CanError, CanSocket, Frame, Header};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use parking_lot::RwLock;
use socketcan::{
    CanFrame, CanSocket as RawCanSocket, EmbeddedFrame, ExtendedId, Frame as _, Socket,
    StandardId,
};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{trace, warn};

mod interface_check;

pub use interface_check::check_interface_status;

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct OpenSocket {
    socket: RawCanSocket,
    interface: String,
}

/// SocketCAN socket
///
/// # 示例
///
/// ```no_run
/// use canio_can::{CanSocket, Frame, SocketCanSocket};
///
/// let socket = SocketCanSocket::new();
/// socket.open("can0", false).unwrap();
/// socket.write_frame(&Frame::new_standard(0x123, &[1, 2, 3, 4])).unwrap();
/// let frame = socket.read_frame().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanSocket {
    socket: RwLock<Option<OpenSocket>>,
    cancelled: AtomicBool,
    poll_interval: Duration,
}

impl Default for SocketCanSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketCanSocket {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// 指定读操作的轮询间隔（决定 `cancel()` 的最大响应延迟）
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            socket: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// 当前打开的接口名称
    pub fn interface(&self) -> Option<String> {
        self.socket.read().as_ref().map(|open| open.interface.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

fn set_raw_option(socket: &RawCanSocket, option: libc::c_int, value: u32) -> std::io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_CAN_RAW,
            option,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<u32>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// socketcan::CanFrame -> Frame
fn from_can_frame(can_frame: &CanFrame) -> Frame {
    if can_frame.is_error_frame() {
        return Frame::new_error(can_frame.raw_id(), can_frame.data());
    }

    let header = Header {
        id: can_frame.raw_id(),
        is_extended: can_frame.is_extended(),
        ..Header::default()
    };
    if can_frame.is_remote_frame() {
        Frame::new_remote(header, can_frame.dlc() as u8)
    } else {
        Frame::with_header(header, can_frame.data())
    }
}

/// Frame -> socketcan::CanFrame
fn to_can_frame(frame: &Frame) -> Result<CanFrame, CanError> {
    let invalid = |what: &str| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::InvalidFrame,
            format!("Failed to create {} frame with ID 0x{:X}", what, frame.id),
        ))
    };

    if frame.is_error || !frame.is_valid() {
        return Err(invalid("transmittable"));
    }

    let len = frame.len as usize;
    if frame.is_extended {
        let id = ExtendedId::new(frame.id).ok_or_else(|| invalid("extended"))?;
        if frame.is_rtr {
            CanFrame::new_remote(id, len).ok_or_else(|| invalid("extended remote"))
        } else {
            CanFrame::new(id, frame.data_slice()).ok_or_else(|| invalid("extended"))
        }
    } else {
        let id = StandardId::new(frame.id as u16).ok_or_else(|| invalid("standard"))?;
        if frame.is_rtr {
            CanFrame::new_remote(id, len).ok_or_else(|| invalid("standard remote"))
        } else {
            CanFrame::new(id, frame.data_slice()).ok_or_else(|| invalid("standard"))
        }
    }
}

impl CanSocket for SocketCanSocket {
    fn open(&self, device: &str, loopback: bool) -> Result<(), CanError> {
        // 1. 检查接口状态（仅检查，不自动配置）
        if !check_interface_status(device)? {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::UnsupportedConfig,
                format!(
                    "CAN interface '{}' exists but is not UP. Please start it first:\n  sudo ip link set up {}",
                    device, device
                ),
            )));
        }

        // 2. 关闭旧 socket（如果有）
        self.close();

        // 3. 打开 SocketCAN 接口
        let socket = RawCanSocket::open(device).map_err(|e| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::Backend,
                format!("Failed to open CAN interface '{}': {}", device, e),
            ))
        })?;

        if let Err(e) = set_raw_option(&socket, libc::CAN_RAW_RECV_OWN_MSGS, loopback as u32) {
            // 不阻塞初始化（某些系统可能不支持此选项）
            warn!(
                "Failed to set CAN_RAW_RECV_OWN_MSGS={} on '{}': {}",
                loopback, device, e
            );
        }

        if let Err(e) = set_raw_option(&socket, libc::CAN_RAW_ERR_FILTER, libc::CAN_ERR_MASK) {
            warn!("Failed to enable error frames on '{}': {}", device, e);
        }

        socket.set_read_timeout(self.poll_interval).map_err(CanError::Io)?;

        *self.socket.write() = Some(OpenSocket {
            socket,
            interface: device.to_string(),
        });
        self.cancelled.store(false, Ordering::Release);

        trace!(
            "SocketCAN interface '{}' opened (loopback={})",
            device, loopback
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.read().is_some()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn close(&self) {
        if let Some(open) = self.socket.write().take() {
            trace!("SocketCAN interface '{}' closed", open.interface);
        }
    }

    fn read_frame(&self) -> Result<Frame, CanError> {
        let timeout_ms = self.poll_interval.as_millis().min(u16::MAX as u128) as u16;

        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(CanError::Aborted);
            }

            // 每个轮询周期重新获取读锁，close() 最多等待一个周期
            let guard = self.socket.read();
            let open = guard.as_ref().ok_or(CanError::NotStarted)?;

            let fd = open.socket.as_raw_fd();
            let pollfd = PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN);
            match poll(&mut [pollfd], PollTimeout::from(timeout_ms)) {
                Ok(0) => continue,
                Ok(_) => {},
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    return Err(CanError::Io(std::io::Error::other(format!(
                        "poll failed: {}",
                        e
                    ))));
                },
            }

            match open.socket.read_frame() {
                Ok(can_frame) => {
                    let frame = from_can_frame(&can_frame);
                    trace!("Received CAN frame: {}", frame);
                    return Ok(frame);
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                },
                Err(e) => return Err(CanError::Io(e)),
            }
        }
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), CanError> {
        let can_frame = to_can_frame(frame)?;

        let guard = self.socket.read();
        let open = guard.as_ref().ok_or(CanError::NotStarted)?;
        open.socket.write_frame(&can_frame).map_err(|e| {
            if e.raw_os_error() == Some(libc::ENOBUFS) {
                CanError::BufferOverflow
            } else {
                CanError::Io(e)
            }
        })?;

        trace!("Sent CAN frame: {}", frame);
        Ok(())
    }
}
