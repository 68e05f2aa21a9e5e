//! CAN 接口状态检查
//!
//! 通过 `if_nametoindex()` 与 `ioctl(SIOCGIFFLAGS)` 检查接口是否存在以及是否为 UP 状态。
//! 只读操作，不需要 root 或 CAP_NET_ADMIN 权限。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SOCK_DGRAM, if_nametoindex, ifreq};
use std::ffi::CString;
use std::io;
use tracing::trace;

/// ifr_name 为 IFNAMSIZ = 16 字节（含结尾 NUL）
const MAX_IFACE_NAME_LEN: usize = libc::IFNAMSIZ - 1;

fn invalid_name(message: String) -> CanError {
    CanError::Device(CanDeviceError::new(CanDeviceErrorKind::NotFound, message))
}

/// ioctl 用的临时 socket，Drop 时关闭
struct FdGuard(libc::c_int);

impl Drop for FdGuard {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

/// 检查 CAN 接口是否存在且已启动
///
/// # 返回值
/// - `Ok(true)`: 接口存在且 IFF_UP
/// - `Ok(false)`: 接口存在但处于 DOWN 状态
/// - `Err(CanError::Device)`: 接口名无效或接口不存在（kind 为 `NotFound`）
/// - `Err(CanError::Io)`: socket/ioctl 调用失败
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    if interface.is_empty() || interface.len() > MAX_IFACE_NAME_LEN {
        return Err(invalid_name(format!(
            "Interface name '{}' must be 1..={} characters",
            interface, MAX_IFACE_NAME_LEN
        )));
    }

    let c_iface = CString::new(interface)
        .map_err(|e| invalid_name(format!("Invalid interface name: {}", e)))?;

    let ifindex = unsafe { if_nametoindex(c_iface.as_ptr()) };
    if ifindex == 0 {
        return Err(invalid_name(format!(
            "CAN interface '{}' does not exist ({}). Please create it first:\n  sudo ip link add dev {} type can",
            interface,
            io::Error::last_os_error(),
            interface
        )));
    }

    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    let name = c_iface.as_bytes_with_nul();
    unsafe {
        std::ptr::copy_nonoverlapping(
            name.as_ptr(),
            ifr.ifr_name.as_mut_ptr() as *mut u8,
            name.len(),
        );
    }

    let sockfd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };
    if sockfd < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let _guard = FdGuard(sockfd);

    let result = unsafe { libc::ioctl(sockfd, SIOCGIFFLAGS, &mut ifr as *mut _ as *mut libc::c_void) };
    if result < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }

    // ifru_flags 是 ifr_ifru union 的第一个字段（c_short）
    let flags = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short) };
    let is_up = (flags as i32 & IFF_UP) != 0;

    trace!(
        "Interface '{}' status: {}",
        interface,
        if is_up { "UP" } else { "DOWN" }
    );
    Ok(is_up)
}
