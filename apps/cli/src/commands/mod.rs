//! 命令定义和实现

pub mod dump;
pub mod send;
pub mod state;

pub use dump::DumpCommand;
pub use send::SendCommand;
pub use state::StateCommand;

use anyhow::Result;
use canio_driver::DriverInterface;
use clap::Args;
use std::time::Duration;

/// 所有命令共用的连接参数
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// CAN 接口（例如 can0、vcan0）
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    /// 接收本机发送的帧
    #[arg(long)]
    pub loopback: bool,

    /// 等待驱动就绪的超时（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub ready_timeout_ms: u64,
}

/// 打开 SocketCAN 接口并返回已就绪的驱动
#[cfg(target_os = "linux")]
pub fn connect(args: &ConnectionArgs) -> Result<Box<dyn DriverInterface>> {
    use anyhow::Context;
    use canio_driver::DriverBuilder;

    let driver = DriverBuilder::new()
        .interface(args.interface.as_str())
        .loopback(args.loopback)
        .ready_timeout(Duration::from_millis(args.ready_timeout_ms))
        .build()
        .with_context(|| format!("Failed to open CAN interface '{}'", args.interface))?;
    Ok(Box::new(driver))
}

#[cfg(not(target_os = "linux"))]
pub fn connect(args: &ConnectionArgs) -> Result<Box<dyn DriverInterface>> {
    let _ = Duration::from_millis(args.ready_timeout_ms);
    anyhow::bail!(
        "SocketCAN interface '{}' is only available on Linux",
        args.interface
    )
}

/// 解析十六进制 CAN ID（可带 0x 前缀）
pub fn parse_id(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid CAN id '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("0x123"), Ok(0x123));
        assert_eq!(parse_id("7FF"), Ok(0x7FF));
        assert_eq!(parse_id("0X18ff0001"), Ok(0x18FF_0001));
        assert!(parse_id("0xZZ").is_err());
        assert!(parse_id("").is_err());
    }
}
