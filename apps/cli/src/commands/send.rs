//! 帧发送命令

use super::{ConnectionArgs, connect};
use anyhow::{Result, bail};
use canio_driver::{CommInterface, DriverInterface, Frame, StateInterface};
use clap::Args;
use std::thread;
use std::time::Duration;

/// 帧发送命令参数
#[derive(Args, Debug)]
pub struct SendCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// candump 格式的帧，例如 123#DEADBEEF、12345678#00、123#R
    pub frame: Frame,

    /// 发送次数
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// 两次发送之间的间隔（毫秒）
    #[arg(long, default_value_t = 10)]
    pub interval_ms: u64,
}

impl SendCommand {
    pub fn execute(&self) -> Result<()> {
        if !self.frame.is_valid() {
            bail!("Frame {} has an out-of-range id", self.frame);
        }

        let driver = connect(&self.connection)?;
        for i in 0..self.count {
            if i > 0 {
                thread::sleep(Duration::from_millis(self.interval_ms));
            }
            if !driver.send(&self.frame) {
                let state = driver.state();
                driver.shutdown();
                bail!("Failed to send {} (state: {})", self.frame, state);
            }
        }
        println!("Sent {} x{}", self.frame, self.count);

        driver.shutdown();
        Ok(())
    }
}
