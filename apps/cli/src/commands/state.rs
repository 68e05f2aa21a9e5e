//! 驱动状态查询命令

use super::{ConnectionArgs, connect};
use anyhow::Result;
use canio_driver::{DriverInterface, StateInterface};
use clap::Args;

/// 状态查询命令参数
#[derive(Args, Debug)]
pub struct StateCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl StateCommand {
    pub fn execute(&self) -> Result<()> {
        let driver = connect(&self.connection)?;

        let state = driver.state();
        println!("Interface:   {}", self.connection.interface);
        println!("State:       {}", state.driver_state);
        println!("Error code:  {}", state.error_code);
        println!(
            "Device:      {}",
            driver.translate_error(state.internal_error)
        );

        driver.shutdown();
        Ok(())
    }
}
