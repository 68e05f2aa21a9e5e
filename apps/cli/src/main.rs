//! # canio CLI
//!
//! SocketCAN 命令行工具，基于 `canio-driver` 的后台线程驱动。
//!
//! ```bash
//! # 打印总线上的帧，直到 Ctrl-C
//! canio dump -i can0
//!
//! # 只看 0x123，收到 10 帧后退出
//! canio dump -i can0 --id 0x123 --count 10
//!
//! # 发送一帧（candump 格式）
//! canio send -i can0 123#DEADBEEF
//!
//! # 查询驱动能否就绪
//! canio state -i vcan0
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{DumpCommand, SendCommand, StateCommand};

/// canio - SocketCAN 命令行工具
#[derive(Parser, Debug)]
#[command(name = "canio")]
#[command(about = "Dump and send CAN frames through the canio driver", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 打印接收到的帧
    Dump {
        #[command(flatten)]
        args: DumpCommand,
    },

    /// 发送帧
    Send {
        #[command(flatten)]
        args: SendCommand,
    },

    /// 打开设备并打印驱动状态
    State {
        #[command(flatten)]
        args: StateCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("canio=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump { args } => args.execute(),
        Commands::Send { args } => args.execute(),
        Commands::State { args } => args.execute(),
    }
}
