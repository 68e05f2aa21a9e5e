//! 帧打印命令
//!
//! 按 candump 格式打印收到的帧，直到 Ctrl-C、收满 N 帧或驱动停止。

use super::{ConnectionArgs, connect, parse_id};
use anyhow::{Result, bail};
use canio_driver::{
    CommInterface, DriverInterface, Frame, FrameDelegate, Header, State, StateInterface,
};
use canio_protocol::STANDARD_ID_LIMIT;
use clap::Args;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 帧打印命令参数
#[derive(Args, Debug)]
pub struct DumpCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 只打印该 ID 的帧（十六进制，例如 0x123）
    #[arg(long, value_parser = parse_id)]
    pub id: Option<u32>,

    /// `--id` 是扩展帧 ID
    #[arg(long, requires = "id")]
    pub extended: bool,

    /// 收到 N 帧后退出
    #[arg(short = 'n', long)]
    pub count: Option<u64>,
}

enum Event {
    Interrupted,
    CountReached,
    Stopped(State),
}

impl DumpCommand {
    /// 过滤条件对应的帧头
    pub fn filter(&self) -> Result<Option<Header>> {
        match self.id {
            None => Ok(None),
            Some(id) if self.extended => Ok(Some(Header::extended(id))),
            Some(id) if id >= STANDARD_ID_LIMIT => {
                bail!("0x{:X} is not a standard id, pass --extended", id)
            },
            Some(id) => Ok(Some(Header::standard(id))),
        }
    }

    pub fn execute(&self) -> Result<()> {
        let filter = self.filter()?;
        let driver = connect(&self.connection)?;
        let (tx, rx) = unbounded();

        let interrupt_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = interrupt_tx.send(Event::Interrupted);
        })?;

        let received = Arc::new(AtomicU64::new(0));
        let counter = received.clone();
        let limit = self.count;
        let count_tx = tx.clone();
        let delegate: FrameDelegate = Arc::new(move |frame: &Frame| {
            println!("{}  {}", frame, frame.len);
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if limit == Some(n) {
                let _ = count_tx.send(Event::CountReached);
            }
        });
        let _frames = match filter {
            Some(header) => driver.create_msg_listener_for(header, delegate),
            None => driver.create_msg_listener(delegate),
        };
        let _states = driver.create_state_listener(Arc::new(move |state: &State| {
            if !state.is_ready() {
                let _ = tx.send(Event::Stopped(*state));
            }
        }));

        eprintln!(
            "Listening on {} (Ctrl-C to stop)...",
            self.connection.interface
        );
        match rx.recv()? {
            Event::Interrupted => eprintln!("Interrupted"),
            Event::CountReached => {},
            Event::Stopped(state) => eprintln!("Driver stopped: {}", state),
        }

        driver.shutdown();
        let state = driver.state();
        eprintln!("{} frames received", received.load(Ordering::Relaxed));
        eprintln!("Final state: {}", state);
        if state.internal_error != 0 {
            eprintln!("Device errors: {}", driver.translate_error(state.internal_error));
        }
        Ok(())
    }
}
