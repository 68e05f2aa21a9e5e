//! 随机帧突发测试
//!
//! 向 MockSocket 注入一批随机帧，验证：
//! 1. 无过滤监听器按注入顺序收到全部帧
//! 2. 过滤监听器只收到 key 匹配的帧
//! 3. 接收计数与注入数量一致
//! 4. 慢监听器不会打乱后续帧的顺序

use canio_can::MockSocket;
use canio_driver::{
    AsyncDriver, CommInterface, DriverInterface, Frame, Header, SocketTransport, StateInterface,
    ThreadedDriver,
};
use crossbeam_channel::unbounded;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

const BURST: usize = 500;

fn random_frame(rng: &mut StdRng) -> Frame {
    let len = rng.gen_range(0..=8);
    let data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
    if rng.gen_bool(0.3) {
        Frame::new_extended(rng.gen_range(0..(1 << 29)), &data)
    } else {
        // 只用少量标准 ID，保证过滤监听器有命中
        Frame::new_standard(rng.gen_range(0x100..0x108), &data)
    }
}

#[test]
fn test_random_burst_is_fully_delivered() {
    let mut rng = StdRng::seed_from_u64(0x0CA1_0001);
    let frames: Vec<Frame> = (0..BURST).map(|_| random_frame(&mut rng)).collect();

    let socket = MockSocket::new();
    let driver = ThreadedDriver::new(AsyncDriver::new(SocketTransport::new(socket.clone())));

    let (all_tx, all_rx) = unbounded();
    let _all = driver.create_msg_listener(Arc::new(move |f: &Frame| {
        let _ = all_tx.send(*f);
    }));

    let watched = Header::standard(0x103);
    let (filtered_tx, filtered_rx) = unbounded();
    let _filtered = driver.create_msg_listener_for(
        watched,
        Arc::new(move |f: &Frame| {
            let _ = filtered_tx.send(*f);
        }),
    );

    assert!(driver.init("vcan0", false));
    for frame in &frames {
        socket.inject_frame(*frame);
    }

    let received: Vec<Frame> = (0..BURST)
        .map(|_| all_rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    driver.shutdown();

    assert_eq!(received, frames);

    let expected_filtered: Vec<Frame> = frames
        .iter()
        .filter(|f| f.key() == watched.key())
        .copied()
        .collect();
    assert_eq!(filtered_rx.try_iter().collect::<Vec<_>>(), expected_filtered);

    let snapshot = driver.driver().metrics().snapshot();
    assert_eq!(snapshot.rx_frames, BURST as u64);
    assert!(!driver.state().is_ready());
}

#[test]
fn test_slow_first_listener_keeps_burst_order() {
    let mut rng = StdRng::seed_from_u64(0x0CA1_0002);
    let first = Frame::new_standard(0x001, &[0xAA]);
    let rest: Vec<Frame> = (0..BURST).map(|_| random_frame(&mut rng)).collect();

    let socket = MockSocket::new();
    let driver = ThreadedDriver::new(AsyncDriver::new(SocketTransport::new(socket.clone())));

    let (tx, rx) = unbounded();
    let _listener = driver.create_msg_listener(Arc::new(move |f: &Frame| {
        // 第一帧处理得很慢，后续帧此时已在 socket 中排队
        if f.id == 0x001 && !f.is_extended {
            std::thread::sleep(Duration::from_millis(100));
        }
        let _ = tx.send(*f);
    }));

    assert!(driver.init("vcan0", false));
    socket.inject_frame(first);
    for frame in &rest {
        socket.inject_frame(*frame);
    }

    let received: Vec<Frame> = (0..=BURST)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    driver.shutdown();

    assert_eq!(received[0], first);
    assert_eq!(&received[1..], rest.as_slice());
}
