//! 状态等待器
//!
//! 订阅驱动的状态通知，阻塞调用线程直到观察到目标 [`DriverState`] 或超时。

use crate::dispatcher::Listener;
use crate::interface::StateInterface;
use crate::state::{DriverState, State};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Observed {
    state: State,
    notified: bool,
}

struct WaiterShared {
    observed: Mutex<Observed>,
    cond: Condvar,
}

/// 状态等待器
///
/// 构造时先订阅再读取当前状态：订阅与读取之间到达的通知优先于读取到的快照，
/// 因此不会丢失更新，也不会被旧值覆盖。Drop 时释放订阅。
///
/// # Example
///
/// ```no_run
/// use canio_driver::{DriverState, StateWaiter};
/// # use canio_driver::StateInterface;
/// # fn demo(driver: &impl StateInterface) {
/// use std::time::Duration;
///
/// if StateWaiter::wait_for(DriverState::Ready, driver, Duration::from_secs(1)) {
///     println!("driver ready");
/// }
/// # }
/// ```
pub struct StateWaiter {
    shared: Arc<WaiterShared>,
    _listener: Listener,
}

impl StateWaiter {
    pub fn new<I: StateInterface + ?Sized>(driver: &I) -> Self {
        let shared = Arc::new(WaiterShared {
            observed: Mutex::new(Observed {
                state: State::default(),
                notified: false,
            }),
            cond: Condvar::new(),
        });

        let notify = shared.clone();
        let listener = driver.create_state_listener(Arc::new(move |state: &State| {
            let mut observed = notify.observed.lock();
            observed.state = *state;
            observed.notified = true;
            drop(observed);
            notify.cond.notify_one();
        }));

        let current = driver.state();
        {
            let mut observed = shared.observed.lock();
            if !observed.notified {
                observed.state = current;
            }
        }

        Self {
            shared,
            _listener: listener,
        }
    }

    /// 阻塞直到观察到 `target` 或超时，返回是否观察到
    ///
    /// 目标状态已经成立时立即返回 true。
    pub fn wait(&self, target: DriverState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut observed = self.shared.observed.lock();
        while observed.state.driver_state != target {
            if self
                .shared
                .cond
                .wait_until(&mut observed, deadline)
                .timed_out()
            {
                return observed.state.driver_state == target;
            }
        }
        true
    }

    /// 最近一次观察到的状态
    pub fn latest(&self) -> State {
        self.shared.observed.lock().state
    }

    /// 创建临时等待器并等待
    pub fn wait_for<I: StateInterface + ?Sized>(
        target: DriverState,
        driver: &I,
        timeout: Duration,
    ) -> bool {
        Self::new(driver).wait(target, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Delegate;
    use crate::state::StateMachine;
    use std::thread;

    struct Machine(StateMachine);

    impl StateInterface for Machine {
        fn state(&self) -> State {
            self.0.state()
        }

        fn create_state_listener(&self, delegate: Delegate<State>) -> Listener {
            self.0.create_listener(delegate)
        }
    }

    #[test]
    fn test_target_already_holds() {
        let machine = Machine(StateMachine::new());
        machine.0.set_driver_state(DriverState::Open);

        let start = Instant::now();
        assert!(StateWaiter::wait_for(DriverState::Open, &machine, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_without_transition() {
        let machine = Machine(StateMachine::new());
        let waiter = StateWaiter::new(&machine);

        let start = Instant::now();
        assert!(!waiter.wait(DriverState::Ready, Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(waiter.latest().driver_state, DriverState::Closed);
    }

    #[test]
    fn test_wakes_on_transition() {
        let machine = Arc::new(Machine(StateMachine::new()));
        let waiter = StateWaiter::new(machine.as_ref());

        let setter = machine.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.0.set_driver_state(DriverState::Open);
            setter.0.set_driver_state(DriverState::Ready);
        });

        assert!(waiter.wait(DriverState::Ready, Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn test_drop_releases_subscription() {
        let machine = Machine(StateMachine::new());
        let waiter = StateWaiter::new(&machine);
        drop(waiter);

        // 没有剩余监听器，通知不会访问已释放的等待器
        machine.0.set_driver_state(DriverState::Open);
        assert_eq!(machine.state().driver_state, DriverState::Open);
    }
}
