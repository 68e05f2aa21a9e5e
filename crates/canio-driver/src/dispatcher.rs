//! 分发器（Dispatcher）
//!
//! 把一个值扇出给所有当前注册的回调。注册返回 [`Listener`] 句柄，
//! 句柄的最后一个副本被丢弃时自动注销回调。
//!
//! # 语义
//!
//! - `dispatch()` 在调用线程上同步执行所有回调，回调之间的顺序不确定
//! - 回调列表在分发开始时做快照，分发期间不持有注册表锁，
//!   因此回调内部可以安全地注册/注销监听器
//! - 已经开始的分发可能仍会调用并发注销的回调；注销完成后开始的分发不会再调用它
//!
//! # 示例
//!
//! ```rust
//! use canio_driver::dispatcher::SimpleDispatcher;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let dispatcher = SimpleDispatcher::<u32>::new();
//! let sum = Arc::new(AtomicU32::new(0));
//! let sum_clone = sum.clone();
//! let listener = dispatcher.create_listener(Arc::new(move |v: &u32| {
//!     sum_clone.fetch_add(*v, Ordering::Relaxed);
//! }));
//!
//! dispatcher.dispatch(&5);
//! drop(listener);
//! dispatcher.dispatch(&7);
//! assert_eq!(sum.load(Ordering::Relaxed), 5);
//! ```

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

/// 回调类型
pub type Delegate<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// 监听器句柄
///
/// 可以 `clone()`；最后一个副本被丢弃时注销回调。
#[derive(Clone)]
#[must_use = "dropping the listener immediately deregisters the callback"]
pub struct Listener {
    _guard: Arc<ListenerGuard>,
}

struct ListenerGuard {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Listener {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            _guard: Arc::new(ListenerGuard {
                release: Some(Box::new(release)),
            }),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("handles", &Arc::strong_count(&self._guard))
            .finish()
    }
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Delegate<T>)>,
}

/// 无过滤的分发器
pub struct SimpleDispatcher<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for SimpleDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T: 'static> Default for SimpleDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SimpleDispatcher<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// 注册回调
    pub fn create_listener(&self, delegate: Delegate<T>) -> Listener {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, delegate));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Listener::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// 同步分发给所有已注册的回调
    pub fn dispatch(&self, value: &T) {
        let delegates: SmallVec<[Delegate<T>; 8]> = self
            .registry
            .lock()
            .entries
            .iter()
            .map(|(_, delegate)| delegate.clone())
            .collect();

        for delegate in delegates {
            delegate(value);
        }
    }

    /// 当前注册的回调数量
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 按 key 过滤的分发器
///
/// 无过滤监听器接收所有值；过滤监听器只接收 key 相同的值。
pub struct FilteredDispatcher<K, T> {
    all: SimpleDispatcher<T>,
    filtered: Mutex<HashMap<K, SimpleDispatcher<T>>>,
}

impl<K: Eq + Hash, T: 'static> Default for FilteredDispatcher<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, T: 'static> FilteredDispatcher<K, T> {
    pub fn new() -> Self {
        Self {
            all: SimpleDispatcher::new(),
            filtered: Mutex::new(HashMap::new()),
        }
    }

    /// 注册接收所有值的回调
    pub fn create_listener(&self, delegate: Delegate<T>) -> Listener {
        self.all.create_listener(delegate)
    }

    /// 注册只接收 `key` 对应值的回调
    pub fn create_filtered_listener(&self, key: K, delegate: Delegate<T>) -> Listener {
        let mut filtered = self.filtered.lock();
        filtered.retain(|_, dispatcher| !dispatcher.is_empty());
        filtered.entry(key).or_default().create_listener(delegate)
    }

    pub fn dispatch(&self, key: &K, value: &T) {
        let keyed = self.filtered.lock().get(key).cloned();

        self.all.dispatch(value);
        if let Some(keyed) = keyed {
            keyed.dispatch(value);
        }
    }

    /// 所有回调数量（过滤 + 无过滤）
    pub fn len(&self) -> usize {
        let filtered: usize = self.filtered.lock().values().map(|d| d.len()).sum();
        self.all.len() + filtered
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Delegate<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let delegate: Delegate<u32> = Arc::new(move |_: &u32| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, delegate)
    }

    #[test]
    fn test_dispatch_reaches_all_listeners() {
        let dispatcher = SimpleDispatcher::new();
        let (a, da) = counter();
        let (b, db) = counter();
        let _la = dispatcher.create_listener(da);
        let _lb = dispatcher.create_listener(db);

        dispatcher.dispatch(&1);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_last_clone_deregisters() {
        let dispatcher = SimpleDispatcher::new();
        let (count, delegate) = counter();
        let listener = dispatcher.create_listener(delegate);
        let second = listener.clone();

        drop(listener);
        dispatcher.dispatch(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(second);
        dispatcher.dispatch(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_listener_outlives_dispatcher() {
        let dispatcher = SimpleDispatcher::new();
        let (_count, delegate) = counter();
        let listener = dispatcher.create_listener(delegate);
        drop(dispatcher);
        // 注册表已释放，注销时不应 panic
        drop(listener);
    }

    #[test]
    fn test_register_inside_callback() {
        let dispatcher = Arc::new(SimpleDispatcher::<u32>::new());
        let inner: Arc<Mutex<Vec<Listener>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatcher_clone = dispatcher.clone();
        let inner_clone = inner.clone();
        let _outer = dispatcher.create_listener(Arc::new(move |_: &u32| {
            let listener = dispatcher_clone.create_listener(Arc::new(|_: &u32| {}));
            inner_clone.lock().push(listener);
        }));

        dispatcher.dispatch(&0);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_filtered_dispatch() {
        let dispatcher = FilteredDispatcher::<u32, u32>::new();
        let (all, d_all) = counter();
        let (only_7, d_7) = counter();
        let _l_all = dispatcher.create_listener(d_all);
        let _l_7 = dispatcher.create_filtered_listener(7, d_7);

        dispatcher.dispatch(&7, &100);
        dispatcher.dispatch(&8, &100);
        dispatcher.dispatch(&7, &100);

        assert_eq!(all.load(Ordering::SeqCst), 3);
        assert_eq!(only_7.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_filtered_deregistration_prunes_keys() {
        let dispatcher = FilteredDispatcher::<u32, u32>::new();
        let (count, delegate) = counter();
        let listener = dispatcher.create_filtered_listener(1, delegate);
        drop(listener);

        dispatcher.dispatch(&1, &0);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let (_other, delegate) = counter();
        let _l = dispatcher.create_filtered_listener(2, delegate);
        assert_eq!(dispatcher.filtered.lock().len(), 1);
    }
}
