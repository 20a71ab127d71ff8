use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::tag::Tag;

pub const DEFAULT_POOL_CAPACITY: usize = 5;

/// Bounded cache of idle classic handlers for one tag signature.
///
/// `acquire` hands out an idle handler or builds a new one; `reuse` puts a
/// handler back, releasing and dropping it when the pool is already full.
/// There is no eviction of idle handlers.
pub struct TagHandlerPool {
    capacity: usize,
    idle: Mutex<Vec<Arc<dyn Tag>>>,
}

impl TagHandlerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn acquire<T: Tag + Default>(&self) -> Arc<T> {
        loop {
            let Some(handler) = self.idle.lock().pop() else {
                return Arc::new(T::default());
            };
            if !(*handler).as_any().is::<T>() {
                trace!(
                    wanted = std::any::type_name::<T>(),
                    "releasing pooled handler of another type"
                );
                handler.release();
                continue;
            }
            if let Ok(handler) = handler.into_any().downcast::<T>() {
                return handler;
            }
        }
    }

    pub fn reuse<T: Tag>(&self, handler: Arc<T>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(handler);
            return;
        }
        drop(idle);
        debug!(capacity = self.capacity, "tag pool saturated, discarding handler");
        handler.release();
    }

    /// Releases and drops every idle handler.
    pub fn release_all(&self) {
        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        for handler in drained {
            handler.release();
        }
    }
}

/// Process-wide pools keyed by handler type and structural tag signature.
/// Units that bind the same signature to different handlers never share a
/// pool.
#[derive(Default)]
pub struct TagPoolRegistry {
    pools: DashMap<(TypeId, String), Arc<TagHandlerPool>>,
}

impl TagPoolRegistry {
    pub fn global() -> &'static TagPoolRegistry {
        static REGISTRY: OnceLock<TagPoolRegistry> = OnceLock::new();
        REGISTRY.get_or_init(TagPoolRegistry::default)
    }

    /// Pool of `T` handlers for `signature`; the capacity of the first
    /// request wins.
    pub fn pool<T: Tag>(&self, signature: &str, capacity: usize) -> Arc<TagHandlerPool> {
        self.pools
            .entry((TypeId::of::<T>(), signature.to_string()))
            .or_insert_with(|| Arc::new(TagHandlerPool::new(capacity)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn release_all(&self) {
        for entry in self.pools.iter() {
            entry.value().release_all();
        }
    }
}
