//! Notification bus and target-removal subscriptions.
//!
//! Both registries hand out explicit handles at registration time; dropping a
//! registration is always done through its handle.

use bevy_ecs::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Fire-and-forget notifications emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    EntityCountChanged { count: usize },
    CollisionGridChanged,
    EntityMoved { entity: Entity },
    EntityStopped { entity: Entity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn FnMut(&Notification) + Send + Sync>;

/// Maximum notifications retained for polling consumers.
const LOG_CAPACITY: usize = 1024;

/// Local notification bus.
///
/// Listeners are invoked synchronously on emit. Every notification is also
/// kept in a bounded log that polling consumers read with [`drain`](Self::drain).
#[derive(Resource, Default)]
pub struct Notifications {
    next_id: u64,
    listeners: Vec<(ListenerHandle, Listener)>,
    log: VecDeque<Notification>,
}

impl fmt::Debug for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifications")
            .field("listeners", &self.listeners.len())
            .field("log", &self.log)
            .finish()
    }
}

impl Notifications {
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: FnMut(&Notification) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let handle = ListenerHandle(self.next_id);
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// Returns false if the handle was not registered.
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(h, _)| *h != handle);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, notification: Notification) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&notification);
        }
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(notification);
    }

    /// Take every logged notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.log.drain(..).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Notification> {
        self.log.iter()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Registration of one entity's interest in another entity's removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    target: Entity,
}

impl SubscriptionHandle {
    pub fn target(&self) -> Entity {
        self.target
    }
}

/// Target-removal subscriptions keyed by the watched entity.
#[derive(Resource, Debug, Default)]
pub struct RemovalSubscriptions {
    next_id: u64,
    by_target: HashMap<Entity, Vec<(SubscriptionHandle, Entity)>>,
    delivered: u64,
}

impl RemovalSubscriptions {
    /// `subscriber` is notified when `target` is removed.
    pub fn subscribe(&mut self, target: Entity, subscriber: Entity) -> SubscriptionHandle {
        self.next_id += 1;
        let handle = SubscriptionHandle {
            id: self.next_id,
            target,
        };
        self.by_target
            .entry(target)
            .or_default()
            .push((handle, subscriber));
        handle
    }

    /// Returns false if the handle was already gone.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let Some(list) = self.by_target.get_mut(&handle.target) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != handle);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_target.remove(&handle.target);
        }
        removed
    }

    /// Remove and return every subscription on `target`, in registration order.
    pub fn take_for(&mut self, target: Entity) -> Vec<(SubscriptionHandle, Entity)> {
        self.by_target.remove(&target).unwrap_or_default()
    }

    pub fn count_for(&self, target: Entity) -> usize {
        self.by_target.get(&target).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    pub fn is_registered(&self, handle: SubscriptionHandle) -> bool {
        self.by_target
            .get(&handle.target)
            .is_some_and(|list| list.iter().any(|(h, _)| *h == handle))
    }

    pub(crate) fn record_delivery(&mut self) {
        self.delivered += 1;
    }

    /// Removal callbacks delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn clear(&mut self) {
        self.by_target.clear();
    }
}
