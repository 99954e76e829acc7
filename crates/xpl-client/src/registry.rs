//! Subscription registry
//!
//! The registry owns every live subscription: the name→index map used when
//! building requests, the index→subscription map used to demultiplex
//! inbound updates, and the monotonic index allocator. Indices start at 0
//! and are never handed out twice, so a late update for a retired index can
//! only miss — it can never reach the wrong callback.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::ClientError;

/// Callback invoked with each new value of a subscribed dataref
pub type UpdateCallback = Box<dyn FnMut(f32) + Send>;

/// One live subscription
pub struct Subscription {
    name: String,
    index: u32,
    frequency: i32,
    callback: UpdateCallback,
}

impl Subscription {
    /// Dataref name this subscription streams
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index the simulator echoes back in update records
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Requested updates per second
    pub fn frequency(&self) -> i32 {
        self.frequency
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("frequency", &self.frequency)
            .field("callback", &"<callback>")
            .finish()
    }
}

/// Bidirectional name↔index map plus dispatch table
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_name: HashMap<String, u32>,
    by_index: HashMap<u32, Subscription>,
    next_index: u32,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and return its assigned index
    ///
    /// Re-registering a live name retires the old entry: the previous index
    /// stops dispatching and a fresh index is assigned. At most one live
    /// subscription exists per name.
    pub fn register(&mut self, name: &str, frequency: i32, callback: UpdateCallback) -> u32 {
        let index = self.next_index;
        self.next_index += 1;

        if let Some(old) = self.by_name.insert(name.to_owned(), index) {
            self.by_index.remove(&old);
            debug!(name, old_index = old, new_index = index, "replacing live subscription");
        }

        self.by_index.insert(
            index,
            Subscription {
                name: name.to_owned(),
                index,
                frequency,
                callback,
            },
        );

        index
    }

    /// Invoke the callback registered for `index` with a new value
    pub fn dispatch(&mut self, index: u32, value: f32) -> Result<(), ClientError> {
        let subscription = self
            .by_index
            .get_mut(&index)
            .ok_or(ClientError::UnknownIndex(index))?;
        (subscription.callback)(value);
        Ok(())
    }

    /// Remove a subscription by dataref name, returning the retired entry
    pub fn remove_by_name(&mut self, name: &str) -> Result<Subscription, ClientError> {
        let index = self
            .by_name
            .remove(name)
            .ok_or_else(|| ClientError::NotSubscribed(name.to_owned()))?;
        // both maps are kept in lockstep, so the entry must exist
        self.by_index
            .remove(&index)
            .ok_or_else(|| ClientError::NotSubscribed(name.to_owned()))
    }

    /// Remove a subscription by index, returning the retired entry
    pub fn remove_by_index(&mut self, index: u32) -> Result<Subscription, ClientError> {
        let subscription = self
            .by_index
            .remove(&index)
            .ok_or_else(|| ClientError::NotSubscribed(format!("index {index}")))?;
        self.by_name.remove(subscription.name());
        Ok(subscription)
    }

    /// Index currently assigned to `name`, if live
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Whether `name` has a live subscription
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Remove and return every live subscription (session teardown)
    pub fn drain(&mut self) -> Vec<Subscription> {
        self.by_name.clear();
        self.by_index.drain().map(|(_, sub)| sub).collect()
    }
}
