use crate::memdb::encoded_key::EncodedKey;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A one-shot signal: closing the channel is the notification. Channels are
/// handed out by reads and closed by the commit that invalidates the read.
/// Cloning shares the underlying signal.
#[derive(Clone, Default)]
pub struct WatchChannel {
    inner: Arc<WatchInner>,
}

#[derive(Default)]
struct WatchInner {
    closed: AtomicBool,
    waiters: Mutex<Vec<Arc<Waiter>>>,
}

#[derive(Default)]
struct Waiter {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl WatchChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the channel and wake every subscribed waiter. Idempotent.
    pub fn close(&self) {
        let waiters = {
            let mut waiters = self.inner.waiters.lock();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *waiters)
        };
        for waiter in waiters {
            waiter.fire();
        }
    }

    fn subscribe(&self, waiter: &Arc<Waiter>) {
        let mut waiters = self.inner.waiters.lock();
        if self.inner.closed.load(Ordering::SeqCst) {
            drop(waiters);
            waiter.fire();
            return;
        }
        waiters.push(Arc::clone(waiter));
    }
}

impl std::fmt::Debug for WatchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Waiter {
    fn fire(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.cond.notify_all();
    }
}

/// Collects the watch channels seen during a read so the caller can block
/// until any of them signals or a deadline passes.
#[derive(Debug, Default)]
pub struct WatchSet {
    channels: Vec<WatchChannel>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: WatchChannel) {
        self.channels.push(channel);
    }

    pub fn add_all(&mut self, channels: impl IntoIterator<Item = WatchChannel>) {
        self.channels.extend(channels);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Block until any collected channel closes or the deadline passes.
    /// Returns true when a channel fired, false on deadline expiry. An empty
    /// set simply waits out the deadline.
    pub fn watch(&self, deadline: Instant) -> bool {
        let waiter = Arc::new(Waiter::default());
        for channel in &self.channels {
            channel.subscribe(&waiter);
            if channel.is_closed() {
                return true;
            }
        }
        let mut fired = waiter.fired.lock();
        while !*fired {
            if waiter.cond.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }
}

/// Shared (unversioned) registry of live watch channels per table: one
/// channel per watched `(index, key)` pair plus a table-wide channel handed
/// to iterators. Commits close the precise key channels they touched and
/// roll the table channel of every touched table.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    tables: Mutex<HashMap<&'static str, TableWatches>>,
}

#[derive(Default)]
struct TableWatches {
    table: WatchChannel,
    keys: HashMap<(&'static str, EncodedKey), WatchChannel>,
}

impl WatchRegistry {
    pub(crate) fn key_channel(
        &self,
        table: &'static str,
        index: &'static str,
        key: EncodedKey,
    ) -> WatchChannel {
        let mut tables = self.tables.lock();
        let watches = tables.entry(table).or_default();
        watches
            .keys
            .entry((index, key))
            .or_insert_with(WatchChannel::new)
            .clone()
    }

    pub(crate) fn table_channel(&self, table: &'static str) -> WatchChannel {
        let mut tables = self.tables.lock();
        tables.entry(table).or_default().table.clone()
    }

    /// Fire watches for a committed change set: `keys` holds every
    /// `(table, index, key)` added or removed by the commit, `touched` the
    /// tables it wrote.
    pub(crate) fn fire(
        &self,
        keys: &[(&'static str, &'static str, EncodedKey)],
        touched: impl IntoIterator<Item = &'static str>,
    ) {
        let mut closing = Vec::new();
        {
            let mut tables = self.tables.lock();
            for (table, index, key) in keys {
                if let Some(watches) = tables.get_mut(table) {
                    if let Some(channel) = watches.keys.remove(&(*index, key.clone())) {
                        closing.push(channel);
                    }
                }
            }
            for table in touched {
                let watches = tables.entry(table).or_default();
                closing.push(std::mem::take(&mut watches.table));
            }
        }
        for channel in closing {
            channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WatchChannel, WatchSet};
    use std::time::{Duration, Instant};

    #[test]
    fn close_is_idempotent_and_observable() {
        let ch = WatchChannel::new();
        assert!(!ch.is_closed());
        ch.close();
        ch.close();
        assert!(ch.is_closed());
    }

    #[test]
    fn watch_returns_immediately_for_closed_channel() {
        let ch = WatchChannel::new();
        ch.close();
        let mut ws = WatchSet::new();
        ws.add(ch);
        assert!(ws.watch(Instant::now() + Duration::from_secs(5)));
    }

    #[test]
    fn watch_times_out_without_signal() {
        let mut ws = WatchSet::new();
        ws.add(WatchChannel::new());
        let start = Instant::now();
        assert!(!ws.watch(start + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn watch_wakes_on_concurrent_close() {
        let ch = WatchChannel::new();
        let mut ws = WatchSet::new();
        ws.add(ch.clone());

        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            ch.close();
        });
        assert!(ws.watch(Instant::now() + Duration::from_secs(5)));
        closer.join().expect("closer thread");
    }

    #[test]
    fn empty_set_waits_out_the_deadline() {
        let ws = WatchSet::new();
        assert!(!ws.watch(Instant::now() + Duration::from_millis(5)));
    }
}
