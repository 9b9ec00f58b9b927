//! Broadcast signals of one instance
//!
//! Every signal is a `watch` channel, so any number of waiters observe each
//! change and late subscribers see the latest value.

use tokio::sync::watch;

pub(crate) struct Signals {
    /// One-time setup finished; actions and allowed-action queries may proceed
    ready: watch::Sender<bool>,
    /// The body started executing; cancellation may proceed
    executing: watch::Sender<bool>,
    /// The instance reached a terminal state
    completed: watch::Sender<bool>,
    /// Bumped whenever an action finishes or the exit state is triggered
    action_finished: watch::Sender<u64>,
    /// Actions accepted but not yet finished
    pending: watch::Sender<usize>,
}

impl Signals {
    pub fn new() -> Self {
        Self {
            ready: watch::channel(false).0,
            executing: watch::channel(false).0,
            completed: watch::channel(false).0,
            action_finished: watch::channel(0).0,
            pending: watch::channel(0).0,
        }
    }

    async fn wait_open(flag: &watch::Sender<bool>) {
        let mut rx = flag.subscribe();
        // The sender lives as long as `self`, so this only ends once the flag is set
        let _ = rx.wait_for(|open| *open).await;
    }

    pub fn open_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn wait_ready(&self) {
        Self::wait_open(&self.ready).await
    }

    pub fn open_executing(&self) {
        self.executing.send_replace(true);
    }

    pub async fn wait_executing(&self) {
        Self::wait_open(&self.executing).await
    }

    pub fn complete(&self) {
        self.completed.send_replace(true);
    }

    pub fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    pub async fn wait_completed(&self) {
        Self::wait_open(&self.completed).await
    }

    pub fn finish_action(&self) {
        self.action_finished.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Receiver that reports the next finished action
    pub fn subscribe_actions(&self) -> watch::Receiver<u64> {
        self.action_finished.subscribe()
    }

    pub fn begin_pending(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    pub fn end_pending(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Counts one pending action for as long as it lives
pub(crate) struct PendingAction<'a> {
    signals: &'a Signals,
}

impl<'a> PendingAction<'a> {
    pub fn begin(signals: &'a Signals) -> Self {
        signals.begin_pending();
        Self { signals }
    }

    /// Take over a count already added with `begin_pending`
    pub fn adopt(signals: &'a Signals) -> Self {
        Self { signals }
    }
}

impl Drop for PendingAction<'_> {
    fn drop(&mut self) {
        self.signals.end_pending();
    }
}
