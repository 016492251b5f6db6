//! Collapses bursts of recompute requests for a transaction into as few
//! completeness calculations as possible.
//!
//! Every transaction key moves through the states below. The state lives in a
//! [RecomputeRegistry] owned by the coalescer, so two coalescers (or two
//! processes) never share it.
//!
//! ```text
//!            request                 debounce elapsed
//!   Idle ──────────────▶ Scheduled ───────────────────▶ Running
//!    ▲                    │  ▲ request: merged           │  │ request: dirty = true
//!    │                    │  └──────────────             │  ▼
//!    └──── run finished, not dirty ◀─────────────────────┘  trailing run (once)
//! ```
//!
//! A burst of requests therefore costs at most two calculations: the
//! debounced one, and one trailing run if anything arrived while it was in
//! flight. The trailing run always starts after the last request, so the
//! value it persists is never stale.
//!
//! Runs are detached tokio tasks. Callers never wait for them and never see
//! their errors, which are logged and dropped.

use std::{
    collections::HashMap,
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::Notify, time::Instant};

use crate::{
    Error,
    audit::{AuditStore, CompletenessSnapshot, calculate_completeness},
    database_id::{AccountId, TransactionId},
};

/// The scope of all coalescing state: one transaction in one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecomputeKey {
    /// The account that owns the transaction.
    pub account_id: AccountId,
    /// The transaction whose items are audited.
    pub transaction_id: TransactionId,
}

impl RecomputeKey {
    /// Create the key for `transaction_id` owned by `account_id`.
    pub fn new(account_id: &str, transaction_id: &str) -> Self {
        Self {
            account_id: account_id.to_owned(),
            transaction_id: transaction_id.to_owned(),
        }
    }
}

impl Display for RecomputeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_id, self.transaction_id)
    }
}

/// Tuning for [RecomputeCoalescer].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// How long to wait after the first request before running, so that
    /// requests arriving in the meantime share the run.
    pub debounce: Duration,
    /// How long an idle key's state is kept before it is evicted.
    pub idle_ttl: Duration,
}

impl CoalescerConfig {
    /// The default debounce window.
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
    /// The default time idle keys are kept around.
    pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
            idle_ttl: Self::DEFAULT_IDLE_TTL,
        }
    }
}

/// Scheduling state for a single key.
#[derive(Debug)]
pub(super) struct KeyState {
    /// A task is waiting out the debounce window.
    pub(super) scheduled: bool,
    /// A calculation is in flight.
    pub(super) running: bool,
    /// A request arrived while running; one trailing run is owed.
    pub(super) dirty: bool,
    /// Nesting depth of open batches.
    pub(super) batch_depth: u32,
    /// Wakes the scheduled task early when a caller wants the result now.
    wake: Arc<Notify>,
    /// When the key last became idle.
    idle_since: Instant,
}

impl KeyState {
    fn new() -> Self {
        Self {
            scheduled: false,
            running: false,
            dirty: false,
            batch_depth: 0,
            wake: Arc::new(Notify::new()),
            idle_since: Instant::now(),
        }
    }

    fn is_idle(&self) -> bool {
        !self.scheduled && !self.running && !self.dirty && self.batch_depth == 0
    }
}

/// Per-key scheduling state for every transaction with recent recompute
/// activity.
///
/// Created with its coalescer at start up. Keys are added on first use and
/// evicted once they have been idle for longer than the configured TTL.
#[derive(Debug, Default)]
pub(super) struct RecomputeRegistry {
    entries: HashMap<RecomputeKey, KeyState>,
}

impl RecomputeRegistry {
    pub(super) fn entry(&mut self, key: &RecomputeKey) -> &mut KeyState {
        self.entries
            .entry(key.clone())
            .or_insert_with(KeyState::new)
    }

    pub(super) fn get(&self, key: &RecomputeKey) -> Option<&KeyState> {
        self.entries.get(key)
    }

    fn evict_idle(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, state| !state.is_idle() || now.duration_since(state.idle_since) < ttl);

        before - self.entries.len()
    }

    fn all_idle(&self) -> bool {
        self.entries.values().all(KeyState::is_idle)
    }
}

/// Debounces, serializes and persists completeness recomputes per transaction.
///
/// Cloning is cheap and clones share the same registry.
#[derive(Debug)]
pub struct RecomputeCoalescer<S> {
    inner: Arc<Inner<S>>,
}

#[derive(Debug)]
struct Inner<S> {
    store: S,
    config: CoalescerConfig,
    registry: Mutex<RecomputeRegistry>,
    /// Signalled whenever a key goes back to idle.
    became_idle: Notify,
}

impl<S> Clone for RecomputeCoalescer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AuditStore> RecomputeCoalescer<S> {
    /// Create a coalescer that reads from and writes to `store`.
    pub fn new(store: S, config: CoalescerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                registry: Mutex::new(RecomputeRegistry::default()),
                became_idle: Notify::new(),
            }),
        }
    }

    /// The configuration the coalescer was created with.
    pub fn config(&self) -> CoalescerConfig {
        self.inner.config
    }

    /// Ask for the `needs_review` flag of the transaction to be recomputed.
    ///
    /// Returns immediately. Does nothing while a batch is open for `key`, the
    /// batch's flush will request the recompute instead.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request_recompute(&self, key: &RecomputeKey) {
        self.schedule(key, false);
    }

    /// Compute the completeness of a transaction from its current state.
    ///
    /// This always reads fresh data and never touches the persisted flag or
    /// the scheduling state.
    ///
    /// # Errors
    /// Returns whatever error the store returns when loading the transaction
    /// or its items.
    pub async fn get_completeness(&self, key: &RecomputeKey) -> Result<CompletenessSnapshot, Error> {
        let transaction = self.inner.store.load_transaction(key).await?;
        let items = self.inner.store.load_items(key).await?;

        Ok(calculate_completeness(&transaction, &items))
    }

    /// Wait until no key has a scheduled or running recompute.
    ///
    /// Keys inside an open batch count as busy.
    pub async fn settle(&self) {
        loop {
            let became_idle = self.inner.became_idle.notified();
            tokio::pin!(became_idle);
            became_idle.as_mut().enable();

            if self.lock_registry().all_idle() {
                return;
            }

            became_idle.await;
        }
    }

    /// The number of keys currently tracked by the registry.
    pub fn tracked_keys(&self) -> usize {
        self.lock_registry().entries.len()
    }

    pub(super) fn lock_registry(&self) -> MutexGuard<'_, RecomputeRegistry> {
        // The registry holds plain flags, a panic while it was locked cannot
        // leave it in a state that is unsafe to keep using.
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start, merge or mark dirty a recompute for `key`.
    ///
    /// `immediate` skips the debounce window, waking an already scheduled
    /// task if there is one.
    pub(super) fn schedule(&self, key: &RecomputeKey, immediate: bool) {
        let mut registry = self.lock_registry();

        let evicted = registry.evict_idle(Instant::now(), self.inner.config.idle_ttl);
        if evicted > 0 {
            tracing::debug!("evicted {evicted} idle recompute keys");
        }

        let state = registry.entry(key);

        if state.batch_depth > 0 {
            tracing::trace!("recompute for {key} suppressed by open batch");
            return;
        }

        if state.running {
            tracing::debug!("recompute for {key} already running, marking dirty");
            state.dirty = true;
            return;
        }

        if state.scheduled {
            if immediate {
                tracing::debug!("waking scheduled recompute for {key}");
                state.wake.notify_one();
            } else {
                tracing::trace!("recompute for {key} merged into scheduled run");
            }
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                tracing::error!("cannot schedule recompute for {key} outside a runtime: {error}");
                return;
            }
        };

        state.scheduled = true;
        state.wake = Arc::new(Notify::new());
        let wake = Arc::clone(&state.wake);
        drop(registry);

        let delay = if immediate {
            Duration::ZERO
        } else {
            self.inner.config.debounce
        };

        tracing::debug!("scheduling recompute for {key} in {delay:?}");
        runtime.spawn(self.clone().drive(key.clone(), delay, wake));
    }

    /// The body of the detached task that owns a key while it is scheduled or
    /// running.
    async fn drive(self, key: RecomputeKey, delay: Duration, wake: Arc<Notify>) {
        let mut guard = ResetOnDrop {
            coalescer: &self,
            key: &key,
            armed: true,
        };

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wake.notified() => {
                    tracing::debug!("debounce for {key} cut short");
                }
            }
        }

        if self.start_run(&key) {
            loop {
                self.execute(&key).await;

                if !self.finish_run(&key) {
                    break;
                }

                tracing::debug!("starting trailing recompute for {key}");
            }
        }

        guard.armed = false;
        self.inner.became_idle.notify_waiters();
    }

    /// Move `key` from scheduled to running. Returns false if a batch was
    /// opened during the debounce window, the batch's flush reschedules.
    fn start_run(&self, key: &RecomputeKey) -> bool {
        let mut registry = self.lock_registry();
        let state = registry.entry(key);
        state.scheduled = false;

        if state.batch_depth > 0 {
            tracing::debug!("batch opened for {key} while scheduled, deferring to its flush");
            state.idle_since = Instant::now();
            return false;
        }

        state.running = true;
        state.dirty = false;
        true
    }

    /// Finish a run for `key`. Returns true if a trailing run is owed, in
    /// which case the key stays in the running state.
    fn finish_run(&self, key: &RecomputeKey) -> bool {
        let mut registry = self.lock_registry();
        let state = registry.entry(key);

        if state.dirty && state.batch_depth == 0 {
            state.dirty = false;
            return true;
        }

        state.running = false;
        state.dirty = false;
        state.idle_since = Instant::now();
        false
    }

    async fn execute(&self, key: &RecomputeKey) {
        match self.recompute(key).await {
            Ok(snapshot) => tracing::debug!(
                "recomputed {key}: status {:?}, ratio {}, needs review {}",
                snapshot.completeness_status,
                snapshot.completeness_ratio,
                snapshot.needs_review()
            ),
            Err(error) => tracing::warn!("dropping recompute for {key}: {error}"),
        }
    }

    async fn recompute(&self, key: &RecomputeKey) -> Result<CompletenessSnapshot, Error> {
        let snapshot = self.get_completeness(key).await?;

        self.inner
            .store
            .save_needs_review(key, snapshot.needs_review())
            .await?;

        Ok(snapshot)
    }
}

/// Clears the scheduling flags for a key if its task dies part way through,
/// e.g. a panic in the store or the runtime shutting down.
struct ResetOnDrop<'a, S: AuditStore> {
    coalescer: &'a RecomputeCoalescer<S>,
    key: &'a RecomputeKey,
    armed: bool,
}

impl<S: AuditStore> Drop for ResetOnDrop<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!("recompute task for {} ended abnormally", self.key);
        let mut registry = self.coalescer.lock_registry();
        let state = registry.entry(self.key);
        state.scheduled = false;
        state.running = false;
        state.dirty = false;
        state.idle_since = Instant::now();
        drop(registry);

        self.coalescer.inner.became_idle.notify_waiters();
    }
}
