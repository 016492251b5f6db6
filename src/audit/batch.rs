//! Lets a top-level operation declare "this is one logical change" so its
//! nested mutations cost exactly one recompute.

use crate::audit::{AuditStore, RecomputeCoalescer, RecomputeKey};

/// Options for [RecomputeCoalescer::flush_batch].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOptions {
    /// Skip the debounce window, for when a user is waiting on the result.
    pub flush_immediately: bool,
}

impl FlushOptions {
    /// Flush without waiting for the debounce window.
    pub fn immediate() -> Self {
        Self {
            flush_immediately: true,
        }
    }
}

impl<S: AuditStore> RecomputeCoalescer<S> {
    /// Open a batch for `key`. Batches nest, each call must be matched by a
    /// call to [RecomputeCoalescer::flush_batch].
    ///
    /// Prefer [RecomputeCoalescer::batch], which cannot be left unbalanced.
    pub fn begin_batch(&self, key: &RecomputeKey) {
        let mut registry = self.lock_registry();
        let state = registry.entry(key);
        state.batch_depth = state.batch_depth.saturating_add(1);

        tracing::trace!("opened batch for {key}, depth {}", state.batch_depth);
    }

    /// Whether a batch is open for `key`.
    ///
    /// Mutation call-sites check this before requesting a recompute.
    pub fn is_batch_active(&self, key: &RecomputeKey) -> bool {
        self.lock_registry()
            .get(key)
            .is_some_and(|state| state.batch_depth > 0)
    }

    /// Close one level of batching for `key`. Closing the outermost level
    /// requests exactly one recompute.
    ///
    /// A flush with no open batch is tolerated: it logs a warning, leaves the
    /// depth at zero and still requests the recompute.
    pub fn flush_batch(&self, key: &RecomputeKey, options: FlushOptions) {
        let closed_outermost = {
            let mut registry = self.lock_registry();
            let state = registry.entry(key);

            match state.batch_depth {
                0 => {
                    tracing::warn!("flushed batch for {key} without a matching begin");
                    true
                }
                depth => {
                    state.batch_depth = depth - 1;
                    state.batch_depth == 0
                }
            }
        };

        if closed_outermost {
            self.schedule(key, options.flush_immediately);
        }
    }

    /// Open a batch for `key` that is closed when the returned scope is
    /// finished or dropped.
    ///
    /// Dropping the scope without calling [BatchScope::finish], e.g. because
    /// the batch body returned early with an error, still closes the batch and
    /// requests the recompute for whatever was written before the failure.
    pub fn batch(&self, key: &RecomputeKey) -> BatchScope<S> {
        self.begin_batch(key);

        BatchScope {
            coalescer: self.clone(),
            key: key.clone(),
            finished: false,
        }
    }
}

/// An open batch, see [RecomputeCoalescer::batch].
#[must_use = "dropping a batch scope closes the batch immediately"]
#[derive(Debug)]
pub struct BatchScope<S: AuditStore> {
    coalescer: RecomputeCoalescer<S>,
    key: RecomputeKey,
    finished: bool,
}

impl<S: AuditStore> BatchScope<S> {
    /// The key this batch covers.
    pub fn key(&self) -> &RecomputeKey {
        &self.key
    }

    /// Close the batch.
    pub fn finish(mut self, options: FlushOptions) {
        self.finished = true;
        self.coalescer.flush_batch(&self.key, options);
    }
}

impl<S: AuditStore> Drop for BatchScope<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::debug!("batch for {} dropped before finishing, flushing", self.key);
        self.coalescer
            .flush_batch(&self.key, FlushOptions::default());
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{Duration, Instant, sleep};

    use crate::audit::{
        CoalescerConfig, FlushOptions, RecomputeCoalescer, RecomputeKey,
        coalescer::test_store::RecordingStore,
    };

    const DEBOUNCE: Duration = Duration::from_secs(1);

    fn get_coalescer(store: &RecordingStore) -> RecomputeCoalescer<RecordingStore> {
        RecomputeCoalescer::new(
            store.clone(),
            CoalescerConfig {
                debounce: DEBOUNCE,
                idle_ttl: Duration::from_secs(60),
            },
        )
    }

    fn key() -> RecomputeKey {
        RecomputeKey::new("acme", "txn-1")
    }

    /// A stand-in for a low level helper that writes and then asks for a
    /// recompute unless a batch is open.
    fn helper_mutation(coalescer: &RecomputeCoalescer<RecordingStore>, key: &RecomputeKey) {
        if !coalescer.is_batch_active(key) {
            coalescer.request_recompute(key);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_runs_exactly_once_regardless_of_mutation_count() {
        for mutations in [1, 5, 50] {
            let store = RecordingStore::new(Duration::from_millis(100));
            let coalescer = get_coalescer(&store);

            coalescer.begin_batch(&key());
            for _ in 0..mutations {
                helper_mutation(&coalescer, &key());
                // Longer than the debounce window, so timing alone would not
                // collapse these.
                sleep(DEBOUNCE * 2).await;
            }
            coalescer.flush_batch(&key(), FlushOptions::default());
            coalescer.settle().await;

            assert_eq!(store.runs(), 1, "{mutations} mutations");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_recompute_is_suppressed_inside_batch() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        coalescer.begin_batch(&key());
        coalescer.request_recompute(&key());
        sleep(DEBOUNCE * 3).await;

        assert_eq!(store.runs(), 0);
        coalescer.flush_batch(&key(), FlushOptions::default());
        coalescer.settle().await;
        assert_eq!(store.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nested_batches_flush_once_at_outermost_level() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        coalescer.begin_batch(&key());
        coalescer.begin_batch(&key());
        helper_mutation(&coalescer, &key());
        coalescer.flush_batch(&key(), FlushOptions::default());
        assert!(coalescer.is_batch_active(&key()));
        sleep(DEBOUNCE * 3).await;
        assert_eq!(store.runs(), 0);

        coalescer.flush_batch(&key(), FlushOptions::default());
        assert!(!coalescer.is_batch_active(&key()));
        coalescer.settle().await;
        assert_eq!(store.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbalanced_flush_clamps_at_zero() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        coalescer.flush_batch(&key(), FlushOptions::default());
        coalescer.flush_batch(&key(), FlushOptions::default());
        coalescer.settle().await;

        assert!(!coalescer.is_batch_active(&key()));
        assert_eq!(store.runs(), 1);

        // A later batch still works normally.
        coalescer.begin_batch(&key());
        assert!(coalescer.is_batch_active(&key()));
        coalescer.flush_batch(&key(), FlushOptions::default());
        coalescer.settle().await;
        assert_eq!(store.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_immediately_skips_debounce() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);
        let start = Instant::now();

        coalescer.begin_batch(&key());
        coalescer.flush_batch(&key(), FlushOptions::immediate());
        coalescer.settle().await;

        assert_eq!(store.runs(), 1);
        assert!(start.elapsed() < DEBOUNCE, "took {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_immediately_wakes_scheduled_run() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);
        let start = Instant::now();

        coalescer.request_recompute(&key());
        coalescer.flush_batch(&key(), FlushOptions::immediate());
        coalescer.settle().await;

        assert_eq!(store.runs(), 1);
        assert!(start.elapsed() < DEBOUNCE, "took {:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_opened_during_debounce_defers_run_to_flush() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        coalescer.request_recompute(&key());
        coalescer.begin_batch(&key());
        sleep(DEBOUNCE * 2).await;
        assert_eq!(store.runs(), 0);

        coalescer.flush_batch(&key(), FlushOptions::default());
        coalescer.settle().await;
        assert_eq!(store.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scope_finish_flushes() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        let scope = coalescer.batch(&key());
        helper_mutation(&coalescer, &key());
        helper_mutation(&coalescer, &key());
        scope.finish(FlushOptions::default());
        coalescer.settle().await;

        assert_eq!(store.runs(), 1);
        assert!(!coalescer.is_batch_active(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn scope_restores_depth_on_early_return() {
        fn failing_operation(coalescer: &RecomputeCoalescer<RecordingStore>) -> Result<(), String> {
            let _scope = coalescer.batch(&key());
            helper_mutation(coalescer, &key());
            Err::<(), _>("the second write failed".to_owned())?;
            helper_mutation(coalescer, &key());
            Ok(())
        }

        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        coalescer.begin_batch(&key());
        let result = failing_operation(&coalescer);

        assert!(result.is_err());
        // The outer batch is still open, the failed inner one is closed.
        assert!(coalescer.is_batch_active(&key()));
        coalescer.flush_batch(&key(), FlushOptions::default());
        assert!(!coalescer.is_batch_active(&key()));
        coalescer.settle().await;
        assert_eq!(store.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scope_restores_depth_on_panic() {
        let store = RecordingStore::new(Duration::from_millis(100));
        let coalescer = get_coalescer(&store);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = coalescer.batch(&key());
            panic!("mutation blew up");
        }));

        assert!(result.is_err());
        assert!(!coalescer.is_batch_active(&key()));
        coalescer.settle().await;
        assert_eq!(store.runs(), 1);
    }
}
