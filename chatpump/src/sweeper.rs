//! Periodic removal of cache entries that can no longer be edited.
//!
//! Every `period` the [`PeriodicSweeper`] snapshots the cached message ids,
//! asks the transport whether each is still editable, and removes the ones
//! that are not. Removal goes through
//! [`EditableMessageCache::remove_if_unchanged`], so an entry the consumer
//! re-inserted or the edit facade updated during the check is kept until a
//! later sweep looks at it again.
//!
//! A failed editability check skips that entry; the failures of one sweep
//! are reported once through the [`ProblemReporter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use chatpump_proto::message::ConversationId;

use crate::cache::EditableMessageCache;
use crate::report::ProblemReporter;
use crate::transport::ChatTransport;

/// Default sweep period: one hour.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries in the snapshot.
    pub checked: usize,
    /// Entries the transport still reports as editable.
    pub retained: usize,
    /// Entries removed because they are no longer editable.
    pub removed: usize,
    /// Non-editable entries kept because they changed during the check.
    pub changed_during_check: usize,
    /// Entries whose editability check failed.
    pub failed: usize,
}

/// Background pruner for one conversation's [`EditableMessageCache`].
pub struct PeriodicSweeper<T: ChatTransport> {
    conversation: ConversationId,
    cache: Arc<EditableMessageCache>,
    transport: Arc<T>,
    reporter: Arc<dyn ProblemReporter>,
    period: Duration,
    sweeps: AtomicU64,
    last_report: Mutex<Option<SweepReport>>,
}

impl<T: ChatTransport + 'static> PeriodicSweeper<T> {
    /// Creates a sweeper for `cache` that runs every `period`.
    #[must_use]
    pub fn new(
        conversation: ConversationId,
        cache: Arc<EditableMessageCache>,
        transport: Arc<T>,
        reporter: Arc<dyn ProblemReporter>,
        period: Duration,
    ) -> Self {
        Self {
            conversation,
            cache,
            transport,
            reporter,
            period,
            sweeps: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// The configured sweep period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Number of completed sweeps.
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    /// Report of the most recent sweep, if any ran.
    #[must_use]
    pub fn last_report(&self) -> Option<SweepReport> {
        *self.last_report.lock()
    }

    /// Runs one sweep pass now.
    pub async fn sweep_once(&self) -> SweepReport {
        let snapshot = self.cache.snapshot();
        let mut report = SweepReport {
            checked: snapshot.len(),
            ..SweepReport::default()
        };

        for entry in snapshot {
            match self.transport.is_editable(&entry.message_id).await {
                Ok(true) => report.retained += 1,
                Ok(false) => {
                    if self
                        .cache
                        .remove_if_unchanged(&entry.message_id, entry.revision)
                    {
                        report.removed += 1;
                    } else {
                        report.changed_during_check += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        conversation = %self.conversation,
                        message_id = %entry.message_id,
                        error = %e,
                        "editability check failed, keeping entry"
                    );
                }
            }
        }

        if report.failed > 0 {
            self.reporter.report(&format!(
                "editability check failed for {} of {} cached messages in {}",
                report.failed, report.checked, self.conversation
            ));
        }

        tracing::debug!(
            conversation = %self.conversation,
            checked = report.checked,
            removed = report.removed,
            retained = report.retained,
            failed = report.failed,
            "cache sweep finished"
        );

        *self.last_report.lock() = Some(report);
        self.sweeps.fetch_add(1, Ordering::Release);
        report
    }

    /// Spawns a task that sweeps every period until `shutdown` is cancelled.
    ///
    /// The first sweep happens one full period after spawning.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + sweeper.period, sweeper.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        sweeper.sweep_once().await;
                    }
                }
            }
            tracing::debug!(conversation = %sweeper.conversation, "sweeper stopped");
        })
    }
}
