//! Integration tests for the editable-message sweep.
//!
//! Covers removal of non-editable messages, retention of editable ones,
//! the revision guard against concurrent writers, and failure reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use chatpump::cache::EditableMessageCache;
use chatpump::config::EngineConfig;
use chatpump::coordinator::{ConversationCoordinator, EngineContext};
use chatpump::handler::LoggingHandler;
use chatpump::identity::BotIdentity;
use chatpump::report::{CollectingReporter, ProblemReporter};
use chatpump::sweeper::PeriodicSweeper;
use chatpump::transport::memory::MemoryTransport;
use chatpump::transport::{ChatTransport, Conversation, TransportError};

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationId, MemberId, MessageId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn conversation_id() -> ConversationId {
    ConversationId::new("team")
}

fn memory_transport() -> Arc<MemoryTransport> {
    let transport = MemoryTransport::new(MemberInfo::new(MemberId::new("bot"), "Bot"));
    transport.add_conversation(Conversation::new(conversation_id(), "Team"), vec![]);
    Arc::new(transport)
}

async fn start(
    transport: &Arc<MemoryTransport>,
    reporter: &Arc<CollectingReporter>,
    config: EngineConfig,
) -> Arc<ConversationCoordinator<MemoryTransport>> {
    let ctx = EngineContext::new(
        Arc::clone(transport),
        Arc::new(LoggingHandler),
        Arc::clone(reporter) as Arc<dyn ProblemReporter>,
        BotIdentity::new(MemberId::new("bot"), "Bot"),
        config,
    );
    ConversationCoordinator::start(Conversation::new(conversation_id(), "Team"), &ctx).await
}

async fn receive_and_wait(
    transport: &MemoryTransport,
    coordinator: &ConversationCoordinator<MemoryTransport>,
    id: &str,
    content: &str,
) {
    let before = coordinator.stats().consumer.processed;
    coordinator.on_event_received(transport.post_received(
        conversation_id(),
        MessageId::new(id),
        MemberId::new("alice"),
        content,
    ));
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.stats().consumer.processed <= before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("message should be processed");
}

/// Transport whose editability check parks until the test releases it,
/// then reports the message as no longer editable.
struct GatedTransport {
    inner: MemoryTransport,
    entered: Notify,
    release: Notify,
}

impl GatedTransport {
    fn new() -> Self {
        Self {
            inner: MemoryTransport::new(MemberInfo::new(MemberId::new("bot"), "Bot")),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

impl ChatTransport for GatedTransport {
    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, TransportError> {
        self.inner.conversation(id).await
    }

    async fn members(&self, id: &ConversationId) -> Result<Vec<MemberInfo>, TransportError> {
        self.inner.members(id).await
    }

    async fn is_editable(&self, _message: &MessageId) -> Result<bool, TransportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(false)
    }

    async fn profile(&self) -> Result<MemberInfo, TransportError> {
        self.inner.profile().await
    }

    async fn set_content(&self, message: &MessageId, content: &str) -> Result<(), TransportError> {
        self.inner.set_content(message, content).await
    }
}

// ===========================================================================
// Scenarios
// ===========================================================================

/// `{A: "foo"}` with A no longer editable sweeps to `{}`.
#[tokio::test]
async fn non_editable_message_is_swept() {
    let transport = memory_transport();
    let reporter = Arc::new(CollectingReporter::new());
    let coordinator = start(&transport, &reporter, EngineConfig::default()).await;

    receive_and_wait(&transport, &coordinator, "A", "foo").await;
    transport.expire(&MessageId::new("A"));

    let report = coordinator.sweep_now().await;
    assert_eq!(report.removed, 1);
    assert!(coordinator.cache().is_empty());
    assert!(reporter.is_empty());
    coordinator.shutdown().await;
}

/// Editable messages survive any number of sweeps.
#[tokio::test]
async fn editable_messages_are_never_swept() {
    let transport = memory_transport();
    let reporter = Arc::new(CollectingReporter::new());
    let coordinator = start(&transport, &reporter, EngineConfig::default()).await;

    receive_and_wait(&transport, &coordinator, "A", "foo").await;
    receive_and_wait(&transport, &coordinator, "B", "bar").await;
    for _ in 0..3 {
        coordinator.sweep_now().await;
    }
    assert_eq!(coordinator.cache().len(), 2);
    coordinator.shutdown().await;
}

/// The scheduled sweep removes messages whose edit window closed.
#[tokio::test]
async fn scheduled_sweep_prunes_expired_messages() {
    let transport = memory_transport();
    let reporter = Arc::new(CollectingReporter::new());
    let config = EngineConfig {
        sweep_interval: Duration::from_millis(25),
        ..EngineConfig::default()
    };
    let coordinator = start(&transport, &reporter, config).await;

    receive_and_wait(&transport, &coordinator, "A", "foo").await;
    receive_and_wait(&transport, &coordinator, "B", "bar").await;
    transport.expire(&MessageId::new("A"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.cache().contains(&MessageId::new("A")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduled sweep should remove A");
    assert!(coordinator.cache().contains(&MessageId::new("B")));
    assert!(coordinator.stats().sweeps >= 1);
    coordinator.shutdown().await;
}

/// An entry updated while its editability check is in flight is kept.
#[tokio::test]
async fn entry_updated_during_check_survives_sweep() {
    let transport = Arc::new(GatedTransport::new());
    let cache = Arc::new(EditableMessageCache::new());
    let reporter: Arc<dyn ProblemReporter> = Arc::new(CollectingReporter::new());
    let sweeper = Arc::new(PeriodicSweeper::new(
        conversation_id(),
        Arc::clone(&cache),
        Arc::clone(&transport),
        reporter,
        Duration::from_secs(3600),
    ));

    cache.put(MessageId::new("A"), "foo");
    let sweep = {
        let sweeper = Arc::clone(&sweeper);
        tokio::spawn(async move { sweeper.sweep_once().await })
    };

    transport.entered.notified().await;
    cache.update(&MessageId::new("A"), "bar");
    transport.release.notify_one();

    let report = sweep.await.unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.changed_during_check, 1);
    assert_eq!(cache.get(&MessageId::new("A")).as_deref(), Some("bar"));
}

/// An entry removed and re-inserted during the check is kept as well.
#[tokio::test]
async fn entry_reinserted_during_check_survives_sweep() {
    let transport = Arc::new(GatedTransport::new());
    let cache = Arc::new(EditableMessageCache::new());
    let reporter: Arc<dyn ProblemReporter> = Arc::new(CollectingReporter::new());
    let sweeper = Arc::new(PeriodicSweeper::new(
        conversation_id(),
        Arc::clone(&cache),
        Arc::clone(&transport),
        reporter,
        Duration::from_secs(3600),
    ));

    cache.put(MessageId::new("A"), "foo");
    let sweep = {
        let sweeper = Arc::clone(&sweeper);
        tokio::spawn(async move { sweeper.sweep_once().await })
    };

    transport.entered.notified().await;
    cache.remove(&MessageId::new("A"));
    cache.put(MessageId::new("A"), "foo");
    transport.release.notify_one();

    let report = sweep.await.unwrap();
    assert_eq!(report.removed, 0);
    assert!(cache.contains(&MessageId::new("A")));
}

/// A failing check keeps the entry, and the failure reaches the reporter.
#[tokio::test]
async fn failed_checks_are_reported_and_entry_kept() {
    let transport = memory_transport();
    let reporter = Arc::new(CollectingReporter::new());
    let coordinator = start(&transport, &reporter, EngineConfig::default()).await;

    receive_and_wait(&transport, &coordinator, "A", "foo").await;
    transport.expire(&MessageId::new("A"));
    transport.fail_editability_checks(MessageId::new("A"));

    let report = coordinator.sweep_now().await;
    assert_eq!(report.failed, 1);
    assert!(coordinator.cache().contains(&MessageId::new("A")));

    let problems = reporter.take();
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("editability check failed"));
    coordinator.shutdown().await;
}
