//! Integration tests for the per-conversation pipeline.
//!
//! Drives a [`ConversationCoordinator`] through its public entry points and
//! observes what reaches the handler and the editable-message cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use chatpump::config::EngineConfig;
use chatpump::coordinator::{ConversationCoordinator, CoordinatorState, EngineContext};
use chatpump::handler::{HandlerContext, HandlerError, MessageHandler};
use chatpump::identity::BotIdentity;
use chatpump::report::{CollectingReporter, ProblemReporter};
use chatpump::transport::Conversation;
use chatpump::transport::memory::MemoryTransport;

use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::{ConversationId, MemberId, MessageEdit, MessageId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dispatched {
    Command(String),
    Message(String),
}

/// Records every dispatch with the sender's display name at that moment.
#[derive(Default)]
struct RecordingHandler {
    dispatched: Mutex<Vec<(MessageId, Dispatched, String)>>,
    delay: Option<Duration>,
}

impl RecordingHandler {
    fn slow(delay: Duration) -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    fn kinds(&self) -> Vec<Dispatched> {
        self.dispatched
            .lock()
            .iter()
            .map(|(_, kind, _)| kind.clone())
            .collect()
    }

    fn ids(&self) -> Vec<MessageId> {
        self.dispatched
            .lock()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

impl MessageHandler for RecordingHandler {
    async fn handle_command(
        &self,
        ctx: &HandlerContext<'_>,
        command: &str,
    ) -> Result<(), HandlerError> {
        self.dispatched.lock().push((
            ctx.message_id.clone(),
            Dispatched::Command(command.to_string()),
            ctx.sender_name(),
        ));
        Ok(())
    }

    async fn handle_message(&self, ctx: &HandlerContext<'_>) -> Result<(), HandlerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.dispatched.lock().push((
            ctx.message_id.clone(),
            Dispatched::Message(ctx.content.to_string()),
            ctx.sender_name(),
        ));
        Ok(())
    }
}

struct Harness {
    transport: Arc<MemoryTransport>,
    handler: Arc<RecordingHandler>,
    coordinator: Arc<ConversationCoordinator<MemoryTransport>>,
}

fn conversation_id() -> ConversationId {
    ConversationId::new("team")
}

async fn harness_with(handler: RecordingHandler, config: EngineConfig) -> Harness {
    let transport = Arc::new(MemoryTransport::new(MemberInfo::new(
        MemberId::new("bot"),
        "Bot",
    )));
    transport.add_conversation(
        Conversation::new(conversation_id(), "Team"),
        vec![MemberInfo::new(MemberId::new("alice"), "Alice")],
    );
    let handler = Arc::new(handler);
    let reporter: Arc<dyn ProblemReporter> = Arc::new(CollectingReporter::new());
    let ctx = EngineContext::new(
        Arc::clone(&transport),
        Arc::clone(&handler),
        reporter,
        BotIdentity::new(MemberId::new("bot"), "Bot"),
        config,
    );
    let coordinator =
        ConversationCoordinator::start(Conversation::new(conversation_id(), "Team"), &ctx).await;
    Harness {
        transport,
        handler,
        coordinator,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingHandler::default(), EngineConfig::default()).await
}

impl Harness {
    fn receive(&self, id: &str, content: &str) {
        let event = self.transport.post_received(
            conversation_id(),
            MessageId::new(id),
            MemberId::new("alice"),
            content,
        );
        self.coordinator.on_event_received(event);
    }

    async fn wait_processed(&self, n: u64) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.coordinator.stats().consumer.processed < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consumer should process all items in time");
    }
}

// ===========================================================================
// Dispatch routing and cache population
// ===========================================================================

/// `["hello", "!addlistener", "world"]` dispatches normal, command, normal
/// and caches only the two normal messages.
#[tokio::test]
async fn mixed_batch_routes_and_caches() {
    let h = harness().await;
    h.receive("msg1", "hello");
    h.receive("msg2", "!addlistener");
    h.receive("msg3", "world");
    h.wait_processed(3).await;

    assert_eq!(
        h.handler.kinds(),
        vec![
            Dispatched::Message("hello".to_string()),
            Dispatched::Command("!addlistener".to_string()),
            Dispatched::Message("world".to_string()),
        ]
    );

    let expected: HashMap<MessageId, String> = [
        (MessageId::new("msg1"), "hello".to_string()),
        (MessageId::new("msg3"), "world".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(h.coordinator.cache().to_map(), expected);

    let stats = h.coordinator.stats().consumer;
    assert_eq!(stats.commands, 1);
    assert_eq!(stats.messages, 2);
    h.coordinator.shutdown().await;
}

/// Command matching ignores case only; padding or extra words make a
/// normal message.
#[tokio::test]
async fn command_tokens_match_case_insensitively() {
    let h = harness().await;
    h.receive("a", "!HELP");
    h.receive("b", " !help");
    h.receive("c", "!help me");
    h.wait_processed(3).await;

    assert_eq!(
        h.handler.kinds(),
        vec![
            Dispatched::Command("!help".to_string()),
            Dispatched::Message(" !help".to_string()),
            Dispatched::Message("!help me".to_string()),
        ]
    );
    h.coordinator.shutdown().await;
}

/// A single producer's events are dispatched in exactly enqueue order.
#[tokio::test]
async fn single_producer_order_is_preserved() {
    let h = harness().await;
    let ids: Vec<MessageId> = (0..200).map(|i| MessageId::new(format!("m{i:03}"))).collect();
    for id in &ids {
        h.receive(id.as_str(), "payload");
    }
    h.wait_processed(200).await;

    assert_eq!(h.handler.ids(), ids);
    h.coordinator.shutdown().await;
}

/// Handlers read the member directory at their own dispatch time.
#[tokio::test]
async fn handlers_see_membership_changes() {
    let h = harness().await;
    h.receive("a", "before");
    h.wait_processed(1).await;

    h.coordinator
        .on_member_joined(MemberInfo::new(MemberId::new("alice"), "Alice Liddell"));
    h.receive("b", "after");
    h.wait_processed(2).await;

    let names: Vec<String> = h
        .handler
        .dispatched
        .lock()
        .iter()
        .map(|(_, _, name)| name.clone())
        .collect();
    assert_eq!(names, vec!["Alice".to_string(), "Alice Liddell".to_string()]);
    h.coordinator.shutdown().await;
}

// ===========================================================================
// Edits
// ===========================================================================

/// After an edit the cache holds the new content; an editable sweep keeps it.
#[tokio::test]
async fn edit_then_editable_sweep_keeps_new_content() {
    let h = harness().await;
    h.receive("A", "foo");
    h.wait_processed(1).await;

    let applied = h.coordinator.edit_facade().on_message_edited(&MessageEdit {
        message_id: MessageId::new("A"),
        conversation_id: conversation_id(),
        editor: MemberId::new("alice"),
        new_content: "bar".to_string(),
    });
    assert!(applied.is_some());

    let report = h.coordinator.sweep_now().await;
    assert_eq!(report.retained, 1);
    assert_eq!(
        h.coordinator.cache().get(&MessageId::new("A")).as_deref(),
        Some("bar")
    );
    h.coordinator.shutdown().await;
}

/// An edit for a message the consumer never saw changes nothing.
#[tokio::test]
async fn edit_before_seen_is_ignored() {
    let h = harness().await;
    let applied = h.coordinator.edit_facade().on_message_edited(&MessageEdit {
        message_id: MessageId::new("ghost"),
        conversation_id: conversation_id(),
        editor: MemberId::new("alice"),
        new_content: "boo".to_string(),
    });
    assert!(applied.is_none());
    assert!(h.coordinator.cache().is_empty());
    h.coordinator.shutdown().await;
}

// ===========================================================================
// Workers and shutdown
// ===========================================================================

/// With several workers every item is still dispatched exactly once.
#[tokio::test]
async fn multiple_workers_dispatch_each_item_once() {
    let config = EngineConfig {
        consumer_workers: 4,
        ..EngineConfig::default()
    };
    let h = harness_with(RecordingHandler::default(), config).await;
    for i in 0..500 {
        h.receive(&format!("m{i}"), "payload");
    }
    h.wait_processed(500).await;

    let ids = h.handler.ids();
    let unique: HashSet<MessageId> = ids.iter().cloned().collect();
    assert_eq!(ids.len(), 500);
    assert_eq!(unique.len(), 500);
    h.coordinator.shutdown().await;
}

/// Shutdown dispatches the queued backlog before the workers exit.
#[tokio::test]
async fn shutdown_drains_backlog() {
    let h = harness_with(
        RecordingHandler::slow(Duration::from_millis(2)),
        EngineConfig::default(),
    )
    .await;
    for i in 0..50 {
        h.receive(&format!("m{i}"), "payload");
    }
    h.coordinator.shutdown().await;

    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
    assert_eq!(h.handler.ids().len(), 50);
    assert_eq!(h.coordinator.stats().queued, 0);
}

/// A handler slower than the shutdown timeout is aborted: `shutdown`
/// returns promptly and the handler never completes afterwards.
#[tokio::test]
async fn shutdown_aborts_tasks_past_timeout() {
    let config = EngineConfig {
        shutdown_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let h = harness_with(RecordingHandler::slow(Duration::from_millis(400)), config).await;
    h.receive("m1", "payload");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = tokio::time::Instant::now();
    h.coordinator.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(350));
    assert_eq!(h.coordinator.state(), CoordinatorState::Stopped);
    assert_eq!(h.coordinator.stats().queued, 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(h.handler.ids().is_empty(), "aborted handler must not finish");
    assert_eq!(h.coordinator.stats().consumer.processed, 0);
}
