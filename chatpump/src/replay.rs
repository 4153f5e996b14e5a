//! Replays a JSON-lines event script through a [`ConversationRegistry`].
//!
//! Each non-blank line that does not start with `#` is one [`ScriptStep`],
//! tagged by its `step` field:
//!
//! ```text
//! {"step":"conversation","id":"c1","title":"Team","members":[{"member_id":"alice","display_name":"Alice"}]}
//! {"step":"sent","conversation":"c1","content":"!addlistener"}
//! {"step":"received","conversation":"c1","id":"m1","sender":"alice","content":"hello"}
//! {"step":"edited","conversation":"c1","id":"m1","editor":"alice","content":"hello!"}
//! {"step":"expire","id":"m1"}
//! {"step":"sweep","conversation":"c1"}
//! {"step":"sleep","ms":50}
//! ```
//!
//! The script drives a [`MemoryTransport`]: posted messages are recorded
//! there before the registry sees them, so editability checks and the
//! activation-message rewrite behave as they would against a live client.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use chatpump_proto::member::{MemberInfo, MemberRole};
use chatpump_proto::message::{ConversationId, MemberId, MessageEdit, MessageId};

use crate::handler::MessageHandler;
use crate::registry::{ConversationRegistry, SentOutcome};
use crate::transport::{Conversation, TransportError};
use crate::transport::memory::MemoryTransport;

/// Errors that can occur while replaying a script.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Reading the script failed.
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    /// The bot's identity could not be resolved from the transport.
    #[error("could not resolve bot identity: {0}")]
    Identity(#[from] TransportError),

    /// A line is not a valid step.
    #[error("invalid step on line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Declare a conversation and its members in the transport.
    Conversation {
        /// Conversation id.
        id: ConversationId,
        /// Display title.
        title: String,
        /// Initial members.
        #[serde(default)]
        members: Vec<MemberInfo>,
    },
    /// Another member posts a message.
    Received {
        /// Target conversation.
        conversation: ConversationId,
        /// Message id; generated when absent.
        #[serde(default)]
        id: Option<MessageId>,
        /// Posting member.
        sender: MemberId,
        /// Message content.
        content: String,
    },
    /// The bot's account posts a message.
    Sent {
        /// Target conversation.
        conversation: ConversationId,
        /// Message id; generated when absent.
        #[serde(default)]
        id: Option<MessageId>,
        /// Message content.
        content: String,
    },
    /// An existing message is edited.
    Edited {
        /// Conversation of the message.
        conversation: ConversationId,
        /// Edited message.
        id: MessageId,
        /// Member performing the edit.
        editor: MemberId,
        /// New content.
        content: String,
    },
    /// A member joins.
    Joined {
        /// Target conversation.
        conversation: ConversationId,
        /// Joining member.
        member: MemberId,
        /// Display name.
        name: String,
        /// Role in the conversation.
        #[serde(default)]
        role: MemberRole,
    },
    /// A member leaves.
    Left {
        /// Target conversation.
        conversation: ConversationId,
        /// Leaving member.
        member: MemberId,
    },
    /// Close a message's edit window now.
    Expire {
        /// Message to expire.
        id: MessageId,
    },
    /// Run a cache sweep immediately.
    Sweep {
        /// Conversation to sweep.
        conversation: ConversationId,
    },
    /// Pause the script.
    Sleep {
        /// Milliseconds to wait.
        ms: u64,
    },
}

/// Parses one script line. Blank lines and `#` comments yield `Ok(None)`.
///
/// # Errors
///
/// Returns the JSON error if the line is not a valid [`ScriptStep`].
pub fn parse_line(line: &str) -> Result<Option<ScriptStep>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Counters describing a completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Steps executed.
    pub steps: usize,
    /// Received messages accepted by a coordinator.
    pub forwarded: usize,
    /// Conversations registered by activation messages.
    pub activations: usize,
    /// Conversations deregistered by deactivation messages.
    pub deactivations: usize,
    /// Edits that changed a cached message.
    pub edits_applied: usize,
    /// Forced sweeps run.
    pub sweeps: usize,
}

/// Feeds script steps into a registry backed by a [`MemoryTransport`].
pub struct Replay<H: MessageHandler> {
    transport: Arc<MemoryTransport>,
    registry: Arc<ConversationRegistry<MemoryTransport, H>>,
}

impl<H: MessageHandler + 'static> Replay<H> {
    /// Creates a replay over `transport` and `registry`.
    ///
    /// The registry must have been built over the same transport.
    #[must_use]
    pub const fn new(
        transport: Arc<MemoryTransport>,
        registry: Arc<ConversationRegistry<MemoryTransport, H>>,
    ) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Runs every step read from `reader` until end of input.
    ///
    /// # Errors
    ///
    /// Stops at the first unreadable or unparsable line.
    pub async fn run<R>(&self, reader: R) -> Result<ReplaySummary, ReplayError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = ReplaySummary::default();
        let mut lines = reader.lines();
        let mut line_no = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let step = parse_line(&line).map_err(|source| ReplayError::Parse {
                line: line_no,
                source,
            })?;
            if let Some(step) = step {
                self.apply(step, &mut summary).await;
                summary.steps += 1;
            }
        }
        tracing::info!(steps = summary.steps, "script finished");
        Ok(summary)
    }

    /// Executes a single step.
    pub async fn apply(&self, step: ScriptStep, summary: &mut ReplaySummary) {
        match step {
            ScriptStep::Conversation { id, title, members } => {
                self.transport
                    .add_conversation(Conversation::new(id, title), members);
            }
            ScriptStep::Received {
                conversation,
                id,
                sender,
                content,
            } => {
                let id = id.unwrap_or_else(MessageId::generate);
                let event = self
                    .transport
                    .post_received(conversation, id, sender, content);
                if self.registry.on_event_received(event).await {
                    summary.forwarded += 1;
                }
            }
            ScriptStep::Sent {
                conversation,
                id,
                content,
            } => {
                let id = id.unwrap_or_else(MessageId::generate);
                let event = self.transport.post_sent(conversation, id, content);
                match self.registry.on_event_sent(event).await {
                    SentOutcome::Registered => summary.activations += 1,
                    SentOutcome::Deregistered => summary.deactivations += 1,
                    SentOutcome::Forwarded | SentOutcome::Ignored => {}
                }
            }
            ScriptStep::Edited {
                conversation,
                id,
                editor,
                content,
            } => {
                self.transport.edit(&id, content.clone());
                let edit = MessageEdit {
                    message_id: id,
                    conversation_id: conversation,
                    editor,
                    new_content: content,
                };
                if self.registry.on_message_edited(&edit).await.is_some() {
                    summary.edits_applied += 1;
                }
            }
            ScriptStep::Joined {
                conversation,
                member,
                name,
                role,
            } => {
                let info = MemberInfo::new(member, name).with_role(role);
                self.transport.add_member(&conversation, info.clone());
                self.registry.on_member_joined(&conversation, info).await;
            }
            ScriptStep::Left {
                conversation,
                member,
            } => {
                self.transport.remove_member(&conversation, &member);
                self.registry.on_member_left(&conversation, &member).await;
            }
            ScriptStep::Expire { id } => self.transport.expire(&id),
            ScriptStep::Sweep { conversation } => {
                if let Some(report) = self.registry.sweep(&conversation).await {
                    summary.sweeps += 1;
                    tracing::info!(
                        conversation = %conversation,
                        removed = report.removed,
                        retained = report.retained,
                        "forced sweep"
                    );
                }
            }
            ScriptStep::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }
}
