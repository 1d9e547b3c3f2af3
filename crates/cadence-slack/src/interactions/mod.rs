//! Dispatch of inbound slash commands and interactive payloads.
//!
//! Handlers are registered in a map keyed by command name or action id; the
//! dispatcher itself never grows a case per feature. Every dispatch returns
//! an acknowledgement [`Reply`] — whether that reply is ephemeral or public
//! is a property of the reply, not of whatever broadcast the handler may have
//! triggered on the side. Handlers read and write directory records but never
//! re-run a full sync.

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use cadence_directory::{DirectoryError, DirectoryStore, Organization, ReminderQueue};

use crate::api::SlackClient;

/// An inbound slash command, already attributed to an organization.
#[derive(Debug, Clone)]
pub struct SlashCommand {
    /// The command name including the slash, e.g. `/checkin`.
    pub command: String,
    pub external_user_id: String,
    pub user_name: Option<String>,
    pub text: String,
    pub channel_id: String,
}

/// An inbound interactive action (button press, menu selection).
#[derive(Debug, Clone)]
pub struct Action {
    pub action_id: String,
    pub external_user_id: String,
    pub value: Option<String>,
}

/// Who can see an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyVisibility {
    /// Only the invoking user.
    Ephemeral,
    /// Everyone in the channel.
    InChannel,
}

impl ReplyVisibility {
    /// Wire value for the platform's `response_type` field.
    #[must_use]
    pub fn response_type(self) -> &'static str {
        match self {
            ReplyVisibility::Ephemeral => "ephemeral",
            ReplyVisibility::InChannel => "in_channel",
        }
    }
}

/// Acknowledgement returned to the platform for one dispatch.
#[derive(Debug, Clone)]
pub struct Reply {
    pub visibility: ReplyVisibility,
    pub text: String,
}

impl Reply {
    #[must_use]
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            visibility: ReplyVisibility::Ephemeral,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn in_channel(text: impl Into<String>) -> Self {
        Self {
            visibility: ReplyVisibility::InChannel,
            text: text.into(),
        }
    }
}

/// Failures inside a handler. Dispatch converts these into an apologetic
/// ephemeral reply; details go to the log.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("interaction failed: {detail}")]
    Failed { detail: String },
}

/// Everything a handler may touch.
pub struct InteractionContext {
    pub organization: Organization,
    pub store: Arc<dyn DirectoryStore>,
    pub reminders: Arc<dyn ReminderQueue>,
    /// Client bound to the organization's bot token, when one is configured.
    pub chat: Option<SlackClient>,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &InteractionContext,
        command: &SlashCommand,
    ) -> Result<Reply, InteractionError>;
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &InteractionContext,
        action: &Action,
    ) -> Result<Reply, InteractionError>;
}

/// Registration map from command names and action ids to handlers.
#[derive(Default)]
pub struct InteractionRouter {
    commands: HashMap<String, Arc<dyn CommandHandler>>,
    actions: HashMap<String, Arc<dyn ActionHandler>>,
}

impl InteractionRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the built-in Cadence handlers registered.
    #[must_use]
    pub fn with_builtin_handlers() -> Self {
        let mut router = Self::new();
        router.register_command("/checkin", Arc::new(handlers::CheckinCommand));
        router.register_action("checkin_remind_later", Arc::new(handlers::RemindLaterAction));
        router
    }

    pub fn register_command(&mut self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.commands.insert(name.to_string(), handler);
    }

    pub fn register_action(&mut self, action_id: &str, handler: Arc<dyn ActionHandler>) {
        self.actions.insert(action_id.to_string(), handler);
    }

    /// Dispatch a slash command; always produces an acknowledgement.
    pub async fn dispatch_command(
        &self,
        ctx: &InteractionContext,
        command: &SlashCommand,
    ) -> Reply {
        let Some(handler) = self.commands.get(&command.command) else {
            return Reply::ephemeral(format!(
                "Sorry, I don't recognize the command {}.",
                command.command
            ));
        };
        match handler.handle(ctx, command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    command = %command.command,
                    org = %ctx.organization.slug,
                    error = %e,
                    "command handler failed"
                );
                Reply::ephemeral("Something went wrong handling that command. Please try again.")
            }
        }
    }

    /// Dispatch an interactive action; always produces an acknowledgement.
    pub async fn dispatch_action(&self, ctx: &InteractionContext, action: &Action) -> Reply {
        let Some(handler) = self.actions.get(&action.action_id) else {
            return Reply::ephemeral("Sorry, that button isn't wired up anymore.");
        };
        match handler.handle(ctx, action).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    action = %action.action_id,
                    org = %ctx.organization.slug,
                    error = %e,
                    "action handler failed"
                );
                Reply::ephemeral("Something went wrong handling that action. Please try again.")
            }
        }
    }
}
