//! Built-in interaction handlers.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use cadence_directory::{InternalUserRecord, NewReminder, NewUser, Role};

use super::{
    Action, ActionHandler, CommandHandler, InteractionContext, InteractionError, Reply,
    SlashCommand,
};

/// How far out "remind me later" schedules the nudge.
const REMIND_LATER: Duration = Duration::hours(2);

/// `/checkin` — record that the user is checking in.
///
/// Ensures the invoking user has a directory record (creating one on first
/// interaction), broadcasts the check-in to the channel as a side effect, and
/// acknowledges ephemerally. The check-in content itself lives in the web
/// app; the command only announces it.
pub struct CheckinCommand;

#[async_trait]
impl CommandHandler for CheckinCommand {
    async fn handle(
        &self,
        ctx: &InteractionContext,
        command: &SlashCommand,
    ) -> Result<Reply, InteractionError> {
        let record = ensure_record(ctx, &command.external_user_id, command.user_name.as_deref())
            .await?;

        // Broadcast is a side effect; the acknowledgement below stays
        // ephemeral regardless of whether the post lands.
        if let Some(chat) = &ctx.chat {
            let broadcast = format!(":speech_balloon: *{}* just checked in!", record.name);
            if let Err(e) = chat
                .post_message(&command.channel_id, &broadcast, None)
                .await
            {
                warn!(org = %ctx.organization.slug, error = %e, "check-in broadcast failed");
            }
        }

        Ok(Reply::ephemeral(
            "Check-in noted! Open Cadence to fill in the details.",
        ))
    }
}

/// `checkin_remind_later` — snooze the check-in prompt.
///
/// Schedules a durable reminder; the service's poller delivers it even if the
/// process restarts in between.
pub struct RemindLaterAction;

#[async_trait]
impl ActionHandler for RemindLaterAction {
    async fn handle(
        &self,
        ctx: &InteractionContext,
        action: &Action,
    ) -> Result<Reply, InteractionError> {
        let due_at = Utc::now() + REMIND_LATER;
        ctx.reminders
            .schedule(NewReminder {
                organization_id: ctx.organization.id,
                external_user_id: action.external_user_id.clone(),
                message: "Time for your check-in! Open Cadence when you have a minute."
                    .to_string(),
                due_at,
            })
            .await?;

        info!(
            org = %ctx.organization.slug,
            user = %action.external_user_id,
            due_at = %due_at,
            "check-in reminder scheduled"
        );
        Ok(Reply::ephemeral("Okay, I'll nudge you again in two hours."))
    }
}

/// Look up the invoking user's record, creating a minimal one on first
/// interaction. Creation wants an email, which only the platform knows.
async fn ensure_record(
    ctx: &InteractionContext,
    external_user_id: &str,
    user_name: Option<&str>,
) -> Result<InternalUserRecord, InteractionError> {
    if let Some(record) = ctx
        .store
        .find_by_external_id(ctx.organization.id, external_user_id)
        .await?
    {
        return Ok(record);
    }

    let Some(chat) = &ctx.chat else {
        return Err(InteractionError::Failed {
            detail: "no bot token configured, cannot look up profile".to_string(),
        });
    };
    let info = chat
        .users_info(external_user_id)
        .await
        .map_err(|e| InteractionError::Failed {
            detail: format!("profile lookup failed: {e}"),
        })?;
    let Some(email) = info.profile.email.clone() else {
        return Err(InteractionError::Failed {
            detail: format!("profile {external_user_id} has no email"),
        });
    };

    let name = user_name
        .map(str::to_string)
        .unwrap_or_else(|| info.display_name());
    let record = ctx
        .store
        .insert_user(NewUser {
            organization_id: ctx.organization.id,
            external_id: Some(external_user_id.to_string()),
            email,
            name,
            role: Role::Member,
            setup_token_hash: None,
        })
        .await?;
    info!(
        org = %ctx.organization.slug,
        user = %record.id,
        "directory record created on first interaction"
    );
    Ok(record)
}
