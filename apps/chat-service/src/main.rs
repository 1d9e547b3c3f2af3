//! Cadence chat-platform integration service.
//!
//! Hosts the Slack login flow, the slash-command/interaction endpoints, the
//! membership-event webhook, the periodic directory sync, and the reminder
//! poller.

mod config;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cadence_directory::{
    DirectoryStore, PgDirectoryStore, PgReminderQueue, ReminderQueue,
};
use cadence_slack::api::SlackClient;
use cadence_slack::interactions::InteractionRouter;
use cadence_slack::sync::{BillingNotifier, HttpBillingNotifier, NoopBillingNotifier};
use cadence_slack::{chat_router, ChatState, SyncService};

use config::AppConfig;

/// Reminders fetched per poll.
const REMINDER_BATCH: i64 = 50;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        env = %config.app_env,
        "starting chat service"
    );

    let pool = match PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "database connection failed");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn DirectoryStore> = Arc::new(PgDirectoryStore::new(pool.clone()));
    let reminders: Arc<dyn ReminderQueue> = Arc::new(PgReminderQueue::new(pool));
    let slack_config = Arc::new(config.slack.clone());

    let billing: Arc<dyn BillingNotifier> = match &slack_config.billing_webhook_url {
        Some(url) => Arc::new(HttpBillingNotifier::new(url)),
        None => {
            warn!("BILLING_WEBHOOK_URL not set, billing notifications disabled");
            Arc::new(NoopBillingNotifier)
        }
    };

    let sync = Arc::new(SyncService::new(
        Arc::clone(&slack_config),
        Arc::clone(&store),
        billing,
    ));
    let interactions = Arc::new(InteractionRouter::with_builtin_handlers());

    let state = ChatState::new(
        Arc::clone(&slack_config),
        Arc::clone(&store),
        Arc::clone(&reminders),
        Arc::clone(&sync),
        interactions,
    );

    tokio::spawn(run_periodic_sync(
        Arc::clone(&sync),
        Arc::clone(&store),
        config.sync_interval,
    ));
    tokio::spawn(run_reminder_poller(
        Arc::clone(&reminders),
        Arc::clone(&store),
        Arc::clone(&slack_config),
        config.reminder_poll_interval,
    ));

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(chat_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid listen address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %addr, "bind failed");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "listening");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// The scheduled trigger: same sync function as the webhook, on an interval.
async fn run_periodic_sync(
    sync: Arc<SyncService>,
    store: Arc<dyn DirectoryStore>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let organizations = match store.list_organizations().await {
            Ok(orgs) => orgs,
            Err(e) => {
                error!(error = %e, "could not list organizations for sync");
                continue;
            }
        };
        for org in organizations {
            let outcome = sync.sync_organization(&org).await;
            if let Some(error) = &outcome.error {
                warn!(
                    org = %org.slug,
                    code = error.error_code(),
                    error = %error,
                    remediation = error.remediation(),
                    "scheduled sync failed"
                );
            }
        }
    }
}

/// Deliver due reminders; failures stay queued for the next poll.
async fn run_reminder_poller(
    reminders: Arc<dyn ReminderQueue>,
    store: Arc<dyn DirectoryStore>,
    config: Arc<cadence_slack::SlackConfig>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let due = match reminders.due(Utc::now(), REMINDER_BATCH).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "reminder poll failed");
                continue;
            }
        };
        if due.is_empty() {
            continue;
        }

        let organizations = match store.list_organizations().await {
            Ok(orgs) => orgs,
            Err(e) => {
                error!(error = %e, "could not list organizations for reminders");
                continue;
            }
        };

        for reminder in due {
            let Some(org) = organizations
                .iter()
                .find(|o| o.id == reminder.organization_id)
            else {
                warn!(reminder = %reminder.id, "reminder for unknown organization, skipping");
                continue;
            };
            let Some(token) = config.bot_token_for(&org.slug) else {
                warn!(org = %org.slug, "no bot token, reminder stays queued");
                continue;
            };
            let chat = SlackClient::new(&config.api_base_url, token);

            let delivered = async {
                let dm = chat.open_dm(&reminder.external_user_id).await?;
                chat.post_message(&dm, &reminder.message, None).await
            }
            .await;

            match delivered {
                Ok(()) => {
                    if let Err(e) = reminders.mark_delivered(reminder.id).await {
                        error!(reminder = %reminder.id, error = %e, "could not mark reminder delivered");
                    }
                }
                Err(e) => {
                    warn!(
                        reminder = %reminder.id,
                        user = %reminder.external_user_id,
                        error = %e,
                        "reminder delivery failed, will retry next poll"
                    );
                }
            }
        }
    }
}
