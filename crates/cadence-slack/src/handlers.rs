//! HTTP handlers: login flow, slash commands, interactive payloads, events.
//!
//! Login failures surface one generic message to the browser; the detailed
//! cause is logged only. Sync failures triggered from here are structured
//! outcomes aimed at administrators, not end users.

use axum::extract::{Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use cadence_directory::Organization;

use crate::api::SlackClient;
use crate::error::LoginError;
use crate::interactions::{Action, InteractionContext, Reply, SlashCommand};
use crate::router::ChatState;

/// Session cookie carrying the opaque key the state store is scoped by.
const SESSION_COOKIE_NAME: &str = "cadence_session";

/// Session cookie lifetime: long enough to span a login round trip.
const SESSION_COOKIE_MAX_AGE: i64 = 3600;

fn session_cookie(session_id: &str) -> String {
    // SameSite=Lax: the OAuth callback arrives as a cross-site redirect and
    // still needs the cookie.
    format!(
        "{SESSION_COOKIE_NAME}={session_id}; HttpOnly; Secure; SameSite=Lax; Path=/auth; Max-Age={SESSION_COOKIE_MAX_AGE}"
    )
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(COOKIE)?.to_str().ok()?;
    for part in cookie_str.split(';') {
        if let Some(value) = part.trim().strip_prefix(&format!("{SESSION_COOKIE_NAME}=")) {
            return Some(value.trim().to_string());
        }
    }
    None
}

fn forwarded_parts(headers: &HeaderMap) -> (Option<&str>, Option<&str>) {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok());
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|v| v.to_str().ok());
    (proto, host)
}

/// One generic browser-facing response per failure class; the diagnostic
/// stays in the log.
fn login_failure(error: &LoginError) -> Response {
    warn!(error = %error, "login attempt rejected");
    (StatusCode::BAD_REQUEST, error.user_message()).into_response()
}

fn login_disabled() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Slack login is not configured for this deployment.",
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// Organization slug the login is for.
    pub org: String,
}

/// `GET /auth/slack/login` — issue state and redirect to the platform.
pub async fn login(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Response {
    let Some(flow) = &state.login else {
        return login_disabled();
    };

    let session_id =
        extract_session_cookie(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());

    let (proto, host) = forwarded_parts(&headers);
    let (redirect_uri, source) = state.config.resolve_redirect_uri(proto, host);
    let csrf_state = state.states.issue(&session_id, &params.org);
    let authorize_url = flow.client.authorize_url(&csrf_state, &redirect_uri);

    info!(
        org = %params.org,
        redirect_source = ?source,
        "login started"
    );

    let mut response = Redirect::to(&authorize_url).into_response();
    if let Ok(cookie) = HeaderValue::from_str(&session_cookie(&session_id)) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the platform when the user denied the request.
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /auth/slack/callback` — validate state, exchange the code, verify the
/// identity token, then hand off to the web app to establish its session.
pub async fn callback(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(flow) = &state.login else {
        return login_disabled();
    };

    if let Some(denied) = &params.error {
        warn!(error = %denied, "authorization denied upstream");
        return (
            StatusCode::BAD_REQUEST,
            "Slack did not authorize the login. Please try again.",
        )
            .into_response();
    }

    let Some(session_id) = extract_session_cookie(&headers) else {
        return login_failure(&LoginError::StateMissing);
    };
    let received_state = params.state.as_deref().unwrap_or_default();
    let slug = match state.states.validate(&session_id, received_state) {
        Ok(slug) => slug,
        Err(e) => return login_failure(&e),
    };

    let Some(code) = params.code.as_deref() else {
        return login_failure(&LoginError::TokenExchangeFailed {
            status: None,
            detail: "callback carried no authorization code".to_string(),
        });
    };

    // Must resolve to the same value the authorization request used.
    let (proto, host) = forwarded_parts(&headers);
    let (redirect_uri, _) = state.config.resolve_redirect_uri(proto, host);

    let exchange = match flow.client.exchange_code(code, &redirect_uri).await {
        Ok(exchange) => exchange,
        Err(e) => return login_failure(&e),
    };
    let identity = match flow.verifier.verify(&exchange.id_token).await {
        Ok(identity) => identity,
        Err(e) => return login_failure(&e),
    };

    info!(
        org = %slug,
        external_user_id = %identity.external_user_id,
        external_team_id = %identity.external_team_id,
        "identity verified"
    );

    // Session establishment belongs to the web app; it receives the verified
    // login through its own backchannel and sets its cookie.
    let destination = format!(
        "{}/auth/complete?org={}",
        state.config.frontend_url.trim_end_matches('/'),
        urlencoding::encode(&slug)
    );
    Redirect::to(&destination).into_response()
}

async fn interaction_context(state: &ChatState, team_id: &str) -> Option<InteractionContext> {
    let org: Organization = match state.store.find_org_by_team(team_id).await {
        Ok(Some(org)) => org,
        Ok(None) => {
            warn!(team = %team_id, "interaction from unlinked workspace");
            return None;
        }
        Err(e) => {
            warn!(team = %team_id, error = %e, "organization lookup failed");
            return None;
        }
    };
    let chat = state
        .config
        .bot_token_for(&org.slug)
        .map(|token| SlackClient::new(&state.config.api_base_url, token));
    Some(InteractionContext {
        organization: org,
        store: state.store.clone(),
        reminders: state.reminders.clone(),
        chat,
    })
}

fn reply_json(reply: &Reply) -> Response {
    Json(json!({
        "response_type": reply.visibility.response_type(),
        "text": reply.text,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SlashCommandForm {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub channel_id: String,
    pub team_id: String,
}

/// `POST /slack/commands` — form-encoded slash command.
pub async fn slash_command(
    State(state): State<ChatState>,
    Form(form): Form<SlashCommandForm>,
) -> Response {
    let Some(ctx) = interaction_context(&state, &form.team_id).await else {
        return reply_json(&Reply::ephemeral(
            "This workspace isn't linked to a Cadence organization yet.",
        ));
    };
    let command = SlashCommand {
        command: form.command,
        external_user_id: form.user_id,
        user_name: form.user_name,
        text: form.text,
        channel_id: form.channel_id,
    };
    let reply = state.interactions.dispatch_command(&ctx, &command).await;
    reply_json(&reply)
}

#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    /// The platform wraps the JSON payload in a form field.
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(default)]
    actions: Vec<PayloadAction>,
    user: PayloadUser,
    team: PayloadTeam,
}

#[derive(Debug, Deserialize)]
struct PayloadAction {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayloadTeam {
    id: String,
}

/// `POST /slack/interactions` — interactive component payload.
pub async fn interaction(
    State(state): State<ChatState>,
    Form(form): Form<InteractionForm>,
) -> Response {
    let payload: InteractionPayload = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "undecodable interaction payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let Some(first) = payload.actions.first() else {
        return StatusCode::OK.into_response();
    };
    let Some(ctx) = interaction_context(&state, &payload.team.id).await else {
        return reply_json(&Reply::ephemeral(
            "This workspace isn't linked to a Cadence organization yet.",
        ));
    };
    let action = Action {
        action_id: first.action_id.clone(),
        external_user_id: payload.user.id.clone(),
        value: first.value.clone(),
    };
    let reply = state.interactions.dispatch_action(&ctx, &action).await;
    reply_json(&reply)
}

#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub event: Option<InnerEvent>,
}

#[derive(Debug, Deserialize)]
pub struct InnerEvent {
    #[serde(rename = "type")]
    pub kind: String,
}

/// `POST /slack/events` — event subscriptions.
///
/// Membership changes trigger the same sync function as the scheduler; the
/// request is acknowledged immediately and the run happens in the background.
pub async fn event(
    State(state): State<ChatState>,
    Json(envelope): Json<EventEnvelope>,
) -> Response {
    if envelope.kind == "url_verification" {
        return Json(json!({ "challenge": envelope.challenge.unwrap_or_default() }))
            .into_response();
    }

    if let (Some(team_id), Some(inner)) = (envelope.team_id, envelope.event) {
        if matches!(
            inner.kind.as_str(),
            "member_joined_channel" | "member_left_channel"
        ) {
            info!(team = %team_id, event = %inner.kind, "membership change, scheduling sync");
            let sync = state.sync.clone();
            tokio::spawn(async move {
                let outcome = sync.sync_by_team(&team_id).await;
                if let Some(error) = &outcome.error {
                    warn!(
                        team = %team_id,
                        code = error.error_code(),
                        error = %error,
                        remediation = error.remediation(),
                        "webhook-triggered sync failed"
                    );
                }
            });
        }
    }

    StatusCode::OK.into_response()
}
