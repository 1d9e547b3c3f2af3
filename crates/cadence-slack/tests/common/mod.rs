//! Shared mock-server plumbing for the integration tests.
//!
//! Mirrors the Slack Web API closely enough for the client under test:
//! `{ok, error}` envelopes, cursor pagination, and per-user profile lookups.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Responds with each body in turn, then repeats the last one.
pub struct SequentialResponder {
    bodies: Vec<Value>,
    index: Arc<AtomicUsize>,
}

impl SequentialResponder {
    pub fn new(bodies: Vec<Value>) -> Self {
        Self {
            bodies,
            index: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Respond for SequentialResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let body = self
            .bodies
            .get(i)
            .or_else(|| self.bodies.last())
            .cloned()
            .unwrap_or_else(|| json!({ "ok": false, "error": "fatal_error" }));
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// `conversations.members` page body.
pub fn members_body(ids: &[String], next_cursor: Option<&str>) -> Value {
    json!({
        "ok": true,
        "members": ids,
        "response_metadata": { "next_cursor": next_cursor.unwrap_or("") }
    })
}

/// `conversations.list` page body.
pub fn channels_body(channels: &[(&str, &str)], next_cursor: Option<&str>) -> Value {
    let channels: Vec<Value> = channels
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    json!({
        "ok": true,
        "channels": channels,
        "response_metadata": { "next_cursor": next_cursor.unwrap_or("") }
    })
}

/// Mount a successful `conversations.info` for a direct channel id.
pub async fn mount_channel_info_ok(server: &MockServer, channel_id: &str) {
    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": channel_id, "name": "team" }
        })))
        .mount(server)
        .await;
}

/// Mount a platform error for any call to `api_method`.
pub async fn mount_platform_error(server: &MockServer, api_method: &str, code: &str) {
    Mock::given(path(format!("/{api_method}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": code })),
        )
        .mount(server)
        .await;
}

/// Mount the member-id pages for one channel, in order.
pub async fn mount_member_pages(server: &MockServer, pages: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/conversations.members"))
        .respond_with(SequentialResponder::new(pages))
        .mount(server)
        .await;
}

/// Profile responder that derives a healthy profile from the requested user
/// id, optionally failing for specific ids.
pub struct ProfileResponder {
    failing_ids: Vec<String>,
}

impl ProfileResponder {
    pub fn new() -> Self {
        Self {
            failing_ids: Vec::new(),
        }
    }

    pub fn failing_for(mut self, ids: &[&str]) -> Self {
        self.failing_ids = ids.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

impl Respond for ProfileResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let user = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "user")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        if self.failing_ids.contains(&user) {
            return ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": false, "error": "user_not_found" }));
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "user": {
                "id": user,
                "real_name": format!("Member {user}"),
                "profile": { "email": format!("{}@acme.test", user.to_lowercase()) },
                "deleted": false,
                "is_bot": false
            }
        }))
    }
}

/// Mount the catch-all profile lookup.
pub async fn mount_profiles(server: &MockServer, responder: ProfileResponder) {
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// Mount one explicit `users.info` profile.
pub async fn mount_profile(
    server: &MockServer,
    id: &str,
    name: &str,
    email: Option<&str>,
    deleted: bool,
    is_bot: bool,
) {
    use wiremock::matchers::query_param;
    Mock::given(method("GET"))
        .and(path("/users.info"))
        .and(query_param("user", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "user": {
                "id": id,
                "real_name": name,
                "profile": { "email": email },
                "deleted": deleted,
                "is_bot": is_bot
            }
        })))
        .mount(server)
        .await;
}

/// DM responder: opens `D-<user>` for every request, optionally failing for
/// specific user ids.
pub struct OpenDmResponder {
    failing_ids: Vec<String>,
}

impl OpenDmResponder {
    pub fn new() -> Self {
        Self {
            failing_ids: Vec::new(),
        }
    }

    pub fn failing_for(mut self, ids: &[&str]) -> Self {
        self.failing_ids = ids.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

impl Respond for OpenDmResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let user = body["users"].as_str().unwrap_or_default().to_string();
        if self.failing_ids.contains(&user) {
            return ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": false, "error": "user_not_found" }));
        }
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": format!("D-{user}") }
        }))
    }
}

/// Mount DM opening and message posting as always-succeeding (unless the
/// responder says otherwise).
pub async fn mount_messaging(server: &MockServer, open_dm: OpenDmResponder) {
    Mock::given(method("POST"))
        .and(path("/conversations.open"))
        .respond_with(open_dm)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}
