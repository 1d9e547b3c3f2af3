//! Slack integration configuration.
//!
//! Everything here is resolved once at startup and passed in; no call site
//! reads environment variables directly. Redirect-URI resolution in
//! particular is a single precedence function over named sources rather than
//! conditionals scattered across handlers.

use std::collections::HashMap;

/// Default Slack endpoints. Overridable for tests.
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://slack.com/openid/connect/authorize";
pub const DEFAULT_JWKS_URL: &str = "https://slack.com/openid/connect/keys";
pub const DEFAULT_ISSUER: &str = "https://slack.com";

/// Production redirect-URI fallback, used when neither request headers nor an
/// override are available (e.g. a CLI-triggered login link).
pub const FALLBACK_REDIRECT_URI: &str = "https://app.cadence.team/auth/slack/callback";

/// Raised at startup when the login feature cannot be enabled.
#[derive(Debug, thiserror::Error)]
#[error("OAuth credentials missing: {var} is not set")]
pub struct AuthConfigMissing {
    pub var: &'static str,
}

/// Client credentials for the login flow.
///
/// Absence of these disables login (logged once at startup) without touching
/// directory sync, which authenticates with bot tokens instead.
#[derive(Debug, Clone)]
pub struct SlackAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl SlackAuthConfig {
    /// Build from optional credential values, typically straight from env.
    pub fn from_values(
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self, AuthConfigMissing> {
        let client_id = client_id
            .filter(|s| !s.is_empty())
            .ok_or(AuthConfigMissing {
                var: "SLACK_CLIENT_ID",
            })?;
        let client_secret = client_secret
            .filter(|s| !s.is_empty())
            .ok_or(AuthConfigMissing {
                var: "SLACK_CLIENT_SECRET",
            })?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// The channel whose membership drives directory sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// An opaque channel id (`C…`/`G…`/`D…`), used directly.
    Id(String),
    /// A human channel name, resolved through the paginated catalog.
    Name(String),
}

impl ChannelRef {
    /// Classify a configured value by its shape.
    ///
    /// Slack channel ids start with `C`, `G` or `D` followed by at least
    /// seven uppercase alphanumerics. Anything else (including values with a
    /// leading `#`) is treated as a name.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let looks_like_id = value.len() >= 8
            && matches!(value.as_bytes()[0], b'C' | b'G' | b'D')
            && value[1..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if looks_like_id {
            ChannelRef::Id(value.to_string())
        } else {
            ChannelRef::Name(value.trim_start_matches('#').to_string())
        }
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Name(name) => write!(f, "#{name}"),
        }
    }
}

/// Which source produced a resolved redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectUriSource {
    /// Derived from the incoming request's forwarded proto/host headers.
    RequestHeaders,
    /// The explicit configuration override.
    Override,
    /// The hard-coded production fallback.
    Fallback,
}

/// Full configuration of the integration.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Login credentials; `None` disables the login flow.
    pub auth: Option<SlackAuthConfig>,
    /// Explicit redirect-URI override.
    pub redirect_override: Option<String>,
    /// Global bot token fallback.
    pub bot_token: Option<String>,
    /// Per-organization bot tokens keyed by organization slug.
    pub org_bot_tokens: HashMap<String, String>,
    /// The synced channel.
    pub channel: ChannelRef,
    /// Channel for administrator-facing sync summaries.
    pub private_channel_id: Option<String>,
    /// Where the web app lives; used for post-login redirects and setup links.
    pub frontend_url: String,
    /// Billing webhook endpoint; `None` silences billing notifications.
    pub billing_webhook_url: Option<String>,
    pub api_base_url: String,
    pub authorize_url: String,
    pub jwks_url: String,
    pub issuer: String,
}

impl SlackConfig {
    /// Baseline configuration against production Slack endpoints.
    #[must_use]
    pub fn new(auth: Option<SlackAuthConfig>, channel: ChannelRef, frontend_url: String) -> Self {
        Self {
            auth,
            redirect_override: None,
            bot_token: None,
            org_bot_tokens: HashMap::new(),
            channel,
            private_channel_id: None,
            frontend_url,
            billing_webhook_url: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            jwks_url: DEFAULT_JWKS_URL.to_string(),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// The bot token for one organization: per-organization entry first,
    /// global fallback second.
    #[must_use]
    pub fn bot_token_for(&self, slug: &str) -> Option<&str> {
        self.org_bot_tokens
            .get(slug)
            .or(self.bot_token.as_ref())
            .map(String::as_str)
    }

    /// Resolve the redirect URI for a login request.
    ///
    /// Precedence: request-derived headers, then the configured override,
    /// then the production fallback. The winning source is returned alongside
    /// the URI so callers can log it.
    #[must_use]
    pub fn resolve_redirect_uri(
        &self,
        forwarded_proto: Option<&str>,
        host: Option<&str>,
    ) -> (String, RedirectUriSource) {
        if let Some(host) = host {
            let proto = forwarded_proto.unwrap_or("https");
            return (
                format!("{proto}://{host}/auth/slack/callback"),
                RedirectUriSource::RequestHeaders,
            );
        }
        if let Some(uri) = &self.redirect_override {
            return (uri.clone(), RedirectUriSource::Override);
        }
        (
            FALLBACK_REDIRECT_URI.to_string(),
            RedirectUriSource::Fallback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SlackConfig {
        SlackConfig::new(
            None,
            ChannelRef::parse("#team"),
            "https://app.cadence.test".to_string(),
        )
    }

    #[test]
    fn test_auth_config_requires_both_credentials() {
        let err = SlackAuthConfig::from_values(Some("id".into()), None).unwrap_err();
        assert_eq!(err.var, "SLACK_CLIENT_SECRET");

        let err = SlackAuthConfig::from_values(None, Some("secret".into())).unwrap_err();
        assert_eq!(err.var, "SLACK_CLIENT_ID");

        let err = SlackAuthConfig::from_values(Some(String::new()), Some("secret".into()))
            .unwrap_err();
        assert_eq!(err.var, "SLACK_CLIENT_ID");

        assert!(SlackAuthConfig::from_values(Some("id".into()), Some("secret".into())).is_ok());
    }

    #[test]
    fn test_channel_ref_shape_detection() {
        assert_eq!(
            ChannelRef::parse("C0123ABCD"),
            ChannelRef::Id("C0123ABCD".into())
        );
        assert_eq!(
            ChannelRef::parse("G9ZZZ9999"),
            ChannelRef::Id("G9ZZZ9999".into())
        );
        assert_eq!(ChannelRef::parse("#team"), ChannelRef::Name("team".into()));
        assert_eq!(ChannelRef::parse("team"), ChannelRef::Name("team".into()));
        // Lowercase tail means it is a name, not an id.
        assert_eq!(
            ChannelRef::parse("Checkins"),
            ChannelRef::Name("Checkins".into())
        );
        // Too short for an id.
        assert_eq!(ChannelRef::parse("C12"), ChannelRef::Name("C12".into()));
    }

    #[test]
    fn test_bot_token_precedence() {
        let mut cfg = config();
        assert!(cfg.bot_token_for("acme").is_none());

        cfg.bot_token = Some("xoxb-global".into());
        assert_eq!(cfg.bot_token_for("acme"), Some("xoxb-global"));

        cfg.org_bot_tokens
            .insert("acme".into(), "xoxb-acme".into());
        assert_eq!(cfg.bot_token_for("acme"), Some("xoxb-acme"));
        assert_eq!(cfg.bot_token_for("globex"), Some("xoxb-global"));
    }

    #[test]
    fn test_redirect_uri_precedence() {
        let mut cfg = config();
        cfg.redirect_override = Some("https://override.cadence.test/cb".into());

        let (uri, source) = cfg.resolve_redirect_uri(Some("https"), Some("req.cadence.test"));
        assert_eq!(uri, "https://req.cadence.test/auth/slack/callback");
        assert_eq!(source, RedirectUriSource::RequestHeaders);

        let (uri, source) = cfg.resolve_redirect_uri(None, None);
        assert_eq!(uri, "https://override.cadence.test/cb");
        assert_eq!(source, RedirectUriSource::Override);

        cfg.redirect_override = None;
        let (uri, source) = cfg.resolve_redirect_uri(None, None);
        assert_eq!(uri, FALLBACK_REDIRECT_URI);
        assert_eq!(source, RedirectUriSource::Fallback);
    }

    #[test]
    fn test_header_derived_defaults_to_https() {
        let cfg = config();
        let (uri, _) = cfg.resolve_redirect_uri(None, Some("req.cadence.test"));
        assert!(uri.starts_with("https://"));
    }
}
