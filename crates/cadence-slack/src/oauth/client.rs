//! Authorization URL construction and authorization-code exchange.

use std::time::Duration;

use serde::Deserialize;

use crate::config::SlackAuthConfig;
use crate::error::LoginError;

/// Scopes requested for login. Identity claims only: the login flow must not
/// accumulate message-send permissions.
const LOGIN_SCOPES: &str = "openid,profile,email";

/// Timeout for the token-endpoint call.
const TOKEN_EXCHANGE_TIMEOUT_SECS: u64 = 10;

/// Result of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: String,
    pub id_token: String,
    /// Workspace the code was minted in, when the platform reports it.
    pub team_id: Option<String>,
}

/// Slack's token-endpoint envelope.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    ok: bool,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    team: Option<TeamStub>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamStub {
    id: String,
}

/// Client for the OpenID-Connect endpoints.
///
/// Constructed once at startup and injected wherever the login flow runs; a
/// second organization with different credentials simply gets a second
/// instance.
#[derive(Clone)]
pub struct OidcClient {
    auth: SlackAuthConfig,
    authorize_url: String,
    token_url: String,
    http: reqwest::Client,
}

impl OidcClient {
    #[must_use]
    pub fn new(auth: SlackAuthConfig, authorize_url: &str, api_base_url: &str) -> Self {
        Self {
            auth,
            authorize_url: authorize_url.to_string(),
            token_url: format!("{api_base_url}/openid.connect.token"),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(TOKEN_EXCHANGE_TIMEOUT_SECS))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// The configured client id (the expected identity-token audience).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.auth.client_id
    }

    /// Build the authorization URL the browser is redirected to.
    #[must_use]
    pub fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&scope={}&redirect_uri={}&state={}&response_type=code",
            self.authorize_url,
            urlencoding::encode(&self.auth.client_id),
            urlencoding::encode(LOGIN_SCOPES),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `redirect_uri` must be the exact value used in the authorization
    /// request.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchange, LoginError> {
        let params = [
            ("client_id", self.auth.client_id.as_str()),
            ("client_secret", self.auth.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| LoginError::TokenExchangeFailed {
                status: None,
                detail: format!("transport error: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                detail: format!("token endpoint returned HTTP {status}"),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| LoginError::TokenExchangeFailed {
                    status: Some(status.as_u16()),
                    detail: format!("unreadable token response: {e}"),
                })?;

        if !body.ok {
            return Err(LoginError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                detail: format!(
                    "token endpoint rejected the grant: {}",
                    body.error.as_deref().unwrap_or("unknown_error")
                ),
            });
        }

        match (body.access_token, body.id_token) {
            (Some(access_token), Some(id_token)) => Ok(TokenExchange {
                access_token,
                id_token,
                team_id: body.team.map(|t| t.id),
            }),
            _ => Err(LoginError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                detail: "token response missing access_token or id_token".to_string(),
            }),
        }
    }
}
