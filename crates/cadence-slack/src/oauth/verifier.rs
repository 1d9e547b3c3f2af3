//! Identity-token verification against Slack's published key set.
//!
//! Signature first, claims second: the token is decoded with the key named by
//! its `kid` header (algorithm taken from the JWK, never from the token
//! header), then issuer and audience are checked separately so that a
//! mis-addressed token is rejected no matter what signed it.

use std::time::Duration;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use moka::sync::Cache;
use serde::Deserialize;
use tracing::info;

use crate::error::LoginError;

/// Upper bound on a key-set response body.
const MAX_JWKS_BYTES: usize = 256 * 1024;

/// Key-set cache TTL.
const JWKS_CACHE_TTL_SECS: u64 = 600;

/// Fetch timeout for the key-set endpoint.
const JWKS_FETCH_TIMEOUT_SECS: u64 = 10;

/// Clock-skew leeway for expiry validation.
const EXP_LEEWAY_SECS: u64 = 60;

/// Claims carried by Slack's OpenID-Connect identity token.
///
/// The platform-specific user and team ids arrive as namespaced claims.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackIdTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "https://slack.com/user_id")]
    pub user_id: String,
    #[serde(rename = "https://slack.com/team_id")]
    pub team_id: String,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::One(s) => s == value,
            Audience::Many(v) => v.iter().any(|s| s == value),
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Audience::One(s) => write!(f, "{s}"),
            Audience::Many(v) => write!(f, "{}", v.join(",")),
        }
    }
}

/// The identity established by a verified token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub external_user_id: String,
    pub external_team_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// RFC 7517 key set.
#[derive(Debug, Clone, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Verifies identity tokens with a cached remote key set.
///
/// One instance per configuration, injected through state; the cache lives on
/// the instance so differently configured verifiers never share keys.
#[derive(Clone)]
pub struct IdentityVerifier {
    client_id: String,
    issuer: String,
    jwks_url: String,
    http: reqwest::Client,
    cache: Cache<String, JwkSet>,
}

impl IdentityVerifier {
    #[must_use]
    pub fn new(client_id: &str, issuer: &str, jwks_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            issuer: issuer.to_string(),
            jwks_url: jwks_url.to_string(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(JWKS_FETCH_TIMEOUT_SECS))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            cache: Cache::builder()
                .max_capacity(2)
                .time_to_live(Duration::from_secs(JWKS_CACHE_TTL_SECS))
                .build(),
        }
    }

    /// Verify signature, expiry, issuer and audience of an identity token.
    pub async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, LoginError> {
        let header = decode_header(id_token).map_err(|e| LoginError::SignatureInvalid {
            detail: format!("undecodable token header: {e}"),
        })?;
        let kid = header.kid.ok_or_else(|| LoginError::SignatureInvalid {
            detail: "token header has no kid".to_string(),
        })?;

        let jwk = self.key_for(&kid).await?;
        let (key, algorithm) = build_decoding_key(&jwk)?;

        // Issuer and audience are checked by `check_claims` below so the
        // failures map to distinct variants; jsonwebtoken only enforces
        // signature and expiry here.
        let mut validation = Validation::new(algorithm);
        validation.leeway = EXP_LEEWAY_SECS;
        validation.validate_aud = false;

        let decoded = decode::<SlackIdTokenClaims>(id_token, &key, &validation)
            .map_err(map_decode_error)?;

        check_claims(&decoded.claims, &self.issuer, &self.client_id)?;

        let claims = decoded.claims;
        Ok(VerifiedIdentity {
            external_user_id: claims.user_id,
            external_team_id: claims.team_id,
            email: claims.email,
            name: claims.name,
        })
    }

    /// Find the key named by `kid`, refreshing the cached set once if the kid
    /// is unknown (key rotation).
    async fn key_for(&self, kid: &str) -> Result<Jwk, LoginError> {
        let jwks = match self.cache.get(&self.jwks_url) {
            Some(cached) => cached,
            None => {
                let fetched = self.fetch_jwks().await?;
                self.cache.insert(self.jwks_url.clone(), fetched.clone());
                fetched
            }
        };

        if let Some(key) = jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid)) {
            return Ok(key.clone());
        }

        info!(kid, "kid not in cached key set, refreshing");
        self.cache.invalidate(&self.jwks_url);
        let refreshed = self.fetch_jwks().await?;
        let key = refreshed
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
            .ok_or_else(|| LoginError::SignatureInvalid {
                detail: format!("no key for kid {kid} even after refresh"),
            })?;
        self.cache.insert(self.jwks_url.clone(), refreshed);
        Ok(key)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, LoginError> {
        let response = self.http.get(&self.jwks_url).send().await.map_err(|e| {
            LoginError::SignatureInvalid {
                detail: format!("key set unreachable: {e}"),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::SignatureInvalid {
                detail: format!("key set fetch returned HTTP {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoginError::SignatureInvalid {
                detail: format!("key set body unreadable: {e}"),
            })?;
        if bytes.len() > MAX_JWKS_BYTES {
            return Err(LoginError::SignatureInvalid {
                detail: format!("key set body too large: {} bytes", bytes.len()),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| LoginError::SignatureInvalid {
            detail: format!("key set unparsable: {e}"),
        })
    }
}

/// Issuer/audience validation, separated from signature checking so it can be
/// exercised on bare claims.
fn check_claims(
    claims: &SlackIdTokenClaims,
    expected_issuer: &str,
    expected_audience: &str,
) -> Result<(), LoginError> {
    if claims.iss != expected_issuer {
        return Err(LoginError::IssuerMismatch {
            found: claims.iss.clone(),
        });
    }
    if !claims.aud.contains(expected_audience) {
        return Err(LoginError::AudienceMismatch {
            found: claims.aud.to_string(),
        });
    }
    Ok(())
}

/// Build the decoding key, taking the algorithm from the JWK itself so a
/// token header cannot downgrade or confuse it. Slack signs with RSA.
fn build_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), LoginError> {
    if jwk.kty != "RSA" {
        return Err(LoginError::SignatureInvalid {
            detail: format!("unsupported key type {}", jwk.kty),
        });
    }
    let n = jwk.n.as_ref().ok_or_else(|| LoginError::SignatureInvalid {
        detail: "RSA key missing modulus".to_string(),
    })?;
    let e = jwk.e.as_ref().ok_or_else(|| LoginError::SignatureInvalid {
        detail: "RSA key missing exponent".to_string(),
    })?;
    let key =
        DecodingKey::from_rsa_components(n, e).map_err(|e| LoginError::SignatureInvalid {
            detail: format!("unusable RSA components: {e}"),
        })?;
    let algorithm = match jwk.alg.as_deref() {
        Some("RS384") => Algorithm::RS384,
        Some("RS512") => Algorithm::RS512,
        _ => Algorithm::RS256,
    };
    Ok((key, algorithm))
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> LoginError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => LoginError::TokenExpired,
        _ => LoginError::SignatureInvalid {
            detail: e.to_string(),
        },
    }
}
