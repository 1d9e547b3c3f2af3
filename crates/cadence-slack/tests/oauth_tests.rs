//! Token exchange and identity verification against a mock platform.

mod common;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cadence_slack::config::SlackAuthConfig;
use cadence_slack::oauth::{IdentityVerifier, OidcClient};
use cadence_slack::LoginError;

fn auth() -> SlackAuthConfig {
    SlackAuthConfig {
        client_id: "123.456".to_string(),
        client_secret: "shhh".to_string(),
    }
}

fn oidc_client(server: &MockServer) -> OidcClient {
    OidcClient::new(
        auth(),
        &format!("{}/openid/connect/authorize", server.uri()),
        &server.uri(),
    )
}

fn verifier(server: &MockServer) -> IdentityVerifier {
    IdentityVerifier::new(
        "123.456",
        "https://slack.com",
        &format!("{}/openid/connect/keys", server.uri()),
    )
}

#[tokio::test]
async fn test_exchange_code_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openid.connect.token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "access_token": "xoxp-access",
            "id_token": "header.payload.sig",
            "team": { "id": "T0001" }
        })))
        .mount(&server)
        .await;

    let exchange = oidc_client(&server)
        .exchange_code("auth-code-1", "https://app.cadence.test/cb")
        .await
        .unwrap();
    assert_eq!(exchange.access_token, "xoxp-access");
    assert_eq!(exchange.id_token, "header.payload.sig");
    assert_eq!(exchange.team_id.as_deref(), Some("T0001"));
}

#[tokio::test]
async fn test_exchange_code_non_2xx_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openid.connect.token"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = oidc_client(&server)
        .exchange_code("code", "https://app.cadence.test/cb")
        .await
        .unwrap_err();
    match err {
        LoginError::TokenExchangeFailed { status, .. } => assert_eq!(status, Some(502)),
        other => panic!("expected TokenExchangeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_code_ok_false_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openid.connect.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error": "invalid_code"
        })))
        .mount(&server)
        .await;

    let err = oidc_client(&server)
        .exchange_code("code", "https://app.cadence.test/cb")
        .await
        .unwrap_err();
    match err {
        LoginError::TokenExchangeFailed { detail, .. } => {
            assert!(detail.contains("invalid_code"));
        }
        other => panic!("expected TokenExchangeFailed, got {other:?}"),
    }
}

/// A syntactically valid JWT with an arbitrary kid; the signature is HMAC,
/// which the verifier will reject long after the behavior under test.
fn token_with_kid(kid: &str) -> String {
    let mut header = Header::default();
    header.kid = Some(kid.to_string());
    let claims = json!({
        "sub": "U0123",
        "iss": "https://slack.com",
        "aud": "123.456",
        "exp": 4_102_444_800i64,
        "iat": 1_700_000_000i64,
        "https://slack.com/user_id": "U0123",
        "https://slack.com/team_id": "T0456"
    });
    encode(&header, &claims, &EncodingKey::from_secret(b"test")).unwrap()
}

fn jwks_with_kid(kid: &str) -> serde_json::Value {
    json!({
        "keys": [{
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1Wlu",
            "e": "AQAB"
        }]
    })
}

#[tokio::test]
async fn test_unknown_kid_fails_after_refresh() {
    let server = MockServer::start().await;
    // The key set never contains the token's kid; the verifier refreshes
    // once, then gives up.
    Mock::given(method("GET"))
        .and(path("/openid/connect/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_with_kid("other-kid")))
        .expect(2)
        .mount(&server)
        .await;

    let err = verifier(&server)
        .verify(&token_with_kid("unknown-kid"))
        .await
        .unwrap_err();
    match err {
        LoginError::SignatureInvalid { detail } => {
            assert!(detail.contains("unknown-kid"));
        }
        other => panic!("expected SignatureInvalid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_key_set_is_signature_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openid/connect/keys"))
        .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
        .mount(&server)
        .await;

    let err = verifier(&server)
        .verify(&token_with_kid("k1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::SignatureInvalid { .. }));
}

#[tokio::test]
async fn test_garbage_token_rejected_without_network() {
    let server = MockServer::start().await;
    // No mounted mocks: a malformed token must fail before any fetch.
    let err = verifier(&server).verify("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, LoginError::SignatureInvalid { .. }));
}

#[tokio::test]
async fn test_token_without_kid_rejected() {
    let server = MockServer::start().await;
    let claims = json!({ "sub": "U0123", "exp": 4_102_444_800i64 });
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();

    let err = verifier(&server).verify(&token).await.unwrap_err();
    match err {
        LoginError::SignatureInvalid { detail } => assert!(detail.contains("kid")),
        other => panic!("expected SignatureInvalid, got {other:?}"),
    }
}
