use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::settings::Settings;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{step} failed with status {status}")]
    Status {
        step: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{step} response has no {field}")]
    MissingField {
        step: &'static str,
        field: &'static str,
    },
    #[error("Failed to decode {step} response: {source}")]
    Decode {
        step: &'static str,
        source: serde_json::Error,
    },
}

/// Access/refresh token pair for one process run. Never persisted.
#[derive(Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once `now` is within `margin` of expiry.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.is_expired(now + margin)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthnResponse {
    session_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Okta-style login: credentials, then an authorization code captured from the
/// redirect, then a PKCE code exchange.
pub struct IdentityProvider {
    client: reqwest::Client,
    authn_url: Url,
    authorize_url: Url,
    token_url: Url,
    client_id: String,
    redirect_uri: String,
    scope: String,
    username: String,
    password: String,
    code_verifier: String,
    code_challenge: String,
    state: String,
    nonce: String,
    user_agent: String,
    expiry_margin: Duration,
    clock: Arc<dyn Clock>,
}

impl IdentityProvider {
    /// `client` must not follow redirects, the authorization code lives in the
    /// `Location` of the authorize response.
    pub fn new(client: reqwest::Client, settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            authn_url: settings.authn_url.clone(),
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            scope: settings.scope.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            code_verifier: settings.code_verifier.clone(),
            code_challenge: settings.code_challenge.clone(),
            state: settings.oauth_state.clone(),
            nonce: settings.oauth_nonce.clone(),
            user_agent: settings.auth_user_agent.clone(),
            expiry_margin: Duration::seconds(settings.token_expiry_margin_secs),
            clock,
        }
    }

    /// Returns a token that stays valid for at least the configured margin,
    /// authenticating or refreshing `session` in place when needed.
    pub async fn get_valid_token(
        &self,
        session: &mut Option<AuthSession>,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let next = match session.as_ref() {
            Some(current) if !current.access_token.is_empty() => {
                if !current.expires_within(now, self.expiry_margin) {
                    debug!(expires_at = %current.expires_at, "reusing cached access token");
                    return Ok(current.access_token.clone());
                }
                match current.refresh_token.as_deref() {
                    Some(refresh_token) => self.refresh(refresh_token).await?,
                    None => {
                        warn!("access token expiring without a refresh token, re-authenticating");
                        self.authenticate().await?
                    }
                }
            }
            _ => self.authenticate().await?,
        };

        let token = next.access_token.clone();
        *session = Some(next);
        Ok(token)
    }

    /// Full login from stored credentials.
    pub async fn authenticate(&self) -> Result<AuthSession, AuthError> {
        info!("authenticating against identity provider");
        let session_token = self.session_token().await?;
        let code = self.authorization_code(&session_token).await?;
        let session = self.exchange_code(&code).await?;
        info!(expires_at = %session.expires_at, "obtained access token");
        Ok(session)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        info!("refreshing access token");
        let body = form_body(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("grant_type", "refresh_token"),
        ]);
        let mut session = self.token_request("token refresh", body).await?;
        if session.refresh_token.is_none() {
            session.refresh_token = Some(refresh_token.to_string());
        }
        info!(expires_at = %session.expires_at, "refreshed access token");
        Ok(session)
    }

    async fn session_token(&self) -> Result<String, AuthError> {
        const STEP: &str = "authn";
        let payload = serde_json::json!({
            "username": self.username,
            "password": self.password,
            "options": {
                "multiOptionalFactorEnroll": true,
                "warnBeforePasswordExpired": true,
            },
        });

        let response = self
            .client
            .post(self.authn_url.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .json(&payload)
            .send()
            .await?;
        let body = read_success(STEP, response).await?;
        let parsed: AuthnResponse = serde_json::from_str(&body)
            .map_err(|source| AuthError::Decode { step: STEP, source })?;

        parsed
            .session_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingField {
                step: STEP,
                field: "sessionToken",
            })
    }

    async fn authorization_code(&self, session_token: &str) -> Result<String, AuthError> {
        const STEP: &str = "authorize";
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("sessionToken", session_token)
            .append_pair("response_type", "code")
            .append_pair("code_challenge_method", "S256")
            .append_pair("scope", &self.scope)
            .append_pair("code_challenge", &self.code_challenge)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("client_id", &self.client_id)
            .append_pair("state", &self.state)
            .append_pair("nonce", &self.nonce);

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_redirection() {
            let body = response.text().await.unwrap_or_default();
            error!(step = STEP, %status, "expected a redirect carrying the authorization code");
            return Err(AuthError::Status {
                step: STEP,
                status,
                body,
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingField {
                step: STEP,
                field: "Location header",
            })?;

        extract_code(&self.authorize_url, location).ok_or(AuthError::MissingField {
            step: STEP,
            field: "authorization code",
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        let body = form_body(&[
            ("code", code),
            ("code_verifier", &self.code_verifier),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("grant_type", "authorization_code"),
        ]);
        self.token_request("code exchange", body).await
    }

    async fn token_request(
        &self,
        step: &'static str,
        body: String,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.token_url.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .body(body)
            .send()
            .await?;
        let body = read_success(step, response).await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|source| AuthError::Decode { step, source })?;

        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingField {
                step,
                field: "access_token",
            })?;
        let lifetime = parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        Ok(AuthSession {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_at: self.clock.now() + Duration::seconds(lifetime),
        })
    }
}

async fn read_success(
    step: &'static str,
    response: reqwest::Response,
) -> Result<String, AuthError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        error!(step, %status, "identity provider rejected request");
        return Err(AuthError::Status { step, status, body });
    }
    Ok(body)
}

fn form_body(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Pulls `code` out of a redirect target, which may be relative or use the
/// app's custom scheme.
fn extract_code(base: &Url, location: &str) -> Option<String> {
    let target = base.join(location).ok()?;
    target
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn base() -> Url {
        Url::parse("https://idp.example.com/oauth2/default/v1/authorize").unwrap()
    }

    #[test]
    fn test_extract_code_custom_scheme() {
        let code = extract_code(
            &base(),
            "uk.co.davidlloyd.mobile-app:/login?code=abc123&state=xyz",
        );
        assert_eq!(code.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_extract_code_relative_location() {
        let code = extract_code(&base(), "/login?state=xyz&code=rel-code");
        assert_eq!(code.as_deref(), Some("rel-code"));
    }

    #[test]
    fn test_extract_code_missing() {
        assert!(extract_code(&base(), "app:/login?error=access_denied").is_none());
        assert!(extract_code(&base(), "app:/login?code=").is_none());
    }

    #[test]
    fn test_form_body_encodes_reserved_characters() {
        let body = form_body(&[("redirect_uri", "app:/login"), ("grant_type", "refresh_token")]);
        assert_eq!(body, "redirect_uri=app%3A%2Flogin&grant_type=refresh_token");
    }

    #[test]
    fn test_session_expiry_boundary() {
        let expires_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let session = AuthSession {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at,
        };
        assert!(!session.is_expired(expires_at - Duration::seconds(1)));
        assert!(session.is_expired(expires_at));
    }

    #[test]
    fn test_session_expires_within_margin() {
        let expires_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let session = AuthSession {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at,
        };
        let margin = Duration::seconds(30);
        assert!(!session.expires_within(expires_at - Duration::seconds(31), margin));
        assert!(session.expires_within(expires_at - Duration::seconds(30), margin));
        assert!(session.expires_within(expires_at - Duration::seconds(1), margin));
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = AuthSession {
            access_token: "very-secret".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_at: Utc::now(),
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("also-secret"));
    }
}
