use std::fmt;

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, ORIGIN, USER_AGENT,
};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::endpoint;
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{context} failed with status {status}: {body}")]
    Status {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Malformed {context} response: {detail}")]
    MalformedResponse {
        context: &'static str,
        detail: String,
    },
    #[error("Purchase {purchase_id} belongs to club {placeholder_club}, not club {club_id}")]
    ClubMismatch {
        purchase_id: String,
        placeholder_club: u32,
        club_id: u32,
    },
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Server-issued purchase slot, scoped to the club it was requested for.
///
/// The id is kept exactly as the backend sent it (string or number) and
/// echoed back verbatim in hold payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchasePlaceholder {
    pub id: Value,
    pub club_id: u32,
}

impl fmt::Display for PurchasePlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Value::String(id) => f.write_str(id),
            other => write!(f, "{other}"),
        }
    }
}

/// The id becomes a path segment of the confirm URL, so dot segments are
/// refused along with empty ones.
fn purchase_id_from(response: &Value) -> Option<Value> {
    match response.get("purchaseId")? {
        Value::String(id) if !matches!(id.as_str(), "" | "." | "..") => {
            Some(Value::String(id.clone()))
        }
        Value::Number(id) => Some(Value::Number(id.clone())),
        _ => None,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HoldRequest<'a> {
    purchase_id: &'a Value,
    contact_id: &'a str,
    course_id: u64,
}

/// The gym backend as the iOS app talks to it.
pub struct BookingClient {
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl BookingClient {
    pub fn new(
        client: reqwest::Client,
        settings: &Settings,
        access_token: &str,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client,
            base_url: settings.api_base_url.clone(),
            headers: mobile_headers(settings, access_token)?,
        })
    }

    pub async fn get_purchase_id(&self, club_id: u32) -> Result<PurchasePlaceholder, ClientError> {
        const CONTEXT: &str = "purchase";
        info!(club_id, "requesting purchase id");

        let response = self
            .send(CONTEXT, Method::POST, &["purchases"], &json!({ "siteId": club_id }))
            .await?;
        let id = purchase_id_from(&response).ok_or_else(|| {
            error!("no purchaseId found in response");
            ClientError::MalformedResponse {
                context: CONTEXT,
                detail: "No purchaseId found in response".into(),
            }
        })?;

        let placeholder = PurchasePlaceholder { id, club_id };
        info!(purchase_id = %placeholder, "obtained purchase id");
        Ok(placeholder)
    }

    pub async fn hold_session(
        &self,
        club_id: u32,
        session_id: u64,
        purchase: &PurchasePlaceholder,
        contact_id: &str,
        course_id: u64,
    ) -> Result<Value, ClientError> {
        ensure_same_club(purchase, club_id)?;
        info!(club_id, session_id, purchase_id = %purchase, "holding session");

        let payload = HoldRequest {
            purchase_id: &purchase.id,
            contact_id,
            course_id,
        };
        let (club, session) = (club_id.to_string(), session_id.to_string());
        let response = self
            .send(
                "hold",
                Method::POST,
                &["clubs", &club, "classes", "sessions", &session, "hold"],
                &payload,
            )
            .await?;
        info!(session_id, "session held");
        Ok(response)
    }

    pub async fn confirm_purchase(
        &self,
        purchase: &PurchasePlaceholder,
    ) -> Result<Value, ClientError> {
        info!(purchase_id = %purchase, "confirming purchase");
        let payload = json!({
            "locale": "en-gb",
            "revenueStream": "CLASS",
            "promotionsHaveBeenApplied": false,
        });
        let purchase_id = purchase.to_string();
        let response = self
            .send(
                "confirm",
                Method::POST,
                &["purchases", &purchase_id, "adyen-drop-in"],
                &payload,
            )
            .await?;
        info!(purchase_id = %purchase, "purchase confirmed");
        Ok(response)
    }

    /// Gives a held seat back. Only used to undo a hold whose purchase could
    /// not be confirmed.
    pub async fn release_hold(
        &self,
        club_id: u32,
        session_id: u64,
        purchase: &PurchasePlaceholder,
    ) -> Result<Value, ClientError> {
        ensure_same_club(purchase, club_id)?;
        info!(club_id, session_id, purchase_id = %purchase, "releasing hold");
        let (club, session) = (club_id.to_string(), session_id.to_string());
        self.send(
            "release hold",
            Method::DELETE,
            &["clubs", &club, "classes", "sessions", &session, "hold"],
            &json!({ "purchaseId": purchase.id }),
        )
        .await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        context: &'static str,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, ClientError> {
        let url = endpoint(&self.base_url, segments)?;
        debug!(method = method.as_str(), %url, "sending request");

        let response = self
            .client
            .request(method, url.as_str())
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| {
                error!(context, error = %err, "request failed");
                err
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(context, %status, body = %text, "backend returned an error");
            return Err(ClientError::Status {
                context,
                status,
                body: text,
            });
        }

        let decoded = decode_body(context, &text)?;
        debug!(context, response = %decoded, "received response");
        Ok(decoded)
    }
}

fn ensure_same_club(purchase: &PurchasePlaceholder, club_id: u32) -> Result<(), ClientError> {
    if purchase.club_id != club_id {
        return Err(ClientError::ClubMismatch {
            purchase_id: purchase.to_string(),
            placeholder_club: purchase.club_id,
            club_id,
        });
    }
    Ok(())
}

/// Empty success bodies decode to `null`.
fn decode_body(context: &'static str, text: &str) -> Result<Value, ClientError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|err| ClientError::MalformedResponse {
        context,
        detail: err.to_string(),
    })
}

fn mobile_headers(settings: &Settings, access_token: &str) -> Result<HeaderMap, ClientError> {
    fn value(name: &'static str, raw: &str) -> Result<HeaderValue, ClientError> {
        HeaderValue::from_str(raw).map_err(|_| ClientError::InvalidHeader(name))
    }

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        value("accept-language", &settings.accept_language)?,
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static("null"));
    headers.insert(USER_AGENT, value("user-agent", &settings.user_agent)?);
    let mut token = value("x-auth-token", access_token)?;
    token.set_sensitive(true);
    headers.insert(HeaderName::from_static("x-auth-token"), token);
    headers.insert(
        HeaderName::from_static("x-app-version"),
        value("x-app-version", &settings.app_version)?,
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    Ok(headers)
}
