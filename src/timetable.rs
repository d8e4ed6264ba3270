use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::ClassCatalog;
use crate::endpoint;
use crate::models::{ClassOccurrence, TimetableResponse};

#[derive(Debug, Error)]
pub enum TimetableError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Timetable request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to decode timetable: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid timetable URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Unauthenticated reader for a club's class timetable.
#[derive(Clone)]
pub struct TimetableClient {
    client: reqwest::Client,
    base_url: Arc<Url>,
    retries: u32,
    retry_delay: Duration,
}

impl TimetableClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self {
            client,
            base_url: Arc::new(base_url),
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    /// Extra attempts for the timetable GET. Only this idempotent read retries.
    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub async fn fetch_catalog(&self, club_id: u32) -> Result<ClassCatalog, TimetableError> {
        let club = club_id.to_string();
        let url = endpoint(&self.base_url, &["clubs", &club, "sessions", "timetable"])?;

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(response) => {
                    let catalog = ClassCatalog::from_response(club_id, response);
                    info!(club_id, sessions = catalog.len(), "fetched timetable");
                    return Ok(catalog);
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!(error = %err, attempt, "timetable fetch failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<TimetableResponse, TimetableError> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TimetableError::Status { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// A failed fetch counts as "no data"; callers decide whether a missing
    /// session is an error.
    pub async fn get_session_by_course_and_date(
        &self,
        club_id: u32,
        course_id: u64,
        date: NaiveDate,
    ) -> Option<ClassOccurrence> {
        let catalog = self
            .fetch_catalog(club_id)
            .await
            .map_err(|err| warn!(error = %err, club_id, "failed to fetch timetable"))
            .ok()?;
        let found = catalog.find_by_course_and_date(course_id, date).cloned();
        debug!(course_id, %date, found = found.is_some(), "looked up session");
        found
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::models::tests::occurrence_json;

    fn client_for(server: &MockServer) -> TimetableClient {
        TimetableClient::new(
            reqwest::Client::new(),
            Url::parse(&server.base_url()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_catalog() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/clubs/42/sessions/timetable");
                then.status(200).json_body(json!({
                    "sessionsDetails": [
                        occurrence_json(1, 10, "2026-10-20"),
                        occurrence_json(2, 20, "2026-10-21"),
                    ]
                }));
            })
            .await;

        let catalog = client_for(&server).fetch_catalog(42).await.unwrap();

        mock.assert_async().await;
        assert_eq!(catalog.club_id, 42);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.occurrences()[1].course_instance_id, 20);
    }

    #[tokio::test]
    async fn test_fetch_catalog_retries_then_fails() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/clubs/42/sessions/timetable");
                then.status(503).body("maintenance");
            })
            .await;

        let err = client_for(&server)
            .with_retries(2, Duration::ZERO)
            .fetch_catalog(42)
            .await
            .unwrap_err();

        mock.assert_calls_async(3).await;
        assert!(matches!(
            err,
            TimetableError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_fetch_catalog_rejects_garbage() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/clubs/42/sessions/timetable");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = client_for(&server).fetch_catalog(42).await.unwrap_err();
        assert!(matches!(err, TimetableError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_session_by_course_and_date() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/clubs/42/sessions/timetable");
                then.status(200).json_body(json!({
                    "sessionsDetails": [
                        occurrence_json(101786949, 10, "2026-10-24"),
                        occurrence_json(101786949, 11, "2026-10-25"),
                    ]
                }));
            })
            .await;

        let client = client_for(&server);
        let day = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        let found = client
            .get_session_by_course_and_date(42, 101786949, day)
            .await
            .unwrap();
        assert_eq!(found.course_instance_id, 11);

        let other_day = NaiveDate::from_ymd_opt(2026, 10, 26).unwrap();
        assert!(
            client
                .get_session_by_course_and_date(42, 101786949, other_day)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_get_session_swallows_fetch_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/clubs/42/sessions/timetable");
                then.status(500);
            })
            .await;

        let day = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        let found = client_for(&server)
            .get_session_by_course_and_date(42, 1, day)
            .await;
        assert!(found.is_none());
    }
}
