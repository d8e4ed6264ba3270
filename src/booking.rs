use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::auth::{AuthSession, IdentityProvider};
use crate::client::{BookingClient, PurchasePlaceholder};
use crate::clock::Clock;
use crate::error::BookingError;
use crate::http_client;
use crate::models::ClassOccurrence;
use crate::settings::Settings;
use crate::timetable::TimetableClient;

/// What to book, relative to "today" in the club's timezone.
#[derive(Debug, Clone)]
pub struct BookingTarget {
    pub club_id: u32,
    pub course_id: u64,
    pub contact_id: String,
    pub offset_days: u32,
    pub tz: Tz,
}

impl BookingTarget {
    pub fn from_settings(settings: &Settings) -> Result<Self, BookingError> {
        Ok(Self {
            club_id: settings.club_id,
            course_id: settings.course_id,
            contact_id: settings.contact_id.clone(),
            offset_days: settings.booking_offset_days,
            tz: settings.tz()?,
        })
    }

    /// Bookings open a fixed number of days ahead of the class.
    pub fn target_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive() + Days::new(u64::from(self.offset_days))
    }
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub occurrence: ClassOccurrence,
    pub purchase: PurchasePlaceholder,
    pub hold: Value,
    pub confirmation: Value,
}

/// Runs the booking sequence: token, session lookup, purchase id, hold,
/// confirm. Any failing step ends the run. The token is re-validated before
/// every authenticated call, so a slow run never sends an expired one.
pub struct Booker {
    settings: Settings,
    http: reqwest::Client,
    identity: IdentityProvider,
    timetable: TimetableClient,
    target: BookingTarget,
    clock: Arc<dyn Clock>,
}

impl Booker {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Result<Self, BookingError> {
        let http = http_client(&settings).map_err(|err| BookingError::Config(err.to_string()))?;
        let identity = IdentityProvider::new(http.clone(), &settings, clock.clone());
        let timetable = TimetableClient::new(http.clone(), settings.api_base_url.clone())
            .with_retries(settings.timetable_retries, settings.retry_delay());
        let target = BookingTarget::from_settings(&settings)?;

        Ok(Self {
            settings,
            http,
            identity,
            timetable,
            target,
            clock,
        })
    }

    pub fn target(&self) -> &BookingTarget {
        &self.target
    }

    pub async fn book(
        &self,
        session: &mut Option<AuthSession>,
    ) -> Result<BookingOutcome, BookingError> {
        let target = &self.target;

        self.identity.get_valid_token(session).await?;
        info!("obtained access token");

        let date = target.target_date(self.clock.now());
        let occurrence = self
            .timetable
            .get_session_by_course_and_date(target.club_id, target.course_id, date)
            .await
            .ok_or(BookingError::NoSuchSession {
                course_id: target.course_id,
                date,
            })?;
        let session_id = occurrence.course_instance_id;
        info!(session_id, %date, name = %occurrence.name, "found session");

        let purchase = self
            .client(session)
            .await?
            .get_purchase_id(target.club_id)
            .await?;

        let hold = self
            .client(session)
            .await?
            .hold_session(
                target.club_id,
                session_id,
                &purchase,
                &target.contact_id,
                target.course_id,
            )
            .await?;
        info!("successfully held session");

        let client = self.client(session).await?;
        let confirmation = match client.confirm_purchase(&purchase).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                error!(
                    error = %err,
                    purchase_id = %purchase,
                    "confirmation failed with a hold outstanding"
                );
                if self.settings.release_hold_on_failure {
                    self.release(&client, session_id, &purchase).await;
                }
                return Err(err.into());
            }
        };
        info!("successfully confirmed purchase");

        Ok(BookingOutcome {
            occurrence,
            purchase,
            hold,
            confirmation,
        })
    }

    /// Backend client carrying a token that is valid right now.
    async fn client(
        &self,
        session: &mut Option<AuthSession>,
    ) -> Result<BookingClient, BookingError> {
        let token = self.identity.get_valid_token(session).await?;
        Ok(BookingClient::new(self.http.clone(), &self.settings, &token)?)
    }

    async fn release(
        &self,
        client: &BookingClient,
        session_id: u64,
        purchase: &PurchasePlaceholder,
    ) {
        match client
            .release_hold(self.target.club_id, session_id, purchase)
            .await
        {
            Ok(_) => info!(session_id, "released outstanding hold"),
            Err(err) => warn!(
                error = %err,
                session_id,
                "failed to release hold, it will lapse on its own"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn target(tz: Tz) -> BookingTarget {
        BookingTarget {
            club_id: 42,
            course_id: 101786949,
            contact_id: "contact".to_string(),
            offset_days: 9,
            tz,
        }
    }

    #[test]
    fn test_target_date_offset() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(
            target(chrono_tz::UTC).target_date(now),
            NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()
        );
    }

    #[test]
    fn test_target_date_uses_club_timezone() {
        // 23:30 UTC is already the next day in London during BST.
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 23, 30, 0).unwrap();
        assert_eq!(
            target(chrono_tz::Europe::London).target_date(now),
            NaiveDate::from_ymd_opt(2026, 10, 26).unwrap()
        );
        assert_eq!(
            target(chrono_tz::UTC).target_date(now),
            NaiveDate::from_ymd_opt(2026, 10, 25).unwrap()
        );
    }

    #[test]
    fn test_from_settings_rejects_bad_timezone() {
        let mut settings = crate::settings::tests::sample("http://localhost");
        settings.timezone = "Nowhere/Special".to_string();
        assert!(matches!(
            BookingTarget::from_settings(&settings),
            Err(BookingError::Config(_))
        ));
    }
}
