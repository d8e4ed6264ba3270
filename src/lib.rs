pub mod auth;
pub mod booking;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod clock;
pub mod error;
pub mod ical;
pub mod models;
pub mod settings;
pub mod timetable;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};
use url::Url;

use crate::booking::Booker;
use crate::cli::{Cli, Command};
use crate::clock::SystemClock;
use crate::error::BookingError;
use crate::ical::ICalExporter;
use crate::settings::Settings;
use crate::timetable::TimetableClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command() {
        Command::Book => book(settings).await?,
        Command::Timetable { club, ics } => show_timetable(settings, club, ics).await?,
    }
    Ok(())
}

async fn book(settings: Settings) -> Result<(), BookingError> {
    let booker = Booker::new(settings, Arc::new(SystemClock))?;
    let target = booker.target();
    info!(
        club_id = target.club_id,
        course_id = target.course_id,
        offset_days = target.offset_days,
        "starting booking run"
    );

    let mut session = None;
    let outcome = booker.book(&mut session).await?;

    println!(
        "Booked {} on {} at {} (session {}, purchase {})",
        outcome.occurrence.name,
        outcome.occurrence.date,
        outcome.occurrence.start_time,
        outcome.occurrence.course_instance_id,
        outcome.purchase,
    );
    debug!(confirmation = %outcome.confirmation, "final confirmation response");
    Ok(())
}

async fn show_timetable(
    settings: Settings,
    club: Option<u32>,
    ics: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let club_id = club.unwrap_or(settings.club_id);
    let client = TimetableClient::new(http_client(&settings)?, settings.api_base_url.clone())
        .with_retries(settings.timetable_retries, settings.retry_delay());
    let catalog = client.fetch_catalog(club_id).await?;

    for summary in catalog.summaries() {
        println!(
            "{} {:>5} {:>3}min  {:<32} {:<24} {} [{}]{}",
            summary.date,
            summary.time,
            summary.duration,
            summary.name,
            summary.instructor,
            summary.location,
            summary.age_range,
            if summary.is_virtual { " virtual" } else { "" },
        );
    }

    if let Some(path) = ics {
        let exporter = ICalExporter::new(settings.tz()?);
        std::fs::write(&path, exporter.generate(&catalog))?;
        info!(path = %path.display(), "wrote timetable calendar");
    }
    Ok(())
}

/// Shared HTTP client. Redirects are never followed: the authorize step reads
/// the authorization code from the redirect itself.
pub fn http_client(settings: &Settings) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Appends `segments` to `base` without dropping any path prefix `base`
/// carries. Each segment is percent-encoded, so `/`, `?` and `#` inside a
/// value never change the target.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
