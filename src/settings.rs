use std::fmt;
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api_base_url: Url,
    pub authn_url: Url,
    pub authorize_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,

    pub username: String,
    pub password: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub oauth_state: String,
    pub oauth_nonce: String,

    pub club_id: u32,
    pub course_id: u64,
    pub contact_id: String,
    pub booking_offset_days: u32,
    pub timezone: String,

    pub user_agent: String,
    pub auth_user_agent: String,
    pub app_version: String,
    pub accept_language: String,

    pub request_timeout_secs: u64,
    /// Tokens this close to expiry are refreshed before use.
    pub token_expiry_margin_secs: i64,
    pub timetable_retries: u32,
    pub retry_delay_ms: u64,
    pub release_hold_on_failure: bool,
    pub debug: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .add_source(File::with_name("booker").required(false))
            // BOOKER_CLUB_ID -> club_id
            .add_source(Environment::with_prefix("BOOKER"))
            .set_default("api_base_url", "https://mobile-app-back.davidlloyd.co.uk")?
            .set_default("authn_url", "https://davidlloyd.okta.com/api/v1/authn")?
            .set_default(
                "authorize_url",
                "https://digitalmanager.davidlloyd.co.uk/oauth2/default/v1/authorize",
            )?
            .set_default(
                "token_url",
                "https://digitalmanager.davidlloyd.co.uk/oauth2/default/v1/token",
            )?
            .set_default("client_id", "0oa3n4dj2s9UuXIRt417")?
            .set_default("redirect_uri", "uk.co.davidlloyd.mobile-app:/login")?
            .set_default("scope", "openid profile offline_access")?
            .set_default("club_id", 42)?
            .set_default("course_id", 101786949)?
            .set_default("booking_offset_days", 9)?
            .set_default("timezone", "Europe/London")?
            .set_default(
                "user_agent",
                concat!(
                    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_0_1 like Mac OS X) ",
                    "AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 DLL/112.0.299",
                ),
            )?
            .set_default("auth_user_agent", "class-booker/0.3")?
            .set_default("app_version", "dev")?
            .set_default("accept_language", "en-GB,en;q=0.9")?
            .set_default("request_timeout_secs", 30)?
            .set_default("token_expiry_margin_secs", 30)?
            .set_default("timetable_retries", 2)?
            .set_default("retry_delay_ms", 500)?
            .set_default("release_hold_on_failure", false)?
            .set_default("debug", false)?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.tz()?;
        Ok(settings)
    }

    /// Club-local timezone used to decide which calendar day "today" is.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Message(format!("unknown timezone `{}`", self.timezone)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("Settings")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("authn_url", &self.authn_url.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("username", &REDACTED)
            .field("password", &REDACTED)
            .field("code_verifier", &REDACTED)
            .field("code_challenge", &REDACTED)
            .field("oauth_state", &REDACTED)
            .field("oauth_nonce", &REDACTED)
            .field("club_id", &self.club_id)
            .field("course_id", &self.course_id)
            .field("contact_id", &REDACTED)
            .field("booking_offset_days", &self.booking_offset_days)
            .field("timezone", &self.timezone)
            .field("user_agent", &self.user_agent)
            .field("auth_user_agent", &self.auth_user_agent)
            .field("app_version", &self.app_version)
            .field("accept_language", &self.accept_language)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token_expiry_margin_secs", &self.token_expiry_margin_secs)
            .field("timetable_retries", &self.timetable_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("release_hold_on_failure", &self.release_hold_on_failure)
            .field("debug", &self.debug)
            .finish()
    }
}
