//! Settings, layered from built-in defaults, a TOML file and `ROOMSYNC__*`
//! environment variables (`ROOMSYNC__GOOGLE__API_KEY` sets `google.api_key`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};

use crate::constants::{
    DEFAULT_POLICY_CACHE_TTL, DEFAULT_RENEW_MARGIN, DEFAULT_WEBHOOK_COOLDOWN, UPSERT_BATCH_SIZE,
};
use crate::error::{RoomSyncError, RoomSyncResult};
use crate::room::{RoomDirectory, RoomId};
use crate::tariff::HolidayCalendar;

const ENV_PREFIX: &str = "ROOMSYNC";

/// Durations are written as "5s", "30min", "3days".
fn human_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    /// Browser UI served as the fallback route.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".into()
    }

    fn default_port() -> u16 {
        3000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: Self::default_host(),
            port: Self::default_port(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSettings {
    #[serde(default = "GoogleSettings::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "GoogleSettings::default_token_url")]
    pub token_url: String,
    /// Enough for listing public calendars. Channels need OAuth.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl GoogleSettings {
    fn default_api_base_url() -> String {
        "https://www.googleapis.com/calendar/v3".into()
    }

    fn default_token_url() -> String {
        "https://oauth2.googleapis.com/token".into()
    }
}

impl Default for GoogleSettings {
    fn default() -> Self {
        GoogleSettings {
            api_base_url: Self::default_api_base_url(),
            token_url: Self::default_token_url(),
            api_key: None,
            client_id: None,
            client_secret: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_role_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Public URL of `POST /webhook/google`.
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(
        default = "WebhookSettings::default_cooldown",
        deserialize_with = "human_duration"
    )]
    pub cooldown: Duration,
    #[serde(
        default = "WebhookSettings::default_renew_margin",
        deserialize_with = "human_duration"
    )]
    pub renew_margin: Duration,
    #[serde(
        default = "WebhookSettings::default_renew_interval",
        deserialize_with = "human_duration"
    )]
    pub renew_interval: Duration,
    #[serde(default = "WebhookSettings::default_stop_previous")]
    pub stop_previous: bool,
}

impl WebhookSettings {
    fn default_cooldown() -> Duration {
        DEFAULT_WEBHOOK_COOLDOWN
    }

    fn default_renew_margin() -> Duration {
        DEFAULT_RENEW_MARGIN
    }

    fn default_renew_interval() -> Duration {
        Duration::from_secs(6 * 3600)
    }

    fn default_stop_previous() -> bool {
        true
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        WebhookSettings {
            callback_url: None,
            cooldown: Self::default_cooldown(),
            renew_margin: Self::default_renew_margin(),
            renew_interval: Self::default_renew_interval(),
            stop_previous: Self::default_stop_previous(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Deadline of a manual multi-room pass.
    #[serde(
        default = "SyncSettings::default_timeout",
        deserialize_with = "human_duration"
    )]
    pub timeout: Duration,
    #[serde(default = "SyncSettings::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "SyncSettings::default_upcoming_weeks")]
    pub upcoming_weeks: u32,
    #[serde(
        default = "SyncSettings::default_refresh_interval",
        deserialize_with = "human_duration"
    )]
    pub refresh_interval: Duration,
    #[serde(
        default = "SyncSettings::default_policy_cache_ttl",
        deserialize_with = "human_duration"
    )]
    pub policy_cache_ttl: Duration,
}

impl SyncSettings {
    fn default_timeout() -> Duration {
        Duration::from_secs(20)
    }

    fn default_batch_size() -> usize {
        UPSERT_BATCH_SIZE
    }

    fn default_upcoming_weeks() -> u32 {
        4
    }

    fn default_refresh_interval() -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn default_policy_cache_ttl() -> Duration {
        DEFAULT_POLICY_CACHE_TTL
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            timeout: Self::default_timeout(),
            batch_size: Self::default_batch_size(),
            upcoming_weeks: Self::default_upcoming_weeks(),
            refresh_interval: Self::default_refresh_interval(),
            policy_cache_ttl: Self::default_policy_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingSettings {
    /// Added to the built-in 2025 holidays.
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminSettings {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub google: GoogleSettings,
    #[serde(default)]
    pub supabase: Option<SupabaseSettings>,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    /// Room id → provider calendar id.
    #[serde(default)]
    pub rooms: BTreeMap<String, String>,
    #[serde(default)]
    pub pricing: PricingSettings,
    #[serde(default)]
    pub admin: AdminSettings,
}

impl Settings {
    /// `~/.config/roomsync/config.toml`
    pub fn default_path() -> RoomSyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RoomSyncError::Config("Could not determine config directory".into()))?
            .join("roomsync");
        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path` (or the default path) and the process environment.
    /// A missing file is not an error.
    pub fn load(path: Option<&Path>) -> RoomSyncResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        Self::load_with_env(File::from(path).required(false), Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX).separator("__")
    }

    fn load_with_env<S>(file: S, env: Environment) -> RoomSyncResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .map_err(|e| RoomSyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RoomSyncError::Config(e.to_string()))
    }

    pub fn room_directory(&self) -> RoomSyncResult<RoomDirectory> {
        let rooms = self
            .rooms
            .iter()
            .map(|(id, calendar_id)| Ok((id.parse::<RoomId>()?, calendar_id.clone())))
            .collect::<RoomSyncResult<Vec<_>>>()?;
        Ok(RoomDirectory::new(rooms))
    }

    pub fn holidays(&self) -> HolidayCalendar {
        let mut holidays = HolidayCalendar::korean_2025();
        holidays.extend(self.pricing.holidays.iter().copied());
        holidays
    }
}
