use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::ReservationPolicy;
use crate::coordinator::BookingSettings;
use crate::flows::QualificationPolicy;
use crate::scheduling::window::{builtin_regions, normalize_region};
use crate::scheduling::{RegionWindow, SchedulePolicy, WindowCalculator};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduling: SchedulingConfig,
    pub calendar: CalendarConfig,
    pub qualification: QualificationConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub weekly_attempt_cap: u32,
    pub min_spacing_hours: u32,
    pub busy_retry_minutes: u32,
    pub voicemail_attempt_no: u32,
    pub default_window: RegionWindow,
    pub regions: BTreeMap<String, RegionWindow>,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub slot_minutes: u32,
    pub buffer_minutes: u32,
    pub min_hold_ttl_secs: u32,
    pub max_hold_ttl_secs: u32,
    pub default_hold_ttl_secs: u32,
    pub meeting_minutes: u32,
    pub hold_match_tolerance_secs: u32,
    pub conference_base_url: String,
    pub uid_domain: String,
}

#[derive(Clone, Debug)]
pub struct QualificationConfig {
    pub accept_unknown_budget_for_high_need: bool,
}

#[derive(Clone, Debug, Default)]
pub struct NotificationsConfig {
    /// Key for the HMAC signature attached to outbox payloads; unsigned when absent.
    pub signing_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub accept_unknown_budget_for_high_need: Option<bool>,
    pub signing_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let reservation = ReservationPolicy::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://booker.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            scheduling: SchedulingConfig {
                weekly_attempt_cap: 3,
                min_spacing_hours: 24,
                busy_retry_minutes: 15,
                voicemail_attempt_no: 2,
                default_window: RegionWindow::default(),
                regions: builtin_regions(),
            },
            calendar: CalendarConfig {
                slot_minutes: 30,
                buffer_minutes: 10,
                min_hold_ttl_secs: reservation.min_hold_ttl_secs,
                max_hold_ttl_secs: reservation.max_hold_ttl_secs,
                default_hold_ttl_secs: 600,
                meeting_minutes: 30,
                hold_match_tolerance_secs: 60,
                conference_base_url: reservation.conference_base_url,
                uid_domain: reservation.uid_domain,
            },
            qualification: QualificationConfig { accept_unknown_budget_for_high_need: true },
            notifications: NotificationsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("booker.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn schedule_policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            weekly_attempt_cap: self.scheduling.weekly_attempt_cap,
            min_spacing: Duration::hours(i64::from(self.scheduling.min_spacing_hours)),
            busy_retry_after: Duration::minutes(i64::from(self.scheduling.busy_retry_minutes)),
            voicemail_attempt_no: self.scheduling.voicemail_attempt_no,
        }
    }

    pub fn window_calculator(&self) -> WindowCalculator {
        WindowCalculator::new(self.scheduling.default_window, self.scheduling.regions.clone())
    }

    pub fn reservation_policy(&self) -> ReservationPolicy {
        ReservationPolicy {
            slot_length: Duration::minutes(i64::from(self.calendar.slot_minutes)),
            buffer: Duration::minutes(i64::from(self.calendar.buffer_minutes)),
            min_hold_ttl_secs: self.calendar.min_hold_ttl_secs,
            max_hold_ttl_secs: self.calendar.max_hold_ttl_secs,
            hold_match_tolerance: Duration::seconds(i64::from(
                self.calendar.hold_match_tolerance_secs,
            )),
            conference_base_url: self.calendar.conference_base_url.clone(),
            uid_domain: self.calendar.uid_domain.clone(),
        }
    }

    pub fn qualification_policy(&self) -> QualificationPolicy {
        QualificationPolicy {
            accept_unknown_budget_for_high_need: self
                .qualification
                .accept_unknown_budget_for_high_need,
        }
    }

    pub fn booking_settings(&self) -> BookingSettings {
        BookingSettings {
            meeting_length: Duration::minutes(i64::from(self.calendar.meeting_minutes)),
            hold_ttl_secs: self.calendar.default_hold_ttl_secs,
            signing_secret: self.notifications.signing_secret.clone(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(scheduling) = patch.scheduling {
            if let Some(weekly_attempt_cap) = scheduling.weekly_attempt_cap {
                self.scheduling.weekly_attempt_cap = weekly_attempt_cap;
            }
            if let Some(min_spacing_hours) = scheduling.min_spacing_hours {
                self.scheduling.min_spacing_hours = min_spacing_hours;
            }
            if let Some(busy_retry_minutes) = scheduling.busy_retry_minutes {
                self.scheduling.busy_retry_minutes = busy_retry_minutes;
            }
            if let Some(voicemail_attempt_no) = scheduling.voicemail_attempt_no {
                self.scheduling.voicemail_attempt_no = voicemail_attempt_no;
            }
            if let Some(default_window) = scheduling.default_window {
                self.scheduling.default_window = default_window;
            }
            if let Some(regions) = scheduling.regions {
                self.scheduling.regions.extend(
                    regions.into_iter().map(|(region, window)| (normalize_region(&region), window)),
                );
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(slot_minutes) = calendar.slot_minutes {
                self.calendar.slot_minutes = slot_minutes;
            }
            if let Some(buffer_minutes) = calendar.buffer_minutes {
                self.calendar.buffer_minutes = buffer_minutes;
            }
            if let Some(min_hold_ttl_secs) = calendar.min_hold_ttl_secs {
                self.calendar.min_hold_ttl_secs = min_hold_ttl_secs;
            }
            if let Some(max_hold_ttl_secs) = calendar.max_hold_ttl_secs {
                self.calendar.max_hold_ttl_secs = max_hold_ttl_secs;
            }
            if let Some(default_hold_ttl_secs) = calendar.default_hold_ttl_secs {
                self.calendar.default_hold_ttl_secs = default_hold_ttl_secs;
            }
            if let Some(meeting_minutes) = calendar.meeting_minutes {
                self.calendar.meeting_minutes = meeting_minutes;
            }
            if let Some(hold_match_tolerance_secs) = calendar.hold_match_tolerance_secs {
                self.calendar.hold_match_tolerance_secs = hold_match_tolerance_secs;
            }
            if let Some(conference_base_url) = calendar.conference_base_url {
                self.calendar.conference_base_url = conference_base_url;
            }
            if let Some(uid_domain) = calendar.uid_domain {
                self.calendar.uid_domain = uid_domain;
            }
        }

        if let Some(qualification) = patch.qualification {
            if let Some(accept) = qualification.accept_unknown_budget_for_high_need {
                self.qualification.accept_unknown_budget_for_high_need = accept;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(signing_secret) = notifications.signing_secret {
                self.notifications.signing_secret = Some(signing_secret.into());
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOOKER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BOOKER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BOOKER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BOOKER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BOOKER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BOOKER_SCHEDULING_WEEKLY_ATTEMPT_CAP") {
            self.scheduling.weekly_attempt_cap =
                parse_u32("BOOKER_SCHEDULING_WEEKLY_ATTEMPT_CAP", &value)?;
        }
        if let Some(value) = read_env("BOOKER_SCHEDULING_MIN_SPACING_HOURS") {
            self.scheduling.min_spacing_hours =
                parse_u32("BOOKER_SCHEDULING_MIN_SPACING_HOURS", &value)?;
        }
        if let Some(value) = read_env("BOOKER_SCHEDULING_BUSY_RETRY_MINUTES") {
            self.scheduling.busy_retry_minutes =
                parse_u32("BOOKER_SCHEDULING_BUSY_RETRY_MINUTES", &value)?;
        }

        if let Some(value) = read_env("BOOKER_CALENDAR_BUFFER_MINUTES") {
            self.calendar.buffer_minutes = parse_u32("BOOKER_CALENDAR_BUFFER_MINUTES", &value)?;
        }
        if let Some(value) = read_env("BOOKER_CALENDAR_DEFAULT_HOLD_TTL_SECS") {
            self.calendar.default_hold_ttl_secs =
                parse_u32("BOOKER_CALENDAR_DEFAULT_HOLD_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("BOOKER_CALENDAR_MEETING_MINUTES") {
            self.calendar.meeting_minutes = parse_u32("BOOKER_CALENDAR_MEETING_MINUTES", &value)?;
        }
        if let Some(value) = read_env("BOOKER_CALENDAR_CONFERENCE_BASE_URL") {
            self.calendar.conference_base_url = value;
        }
        if let Some(value) = read_env("BOOKER_CALENDAR_UID_DOMAIN") {
            self.calendar.uid_domain = value;
        }

        if let Some(value) = read_env("BOOKER_QUALIFICATION_ACCEPT_UNKNOWN_BUDGET") {
            self.qualification.accept_unknown_budget_for_high_need =
                parse_bool("BOOKER_QUALIFICATION_ACCEPT_UNKNOWN_BUDGET", &value)?;
        }

        if let Some(value) = read_env("BOOKER_NOTIFICATIONS_SIGNING_SECRET") {
            self.notifications.signing_secret = Some(value.into());
        }

        let log_level = read_env("BOOKER_LOGGING_LEVEL").or_else(|| read_env("BOOKER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BOOKER_LOGGING_FORMAT").or_else(|| read_env("BOOKER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(accept) = overrides.accept_unknown_budget_for_high_need {
            self.qualification.accept_unknown_budget_for_high_need = accept;
        }
        if let Some(signing_secret) = overrides.signing_secret {
            self.notifications.signing_secret = Some(signing_secret.into());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_scheduling(&self.scheduling)?;
        validate_calendar(&self.calendar)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("booker.toml"), PathBuf::from("config/booker.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduling(scheduling: &SchedulingConfig) -> Result<(), ConfigError> {
    if scheduling.weekly_attempt_cap == 0 {
        return Err(ConfigError::Validation(
            "scheduling.weekly_attempt_cap must be greater than zero".to_string(),
        ));
    }
    if scheduling.min_spacing_hours == 0 || scheduling.min_spacing_hours > 168 {
        return Err(ConfigError::Validation(
            "scheduling.min_spacing_hours must be in range 1..=168".to_string(),
        ));
    }
    let spacing_minutes = u64::from(scheduling.min_spacing_hours) * 60;
    if scheduling.busy_retry_minutes == 0
        || u64::from(scheduling.busy_retry_minutes) >= spacing_minutes
    {
        return Err(ConfigError::Validation(
            "scheduling.busy_retry_minutes must be positive and shorter than min_spacing_hours"
                .to_string(),
        ));
    }
    if scheduling.voicemail_attempt_no == 0 {
        return Err(ConfigError::Validation(
            "scheduling.voicemail_attempt_no must be greater than zero".to_string(),
        ));
    }


    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.slot_minutes == 0 || calendar.slot_minutes > 240 {
        return Err(ConfigError::Validation(
            "calendar.slot_minutes must be in range 1..=240".to_string(),
        ));
    }
    if calendar.buffer_minutes > 120 {
        return Err(ConfigError::Validation(
            "calendar.buffer_minutes must not exceed 120".to_string(),
        ));
    }
    if calendar.min_hold_ttl_secs == 0 || calendar.min_hold_ttl_secs > calendar.max_hold_ttl_secs
    {
        return Err(ConfigError::Validation(
            "calendar.min_hold_ttl_secs must be positive and not exceed max_hold_ttl_secs"
                .to_string(),
        ));
    }
    if calendar.default_hold_ttl_secs < calendar.min_hold_ttl_secs
        || calendar.default_hold_ttl_secs > calendar.max_hold_ttl_secs
    {
        return Err(ConfigError::Validation(format!(
            "calendar.default_hold_ttl_secs must be in range {}..={}",
            calendar.min_hold_ttl_secs, calendar.max_hold_ttl_secs
        )));
    }
    if calendar.meeting_minutes == 0 {
        return Err(ConfigError::Validation(
            "calendar.meeting_minutes must be greater than zero".to_string(),
        ));
    }

    let base_url = calendar.conference_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "calendar.conference_base_url must start with http:// or https://".to_string(),
        ));
    }

    let uid_domain = calendar.uid_domain.trim();
    if uid_domain.is_empty() || uid_domain.contains('@') || uid_domain.contains(char::is_whitespace)
    {
        return Err(ConfigError::Validation(
            "calendar.uid_domain must be a bare domain such as `booker.example.com`".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if let Some(secret) = &notifications.signing_secret {
        if secret.expose_secret().trim().len() < 16 {
            return Err(ConfigError::Validation(
                "notifications.signing_secret must be at least 16 characters".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    scheduling: Option<SchedulingPatch>,
    calendar: Option<CalendarPatch>,
    qualification: Option<QualificationPatch>,
    notifications: Option<NotificationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulingPatch {
    weekly_attempt_cap: Option<u32>,
    min_spacing_hours: Option<u32>,
    busy_retry_minutes: Option<u32>,
    voicemail_attempt_no: Option<u32>,
    default_window: Option<RegionWindow>,
    regions: Option<BTreeMap<String, RegionWindow>>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    slot_minutes: Option<u32>,
    buffer_minutes: Option<u32>,
    min_hold_ttl_secs: Option<u32>,
    max_hold_ttl_secs: Option<u32>,
    default_hold_ttl_secs: Option<u32>,
    meeting_minutes: Option<u32>,
    hold_match_tolerance_secs: Option<u32>,
    conference_base_url: Option<String>,
    uid_domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QualificationPatch {
    accept_unknown_budget_for_high_need: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
