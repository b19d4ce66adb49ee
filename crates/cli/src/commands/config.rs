use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use booker_core::config::LoadOptions;
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    precedence: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
    regions: Vec<String>,
}

struct SourceLookup {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl SourceLookup {
    fn entry(&self, key: &'static str, value: impl ToString, env_keys: &[&str]) -> ConfigEntry {
        ConfigEntry { key, value: value.to_string(), source: self.source(key, env_keys) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let path = detect_config_path(options.config_path.as_deref());
    let lookup = SourceLookup { doc: load_config_file_doc(path.as_deref()), path };
    let signing_secret =
        if config.notifications.signing_secret.is_some() { "<redacted>" } else { "<unset>" };

    let entries = vec![
        lookup.entry("database.url", &config.database.url, &["BOOKER_DATABASE_URL"]),
        lookup.entry(
            "database.max_connections",
            config.database.max_connections,
            &["BOOKER_DATABASE_MAX_CONNECTIONS"],
        ),
        lookup.entry(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["BOOKER_DATABASE_TIMEOUT_SECS"],
        ),
        lookup.entry(
            "scheduling.weekly_attempt_cap",
            config.scheduling.weekly_attempt_cap,
            &["BOOKER_SCHEDULING_WEEKLY_ATTEMPT_CAP"],
        ),
        lookup.entry(
            "scheduling.min_spacing_hours",
            config.scheduling.min_spacing_hours,
            &["BOOKER_SCHEDULING_MIN_SPACING_HOURS"],
        ),
        lookup.entry(
            "scheduling.busy_retry_minutes",
            config.scheduling.busy_retry_minutes,
            &["BOOKER_SCHEDULING_BUSY_RETRY_MINUTES"],
        ),
        lookup.entry(
            "scheduling.voicemail_attempt_no",
            config.scheduling.voicemail_attempt_no,
            &[],
        ),
        lookup.entry(
            "scheduling.default_window",
            format!(
                "{:02}:00-{:02}:00 UTC",
                config.scheduling.default_window.start_hour(),
                config.scheduling.default_window.end_hour()
            ),
            &[],
        ),
        lookup.entry("calendar.slot_minutes", config.calendar.slot_minutes, &[]),
        lookup.entry(
            "calendar.buffer_minutes",
            config.calendar.buffer_minutes,
            &["BOOKER_CALENDAR_BUFFER_MINUTES"],
        ),
        lookup.entry("calendar.min_hold_ttl_secs", config.calendar.min_hold_ttl_secs, &[]),
        lookup.entry("calendar.max_hold_ttl_secs", config.calendar.max_hold_ttl_secs, &[]),
        lookup.entry(
            "calendar.default_hold_ttl_secs",
            config.calendar.default_hold_ttl_secs,
            &["BOOKER_CALENDAR_DEFAULT_HOLD_TTL_SECS"],
        ),
        lookup.entry(
            "calendar.meeting_minutes",
            config.calendar.meeting_minutes,
            &["BOOKER_CALENDAR_MEETING_MINUTES"],
        ),
        lookup.entry(
            "calendar.conference_base_url",
            &config.calendar.conference_base_url,
            &["BOOKER_CALENDAR_CONFERENCE_BASE_URL"],
        ),
        lookup.entry(
            "calendar.uid_domain",
            &config.calendar.uid_domain,
            &["BOOKER_CALENDAR_UID_DOMAIN"],
        ),
        lookup.entry(
            "qualification.accept_unknown_budget_for_high_need",
            config.qualification.accept_unknown_budget_for_high_need,
            &["BOOKER_QUALIFICATION_ACCEPT_UNKNOWN_BUDGET"],
        ),
        lookup.entry(
            "notifications.signing_secret",
            signing_secret,
            &["BOOKER_NOTIFICATIONS_SIGNING_SECRET"],
        ),
        lookup.entry(
            "logging.level",
            &config.logging.level,
            &["BOOKER_LOGGING_LEVEL", "BOOKER_LOG_LEVEL"],
        ),
        lookup.entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["BOOKER_LOGGING_FORMAT", "BOOKER_LOG_FORMAT"],
        ),
    ];

    let regions = config
        .scheduling
        .regions
        .iter()
        .map(|(region, window)| {
            format!("{region} {:02}:00-{:02}:00 UTC", window.start_hour(), window.end_hour())
        })
        .collect();

    let report = ConfigReport {
        precedence: "overrides > env > file > default",
        config_file: lookup.path.as_ref().map(|path| path.display().to_string()),
        entries,
        regions,
    };
    CommandResult::success_with("config", "effective configuration", Some(report))
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("booker.toml"), PathBuf::from("config/booker.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
