use std::path::PathBuf;
use std::time::Duration;

use chrono::Locale;
use tracing::warn;

use crate::calendar::{locale_from_name, parse_time_of_day};
use crate::engine::SiblingPolicy;
use crate::model::OperatingHours;

/// Runtime settings, read from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub hours: OperatingHours,
    /// Upper bound on every repository call made by the engine.
    pub repository_timeout: Duration,
    pub sibling_policy: SiblingPolicy,
    pub locale: Locale,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            hours: OperatingHours::ALL_DAY,
            repository_timeout: Duration::from_secs(5),
            sibling_policy: SiblingPolicy::AutoReject,
            locale: Locale::en_US,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("ROOMBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let open = lookup("ROOMBOOK_OPEN").and_then(|s| parse_time_of_day(&s).ok());
        let close = lookup("ROOMBOOK_CLOSE").and_then(|s| parse_time_of_day(&s).ok());
        let hours = match (open, close) {
            (None, None) => defaults.hours,
            (open, close) => {
                let open = open.unwrap_or(defaults.hours.open);
                let close = close.unwrap_or(defaults.hours.close);
                OperatingHours::new(open, close).unwrap_or_else(|| {
                    warn!("ROOMBOOK_OPEN/ROOMBOOK_CLOSE do not form a window, using all day");
                    defaults.hours
                })
            }
        };

        let repository_timeout = lookup("ROOMBOOK_REPOSITORY_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.repository_timeout);

        let sibling_policy = match lookup("ROOMBOOK_SIBLING_POLICY") {
            Some(s) => s.parse().unwrap_or_else(|_| {
                warn!("unknown ROOMBOOK_SIBLING_POLICY {s:?}, using {}", defaults.sibling_policy);
                defaults.sibling_policy
            }),
            None => defaults.sibling_policy,
        };

        let locale = match lookup("ROOMBOOK_LOCALE") {
            Some(s) => locale_from_name(&s).unwrap_or_else(|| {
                warn!("unsupported ROOMBOOK_LOCALE {s:?}, using en_US");
                defaults.locale
            }),
            None => defaults.locale,
        };

        let compact_threshold = lookup("ROOMBOOK_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);

        let metrics_port = lookup("ROOMBOOK_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            data_dir,
            hours,
            repository_timeout,
            sibling_policy,
            locale,
            compact_threshold,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.hours, OperatingHours::ALL_DAY);
        assert_eq!(cfg.repository_timeout, Duration::from_secs(5));
        assert_eq!(cfg.sibling_policy, SiblingPolicy::AutoReject);
        assert_eq!(cfg.locale, Locale::en_US);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/bookings.wal"));
    }

    #[test]
    fn business_hours_and_policy() {
        let cfg = config_from(&[
            ("ROOMBOOK_OPEN", "08:00"),
            ("ROOMBOOK_CLOSE", "18:30"),
            ("ROOMBOOK_SIBLING_POLICY", "keep-pending"),
            ("ROOMBOOK_REPOSITORY_TIMEOUT_MS", "250"),
            ("ROOMBOOK_LOCALE", "ja_JP"),
            ("ROOMBOOK_METRICS_PORT", "9100"),
            ("ROOMBOOK_DATA_DIR", "/var/lib/roombook"),
        ]);
        assert_eq!(cfg.hours, OperatingHours { open: 480, close: 1110 });
        assert_eq!(cfg.sibling_policy, SiblingPolicy::KeepPending);
        assert_eq!(cfg.repository_timeout, Duration::from_millis(250));
        assert_eq!(cfg.locale, Locale::ja_JP);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/roombook/bookings.wal"));
    }

    #[test]
    fn inverted_hours_fall_back_to_all_day() {
        let cfg = config_from(&[("ROOMBOOK_OPEN", "18:00"), ("ROOMBOOK_CLOSE", "08:00")]);
        assert_eq!(cfg.hours, OperatingHours::ALL_DAY);
    }

    #[test]
    fn only_close_given() {
        let cfg = config_from(&[("ROOMBOOK_CLOSE", "17:00")]);
        assert_eq!(cfg.hours, OperatingHours { open: 0, close: 1020 });
    }

    #[test]
    fn garbage_values_fall_back() {
        let cfg = config_from(&[
            ("ROOMBOOK_SIBLING_POLICY", "maybe"),
            ("ROOMBOOK_REPOSITORY_TIMEOUT_MS", "soon"),
            ("ROOMBOOK_LOCALE", "tlh"),
            ("ROOMBOOK_COMPACT_THRESHOLD", "-1"),
        ]);
        assert_eq!(cfg.sibling_policy, SiblingPolicy::AutoReject);
        assert_eq!(cfg.repository_timeout, Duration::from_secs(5));
        assert_eq!(cfg.locale, Locale::en_US);
        assert_eq!(cfg.compact_threshold, 1000);
    }
}
