use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::model::{Secs, Span, TermGrid};

/// 2023-11-25T01:00:00Z
pub const DEFAULT_TERM_START: Secs = 1_700_874_000;
/// 2024-11-25T01:00:00Z
pub const DEFAULT_TERM_END: Secs = 1_732_496_400;
pub const DEFAULT_SLOT_WIDTH: Secs = 3600;
pub const DEFAULT_SLOT_CAPACITY: u32 = 5;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub grid: TermGrid,
    /// Registered at startup with ids 1..=n, in order.
    pub tags: Vec<String>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            grid: TermGrid {
                term: Span::new(DEFAULT_TERM_START, DEFAULT_TERM_END),
                slot_width: DEFAULT_SLOT_WIDTH,
                capacity: DEFAULT_SLOT_CAPACITY,
            },
            tags: Vec::new(),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Read `AIRTIME_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let lookup = &lookup;

        let data_dir = lookup("AIRTIME_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let term_start =
            parsed(lookup, "AIRTIME_TERM_START").unwrap_or(defaults.grid.term.start);
        let term_end = parsed(lookup, "AIRTIME_TERM_END").unwrap_or(defaults.grid.term.end);
        let tags = lookup("AIRTIME_TAGS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            data_dir,
            // Not Span::new: an inverted term must reach TermPolicy validation intact.
            grid: TermGrid {
                term: Span { start: term_start, end: term_end },
                slot_width: parsed(lookup, "AIRTIME_SLOT_WIDTH")
                    .unwrap_or(defaults.grid.slot_width),
                capacity: parsed(lookup, "AIRTIME_SLOT_CAPACITY")
                    .unwrap_or(defaults.grid.capacity),
            },
            tags,
            metrics_port: parsed(lookup, "AIRTIME_METRICS_PORT"),
            compact_threshold: parsed(lookup, "AIRTIME_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed(lookup, "AIRTIME_COMPACT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("airtime.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring unparseable {key}={raw:?}, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_cover_one_year_of_hourly_slots() {
        let cfg = from_pairs(&[]);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.grid.term.duration(), 366 * 24 * 3600);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/airtime.wal"));
    }

    #[test]
    fn overrides_applied() {
        let cfg = from_pairs(&[
            ("AIRTIME_DATA_DIR", "/var/lib/airtime"),
            ("AIRTIME_TERM_START", "0"),
            ("AIRTIME_TERM_END", "86400"),
            ("AIRTIME_SLOT_WIDTH", "900"),
            ("AIRTIME_SLOT_CAPACITY", "2"),
            ("AIRTIME_METRICS_PORT", "9090"),
            ("AIRTIME_COMPACT_THRESHOLD", "50"),
            ("AIRTIME_COMPACT_INTERVAL_SECS", "5"),
            ("AIRTIME_TAGS", "music, games ,,talk"),
        ]);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/airtime"));
        assert_eq!(cfg.grid.term, Span::new(0, 86400));
        assert_eq!(cfg.grid.slot_width, 900);
        assert_eq!(cfg.grid.capacity, 2);
        assert_eq!(cfg.metrics_port, Some(9090));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.compact_interval, Duration::from_secs(5));
        assert_eq!(cfg.tags, vec!["music", "games", "talk"]);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let cfg = from_pairs(&[
            ("AIRTIME_SLOT_CAPACITY", "lots"),
            ("AIRTIME_METRICS_PORT", "99999"),
        ]);
        assert_eq!(cfg.grid.capacity, DEFAULT_SLOT_CAPACITY);
        assert_eq!(cfg.metrics_port, None);
    }
}
