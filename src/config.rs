use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Service settings, read from `CLASSGRID_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// JSON directory seed. `None` starts with an empty directory.
    pub directory_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    /// WAL appends before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            directory_path: None,
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers and a zero compaction
    /// interval fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            bind: lookup("CLASSGRID_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "CLASSGRID_PORT").unwrap_or(defaults.port),
            data_dir: lookup("CLASSGRID_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            directory_path: lookup("CLASSGRID_DIRECTORY").map(PathBuf::from),
            metrics_port: parsed(&lookup, "CLASSGRID_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "CLASSGRID_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed::<u64>(&lookup, "CLASSGRID_COMPACT_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("classgrid.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
