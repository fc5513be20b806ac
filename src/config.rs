use log::warn;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    pub snapshot_dir: PathBuf,
    /// Public prefix for saved snapshots. Snapshots are only kept when set.
    pub plates_url: Option<String>,
    /// How many recent plates are ignored when seen again.
    pub recent_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8402,
            db_path: "/data/plates.db".to_string(),
            snapshot_dir: PathBuf::from("/plates"),
            plates_url: None,
            recent_capacity: 7,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        Config {
            port: parse_or(&lookup, "PORT", defaults.port),
            db_path: lookup("DB_PATH").unwrap_or(defaults.db_path),
            snapshot_dir: lookup("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
            plates_url: lookup("PLATES_URL").filter(|s| !s.is_empty()),
            recent_capacity: parse_or(&lookup, "RECENT_CAPACITY", defaults.recent_capacity),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
