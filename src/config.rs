use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    /// Unset means the in-memory store.
    pub database_url: Option<String>,

    // Reader
    pub reader_url: String,
    pub reader_poll: Duration,
    pub reader_timeout: Duration,
    pub reader_backoff_max: Duration,
    pub feed_channel: usize,

    // Engine
    pub debounce_seconds: i64,
    pub recent_events: usize,
    pub subscriber_queue: usize,
    pub store_write_attempts: u32,
    /// How often badge lookups are reloaded from the store. `None` loads once.
    pub identity_refresh: Option<Duration>,
    /// Seeded into the in-memory store only.
    pub antenna_locations: Vec<(u16, String)>,

    // Rate limiting
    pub rate_simulate_per_min: u32,
    pub rate_register_per_min: u32,

    pub log_level: tracing::Level,
    pub log_dir: String,
    pub api_prefix: String,
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}

fn string_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// `"1:Production,2:Warehouse"` into antenna/area pairs.
pub fn parse_antenna_locations(raw: &str) -> anyhow::Result<Vec<(u16, String)>> {
    let mut locations = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((port, area)) = entry.split_once(':') else {
            bail!("antenna location {entry:?} is not PORT:NAME");
        };
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("antenna port in {entry:?}"))?;
        let area = area.trim();
        if area.is_empty() {
            bail!("antenna location {entry:?} has no area name");
        }
        locations.push((port, area.to_string()));
    }
    Ok(locations)
}

/// One day.
const MAX_DEBOUNCE_SECONDS: i64 = 86_400;

fn check_debounce_seconds(seconds: i64) -> anyhow::Result<i64> {
    if !(0..=MAX_DEBOUNCE_SECONDS).contains(&seconds) {
        bail!("DEBOUNCE_SECONDS must be between 0 and {MAX_DEBOUNCE_SECONDS}, got {seconds}");
    }
    Ok(seconds)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let debounce_seconds = check_debounce_seconds(var_or("DEBOUNCE_SECONDS", 5)?)?;

        Ok(Self {
            server_addr: string_or("SERVER_ADDR", "0.0.0.0:8766"),
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            reader_url: string_or("READER_URL", "http://192.168.1.100:8080"),
            reader_poll: Duration::from_millis(var_or("READER_POLL_MS", 100)?),
            reader_timeout: Duration::from_millis(var_or("READER_TIMEOUT_MS", 1_000)?),
            reader_backoff_max: Duration::from_millis(var_or("READER_BACKOFF_MAX_MS", 30_000)?),
            feed_channel: var_or::<usize>("FEED_CHANNEL", 1_024)?.max(1),

            debounce_seconds,
            recent_events: var_or("RECENT_EVENTS", 50)?,
            subscriber_queue: var_or("SUBSCRIBER_QUEUE", 64)?,
            store_write_attempts: var_or::<u32>("STORE_WRITE_ATTEMPTS", 3)?.max(1),
            identity_refresh: Some(var_or::<u64>("IDENTITY_REFRESH_SECS", 300)?)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            antenna_locations: parse_antenna_locations(&string_or(
                "ANTENNA_LOCATIONS",
                "1:Production,2:Warehouse",
            ))?,

            rate_simulate_per_min: var_or("RATE_SIMULATE_PER_MIN", 120)?,
            rate_register_per_min: var_or("RATE_REGISTER_PER_MIN", 30)?,

            log_level: var_or("LOG_LEVEL", tracing::Level::INFO)?,
            log_dir: string_or("LOG_DIR", "logs"),
            api_prefix: string_or("API_PREFIX", "/api"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antenna_locations_parse() {
        let parsed = parse_antenna_locations(" 1:Production, 2 : Warehouse ,").unwrap();
        assert_eq!(
            parsed,
            vec![(1, "Production".to_string()), (2, "Warehouse".to_string())]
        );
        assert!(parse_antenna_locations("").unwrap().is_empty());
    }

    #[test]
    fn malformed_antenna_locations_are_rejected() {
        assert!(parse_antenna_locations("Production").is_err());
        assert!(parse_antenna_locations("x:Production").is_err());
        assert!(parse_antenna_locations("1:").is_err());
    }

    #[test]
    fn debounce_seconds_are_bounded() {
        assert_eq!(check_debounce_seconds(0).unwrap(), 0);
        assert_eq!(check_debounce_seconds(86_400).unwrap(), 86_400);
        assert!(check_debounce_seconds(-1).is_err());
        assert!(check_debounce_seconds(86_401).is_err());
        assert!(check_debounce_seconds(i64::MAX).is_err());
    }
}
