use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BsnError, BsnResult};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub mqtt: MqttConfig,
    pub influx: InfluxConfig,
    pub stream: StreamConfig,
    pub watchdog: WatchdogConfig,
    pub workers: WorkersConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BSN_PROFILE` env var. When set (e.g. `LAB`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("BSN_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            mqtt: MqttConfig::from_env_profiled(p),
            influx: InfluxConfig::from_env_profiled(p),
            stream: StreamConfig::from_env_profiled(p),
            watchdog: WatchdogConfig::from_env_profiled(p),
            workers: WorkersConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  mqtt:      enabled={}, broker={}, topic={}, qos={}",
            self.mqtt.enabled, self.mqtt.broker, self.mqtt.topic, self.mqtt.qos
        );
        tracing::info!(
            "  influx:    url={}, db={}",
            self.influx.url.as_deref().unwrap_or("(none)"),
            self.influx.database.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  stream:    timeout_ms={}, buffer={}",
            self.stream.timeout_ms, self.stream.buffer
        );
        tracing::info!("  watchdog:  interval={}s", self.watchdog.interval_secs);
        tracing::info!(
            "  workers:   scripts={}, python={}",
            self.workers.scripts_folder.display(),
            self.workers.python_command
        );
        if self.postgres.is_configured() {
            tracing::info!("  postgres:  host={}, db={}", self.postgres.host, self.postgres.database);
        } else {
            tracing::info!("  postgres:  (not configured)");
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── MQTT ──────────────────────────────────────────────────────

pub const DEFAULT_MQTT_PORT: u16 = 1883;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub enabled: bool,
    /// Broker URL, e.g. `tcp://localhost:1883`.
    pub broker: String,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub qos: u8,
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "MQTT_ENABLED", true),
            broker: profiled_env_or(p, "MQTT_BROKER", "tcp://localhost:1883"),
            topic: profiled_env_or(p, "MQTT_TOPIC", "aaac/campaign/imu"),
            client_id: profiled_env_or(p, "MQTT_CLIENT_ID", "bsn-webapp-sse"),
            username: profiled_env_opt(p, "MQTT_USERNAME"),
            password: profiled_env_opt(p, "MQTT_PASSWORD"),
            qos: profiled_env_u16(p, "MQTT_QOS", 0).min(2) as u8,
            keep_alive_secs: profiled_env_u64(p, "MQTT_KEEP_ALIVE_SECS", 30),
        }
    }

    /// Host and port of the broker URL.
    pub fn broker_addr(&self) -> BsnResult<(String, u16)> {
        parse_broker(&self.broker)
    }
}

/// Split `tcp://host:port` (or `mqtt://`, or a bare `host[:port]`) into host
/// and port. The port defaults to 1883; other schemes and bad ports are rejected.
pub fn parse_broker(broker: &str) -> BsnResult<(String, u16)> {
    let trimmed = broker.trim();
    let rest = match trimmed.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some((scheme, _)) => {
            return Err(BsnError::invalid(format!(
                "unsupported scheme '{scheme}' in broker url {trimmed}"
            )))
        }
        None => trimmed,
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| BsnError::invalid(format!("bad port in broker url {trimmed}")))?;
            (host, port)
        }
        None => (authority, DEFAULT_MQTT_PORT),
    };
    if host.is_empty() {
        return Err(BsnError::invalid(format!("missing host in broker url {trimmed}")));
    }
    Ok((host.to_string(), port))
}

// ── InfluxDB ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Fallback host/URL for historical reads.
    pub url: Option<String>,
    /// Fallback database for historical reads.
    pub database: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// Live writes allowed in flight at once; further writes are dropped.
    pub max_in_flight_writes: usize,
}

impl InfluxConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "INFLUX_URL"),
            database: profiled_env_opt(p, "INFLUX_DATABASE"),
            user: profiled_env_opt(p, "INFLUX_USER"),
            password: profiled_env_opt(p, "INFLUX_PASSWORD"),
            timeout_secs: profiled_env_u64(p, "INFLUX_TIMEOUT_SECS", 10),
            max_in_flight_writes: profiled_env_u32(p, "INFLUX_MAX_IN_FLIGHT", 64).max(1) as usize,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Live stream (SSE) ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Viewer lifetime in milliseconds; 0 disables the timeout.
    pub timeout_ms: u64,
    /// Per-viewer queue bound.
    pub buffer: usize,
}

impl StreamConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            timeout_ms: profiled_env_u64(p, "SSE_TIMEOUT_MS", 0),
            buffer: profiled_env_u32(p, "SSE_BUFFER", 256).max(1) as usize,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

// ── Watchdog ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub interval_secs: u64,
}

impl WatchdogConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_secs: profiled_env_u64(p, "WATCHDOG_INTERVAL_SECS", 30).max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ── Acquisition workers ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub scripts_folder: PathBuf,
    pub python_command: String,
}

fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

impl WorkersConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            scripts_folder: PathBuf::from(profiled_env_or(p, "SCRIPTS_FOLDER", "scripts")),
            python_command: profiled_env_or(p, "PYTHON_COMMAND", default_python()),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "bsn"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mqtt(broker: &str) -> MqttConfig {
        MqttConfig {
            enabled: true,
            broker: broker.into(),
            topic: "t".into(),
            client_id: "c".into(),
            username: None,
            password: None,
            qos: 0,
            keep_alive_secs: 30,
        }
    }

    #[test]
    fn broker_url_variants() {
        assert_eq!(mqtt("tcp://broker.lab:1884").broker_addr().unwrap(), ("broker.lab".into(), 1884));
        assert_eq!(parse_broker("mqtt://10.0.0.5").unwrap(), ("10.0.0.5".into(), 1883));
        assert_eq!(parse_broker(" broker.lab ").unwrap(), ("broker.lab".into(), 1883));
    }

    #[test]
    fn broker_url_rejects_bad_input() {
        for bad in ["ws://x:1", "tcp://:1883", "tcp://broker.lab:nope", ""] {
            assert!(
                matches!(parse_broker(bad), Err(BsnError::InvalidInput(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        // Unique names so parallel tests do not interfere.
        env::set_var("BSNTEST_CFG_SSE_TIMEOUT_MS", "1500");
        let stream = StreamConfig::from_env_profiled("BSNTEST_CFG");
        assert_eq!(stream.timeout_ms, 1500);
        assert_eq!(stream.timeout(), Some(Duration::from_millis(1500)));
        env::remove_var("BSNTEST_CFG_SSE_TIMEOUT_MS");
    }

    #[test]
    fn zero_timeout_disables_stream_deadline() {
        let s = StreamConfig { timeout_ms: 0, buffer: 16 };
        assert_eq!(s.timeout(), None);
    }

    #[test]
    fn postgres_without_username_is_not_configured() {
        let pg = PostgresConfig {
            host: "localhost".into(),
            port: 5432,
            database: "bsn".into(),
            username: None,
            password: None,
            ssl_mode: "prefer".into(),
            max_connections: 5,
        };
        assert!(!pg.is_configured());
        assert!(pg.connection_string().starts_with("postgres://postgres:@localhost:5432/bsn"));
    }
}
