use bsn_core::DbTarget;

pub const DEFAULT_INFLUX_PORT: u16 = 8086;

/// Turn a configured host into a base URL.
///
/// `http(s)://...` is kept as is, `host:port` gains an `http://` scheme and a
/// bare host also gets the default port. Blank input yields `None`.
pub fn normalize_base_url(host: &str) -> Option<String> {
    let value = host.trim();
    if value.is_empty() {
        return None;
    }
    let url = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else if value.contains(':') {
        format!("http://{value}")
    } else {
        format!("http://{value}:{DEFAULT_INFLUX_PORT}")
    };
    Some(url.trim_end_matches('/').to_string())
}

/// A target ready for HTTP calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub base_url: String,
    pub database: String,
}

impl ResolvedTarget {
    pub fn from_db_target(target: &DbTarget) -> Option<Self> {
        Self::from_parts(&target.host, &target.database)
    }

    pub fn from_parts(host: &str, database: &str) -> Option<Self> {
        let database = database.trim();
        if database.is_empty() {
            return None;
        }
        Some(Self {
            base_url: normalize_base_url(host)?,
            database: database.to_string(),
        })
    }

    pub fn write_url(&self) -> String {
        format!("{}/write", self.base_url)
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }
}
