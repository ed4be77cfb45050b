use nearcast_core::Config;
use std::env;
use std::path::PathBuf;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host (default: 0.0.0.0)
    pub host: String,
    /// Listen port (default: 9443)
    pub port: u16,
    /// Redis URL backing the token store and the pub/sub broker
    pub redis_url: String,
    /// SQLite archive path (default: ./nearcast.db)
    pub database_path: PathBuf,
    /// Neighborhood radius in meters (default: 250)
    pub search_radius_meters: f64,
    /// S2 level clients are indexed at (default: 15)
    pub topology_level: u8,
    /// Session token TTL in seconds (default: 30)
    pub token_ttl_secs: u64,
    /// Period of the expired-session sweep in seconds (default: 30)
    pub cleanup_period_secs: u64,
    /// Port for the binary TCP demo surface; disabled when unset
    pub tcp_port: Option<u16>,
    /// Run against in-memory backends with synthetic peer traffic
    pub simulate: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "9443".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost".to_string());

        let database_path =
            PathBuf::from(env::var("DATABASE_PATH").unwrap_or_else(|_| "./nearcast.db".to_string()));

        let search_radius_meters = env::var("SEARCH_RADIUS_METERS")
            .unwrap_or_else(|_| "250".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidRadius)?;

        let topology_level = env::var("TOPOLOGY_LEVEL")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .ok()
            .filter(|level| (1..=30).contains(level))
            .ok_or(ConfigError::InvalidLevel)?;

        let token_ttl_secs = env::var("TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let cleanup_period_secs = env::var("CLEANUP_PERIOD_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let tcp_port = match env::var("TCP_PORT") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidPort)?),
            Err(_) => None,
        };

        let simulate = env::var("SIMULATE")
            .map(|raw| matches!(raw.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(ServerConfig {
            host,
            port,
            redis_url,
            database_path,
            search_radius_meters,
            topology_level,
            token_ttl_secs,
            cleanup_period_secs,
            tcp_port,
            simulate,
        })
    }

    /// The listen address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The core topology configuration this server runs.
    pub fn topology_config(&self) -> Config {
        Config::new(self.search_radius_meters, self.topology_level)
            .with_broker_url(self.redis_url.clone())
            .with_token_timeout(self.token_ttl_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidRadius,
    InvalidLevel,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT or TCP_PORT environment variable"),
            ConfigError::InvalidRadius => {
                write!(f, "Invalid SEARCH_RADIUS_METERS environment variable")
            }
            ConfigError::InvalidLevel => write!(f, "Invalid TOPOLOGY_LEVEL environment variable"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_config_carries_server_settings() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9443,
            redis_url: "redis://broker:6379".to_string(),
            database_path: PathBuf::from("/tmp/x.db"),
            search_radius_meters: 500.0,
            topology_level: 14,
            token_ttl_secs: 60,
            cleanup_period_secs: 30,
            tcp_port: None,
            simulate: false,
        };
        let core = config.topology_config();
        assert_eq!(core.topology_level, 14);
        assert_eq!(core.token_timeout_secs, 60);
        assert_eq!(core.broker_url, "redis://broker:6379");
    }
}
