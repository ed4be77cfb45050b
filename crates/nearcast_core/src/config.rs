/// Circumference of the earth in meters, as used to convert a search
/// radius into spherical-cap geometry.
pub const EARTH_CIRCUMFERENCE_METERS: f64 = 1000.0 * 40_075.071;

/// Default broker endpoint.
pub const DEFAULT_BROKER_URL: &str = "redis://localhost";

/// Default session token lifetime in seconds.
pub const DEFAULT_TOKEN_TIMEOUT_SECS: u64 = 30;

/// Topology configuration: how wide a client's neighborhood is, at which
/// cell level it is tracked, and how sessions are bounded.
#[derive(Debug, Clone)]
pub struct Config {
    /// Radius of the local neighborhood in meters.
    pub search_radius_meters: f64,
    /// S2 cell level at which clients are indexed (level 15 cells are
    /// roughly 300 m across).
    pub topology_level: u8,
    /// Height of the spherical cap covering the neighborhood, derived
    /// from the search radius.
    pub height: f64,
    /// URL of the pub/sub + key-value broker.
    pub broker_url: String,
    /// Session token lifetime in seconds.
    pub token_timeout_secs: u64,
}

impl Config {
    /// Build a configuration for the given neighborhood radius and cell level.
    pub fn new(search_radius_meters: f64, topology_level: u8) -> Self {
        Config {
            search_radius_meters,
            topology_level,
            height: to_height(search_radius_meters),
            broker_url: DEFAULT_BROKER_URL.to_string(),
            token_timeout_secs: DEFAULT_TOKEN_TIMEOUT_SECS,
        }
    }

    /// Replace the broker URL.
    pub fn with_broker_url(mut self, url: impl Into<String>) -> Self {
        self.broker_url = url.into();
        self
    }

    /// Replace the token lifetime.
    pub fn with_token_timeout(mut self, secs: u64) -> Self {
        self.token_timeout_secs = secs;
        self
    }
}

fn earth_meters_to_radians(meters: f64) -> f64 {
    (2.0 * std::f64::consts::PI) * (meters / EARTH_CIRCUMFERENCE_METERS)
}

/// Spherical-cap height for a cap whose angular radius corresponds to the
/// given distance along the surface: `h = r^2 / 2`.
fn to_height(meters: f64) -> f64 {
    let radius_radians = earth_meters_to_radians(meters);
    (radius_radians * radius_radians) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_tracks_radius() {
        let narrow = Config::new(250.0, 15);
        let wide = Config::new(1000.0, 15);
        assert!(narrow.height > 0.0);
        assert!(wide.height > narrow.height);
        // h = r^2/2 scales quadratically
        let ratio = wide.height / narrow.height;
        assert!((ratio - 16.0).abs() < 1e-9);
    }

    #[test]
    fn defaults() {
        let config = Config::new(250.0, 15);
        assert_eq!(config.broker_url, DEFAULT_BROKER_URL);
        assert_eq!(config.token_timeout_secs, 30);
    }
}
