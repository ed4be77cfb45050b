use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Size of the fixed big-endian wire form of a [`Location`].
pub const LOCATION_WIRE_LEN: usize = 32;

/// A point in space and time reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub alt: f32,
    pub heading: f32,
    /// Seconds since the Unix epoch, client clock.
    pub timestamp: i64,
}

impl Location {
    pub fn new(lat: f64, lng: f64, alt: f32, heading: f32, timestamp: i64) -> Self {
        Location {
            lat,
            lng,
            alt,
            heading,
            timestamp,
        }
    }

    /// Check the coordinate ranges: -90 <= lat <= 90, -180 < lng <= 180.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoreError::malformed(format!("latitude {}", self.lat)));
        }
        if !self.lng.is_finite() || self.lng <= -180.0 || self.lng > 180.0 {
            return Err(CoreError::malformed(format!("longitude {}", self.lng)));
        }
        Ok(())
    }

    /// Append the 32-byte big-endian wire form.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.lat.to_be_bytes());
        out.extend_from_slice(&self.lng.to_be_bytes());
        out.extend_from_slice(&self.alt.to_be_bytes());
        out.extend_from_slice(&self.heading.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
    }

    /// The 32-byte big-endian wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOCATION_WIRE_LEN);
        self.encode_into(&mut out);
        out
    }

    /// Decode the 32-byte big-endian wire form.
    pub fn decode(buf: &[u8]) -> Result<Self, CoreError> {
        if buf.len() < LOCATION_WIRE_LEN {
            return Err(CoreError::malformed(format!(
                "location: {} bytes, need {}",
                buf.len(),
                LOCATION_WIRE_LEN
            )));
        }
        let lat = f64::from_be_bytes(buf[0..8].try_into().unwrap());
        let lng = f64::from_be_bytes(buf[8..16].try_into().unwrap());
        let alt = f32::from_be_bytes(buf[16..20].try_into().unwrap());
        let heading = f32::from_be_bytes(buf[20..24].try_into().unwrap());
        let timestamp = i64::from_be_bytes(buf[24..32].try_into().unwrap());
        Ok(Location {
            lat,
            lng,
            alt,
            heading,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        let loc = Location::new(-34.9287, 138.5999, 86.45, 12.5, 1_700_000_000);
        let bytes = loc.encode();
        assert_eq!(bytes.len(), LOCATION_WIRE_LEN);
        let back = Location::decode(&bytes).unwrap();
        assert_eq!(back, loc);
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(Location::decode(&[0u8; 31]).is_err());
    }

    #[test]
    fn json_field_names() {
        let loc = Location::new(1.0, 2.0, 3.0, 4.0, 5);
        let json = serde_json::to_value(loc).unwrap();
        assert_eq!(json["lat"], 1.0);
        assert_eq!(json["lng"], 2.0);
        assert_eq!(json["alt"], 3.0);
        assert_eq!(json["heading"], 4.0);
        assert_eq!(json["timestamp"], 5);
    }

    #[test]
    fn validation() {
        assert!(Location::new(-34.9, 138.6, 0.0, 0.0, 0).validate().is_ok());
        assert!(Location::new(91.0, 0.0, 0.0, 0.0, 0).validate().is_err());
        assert!(Location::new(0.0, -180.0, 0.0, 0.0, 0).validate().is_err());
        assert!(Location::new(0.0, 180.0, 0.0, 0.0, 0).validate().is_ok());
    }
}
