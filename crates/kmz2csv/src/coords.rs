//! KML coordinate tuple tokenizer.
//!
//! A `<coordinates>` node holds tuples separated by whitespace, each tuple
//! shaped `lon,lat[,alt]`.

use serde::Serialize;

/// One decoded coordinate tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CoordinateTriple {
    /// Longitude (degrees).
    pub longitude: f64,
    /// Latitude (degrees).
    pub latitude: f64,
    /// Altitude (meters), 0 when absent.
    pub altitude: f64,
}

impl CoordinateTriple {
    /// Create a triple.
    pub fn new(longitude: f64, latitude: f64, altitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude,
        }
    }
}

/// Parsed state of a single comma-separated component.
enum Component {
    Missing,
    Value(f64),
    Invalid,
}

impl Component {
    fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Missing;
        };
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() || is_infinity_literal(raw) => Self::Value(v),
            _ => Self::Invalid,
        }
    }

    fn or_zero(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Missing | Self::Invalid => 0.0,
        }
    }
}

/// Only the exact spelling `Infinity` (optionally signed) is numeric; `inf`,
/// `infinity` and `NaN` are not.
fn is_infinity_literal(raw: &str) -> bool {
    raw.strip_prefix(['+', '-']).unwrap_or(raw) == "Infinity"
}

/// Tokenize the text content of a `<coordinates>` node.
///
/// Blank or missing components become 0. A tuple whose longitude or latitude
/// is present but not a number is dropped entirely. Altitude never causes a
/// drop; an unreadable altitude is 0.
pub fn parse_coordinates(text: Option<&str>) -> Vec<CoordinateTriple> {
    let Some(text) = text else {
        return Vec::new();
    };

    text.split_whitespace()
        .filter_map(parse_tuple)
        .collect()
}

fn parse_tuple(token: &str) -> Option<CoordinateTriple> {
    let mut parts = token.split(',');
    let lon = Component::parse(parts.next());
    let lat = Component::parse(parts.next());
    let alt = Component::parse(parts.next());

    if matches!(lon, Component::Invalid) || matches!(lat, Component::Invalid) {
        return None;
    }

    Some(CoordinateTriple::new(lon.or_zero(), lat.or_zero(), alt.or_zero()))
}
