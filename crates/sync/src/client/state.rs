use std::cmp::Ordering;

use glam::{DMat4, DVec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::handle::ClientHandle;
use crate::scene::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    Connecting,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pointer {
    pub origin: DVec3,
    pub end: DVec3,
}

/// Clients mint marker ids themselves, some as numbers and some as strings.
/// Numbers are kept as sent, so `-3` and `1.5` come back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerId {
    Number(Number),
    Text(String),
}

impl From<u64> for MarkerId {
    fn from(id: u64) -> Self {
        MarkerId::Number(id.into())
    }
}

impl Ord for MarkerId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MarkerId::Number(a), MarkerId::Number(b)) => numeric(a)
                .total_cmp(&numeric(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
            (MarkerId::Number(_), MarkerId::Text(_)) => Ordering::Less,
            (MarkerId::Text(_), MarkerId::Number(_)) => Ordering::Greater,
            (MarkerId::Text(a), MarkerId::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for MarkerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn numeric(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub origin: DVec3,
    pub end: DVec3,
    #[serde(default)]
    pub color: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [f32; 3]);

impl Color {
    /// Random hue with high saturation and mid lightness.
    pub fn random_pastel() -> Self {
        let mut rng = rand::rng();
        let hue = rng.random::<f32>();
        let saturation = 0.7 + 0.3 * rng.random::<f32>();
        let lightness = 0.4 + 0.2 * rng.random::<f32>();
        Self::from_hsl(hue, saturation, lightness)
    }

    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let hue = hue.rem_euclid(1.0);
        let saturation = saturation.clamp(0.0, 1.0);
        let lightness = lightness.clamp(0.0, 1.0);

        if saturation == 0.0 {
            return Self([lightness; 3]);
        }

        let q = if lightness <= 0.5 {
            lightness * (1.0 + saturation)
        } else {
            lightness + saturation - lightness * saturation
        };
        let p = 2.0 * lightness - q;

        Self([
            hue_to_rgb(p, q, hue + 1.0 / 3.0),
            hue_to_rgb(p, q, hue),
            hue_to_rgb(p, q, hue - 1.0 / 3.0),
        ])
    }
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}

/// Owned copy of one client's state, detached from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientData {
    pub handle: ClientHandle,
    pub phase: ConnectionPhase,
    pub camera_pose: DMat4,
    pub pointer: Option<Pointer>,
    pub markers: Vec<Marker>,
    pub selected: Vec<NodeId>,
    pub color: Color,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsl_primaries() {
        let red = Color::from_hsl(0.0, 1.0, 0.5);
        for (channel, expected) in red.0.iter().zip([1.0, 0.0, 0.0]) {
            assert!((channel - expected).abs() < 1e-4);
        }

        let grey = Color::from_hsl(0.3, 0.0, 0.25);
        assert_eq!(grey.0, [0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_random_pastel_in_range() {
        for _ in 0..32 {
            let Color(rgb) = Color::random_pastel();
            assert!(rgb.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }

    #[test]
    fn test_marker_id_accepts_numbers_and_strings() {
        let a: MarkerId = serde_json::from_str("12").unwrap();
        let b: MarkerId = serde_json::from_str("\"m-12\"").unwrap();
        assert_eq!(a, MarkerId::from(12));
        assert_eq!(b, MarkerId::Text("m-12".into()));
    }

    #[test]
    fn test_marker_id_keeps_negative_and_fractional_numbers() {
        for raw in ["-3", "1.5", "1700000000000.123"] {
            let id: MarkerId = serde_json::from_str(raw).unwrap();
            assert!(matches!(id, MarkerId::Number(_)));
            assert_eq!(serde_json::to_string(&id).unwrap(), raw);
        }
    }

    #[test]
    fn test_marker_id_order() {
        let mut ids: Vec<MarkerId> = ["\"b\"", "2", "-3", "1.5", "\"a\""]
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect();
        ids.sort();

        let sorted: Vec<String> = ids
            .iter()
            .map(|id| serde_json::to_string(id).unwrap())
            .collect();
        assert_eq!(sorted, ["-3", "1.5", "2", "\"a\"", "\"b\""]);
    }
}
