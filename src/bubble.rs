//! Bubble Model
//!
//! The central entity: an ephemeral, geolocated text message with a bounded
//! lifetime. Bubbles are immutable after construction; `remaining_ms` is
//! always recomputed from live store TTL at read time, never trusted from a
//! stored copy.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// Display style of a bubble. Unknown input values coerce to `Speech`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleKind {
    Speech,
    Thought,
}

impl BubbleKind {
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "thought" => BubbleKind::Thought,
            _ => BubbleKind::Speech,
        }
    }
}

impl<'de> Deserialize<'de> for BubbleKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(BubbleKind::coerce(&raw))
    }
}

impl Default for BubbleKind {
    fn default() -> Self {
        BubbleKind::Speech
    }
}

/// Coordinate validation mode; a deployment selects exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CoordMode {
    /// x is latitude in [-90, 90], y is longitude in [-180, 180].
    Geographic,
    /// Fixed pixel space: x in [0, width], y in [0, height].
    Canvas { width: f64, height: f64 },
}

impl CoordMode {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        match self {
            CoordMode::Geographic => (-90.0..=90.0).contains(&x) && (-180.0..=180.0).contains(&y),
            CoordMode::Canvas { width, height } => {
                (0.0..=*width).contains(&x) && (0.0..=*height).contains(&y)
            }
        }
    }

    /// Clamp a point back into bounds (used by the seeder after jitter).
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            CoordMode::Geographic => (x.clamp(-90.0, 90.0), y.clamp(-180.0, 180.0)),
            CoordMode::Canvas { width, height } => (x.clamp(0.0, *width), y.clamp(0.0, *height)),
        }
    }
}

/// A candidate submission as it arrives from the transport layer. All
/// fields optional; presence is validated by the lifecycle manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BubbleInput {
    pub name: Option<String>,
    pub text: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: Option<BubbleKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bubble {
    pub id: String,
    pub name: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: BubbleKind,
    /// Server-side creation time, Unix millis.
    pub created_at: i64,
    /// Derived at read/replay time from the store's live TTL. A value
    /// decoded from history is stale by definition and must be recomputed.
    #[serde(default)]
    pub remaining_ms: u64,
}

impl Bubble {
    /// Construct a bubble from already-validated parts, applying the
    /// trim/truncate/coercion rules.
    pub fn build(
        source: &str,
        name: &str,
        text: &str,
        x: f64,
        y: f64,
        kind: BubbleKind,
        max_name_len: usize,
        max_text_len: usize,
        is_seed: bool,
    ) -> Self {
        let created_at = Utc::now().timestamp_millis();
        let id = if is_seed {
            let tag = uuid::Uuid::new_v4().simple().to_string();
            format!("seed-{}-{}", &tag[..8], created_at)
        } else {
            format!("{}-{}", source, created_at)
        };
        Self {
            id,
            name: truncate_chars(name.trim(), max_name_len),
            text: truncate_chars(text.trim(), max_text_len),
            x,
            y,
            kind,
            created_at,
            remaining_ms: 0,
        }
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_coercion() {
        assert_eq!(BubbleKind::coerce("thought"), BubbleKind::Thought);
        assert_eq!(BubbleKind::coerce("speech"), BubbleKind::Speech);
        assert_eq!(BubbleKind::coerce("shout"), BubbleKind::Speech);
        assert_eq!(BubbleKind::coerce(""), BubbleKind::Speech);
    }

    #[test]
    fn test_kind_coercion_through_serde() {
        let input: BubbleInput =
            serde_json::from_str(r#"{"name":"a","text":"b","x":1.0,"y":2.0,"type":"banner"}"#)
                .unwrap();
        assert_eq!(input.kind, Some(BubbleKind::Speech));

        let input: BubbleInput =
            serde_json::from_str(r#"{"name":"a","text":"b","x":1.0,"y":2.0,"type":"thought"}"#)
                .unwrap();
        assert_eq!(input.kind, Some(BubbleKind::Thought));
    }

    #[test]
    fn test_geographic_bounds() {
        let mode = CoordMode::Geographic;
        assert!(mode.contains(48.85, 2.35));
        assert!(mode.contains(-90.0, 180.0));
        assert!(!mode.contains(95.0, 0.0));
        assert!(!mode.contains(0.0, -180.1));
        assert!(!mode.contains(f64::NAN, 0.0));
    }

    #[test]
    fn test_canvas_bounds() {
        let mode = CoordMode::Canvas {
            width: 800.0,
            height: 600.0,
        };
        assert!(mode.contains(0.0, 0.0));
        assert!(mode.contains(800.0, 600.0));
        assert!(!mode.contains(-1.0, 10.0));
        assert!(!mode.contains(10.0, 601.0));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 20), "short");
        assert_eq!(truncate_chars("", 20), "");
    }

    #[test]
    fn test_build_applies_trim_and_truncation() {
        let long_text = "x".repeat(500);
        let bubble = Bubble::build(
            "10.0.0.1",
            "  a very long display name indeed  ",
            &long_text,
            1.0,
            2.0,
            BubbleKind::Speech,
            20,
            140,
            false,
        );
        assert_eq!(bubble.name.chars().count(), 20);
        assert_eq!(bubble.text.chars().count(), 140);
        assert!(bubble.id.starts_with("10.0.0.1-"));
        assert_eq!(bubble.remaining_ms, 0);
    }

    #[test]
    fn test_seed_id_prefix() {
        let bubble = Bubble::build(
            "ignored",
            "n",
            "t",
            0.0,
            0.0,
            BubbleKind::Thought,
            20,
            140,
            true,
        );
        assert!(bubble.id.starts_with("seed-"));
    }
}
