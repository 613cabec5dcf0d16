use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// Bounding box for a detected face, in frame-pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    /// Apply a linear scale factor to both origin and extent.
    ///
    /// Used to map frame-pixel coordinates onto the display surface
    /// (`sx = display_width / frame_width`, likewise for `sy`).
    pub fn scaled(&self, sx: f32, sy: f32) -> FaceBox {
        FaceBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
        }
    }
}

/// The closed set of expression labels the classifier produces.
///
/// The enumeration order is fixed and observable: score ties in
/// [`ExpressionScores::dominant`] resolve to the earliest entry of
/// [`Emotion::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Emotion {
    pub const COUNT: usize = 7;

    /// All labels in classifier output order.
    pub const ALL: [Emotion; Emotion::COUNT] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Surprised,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Surprised => "surprised",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-emotion confidences in [0, 1], one slot per [`Emotion`].
///
/// Produced by softmax, so values sum to ~1. The empty case is
/// unrepresentable: every label always has a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionScores {
    values: [f32; Emotion::COUNT],
}

impl ExpressionScores {
    /// Wrap raw values given in [`Emotion::ALL`] order.
    pub fn new(values: [f32; Emotion::COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        self.values[emotion.index()]
    }

    /// Iterate `(label, value)` pairs in [`Emotion::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.iter().map(|&e| (e, self.values[e.index()]))
    }

    /// The label holding the maximum value.
    ///
    /// Ties resolve to the first label in [`Emotion::ALL`] order: the
    /// strict `>` keeps the earliest maximum.
    pub fn dominant(&self) -> Emotion {
        let mut best = Emotion::ALL[0];
        let mut best_value = self.values[0];
        for (emotion, value) in self.iter().skip(1) {
            if value > best_value {
                best = emotion;
                best_value = value;
            }
        }
        best
    }

    /// The `n` highest-scoring labels, descending; ties keep
    /// [`Emotion::ALL`] order (stable sort).
    pub fn top(&self, n: usize) -> Vec<(Emotion, f32)> {
        let mut entries: Vec<(Emotion, f32)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(n);
        entries
    }
}

impl Serialize for ExpressionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Emotion::COUNT))?;
        for (emotion, value) in self.iter() {
            map.serialize_entry(emotion.label(), &value)?;
        }
        map.end()
    }
}

/// One tick's analysis of a detected face: box plus expression scores.
///
/// Immutable; superseded by the next tick's result, never merged with
/// history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceAnalysis {
    pub face: FaceBox,
    pub scores: ExpressionScores,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: [f32; Emotion::COUNT]) -> ExpressionScores {
        ExpressionScores::new(values)
    }

    #[test]
    fn test_emotion_order_is_pinned() {
        // The tie-break contract depends on this exact order.
        assert_eq!(
            Emotion::ALL,
            [
                Emotion::Neutral,
                Emotion::Happy,
                Emotion::Sad,
                Emotion::Angry,
                Emotion::Fearful,
                Emotion::Disgusted,
                Emotion::Surprised,
            ]
        );
    }

    #[test]
    fn test_dominant_unique_maximum() {
        let s = scores([0.05, 0.8, 0.05, 0.02, 0.03, 0.02, 0.03]);
        assert_eq!(s.dominant(), Emotion::Happy);
    }

    #[test]
    fn test_dominant_maximum_in_last_slot() {
        let s = scores([0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.4]);
        assert_eq!(s.dominant(), Emotion::Surprised);
    }

    #[test]
    fn test_dominant_tie_returns_first_in_order() {
        // sad and surprised tie; sad comes first in Emotion::ALL.
        let s = scores([0.1, 0.1, 0.3, 0.1, 0.05, 0.05, 0.3]);
        assert_eq!(s.dominant(), Emotion::Sad);
    }

    #[test]
    fn test_dominant_all_equal_returns_neutral() {
        let v = 1.0 / Emotion::COUNT as f32;
        let s = scores([v; Emotion::COUNT]);
        assert_eq!(s.dominant(), Emotion::Neutral);
    }

    #[test]
    fn test_top_is_sorted_and_tie_stable() {
        let s = scores([0.2, 0.3, 0.1, 0.3, 0.05, 0.03, 0.02]);
        let top = s.top(3);
        // happy and angry tie at 0.3; happy comes first in Emotion::ALL.
        assert_eq!(top[0].0, Emotion::Happy);
        assert_eq!(top[1].0, Emotion::Angry);
        assert_eq!(top[2].0, Emotion::Neutral);
    }

    #[test]
    fn test_scaled_applies_factor_to_origin_and_extent() {
        let b = FaceBox {
            x: 10.0,
            y: 20.0,
            width: 50.0,
            height: 40.0,
            confidence: 0.9,
        };
        let k = 2.5;
        let scaled = b.scaled(k, k);
        assert!((scaled.x - 25.0).abs() < 1e-6);
        assert!((scaled.y - 50.0).abs() < 1e-6);
        assert!((scaled.width - 125.0).abs() < 1e-6);
        assert!((scaled.height - 100.0).abs() < 1e-6);
        assert!((scaled.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_scaled_halving_matches_display_mapping() {
        // 640x480 frame shown on a 320x240 surface.
        let b = FaceBox {
            x: 10.0,
            y: 10.0,
            width: 50.0,
            height: 50.0,
            confidence: 0.8,
        };
        let scaled = b.scaled(320.0 / 640.0, 240.0 / 480.0);
        assert_eq!(
            (scaled.x, scaled.y, scaled.width, scaled.height),
            (5.0, 5.0, 25.0, 25.0)
        );
    }

    #[test]
    fn test_scores_serialize_as_label_map() {
        let s = scores([0.1, 0.8, 0.02, 0.02, 0.02, 0.02, 0.02]);
        let json = serde_json::to_value(&s).unwrap();
        assert!((json["happy"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((json["neutral"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(json.as_object().unwrap().len(), Emotion::COUNT);
    }

    #[test]
    fn test_analysis_serializes_with_face_and_scores() {
        let analysis = FaceAnalysis {
            face: FaceBox {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                confidence: 0.7,
            },
            scores: scores([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["face"]["x"].as_f64().unwrap(), 1.0);
        assert_eq!(json["scores"]["neutral"].as_f64().unwrap(), 1.0);
    }
}
