// 🎖️ Grade Model - rank tokens, numeric values and the severity gradient
//
// Items carry no grade of their own: the grade is read from the item label.
// "s", " S " and "S" are the same token. Anything else is simply ungraded.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// GRADE TOKENS
// ============================================================================

/// Ordered grade tokens, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    D,
    C,
    B,
    A,
    S,
    SS,
}

impl Grade {
    /// All grades in ascending order (D=0 … SS=5)
    pub const ALL: [Grade; 6] = [Grade::D, Grade::C, Grade::B, Grade::A, Grade::S, Grade::SS];

    /// Highest numeric grade value
    pub const MAX_VALUE: u8 = 5;

    /// Parse a label as a grade token (trimmed, case-insensitive)
    pub fn parse(text: &str) -> Option<Grade> {
        match text.trim().to_uppercase().as_str() {
            "D" => Some(Grade::D),
            "C" => Some(Grade::C),
            "B" => Some(Grade::B),
            "A" => Some(Grade::A),
            "S" => Some(Grade::S),
            "SS" => Some(Grade::SS),
            _ => None,
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            Grade::D => 0,
            Grade::C => 1,
            Grade::B => 2,
            Grade::A => 3,
            Grade::S => 4,
            Grade::SS => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::D => "D",
            Grade::C => "C",
            Grade::B => "B",
            Grade::A => "A",
            Grade::S => "S",
            Grade::SS => "SS",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a label to its grade value, `None` when the label is not a grade
pub fn grade_to_value(text: &str) -> Option<u8> {
    Grade::parse(text).map(|g| g.value())
}

// ============================================================================
// COLOR GRADIENT
// ============================================================================

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// CSS hex form, e.g. `#ffdf00`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Gradient anchor at normalized 0.0 (dark green)
pub const LOW_ANCHOR: Rgb = Rgb::new(34, 139, 34);

/// Gradient anchor at normalized 0.5 (yellow)
pub const MID_ANCHOR: Rgb = Rgb::new(255, 223, 0);

/// Gradient anchor at normalized 1.0 (red)
pub const HIGH_ANCHOR: Rgb = Rgb::new(255, 0, 0);

fn lerp_channel(from: u8, to: u8, k: f64) -> u8 {
    let v = from as f64 + (to as f64 - from as f64) * k;
    v.round().clamp(0.0, 255.0) as u8
}

fn lerp(from: Rgb, to: Rgb, k: f64) -> Rgb {
    Rgb {
        r: lerp_channel(from.r, to.r, k),
        g: lerp_channel(from.g, to.g, k),
        b: lerp_channel(from.b, to.b, k),
    }
}

/// Two-segment interpolation low → mid → high over a normalized score.
///
/// Input is clamped to [0, 1]; NaN is treated as 0.
pub fn value_to_color(norm: f64) -> Rgb {
    let t = if norm.is_nan() { 0.0 } else { norm.clamp(0.0, 1.0) };

    if t <= 0.5 {
        lerp(LOW_ANCHOR, MID_ANCHOR, t * 2.0)
    } else {
        lerp(MID_ANCHOR, HIGH_ANCHOR, (t - 0.5) * 2.0)
    }
}

/// Scale a row score (0..=5) into [0, 1]
pub fn normalized_score(score: f64) -> f64 {
    (score / Grade::MAX_VALUE as f64).clamp(0.0, 1.0)
}

/// Accent band color for a row score; ungraded rows get no band
pub fn accent_for(score: Option<f64>) -> Option<Rgb> {
    score.map(|s| value_to_color(normalized_score(s)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_tokens_map_to_values() {
        let expected = [("D", 0), ("C", 1), ("B", 2), ("A", 3), ("S", 4), ("SS", 5)];

        for (token, value) in expected {
            assert_eq!(grade_to_value(token), Some(value), "token {}", token);
        }

        // Bijection: every value 0..=5 is hit exactly once
        let mut values: Vec<u8> = Grade::ALL.iter().map(|g| g.value()).collect();
        values.dedup();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_grade_is_case_insensitive_and_trimmed() {
        assert_eq!(grade_to_value("s"), grade_to_value("S"));
        assert_eq!(grade_to_value("  ss\n"), Some(5));
        assert_eq!(grade_to_value("\ta "), Some(3));
    }

    #[test]
    fn test_unrecognized_text_is_ungraded() {
        for text in ["", "   ", "E", "SSS", "A+", "S S", "grade", "0"] {
            assert_eq!(grade_to_value(text), None, "text {:?}", text);
        }
    }

    #[test]
    fn test_grade_display_round_trip() {
        for grade in Grade::ALL {
            assert_eq!(Grade::parse(&grade.to_string()), Some(grade));
        }
    }

    #[test]
    fn test_color_anchors() {
        assert_eq!(value_to_color(0.0), LOW_ANCHOR);
        assert_eq!(value_to_color(0.5), MID_ANCHOR);
        assert_eq!(value_to_color(1.0), HIGH_ANCHOR);
    }

    #[test]
    fn test_color_is_clamped() {
        assert_eq!(value_to_color(-3.0), LOW_ANCHOR);
        assert_eq!(value_to_color(7.5), HIGH_ANCHOR);
        assert_eq!(value_to_color(f64::NAN), LOW_ANCHOR);
    }

    #[test]
    fn test_color_interpolates_each_segment() {
        // Quarter way: halfway between green and yellow
        let quarter = value_to_color(0.25);
        assert_eq!(quarter, Rgb::new(145, 181, 17));

        // Three quarters: halfway between yellow and red
        let three_quarters = value_to_color(0.75);
        assert_eq!(three_quarters, Rgb::new(255, 112, 0));
    }

    #[test]
    fn test_rgb_formats() {
        assert_eq!(MID_ANCHOR.to_string(), "rgb(255, 223, 0)");
        assert_eq!(MID_ANCHOR.to_hex(), "#ffdf00");
    }

    #[test]
    fn test_accent_for_score() {
        assert_eq!(accent_for(None), None);
        assert_eq!(accent_for(Some(2.5)), Some(MID_ANCHOR));
        assert_eq!(accent_for(Some(9.0)), Some(HIGH_ANCHOR));
    }
}
