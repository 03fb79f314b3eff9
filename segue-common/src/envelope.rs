//! Gain envelopes for crossfading between two pipelines
//!
//! Every curve is defined by its fade-in shape. The fade-out of a curve is
//! its fade-in mirrored in time: `fade_out(t) == fade_in(1 - t)`.
//!
//! All functions here are pure and cheap, so the ramp loop can evaluate them
//! on every tick without synchronisation.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Envelope curve selector for one side of a crossfade
///
/// - Linear: constant rate of change
/// - EqualPower: constant perceived loudness across the overlap
/// - EaseIn: slow start, fast finish (quadratic)
/// - EaseOut: fast start, slow finish (quadratic)
/// - SCurve: smooth acceleration and deceleration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeCurve {
    /// v(t) = t
    Linear,

    /// v(t) = sin(t × π/2)
    EqualPower,

    /// v(t) = t²
    EaseIn,

    /// v(t) = 1 - (1-t)²
    EaseOut,

    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,
}

impl EnvelopeCurve {
    /// Gain of the incoming side at normalized progress
    ///
    /// # Arguments
    /// * `progress` - Position through the fade, clamped to 0.0..=1.0
    ///
    /// # Returns
    /// Gain in 0.0..=1.0; 0.0 at the start of the fade and 1.0 at the end
    pub fn fade_in(&self, progress: f32) -> f32 {
        let t = sanitize(progress);

        let gain = match self {
            EnvelopeCurve::Linear => t,
            EnvelopeCurve::EqualPower => (t * FRAC_PI_2).sin(),
            EnvelopeCurve::EaseIn => t * t,
            EnvelopeCurve::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv
            }
            EnvelopeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
        };

        // sin/cos can overshoot by an ulp at the endpoints
        gain.clamp(0.0, 1.0)
    }

    /// Gain of the outgoing side at normalized progress
    ///
    /// Mirror of [`fade_in`](Self::fade_in): 1.0 at the start of the fade,
    /// 0.0 at the end. For `EqualPower` this is `cos(t × π/2)`, so that
    /// `fade_in(t)² + fade_out(t)² == 1`.
    pub fn fade_out(&self, progress: f32) -> f32 {
        self.fade_in(1.0 - sanitize(progress))
    }

    /// Parse a curve name from configuration
    ///
    /// Accepts (case-insensitive):
    /// - 'linear'
    /// - 'equal_power', 'equalpower', 'equal-power'
    /// - 'ease_in', 'easein', 'ease-in'
    /// - 'ease_out', 'easeout', 'ease-out'
    /// - 's_curve', 'scurve', 's-curve', 'cosine'
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Some(EnvelopeCurve::Linear),
            "equal_power" | "equalpower" | "equal-power" => Some(EnvelopeCurve::EqualPower),
            "ease_in" | "easein" | "ease-in" => Some(EnvelopeCurve::EaseIn),
            "ease_out" | "easeout" | "ease-out" => Some(EnvelopeCurve::EaseOut),
            "s_curve" | "scurve" | "s-curve" | "cosine" => Some(EnvelopeCurve::SCurve),
            _ => None,
        }
    }

    /// Canonical configuration string (matches the serde representation)
    pub fn as_config_str(&self) -> &'static str {
        match self {
            EnvelopeCurve::Linear => "linear",
            EnvelopeCurve::EqualPower => "equal_power",
            EnvelopeCurve::EaseIn => "ease_in",
            EnvelopeCurve::EaseOut => "ease_out",
            EnvelopeCurve::SCurve => "s_curve",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvelopeCurve::Linear => "Linear",
            EnvelopeCurve::EqualPower => "Equal Power",
            EnvelopeCurve::EaseIn => "Ease In",
            EnvelopeCurve::EaseOut => "Ease Out",
            EnvelopeCurve::SCurve => "S-Curve",
        }
    }

    /// All available curves
    pub fn all_variants() -> &'static [EnvelopeCurve] {
        &[
            EnvelopeCurve::Linear,
            EnvelopeCurve::EqualPower,
            EnvelopeCurve::EaseIn,
            EnvelopeCurve::EaseOut,
            EnvelopeCurve::SCurve,
        ]
    }
}

impl Default for EnvelopeCurve {
    fn default() -> Self {
        EnvelopeCurve::EqualPower
    }
}

impl std::fmt::Display for EnvelopeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for EnvelopeCurve {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvelopeCurve::parse(s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("unknown envelope curve '{}'", s)))
    }
}

/// Clamp progress into 0.0..=1.0, mapping NaN to the start of the fade
fn sanitize(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
