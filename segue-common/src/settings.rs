//! Transition settings and media item identity

use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeCurve;

/// How the boundary between two tracks is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Plain gapless advance, no volume changes
    #[default]
    None,
    /// Overlap the tail of the outgoing track with the head of the next one
    Crossfade,
}

impl std::fmt::Display for TransitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionMode::None => write!(f, "none"),
            TransitionMode::Crossfade => write!(f, "crossfade"),
        }
    }
}

/// Resolved settings for one track-to-track transition
///
/// Immutable value. Inactive settings (mode `None` or zero duration) never
/// cause the engine to touch either pipeline's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSettings {
    pub mode: TransitionMode,

    /// Length of the overlap in milliseconds; 0 means no transition
    pub duration_ms: u64,

    /// Envelope applied to the outgoing (Master) side
    pub curve_out: EnvelopeCurve,

    /// Envelope applied to the incoming (Auxiliary) side
    pub curve_in: EnvelopeCurve,
}

impl TransitionSettings {
    /// Settings that disable the transition
    pub fn none() -> Self {
        Self {
            mode: TransitionMode::None,
            duration_ms: 0,
            curve_out: EnvelopeCurve::default(),
            curve_in: EnvelopeCurve::default(),
        }
    }

    pub fn crossfade(duration_ms: u64, curve_out: EnvelopeCurve, curve_in: EnvelopeCurve) -> Self {
        Self {
            mode: TransitionMode::Crossfade,
            duration_ms,
            curve_out,
            curve_in,
        }
    }

    /// True when these settings call for an actual crossfade
    pub fn is_active(&self) -> bool {
        self.mode == TransitionMode::Crossfade && self.duration_ms > 0
    }

    /// Position in the outgoing track at which the fade must begin so that
    /// it finishes exactly at the end of the track
    ///
    /// Returns `None` when the settings are inactive or the fade is longer
    /// than the track itself.
    pub fn transition_point_ms(&self, track_duration_ms: u64) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        track_duration_ms.checked_sub(self.duration_ms)
    }
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self::none()
    }
}

/// Opaque reference to a piece of media loaded into a pipeline
///
/// `media_id` is the stable track identifier used for rule lookup;
/// `uri` is whatever the platform pipeline needs to open the media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItem {
    pub media_id: String,
    pub uri: String,
}

impl MediaItem {
    pub fn new(media_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            uri: uri.into(),
        }
    }
}

impl std::fmt::Display for MediaItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.media_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_point() {
        let settings =
            TransitionSettings::crossfade(5000, EnvelopeCurve::Linear, EnvelopeCurve::Linear);
        assert_eq!(settings.transition_point_ms(200_000), Some(195_000));
        assert_eq!(settings.transition_point_ms(5000), Some(0));
        assert_eq!(settings.transition_point_ms(4999), None);
    }

    #[test]
    fn test_inactive_settings() {
        assert!(!TransitionSettings::none().is_active());
        assert_eq!(TransitionSettings::none().transition_point_ms(200_000), None);

        let zero = TransitionSettings::crossfade(0, EnvelopeCurve::Linear, EnvelopeCurve::Linear);
        assert!(!zero.is_active());
        assert_eq!(zero.transition_point_ms(200_000), None);

        let no_mode = TransitionSettings {
            mode: TransitionMode::None,
            duration_ms: 3000,
            ..TransitionSettings::none()
        };
        assert!(!no_mode.is_active());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: TransitionSettings = toml::from_str(
            r#"
            mode = "crossfade"
            duration_ms = 8000
            curve_out = "ease_out"
            "#,
        )
        .unwrap();

        assert!(settings.is_active());
        assert_eq!(settings.duration_ms, 8000);
        assert_eq!(settings.curve_out, EnvelopeCurve::EaseOut);
        assert_eq!(settings.curve_in, EnvelopeCurve::EqualPower);
    }

    #[test]
    fn test_media_item_display() {
        let item = MediaItem::new("track-7", "file:///music/7.flac");
        assert_eq!(item.to_string(), "track-7");
    }
}
