//! Transition rule resolution
//!
//! The scheduler asks a [`RuleResolver`] which settings apply to a
//! (playlist, from, to) triple. Persistent rule storage belongs to the
//! embedding application; [`RuleTable`] covers the configuration-file case.

use async_trait::async_trait;
use segue_common::{SegueConfig, TransitionRule, TransitionSettings};
use tracing::debug;

use crate::error::Result;

#[async_trait]
pub trait RuleResolver: Send + Sync {
    /// Settings for the transition from `from_track` to `to_track` in `playlist_id`
    async fn resolve(
        &self,
        playlist_id: &str,
        from_track: Option<&str>,
        to_track: Option<&str>,
    ) -> Result<TransitionSettings>;
}

/// Rules from configuration, most specific match first:
/// exact pair, then a rule naming only one side, then playlist-wide, then default
#[derive(Debug, Clone)]
pub struct RuleTable {
    default: TransitionSettings,
    rules: Vec<TransitionRule>,
}

impl RuleTable {
    pub fn new(default: TransitionSettings, rules: Vec<TransitionRule>) -> Self {
        Self { default, rules }
    }

    pub fn from_config(config: &SegueConfig) -> Self {
        Self::new(config.default_transition, config.rules.clone())
    }

    /// Same settings for every transition
    pub fn uniform(settings: TransitionSettings) -> Self {
        Self::new(settings, Vec::new())
    }

    pub fn lookup(
        &self,
        playlist_id: &str,
        from_track: Option<&str>,
        to_track: Option<&str>,
    ) -> TransitionSettings {
        self.rules
            .iter()
            .filter(|rule| rule.playlist_id == playlist_id)
            .filter_map(|rule| {
                let from = side_score(rule.from_track.as_deref(), from_track)?;
                let to = side_score(rule.to_track.as_deref(), to_track)?;
                Some((from + to, rule))
            })
            // max_by_key keeps the last maximum; reverse so earlier rules win ties
            .rev()
            .max_by_key(|(score, _)| *score)
            .map(|(score, rule)| {
                debug!(playlist_id, score, "Matched transition rule");
                rule.settings
            })
            .unwrap_or(self.default)
    }
}

/// 1 when the rule names this track, 0 when it leaves the side open,
/// `None` when it names a different track
fn side_score(rule_track: Option<&str>, track: Option<&str>) -> Option<u8> {
    match (rule_track, track) {
        (None, _) => Some(0),
        (Some(wanted), Some(actual)) if wanted == actual => Some(1),
        _ => None,
    }
}

#[async_trait]
impl RuleResolver for RuleTable {
    async fn resolve(
        &self,
        playlist_id: &str,
        from_track: Option<&str>,
        to_track: Option<&str>,
    ) -> Result<TransitionSettings> {
        Ok(self.lookup(playlist_id, from_track, to_track))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segue_common::{EnvelopeCurve, TransitionMode};

    fn rule(playlist: &str, from: Option<&str>, to: Option<&str>, duration_ms: u64) -> TransitionRule {
        TransitionRule {
            playlist_id: playlist.to_string(),
            from_track: from.map(str::to_string),
            to_track: to.map(str::to_string),
            settings: TransitionSettings::crossfade(duration_ms, EnvelopeCurve::Linear, EnvelopeCurve::Linear),
        }
    }

    fn table() -> RuleTable {
        RuleTable::new(
            TransitionSettings::none(),
            vec![
                rule("mix", None, None, 1000),
                rule("mix", Some("a"), None, 2000),
                rule("mix", None, Some("c"), 3000),
                rule("mix", Some("a"), Some("b"), 4000),
                rule("other", None, None, 9000),
            ],
        )
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let table = table();
        assert_eq!(table.lookup("mix", Some("a"), Some("b")).duration_ms, 4000);
        assert_eq!(table.lookup("mix", Some("a"), Some("z")).duration_ms, 2000);
        assert_eq!(table.lookup("mix", Some("x"), Some("c")).duration_ms, 3000);
        assert_eq!(table.lookup("mix", Some("x"), Some("y")).duration_ms, 1000);
        assert_eq!(table.lookup("mix", None, None).duration_ms, 1000);
    }

    #[test]
    fn test_first_rule_wins_ties() {
        // from-only and to-only both score 1 for a -> c
        assert_eq!(table().lookup("mix", Some("a"), Some("c")).duration_ms, 2000);
    }

    #[test]
    fn test_unknown_playlist_uses_default() {
        let settings = table().lookup("unknown", Some("a"), Some("b"));
        assert_eq!(settings.mode, TransitionMode::None);
        assert!(!settings.is_active());
    }

    #[tokio::test]
    async fn test_resolve_uses_lookup() {
        let settings = table().resolve("other", None, None).await.unwrap();
        assert_eq!(settings.duration_ms, 9000);
    }
}
