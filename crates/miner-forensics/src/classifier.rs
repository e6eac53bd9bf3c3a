//! Suspicion classification.
//!
//! Two alternative strategies, never combined: a fixed rule set over commit
//! features ([`RuleSet`], used by the audit pipeline) and a cutoff over an
//! externally supplied probability ([`ScoreCutoff`]).

use miner_core::{FeatureSummary, RulesConfig, SuspicionRule};
use serde::{Deserialize, Serialize};

/// Threshold rules, OR-combined. Every comparison is exclusive: a value equal
/// to its threshold does not fire.
///
/// # Examples
///
/// ```
/// use miner_forensics::classifier::RuleSet;
///
/// let rules = RuleSet::default();
/// assert!(rules.classify(5, 100, 10.0, 0.0));
/// assert!(!rules.classify(15, 50, 150.0, 0.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Velocity fires below this many seconds...
    pub velocity_max_seconds: i64,
    /// ...when more than this many lines changed.
    pub velocity_min_lines: u64,
    /// Density fires above this many lines per file.
    pub density_max: f64,
    /// Robotic fires below this many seconds...
    pub robotic_max_seconds: i64,
    /// ...when the comment ratio exceeds this.
    pub robotic_min_comment_ratio: f64,
}

impl Default for RuleSet {
    fn default() -> Self {
        RulesConfig::default().into()
    }
}

impl From<RulesConfig> for RuleSet {
    fn from(config: RulesConfig) -> Self {
        Self {
            velocity_max_seconds: config.velocity_max_seconds,
            velocity_min_lines: config.velocity_min_lines,
            density_max: config.density_max,
            robotic_max_seconds: config.robotic_max_seconds,
            robotic_min_comment_ratio: config.robotic_min_comment_ratio,
        }
    }
}

impl RuleSet {
    /// Rules that fire for the given feature values, in declaration order.
    pub fn triggered(
        &self,
        elapsed_seconds: i64,
        lines_changed: u64,
        density: f64,
        comment_ratio: f64,
    ) -> Vec<SuspicionRule> {
        let mut fired = Vec::new();
        if elapsed_seconds < self.velocity_max_seconds && lines_changed > self.velocity_min_lines
        {
            fired.push(SuspicionRule::Velocity);
        }
        if density > self.density_max {
            fired.push(SuspicionRule::Density);
        }
        if elapsed_seconds < self.robotic_max_seconds
            && comment_ratio > self.robotic_min_comment_ratio
        {
            fired.push(SuspicionRule::Robotic);
        }
        fired
    }

    /// `true` when any rule fires.
    pub fn classify(
        &self,
        elapsed_seconds: i64,
        lines_changed: u64,
        density: f64,
        comment_ratio: f64,
    ) -> bool {
        !self
            .triggered(elapsed_seconds, lines_changed, density, comment_ratio)
            .is_empty()
    }

    /// Classify a full feature summary.
    pub fn evaluate(&self, features: &FeatureSummary) -> Verdict {
        let triggered = self.triggered(
            features.elapsed_seconds,
            features.lines_changed,
            features.density,
            features.comment_ratio,
        );
        Verdict {
            is_suspicious: !triggered.is_empty(),
            triggered,
            features: features.clone(),
        }
    }
}

/// Outcome of rule-based classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_suspicious: bool,
    /// Rules that fired; empty when not suspicious.
    pub triggered: Vec<SuspicionRule>,
    /// Features the verdict was derived from.
    pub features: FeatureSummary,
}

/// Probability cutoff for externally scored commits.
///
/// Scores live on their own scale and are not comparable with the rule
/// strategy's comment ratios.
///
/// # Examples
///
/// ```
/// use miner_forensics::classifier::ScoreCutoff;
///
/// let cutoff = ScoreCutoff::default();
/// assert!(cutoff.classify(0.9));
/// assert!(!cutoff.classify(0.75));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCutoff {
    pub cutoff: f64,
}

impl ScoreCutoff {
    pub const DEFAULT_CUTOFF: f64 = 0.75;

    /// `true` when `probability` is strictly above the cutoff.
    ///
    /// Values outside `[0, 1]` are clamped first; NaN never flags.
    pub fn classify(&self, probability: f64) -> bool {
        if probability.is_nan() {
            return false;
        }
        probability.clamp(0.0, 1.0) > self.cutoff
    }

    pub fn evaluate(&self, probability: f64) -> ScoredVerdict {
        ScoredVerdict {
            is_suspicious: self.classify(probability),
            score: probability,
        }
    }
}

impl Default for ScoreCutoff {
    fn default() -> Self {
        Self {
            cutoff: Self::DEFAULT_CUTOFF,
        }
    }
}

/// Outcome of cutoff-based classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredVerdict {
    pub is_suspicious: bool,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::default()
    }

    #[test]
    fn velocity_alert() {
        assert!(rules().classify(5, 100, 10.0, 0.0));
        assert_eq!(
            rules().triggered(5, 100, 10.0, 0.0),
            vec![SuspicionRule::Velocity]
        );
    }

    #[test]
    fn density_alert_for_big_paste() {
        assert!(rules().classify(600, 200, 200.0, 0.0));
        assert_eq!(
            rules().triggered(600, 200, 200.0, 0.0),
            vec![SuspicionRule::Density]
        );
    }

    #[test]
    fn robotic_comment_alert() {
        assert!(rules().classify(5, 4, 2.0, 0.5));
        assert_eq!(
            rules().triggered(5, 4, 2.0, 0.5),
            vec![SuspicionRule::Robotic]
        );
    }

    #[test]
    fn normal_refactor_is_ignored() {
        assert!(!rules().classify(300, 500, 10.0, 0.0));
    }

    #[test]
    fn quick_typo_fix_is_ignored() {
        assert!(!rules().classify(3, 2, 2.0, 0.0));
    }

    #[test]
    fn exact_thresholds_do_not_trigger() {
        assert!(!rules().classify(15, 50, 150.0, 0.0));
        assert!(!rules().classify(10, 0, 0.0, 0.40));
        assert!(!rules().classify(9, 0, 0.0, 0.40));
        assert!(rules().classify(9, 0, 0.0, 0.41));
    }

    #[test]
    fn all_rules_can_fire_together() {
        let fired = rules().triggered(2, 400, 400.0, 0.9);
        assert_eq!(
            fired,
            vec![
                SuspicionRule::Velocity,
                SuspicionRule::Density,
                SuspicionRule::Robotic
            ]
        );
    }

    #[test]
    fn evaluate_carries_features() {
        let features = FeatureSummary {
            hash: "abc".into(),
            lines_changed: 100,
            files_touched: 1,
            density: 100.0,
            comment_ratio: 0.0,
            elapsed_seconds: 5,
            velocity_lines_per_minute: 1200.0,
        };
        let verdict = rules().evaluate(&features);
        assert!(verdict.is_suspicious);
        assert_eq!(verdict.triggered, vec![SuspicionRule::Velocity]);
        assert_eq!(verdict.features, features);
    }

    #[test]
    fn configured_thresholds_are_respected() {
        let strict = RuleSet {
            density_max: 50.0,
            ..RuleSet::default()
        };
        assert!(strict.classify(600, 200, 60.0, 0.0));
        assert!(!rules().classify(600, 200, 60.0, 0.0));
    }

    #[test]
    fn score_cutoff_is_exclusive() {
        let cutoff = ScoreCutoff::default();
        assert!(!cutoff.classify(0.75));
        assert!(cutoff.classify(0.7501));
        assert!(!cutoff.classify(0.1));
        assert!(!cutoff.classify(f64::NAN));
        assert!(cutoff.classify(7.0));

        let verdict = cutoff.evaluate(0.8);
        assert!(verdict.is_suspicious);
        assert_eq!(verdict.score, 0.8);
    }
}
