//! Violation rule evaluators.
//!
//! The detection capability may attach attribute scores to a box (for
//! example `no_helmet: 0.83` from a helmet classifier). A rule fires when
//! the attribute named after its violation type reaches the rule's
//! minimum score on a vehicle of an eligible class. The candidate carries
//! the attribute score, not the box confidence.

use crate::capability::RawDetection;

/// One configured violation check.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRule {
    /// Attribute key and stored violation type, e.g. `"no_helmet"`.
    pub violation_type: String,
    pub description: String,
    pub min_confidence: f64,
    /// Class names the rule applies to; empty means every vehicle class.
    pub classes: Vec<String>,
    pub enabled: bool,
}

/// A rule that fired on one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub violation_type: String,
    pub description: String,
    pub confidence: f64,
}

impl ViolationRule {
    pub fn new(violation_type: &str, description: &str, min_confidence: f64) -> Self {
        Self {
            violation_type: violation_type.to_string(),
            description: description.to_string(),
            min_confidence,
            classes: Vec::new(),
            enabled: true,
        }
    }

    /// Restrict the rule to the given class names.
    pub fn for_classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn applies_to(&self, class_name: &str) -> bool {
        self.enabled && (self.classes.is_empty() || self.classes.iter().any(|c| c == class_name))
    }

    pub fn evaluate(&self, class_name: &str, detection: &RawDetection) -> Option<RuleHit> {
        if !self.applies_to(class_name) {
            return None;
        }
        let score = *detection.attributes.get(&self.violation_type)?;
        if !score.is_finite() || score < self.min_confidence {
            return None;
        }
        Some(RuleHit {
            violation_type: self.violation_type.clone(),
            description: self.description.clone(),
            confidence: roadwatch_core::types::clamp_confidence(score),
        })
    }
}

/// The configured set of rules, evaluated per vehicle detection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<ViolationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ViolationRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[ViolationRule] {
        &self.rules
    }

    /// Evaluate every rule and keep the strongest hit.
    ///
    /// A detection produces at most one violation candidate per frame.
    pub fn evaluate(&self, class_name: &str, detection: &RawDetection) -> Option<RuleHit> {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(class_name, detection))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(vec![
            ViolationRule::new("no_helmet", "Motorcycle rider without helmet", 0.6)
                .for_classes(&["motorcycle"]),
            ViolationRule::new("red_light", "Vehicle crossed on red light", 0.7),
            ViolationRule::new("wrong_lane", "Vehicle driving in the wrong lane", 0.65),
            ViolationRule::new("speeding", "Vehicle exceeding the speed limit", 0.75),
        ])
    }
}
