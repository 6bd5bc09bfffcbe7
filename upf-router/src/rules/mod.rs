mod rule;

pub use rule::Rule;

use crate::packet::Ipv4View;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("|{text}| is not a valid rule: {reason}")]
    Parse { text: String, reason: String },
    #[error("position {pos} is out of range (size {size})")]
    OutOfRange { pos: usize, size: usize },
}

/// Ordered, runtime-mutable set of match predicates.  Positions are
/// 0-indexed and duplicates are permitted.
#[derive(Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
}

impl RuleStore {
    pub fn new() -> Self {
        RuleStore { rules: Vec::new() }
    }

    /// Insert at `pos`, shifting every rule at `i >= pos` up by one.
    pub fn insert_at(&mut self, rule: Rule, pos: usize) -> Result<(), RuleError> {
        if pos > self.rules.len() {
            return Err(RuleError::OutOfRange {
                pos,
                size: self.rules.len(),
            });
        }
        self.rules.insert(pos, rule);
        Ok(())
    }

    pub fn append(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn delete_at(&mut self, pos: usize) -> Result<Rule, RuleError> {
        if pos >= self.rules.len() {
            return Err(RuleError::OutOfRange {
                pos,
                size: self.rules.len(),
            });
        }
        Ok(self.rules.remove(pos))
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// True iff any stored rule matches, evaluated in position order.
    pub fn matches(&self, packet: &Ipv4View) -> bool {
        self.rules.iter().any(|rule| rule.matches(packet))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
