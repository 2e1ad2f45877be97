use crate::config::{PatternAction, PatternSpec};
use crate::error::{FmonError, FmonResult};
use regex::Regex;

/// A compiled pattern rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: String,
    pub action: PatternAction,
    regex: Regex,
}

impl PatternRule {
    pub fn compile(spec: &PatternSpec) -> FmonResult<Self> {
        let regex = Regex::new(&spec.pattern).map_err(|source| FmonError::Pattern {
            pattern: spec.pattern.clone(),
            source,
        })?;

        Ok(Self {
            pattern: spec.pattern.clone(),
            action: spec.action,
            regex,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Outcome of running a file name through the rule list.
#[derive(Debug, Clone, Copy)]
pub enum Verdict<'a> {
    Allow,
    Deny,
    /// Allowed, and the matching rule should be reported.
    Alert(&'a PatternRule),
}

impl Verdict<'_> {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Verdict::Deny)
    }
}

/// Ordered include/exclude/alert rules. The first matching rule decides;
/// a name no rule matches is allowed.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    rules: Vec<PatternRule>,
}

impl PatternMatcher {
    pub fn compile(specs: &[PatternSpec]) -> FmonResult<Self> {
        let rules = specs
            .iter()
            .map(PatternRule::compile)
            .collect::<FmonResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn evaluate(&self, name: &str) -> Verdict<'_> {
        match self.rules.iter().find(|rule| rule.is_match(name)) {
            None => Verdict::Allow,
            Some(rule) => match rule.action {
                PatternAction::Exclude => Verdict::Deny,
                PatternAction::Include => Verdict::Allow,
                PatternAction::Alert => Verdict::Alert(rule),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
