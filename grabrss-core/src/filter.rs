//! Filter rule compilation and evaluation.
//!
//! Rules are evaluated in list order and the first decisive rule wins. An
//! entry that no rule decides on is rejected.

use regex::{Regex, RegexBuilder};
use tracing::{debug, error};

use crate::config::{FeedConfig, FilterRule, MatchMode};
use crate::dispatch::CategoryMapper;
use crate::job::Priority;

/// An override is unset when empty, `default` or `none` (any case).
pub fn override_is_set(value: &str) -> bool {
    !value.is_empty()
        && !value.eq_ignore_ascii_case("default")
        && !value.eq_ignore_ascii_case("none")
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Converts a shell-style wildcard into an (unanchored) regex: `*` matches
/// any sequence, everything else is literal.
pub fn wildcard_to_regex(text: &str) -> String {
    text.split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

/// Compiles a raw filter string case-insensitively. A `re:` prefix (any case)
/// marks the remainder as a regular expression.
pub fn compile_filter(text: &str) -> Result<Regex, regex::Error> {
    let pattern = match text.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("re:") => text[3..].to_string(),
        _ => wildcard_to_regex(text),
    };
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: FilterRule,
    /// `None` when the pattern failed to compile; such a rule never matches.
    matcher: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: &FilterRule) -> Self {
        let matcher = match compile_filter(&rule.pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                error!(
                    pattern = %rule.pattern,
                    error = %err,
                    "could not compile RSS filter, rule ignored"
                );
                None
            }
        };
        Self {
            rule: rule.clone(),
            matcher,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(text))
    }
}

pub fn compile_rules(rules: &[FilterRule]) -> Vec<CompiledRule> {
    rules.iter().map(CompiledRule::compile).collect()
}

/// Feed-level fallbacks for the per-rule overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDefaults {
    pub category: Option<String>,
    pub pp: Option<String>,
    pub script: Option<String>,
    pub priority: Priority,
}

impl From<&FeedConfig> for FeedDefaults {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            category: non_empty(&feed.category),
            pp: non_empty(&feed.pp),
            script: non_empty(&feed.script),
            priority: feed.priority,
        }
    }
}

/// Category, post-processing and script tracked while walking the rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub category: Option<String>,
    pub pp: Option<String>,
    pub script: Option<String>,
}

impl Resolved {
    /// Values before the first rule is looked at.
    pub fn initial(defaults: &FeedDefaults) -> Self {
        Self {
            category: defaults.category.clone(),
            pp: None,
            script: None,
        }
    }
}

/// Applies one rule's overrides on top of the running values.
///
/// Category: rule override, else the mapped entry category, else the feed
/// default. Post-processing falls back to the feed default only when the rule
/// has no category text at all and the entry has no category; script does the
/// same but treats a `default`/`none` category override as absent. In every
/// other case pp and script keep their running value.
pub fn resolve_overrides(
    rule: &FilterRule,
    entry_category: Option<&str>,
    defaults: &FeedDefaults,
    running: &Resolved,
    mapper: &dyn CategoryMapper,
) -> Resolved {
    let category = if override_is_set(&rule.category) {
        Some(rule.category.clone())
    } else if let Some(raw) = entry_category {
        mapper.map_category(raw)
    } else {
        defaults.category.clone()
    };

    let pp = if override_is_set(&rule.pp) {
        Some(rule.pp.clone())
    } else if rule.category.is_empty() && entry_category.is_none() {
        defaults.pp.clone()
    } else {
        running.pp.clone()
    };

    let script = if override_is_set(&rule.script) {
        Some(rule.script.clone())
    } else if !override_is_set(&rule.category) && entry_category.is_none() {
        defaults.script.clone()
    } else {
        running.script.clone()
    };

    Resolved {
        category,
        pp,
        script,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub accepted: bool,
    /// Index of the rule that decided, `None` for the default reject.
    pub decided_by: Option<usize>,
    pub resolved: Resolved,
}

/// Runs a title (and optional feed category) through the rules.
pub fn evaluate(
    rules: &[CompiledRule],
    title: &str,
    entry_category: Option<&str>,
    defaults: &FeedDefaults,
    mapper: &dyn CategoryMapper,
) -> Evaluation {
    let mut resolved = Resolved::initial(defaults);

    for (n, compiled) in rules.iter().enumerate() {
        let rule = &compiled.rule;
        resolved = resolve_overrides(rule, entry_category, defaults, &resolved, mapper);

        let decision = match (rule.mode, entry_category) {
            (MatchMode::CategoryMatch, Some(category)) => {
                if compiled.is_match(category) {
                    None
                } else {
                    Some(false)
                }
            }
            (mode, _) => {
                let found = compiled.is_match(title);
                match mode {
                    MatchMode::Must if !found => Some(false),
                    MatchMode::Accept if found => Some(true),
                    MatchMode::Reject if found => Some(false),
                    _ => None,
                }
            }
        };

        if let Some(accepted) = decision {
            if accepted {
                debug!(rule = n, "filter matched");
            } else {
                debug!(rule = n, "filter rejected");
            }
            return Evaluation {
                accepted,
                decided_by: Some(n),
                resolved,
            };
        }
    }

    Evaluation {
        accepted: false,
        decided_by: None,
        resolved,
    }
}
