// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evaluation Goals
//!
//! A goal tells the judge what to look for. Goals come in four shapes:
//!
//! | Variant | Example |
//! |---------|---------|
//! | `Named` | `"accessibility"` |
//! | `Custom` | description plus explicit criteria |
//! | `Composite` | several goals evaluated together |
//! | `Dynamic` | computed from the session's [`GoalContext`] |
//!
//! Every goal is resolved once, at submission, into a [`ResolvedGoal`] that
//! travels with the request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::domain::error::JudgmentError;
use crate::domain::judgment::{ContextPatterns, Trend};

const MAX_RESOLUTION_DEPTH: usize = 8;

/// Session state visible to dynamic goals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalContext {
    pub trend: Trend,
    pub mean_score: Option<f64>,
    pub history_len: usize,
    pub recurring_issues: Vec<String>,
}

impl GoalContext {
    pub fn from_patterns(patterns: &ContextPatterns, history_len: usize) -> Self {
        Self {
            trend: patterns.trend,
            mean_score: patterns.mean_score,
            history_len,
            recurring_issues: patterns
                .recurring_issues
                .iter()
                .map(|i| i.issue.clone())
                .collect(),
        }
    }
}

impl Default for GoalContext {
    fn default() -> Self {
        Self {
            trend: Trend::Stable,
            mean_score: None,
            history_len: 0,
            recurring_issues: Vec::new(),
        }
    }
}

/// Computes a goal from the current session state
pub trait GoalResolver: Send + Sync {
    fn resolve(&self, context: &GoalContext) -> Goal;
}

impl<F> GoalResolver for F
where
    F: Fn(&GoalContext) -> Goal + Send + Sync,
{
    fn resolve(&self, context: &GoalContext) -> Goal {
        self(context)
    }
}

#[derive(Clone)]
pub enum Goal {
    Named(String),
    Custom {
        description: String,
        criteria: Vec<String>,
    },
    Composite(Vec<Goal>),
    Dynamic(Arc<dyn GoalResolver>),
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Goal::Custom {
                description,
                criteria,
            } => f
                .debug_struct("Custom")
                .field("description", description)
                .field("criteria", criteria)
                .finish(),
            Goal::Composite(goals) => f.debug_tuple("Composite").field(goals).finish(),
            Goal::Dynamic(_) => f.write_str("Dynamic(<resolver>)"),
        }
    }
}

impl From<&str> for Goal {
    fn from(name: &str) -> Self {
        Goal::Named(name.to_string())
    }
}

impl Goal {
    pub fn custom(description: impl Into<String>, criteria: Vec<String>) -> Self {
        Goal::Custom {
            description: description.into(),
            criteria,
        }
    }

    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn(&GoalContext) -> Goal + Send + Sync + 'static,
    {
        Goal::Dynamic(Arc::new(resolver))
    }

    pub fn resolve(&self, context: &GoalContext) -> Result<ResolvedGoal, JudgmentError> {
        self.resolve_at(context, 0)
    }

    fn resolve_at(&self, context: &GoalContext, depth: usize) -> Result<ResolvedGoal, JudgmentError> {
        if depth > MAX_RESOLUTION_DEPTH {
            return Err(JudgmentError::InvalidInput(format!(
                "goal nesting exceeds {} levels",
                MAX_RESOLUTION_DEPTH
            )));
        }

        match self {
            Goal::Named(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(JudgmentError::InvalidInput("goal name cannot be empty".to_string()));
                }
                Ok(ResolvedGoal {
                    description: name.to_string(),
                    criteria: builtin_criteria(name),
                    sources: vec![name.to_string()],
                })
            }
            Goal::Custom {
                description,
                criteria,
            } => {
                if description.trim().is_empty() {
                    return Err(JudgmentError::InvalidInput(
                        "custom goal description cannot be empty".to_string(),
                    ));
                }
                Ok(ResolvedGoal {
                    description: description.clone(),
                    criteria: criteria.clone(),
                    sources: vec!["custom".to_string()],
                })
            }
            Goal::Composite(goals) => {
                if goals.is_empty() {
                    return Err(JudgmentError::InvalidInput(
                        "composite goal must contain at least one goal".to_string(),
                    ));
                }
                let mut merged = ResolvedGoal {
                    description: String::new(),
                    criteria: Vec::new(),
                    sources: Vec::new(),
                };
                let mut descriptions = Vec::with_capacity(goals.len());
                for goal in goals {
                    let resolved = goal.resolve_at(context, depth + 1)?;
                    descriptions.push(resolved.description);
                    for criterion in resolved.criteria {
                        if !merged.criteria.contains(&criterion) {
                            merged.criteria.push(criterion);
                        }
                    }
                    merged.sources.extend(resolved.sources);
                }
                merged.description = descriptions.join("; ");
                Ok(merged)
            }
            Goal::Dynamic(resolver) => resolver.resolve(context).resolve_at(context, depth + 1),
        }
    }
}

fn builtin_criteria(name: &str) -> Vec<String> {
    let criteria: &[&str] = match name.to_ascii_lowercase().as_str() {
        "accessibility" => &[
            "sufficient color contrast",
            "readable text size",
            "visible focus indicators",
            "meaningful labels for controls",
        ],
        "usability" => &[
            "clear primary action",
            "predictable navigation",
            "understandable feedback",
        ],
        "performance" => &["content visible without long blank states", "responsive interactions"],
        "visual" => &["consistent alignment", "no overlapping or clipped elements"],
        _ => &[],
    };
    criteria.iter().map(|c| c.to_string()).collect()
}

/// A goal after resolution, ready to hand to a prompt builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGoal {
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    /// Named goals (or `custom`) that contributed, in resolution order
    #[serde(default)]
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_goal_uses_builtin_criteria() {
        let resolved = Goal::from("accessibility").resolve(&GoalContext::default()).unwrap();
        assert_eq!(resolved.description, "accessibility");
        assert!(resolved.criteria.iter().any(|c| c.contains("contrast")));

        let unknown = Goal::from("delight").resolve(&GoalContext::default()).unwrap();
        assert!(unknown.criteria.is_empty());
        assert_eq!(unknown.sources, vec!["delight".to_string()]);
    }

    #[test]
    fn test_composite_merges_and_dedupes() {
        let goal = Goal::Composite(vec![
            Goal::from("usability"),
            Goal::custom(
                "Documentation clarity",
                vec!["clear primary action".into(), "readable code blocks".into()],
            ),
        ]);
        let resolved = goal.resolve(&GoalContext::default()).unwrap();

        assert_eq!(resolved.description, "usability; Documentation clarity");
        assert_eq!(
            resolved
                .criteria
                .iter()
                .filter(|c| c.as_str() == "clear primary action")
                .count(),
            1
        );
        assert_eq!(resolved.sources, vec!["usability".to_string(), "custom".to_string()]);
    }

    #[test]
    fn test_empty_goals_are_invalid() {
        let ctx = GoalContext::default();
        assert!(Goal::Composite(vec![]).resolve(&ctx).is_err());
        assert!(Goal::from("  ").resolve(&ctx).is_err());
        assert!(Goal::custom("", vec![]).resolve(&ctx).is_err());
    }

    #[test]
    fn test_dynamic_goal_reads_context() {
        let goal = Goal::dynamic(|ctx: &GoalContext| match ctx.trend {
            Trend::Declining => Goal::from("accessibility"),
            _ => Goal::from("usability"),
        });

        let declining = GoalContext {
            trend: Trend::Declining,
            ..Default::default()
        };
        assert_eq!(goal.resolve(&declining).unwrap().description, "accessibility");
        assert_eq!(goal.resolve(&GoalContext::default()).unwrap().description, "usability");
        assert_eq!(format!("{:?}", goal), "Dynamic(<resolver>)");
    }

    #[test]
    fn test_self_referential_dynamic_goal_is_bounded() {
        fn forever(_: &GoalContext) -> Goal {
            Goal::dynamic(forever)
        }
        let err = Goal::dynamic(forever).resolve(&GoalContext::default()).unwrap_err();
        assert!(matches!(err, JudgmentError::InvalidInput(_)));
    }
}
