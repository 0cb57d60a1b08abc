//! Plan construction. Two constructors ship: a trivial single-step
//! decomposer that always produces a valid plan, and a declarative
//! decomposer that parses an operator-authored step list out of TOML.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ExecutionPlan, PlanError, Step};

/// Errors raised while constructing a plan, wrapping [`PlanError`] with the
/// upstream cause (malformed input) when relevant.
#[derive(Debug, Error)]
pub enum PlanConstructionError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] PlanError),
}

/// Wrap the whole task in a single step assigned to the harness's own
/// agent. Always produces a valid plan.
pub fn deterministic_plan(task_id: &str, agent_name: &str, description: &str) -> ExecutionPlan {
    let step = Step::new("main", description, agent_name, vec![], true);
    ExecutionPlan::new(task_id, vec![step], Utc::now())
        .expect("single-step plan with no dependencies is always valid")
}

/// On-disk representation of an operator-authored plan.
#[derive(Debug, Deserialize, Serialize)]
pub struct PlanToml {
    pub plan: PlanMeta,
    #[serde(rename = "step", default)]
    pub steps: Vec<StepToml>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlanMeta {
    pub task_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StepToml {
    pub id: String,
    pub description: String,
    pub agent: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

/// Parse and validate a declarative plan document.
pub fn parse_declarative_plan(content: &str) -> Result<ExecutionPlan, PlanConstructionError> {
    let parsed: PlanToml = toml::from_str(content)?;
    let steps: Vec<Step> = parsed
        .steps
        .into_iter()
        .map(|t| Step::new(t.id, t.description, t.agent, t.depends_on, t.critical))
        .collect();

    let plan = ExecutionPlan::new(parsed.plan.task_id, steps, Utc::now())?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_plan_is_single_ready_step() {
        let plan = deterministic_plan("t-1", "MARS", "do the thing");
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.ready_steps().len(), 1);
    }

    #[test]
    fn declarative_plan_parses_dependencies() {
        let toml_str = r#"
[plan]
task_id = "t-2"

[[step]]
id = "a"
description = "first"
agent = "MARS"

[[step]]
id = "b"
description = "second"
agent = "VENUS"
depends_on = ["a"]
critical = true
"#;
        let plan = parse_declarative_plan(toml_str).expect("should parse");
        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.ready_steps().len(), 1);
        assert_eq!(plan.ready_steps()[0].id, "a");
        assert!(plan.step("b").unwrap().critical);
    }

    #[test]
    fn declarative_plan_rejects_cycle() {
        let toml_str = r#"
[plan]
task_id = "t-3"

[[step]]
id = "a"
description = "first"
agent = "MARS"
depends_on = ["b"]

[[step]]
id = "b"
description = "second"
agent = "MARS"
depends_on = ["a"]
"#;
        let err = parse_declarative_plan(toml_str).unwrap_err();
        assert!(matches!(err, PlanConstructionError::Invalid(PlanError::CycleDetected(_))));
    }

    #[test]
    fn declarative_plan_rejects_malformed_toml() {
        let err = parse_declarative_plan("not valid toml {{{").unwrap_err();
        assert!(matches!(err, PlanConstructionError::Toml(_)));
    }
}
