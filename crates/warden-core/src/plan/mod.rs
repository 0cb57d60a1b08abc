//! Execution plan: a DAG of steps with dependency-driven readiness,
//! failure propagation, and completion detection.
//!
//! Steps reference one another by id; the plan stores them in a flat vector
//! plus a name-to-index map rebuilt on load, sidestepping the
//! cyclic-ownership issues a pointer-based graph would introduce.

pub mod construct;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Blocked,
}

/// One node of the execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub assigned_agent: String,
    pub depends_on: Vec<String>,
    pub critical: bool,
    pub status: StepStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        assigned_agent: impl Into<String>,
        depends_on: Vec<String>,
        critical: bool,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assigned_agent: assigned_agent.into(),
            depends_on,
            critical,
            status: StepStatus::Pending,
            output: None,
            error: None,
        }
    }
}

/// Errors raised while constructing or validating a plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan must contain at least one step")]
    Empty,
    #[error("duplicate step id: {0:?}")]
    DuplicateStepId(String),
    #[error("step {step:?} depends on unknown step {dependency:?}")]
    UnknownDependency { step: String, dependency: String },
    #[error("dependency cycle detected involving steps: {0}")]
    CycleDetected(String),
}

/// A validated, dependency-ordered execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    steps: Vec<Step>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Build and validate a plan from an ordered step list. Dispatch order
    /// for simultaneously-ready steps follows this input order.
    pub fn new(task_id: impl Into<String>, steps: Vec<Step>, created_at: DateTime<Utc>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }

        for step in &steps {
            for dep in &step.depends_on {
                if !index.contains_key(dep) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        check_for_cycles(&steps, &index)?;

        let mut plan = Self { task_id: task_id.into(), created_at, steps, index };
        plan.recompute_readiness();
        Ok(plan)
    }

    /// Rebuild the index after deserializing from storage (the index itself
    /// is never serialized).
    pub fn rebuild_index(&mut self) {
        self.index = self.steps.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Steps currently `ready`, in plan order -- the dispatch order.
    pub fn ready_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.status == StepStatus::Ready).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    pub fn has_failure(&self) -> bool {
        self.steps.iter().any(|s| matches!(s.status, StepStatus::Failed | StepStatus::Blocked))
    }

    /// First failed step's id and error, if any -- used as the harness's
    /// terminal failure reason.
    pub fn first_failure(&self) -> Option<(&str, &str)> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .and_then(|s| s.error.as_deref().map(|e| (s.id.as_str(), e)))
    }

    /// Mark a step completed with its output, then recompute readiness for
    /// every dependent.
    pub fn complete_step(&mut self, id: &str, output: String) {
        if let Some(&i) = self.index.get(id) {
            self.steps[i].status = StepStatus::Completed;
            self.steps[i].output = Some(output);
            self.steps[i].error = None;
        }
        self.recompute_readiness();
    }

    /// Mark a step failed, then propagate blocking to every transitive
    /// dependent.
    pub fn fail_step(&mut self, id: &str, error: String) {
        if let Some(&i) = self.index.get(id) {
            self.steps[i].status = StepStatus::Failed;
            self.steps[i].error = Some(error);
        }
        self.propagate_blocking();
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(&i) = self.index.get(id) {
            self.steps[i].status = StepStatus::Running;
        }
    }

    /// Recompute `ready` for every `pending` step whose dependencies are all
    /// `completed`. This is the only path to `ready`.
    fn recompute_readiness(&mut self) {
        let completed: HashSet<String> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.id.clone())
            .collect();

        for step in &mut self.steps {
            if step.status == StepStatus::Pending && step.depends_on.iter().all(|d| completed.contains(d)) {
                step.status = StepStatus::Ready;
            }
        }
    }

    /// Mark every step that transitively depends on a failed step as
    /// `blocked`, in one topologically-ordered pass.
    fn propagate_blocking(&mut self) {
        loop {
            let failed_or_blocked: HashSet<String> = self
                .steps
                .iter()
                .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Blocked))
                .map(|s| s.id.clone())
                .collect();

            let mut changed = false;
            for step in &mut self.steps {
                if matches!(step.status, StepStatus::Pending | StepStatus::Ready)
                    && step.depends_on.iter().any(|d| failed_or_blocked.contains(d))
                {
                    step.status = StepStatus::Blocked;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// Detect dependency cycles via Kahn's algorithm (topological sort).
fn check_for_cycles(steps: &[Step], index: &HashMap<String, usize>) -> Result<(), PlanError> {
    let n = steps.len();
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];

    for step in steps {
        let step_idx = index[&step.id];
        for dep in &step.depends_on {
            let dep_idx = index[dep];
            adj[dep_idx].push(step_idx);
            in_degree[step_idx] += 1;
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted_count = 0;
    while let Some(node) = queue.pop_front() {
        sorted_count += 1;
        for &next in &adj[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted_count != n {
        let cyclic: Vec<&str> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| steps[i].id.as_str())
            .collect();
        return Err(PlanError::CycleDetected(cyclic.join(", ")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, format!("step {id}"), "MARS", deps.iter().map(|s| s.to_string()).collect(), false)
    }

    #[test]
    fn rejects_empty_plan() {
        assert_eq!(ExecutionPlan::new("t", vec![], Utc::now()).unwrap_err(), PlanError::Empty);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = ExecutionPlan::new("t", vec![step("a", &[]), step("a", &[])], Utc::now()).unwrap_err();
        assert_eq!(err, PlanError::DuplicateStepId("a".to_owned()));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = ExecutionPlan::new("t", vec![step("a", &["missing"])], Utc::now()).unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let err = ExecutionPlan::new("t", vec![step("a", &["b"]), step("b", &["a"])], Utc::now()).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
    }

    #[test]
    fn single_step_plan_is_ready_immediately() {
        let plan = ExecutionPlan::new("t", vec![step("a", &[])], Utc::now()).unwrap();
        assert_eq!(plan.ready_steps().len(), 1);
        assert_eq!(plan.ready_steps()[0].id, "a");
    }

    #[test]
    fn completion_unblocks_dependents() {
        let mut plan = ExecutionPlan::new("t", vec![step("a", &[]), step("b", &["a"])], Utc::now()).unwrap();
        assert_eq!(plan.ready_steps().len(), 1);

        plan.complete_step("a", "done".to_owned());
        assert_eq!(plan.ready_steps().len(), 1);
        assert_eq!(plan.ready_steps()[0].id, "b");
        assert!(!plan.is_complete());

        plan.complete_step("b", "done".to_owned());
        assert!(plan.is_complete());
    }

    #[test]
    fn failure_blocks_transitive_dependents() {
        let mut plan = ExecutionPlan::new(
            "t",
            vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])],
            Utc::now(),
        )
        .unwrap();

        plan.fail_step("a", "boom".to_owned());

        assert_eq!(plan.step("a").unwrap().status, StepStatus::Failed);
        assert_eq!(plan.step("b").unwrap().status, StepStatus::Blocked);
        assert_eq!(plan.step("c").unwrap().status, StepStatus::Blocked);
        assert!(plan.has_failure());
        assert!(!plan.is_complete());
        assert_eq!(plan.first_failure(), Some(("a", "boom")));
    }

    #[test]
    fn diamond_dependency_completes() {
        let mut plan = ExecutionPlan::new(
            "t",
            vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ],
            Utc::now(),
        )
        .unwrap();

        plan.complete_step("a", "1".into());
        let mut ready: Vec<&str> = plan.ready_steps().iter().map(|s| s.id.as_str()).collect();
        ready.sort();
        assert_eq!(ready, vec!["b", "c"]);

        plan.complete_step("b", "2".into());
        assert_eq!(plan.ready_steps().len(), 0);
        plan.complete_step("c", "3".into());
        assert_eq!(plan.ready_steps()[0].id, "d");
        plan.complete_step("d", "4".into());
        assert!(plan.is_complete());
    }
}
