//! Agent harness: the lifecycle state machine, step dispatcher, checkpoint
//! scheduler, and sub-agent coordinator for a single durable execution.
//!
//! ```text
//! created  -> running         (start)
//! running  -> paused          (pause, gate rejection, stop-while-incomplete)
//! paused   -> running         (resume, gate approval)
//! running  -> completed       (plan completion)
//! running  -> failed          (unrecoverable error)
//! paused   -> failed          (stop)
//! ```
//! `completed` and `failed` are terminal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_db::HarnessStatus;

use crate::config::HarnessConfig;
use crate::events::{Emitter, Event, EventKind, GateAction, SubAgentEventKind};
use crate::executor::{AgentExecutor, ExecutorError, PromptContext};
use crate::gate::{self, HumanGate};
use crate::plan::{ExecutionPlan, PlanError, Step, StepStatus};
use crate::store::StoreBridge;
use crate::toolcall::{ToolCallManager, ToolExecutor};

/// Errors surfaced to callers of an [`AgentHarness`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: HarnessStatus, to: HarnessStatus },
    #[error("plan construction failed: {0}")]
    PlanConstructionFailed(String),
    #[error("unrecoverable agent error: {0}")]
    UnrecoverableAgentError(String),
    #[error("neither primary nor fallback store is available: {0}")]
    StoreUnavailable(String),
    #[error("tool-call budget exceeded")]
    BudgetExceeded,
    #[error("sub-agent spawn would exceed max depth")]
    DepthExceeded,
}

impl From<PlanError> for HarnessError {
    fn from(e: PlanError) -> Self {
        HarnessError::PlanConstructionFailed(e.to_string())
    }
}

impl From<ExecutorError> for HarnessError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Unrecoverable(m) => HarnessError::UnrecoverableAgentError(m),
        }
    }
}

/// A request to spawn a sub-harness for a delegated step.
pub struct SubAgentSpawnRequest {
    pub parent_harness_id: String,
    pub parent_depth: u32,
    pub agent_name: String,
    pub task_id: String,
    pub description: String,
    pub prior_error: Option<String>,
}

/// Final outcome recorded for a sub-harness once it reaches a terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub status: HarnessStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Collaborator that spawns and runs a sub-harness to completion on behalf
/// of a step whose assigned agent differs from the owning harness's own
/// agent. Implemented by the harness manager, which also enforces the depth
/// cap before calling through.
#[async_trait]
pub trait SubAgentSpawner: Send + Sync {
    async fn spawn(&self, request: SubAgentSpawnRequest) -> Result<(String, SubAgentResult), HarnessError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn SubAgentSpawner) {}
};

/// Builds the initial plan for a harness from its task. Abstracted so a
/// harness can be constructed with either the deterministic single-step
/// decomposer or the declarative TOML decomposer.
pub type PlanBuilder = Arc<dyn Fn(&str, &str, &str) -> Result<ExecutionPlan, PlanError> + Send + Sync>;

/// The persisted, self-describing representation of a harness. This is the
/// document written to and read back from the durable store; everything
/// else on [`AgentHarness`] is a transient collaborator reattached on
/// construction or resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessSnapshot {
    pub schema_version: u32,
    pub harness_id: String,
    pub agent_name: String,
    pub task_id: String,
    pub description: Option<String>,
    pub parent_harness_id: Option<String>,
    pub status: HarnessStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub plan: Option<ExecutionPlan>,
    pub total_tool_calls: u32,
    pub tool_call_history: Vec<crate::toolcall::ToolCallRecord>,
    pub sub_agent_ids: Vec<String>,
    pub sub_agent_results: HashMap<String, SubAgentResult>,
    pub agent_loop_snapshot: Option<serde_json::Value>,
    pub checkpoint_count: u64,
    pub autonomy_level: u8,
    pub depth: u32,
    pub config: HarnessConfig,
    pub pending_gate: Option<HumanGate>,
    pub last_gate: Option<HumanGate>,
    pub sub_agent_retry_counts: HashMap<String, u8>,
    pub failure_reason: Option<String>,
}

/// Terminal result surfaced to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessResult {
    pub output: Option<String>,
    pub status: HarnessStatus,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub tool_call_count: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A single durable execution: lifecycle state, plan, tool-call history,
/// sub-agent bookkeeping, and the collaborators needed to drive it forward.
pub struct AgentHarness {
    state: HarnessSnapshot,
    plan_builder: PlanBuilder,
    executor: Arc<dyn AgentExecutor>,
    tool_manager: ToolCallManager,
    emitter: Emitter,
    store: Option<Arc<StoreBridge>>,
    sub_agent_spawner: Option<Arc<dyn SubAgentSpawner>>,
}

impl AgentHarness {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        harness_id: impl Into<String>,
        agent_name: impl Into<String>,
        task_id: impl Into<String>,
        description: Option<String>,
        parent_harness_id: Option<String>,
        depth: u32,
        config: HarnessConfig,
        plan_builder: PlanBuilder,
        executor: Arc<dyn AgentExecutor>,
        tools: Vec<Box<dyn ToolExecutor>>,
        permitted_tools: HashSet<String>,
        emitter: Emitter,
        store: Option<Arc<StoreBridge>>,
        sub_agent_spawner: Option<Arc<dyn SubAgentSpawner>>,
        now: DateTime<Utc>,
    ) -> Self {
        let harness_id = harness_id.into();
        let autonomy_level = config.autonomy_level;
        let tool_manager = ToolCallManager::new(harness_id.clone(), config, permitted_tools, tools);
        Self {
            state: HarnessSnapshot {
                schema_version: CURRENT_SCHEMA_VERSION,
                harness_id,
                agent_name: agent_name.into(),
                task_id: task_id.into(),
                description,
                parent_harness_id,
                status: HarnessStatus::Created,
                created_at: now,
                updated_at: now,
                last_checkpoint_at: None,
                plan: None,
                total_tool_calls: 0,
                tool_call_history: Vec::new(),
                sub_agent_ids: Vec::new(),
                sub_agent_results: HashMap::new(),
                agent_loop_snapshot: None,
                checkpoint_count: 0,
                autonomy_level,
                depth,
                config,
                pending_gate: None,
                last_gate: None,
                sub_agent_retry_counts: HashMap::new(),
                failure_reason: None,
            },
            plan_builder,
            executor,
            tool_manager,
            emitter,
            store,
            sub_agent_spawner,
        }
    }

    /// Reconstruct a harness from a persisted snapshot, reattaching the
    /// transient collaborators a resumed process must supply afresh.
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        mut snapshot: HarnessSnapshot,
        plan_builder: PlanBuilder,
        executor: Arc<dyn AgentExecutor>,
        tools: Vec<Box<dyn ToolExecutor>>,
        permitted_tools: HashSet<String>,
        emitter: Emitter,
        store: Option<Arc<StoreBridge>>,
        sub_agent_spawner: Option<Arc<dyn SubAgentSpawner>>,
    ) -> Self {
        if let Some(plan) = snapshot.plan.as_mut() {
            plan.rebuild_index();
        }
        let tool_manager = ToolCallManager::restore(
            snapshot.harness_id.clone(),
            snapshot.config,
            permitted_tools,
            tools,
            snapshot.tool_call_history.clone(),
            snapshot.total_tool_calls,
        );
        Self { state: snapshot, plan_builder, executor, tool_manager, emitter, store, sub_agent_spawner }
    }

    pub fn harness_id(&self) -> &str {
        &self.state.harness_id
    }

    pub fn status(&self) -> HarnessStatus {
        self.state.status
    }

    pub fn depth(&self) -> u32 {
        self.state.depth
    }

    pub fn snapshot(&self) -> HarnessSnapshot {
        self.state.clone()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status(), HarnessStatus::Completed | HarnessStatus::Failed)
    }

    /// The terminal result, or `None` while the harness is still active.
    pub fn result(&self) -> Option<HarnessResult> {
        if !self.is_terminal() {
            return None;
        }
        let plan = self.state.plan.as_ref();
        let steps_completed =
            plan.map(|p| p.steps().iter().filter(|s| s.status == StepStatus::Completed).count()).unwrap_or(0);
        let total_steps = plan.map(|p| p.steps().len()).unwrap_or(0);
        let output = plan.and_then(|p| p.steps().iter().rev().find_map(|s| s.output.clone()));
        Some(HarnessResult {
            output,
            status: self.status(),
            steps_completed,
            total_steps,
            tool_call_count: self.state.total_tool_calls,
            duration_ms: (self.state.updated_at - self.state.created_at).num_milliseconds().max(0) as u64,
            error: self.state.failure_reason.clone(),
        })
    }

    /// `created -> running`, building the plan on first entry if absent,
    /// then driving step dispatch.
    pub async fn start(&mut self) -> Result<(), HarnessError> {
        self.transition(HarnessStatus::Running).await?;

        if self.state.plan.is_none() {
            let description = self.state.description.as_deref().unwrap_or(&self.state.task_id);
            let built = (self.plan_builder)(&self.state.task_id, &self.state.agent_name, description);
            match built {
                Ok(plan) => self.state.plan = Some(plan),
                Err(e) => {
                    self.state.failure_reason = Some(format!("plan construction failed: {e}"));
                    self.transition(HarnessStatus::Failed).await?;
                    self.checkpoint().await;
                    return Err(HarnessError::PlanConstructionFailed(e.to_string()));
                }
            }
        }

        self.drive().await
    }

    pub async fn pause(&mut self) -> Result<(), HarnessError> {
        self.transition(HarnessStatus::Paused).await?;
        self.checkpoint().await;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), HarnessError> {
        self.transition(HarnessStatus::Running).await?;
        self.checkpoint().await;
        self.drive().await
    }

    pub async fn stop(&mut self) -> Result<(), HarnessError> {
        let to = match self.status() {
            HarnessStatus::Running => {
                if self.state.plan.as_ref().map(|p| p.is_complete()).unwrap_or(false) {
                    HarnessStatus::Completed
                } else {
                    HarnessStatus::Failed
                }
            }
            HarnessStatus::Paused => HarnessStatus::Failed,
            other => return Err(HarnessError::InvalidTransition { from: other, to: HarnessStatus::Failed }),
        };
        if to == HarnessStatus::Failed {
            self.state.failure_reason = Some("stopped".to_owned());
        }
        self.transition(to).await?;
        self.checkpoint().await;
        Ok(())
    }

    pub async fn approve_gate(&mut self) -> Result<(), HarnessError> {
        let Some(mut gate) = self.state.pending_gate.take() else {
            return Err(HarnessError::InvalidTransition { from: self.status(), to: HarnessStatus::Running });
        };
        let now = Utc::now();
        gate.approve(now).map_err(|e| HarnessError::UnrecoverableAgentError(e.to_string()))?;
        let wait_ms = gate.wait_duration_ms(now).max(0) as u64;
        self.emit(EventKind::HumanGate {
            gate_id: gate.gate_id.clone(),
            step_id: gate.step_id.clone(),
            action: GateAction::Approved,
            wait_duration_ms: Some(wait_ms),
        })
        .await;
        self.state.last_gate = Some(gate);
        self.transition(HarnessStatus::Running).await?;
        self.checkpoint().await;
        self.drive().await
    }

    pub async fn reject_gate(&mut self, reason: impl Into<String>) -> Result<(), HarnessError> {
        let Some(mut gate) = self.state.pending_gate.take() else {
            return Err(HarnessError::InvalidTransition { from: self.status(), to: HarnessStatus::Paused });
        };
        let now = Utc::now();
        let reason = reason.into();
        gate.reject(reason, now).map_err(|e| HarnessError::UnrecoverableAgentError(e.to_string()))?;
        let wait_ms = gate.wait_duration_ms(now).max(0) as u64;
        self.emit(EventKind::HumanGate {
            gate_id: gate.gate_id.clone(),
            step_id: gate.step_id.clone(),
            action: GateAction::Rejected,
            wait_duration_ms: Some(wait_ms),
        })
        .await;
        self.state.last_gate = Some(gate);
        self.checkpoint().await;
        Ok(())
    }

    async fn transition(&mut self, to: HarnessStatus) -> Result<(), HarnessError> {
        let from = self.status();
        let legal = matches!(
            (from, to),
            (HarnessStatus::Created, HarnessStatus::Running)
                | (HarnessStatus::Running, HarnessStatus::Paused)
                | (HarnessStatus::Paused, HarnessStatus::Running)
                | (HarnessStatus::Running, HarnessStatus::Completed)
                | (HarnessStatus::Running, HarnessStatus::Failed)
                | (HarnessStatus::Paused, HarnessStatus::Failed)
        );
        if !legal {
            return Err(HarnessError::InvalidTransition { from, to });
        }
        self.state.status = to;
        self.state.updated_at = Utc::now();
        self.emit(EventKind::StateTransition { from: from.to_string(), to: to.to_string() }).await;
        Ok(())
    }

    async fn drive(&mut self) -> Result<(), HarnessError> {
        loop {
            if self.status() != HarnessStatus::Running {
                return Ok(());
            }

            self.maybe_periodic_checkpoint().await;

            let (is_complete, has_failure, ready_step) = {
                let plan = self.state.plan.as_ref().expect("plan exists while running");
                (plan.is_complete(), plan.has_failure(), plan.ready_steps().into_iter().next().cloned())
            };

            if is_complete {
                self.transition(HarnessStatus::Completed).await?;
                self.emit(EventKind::PlanCompleted).await;
                self.checkpoint().await;
                return Ok(());
            }

            if has_failure {
                let reason = {
                    let plan = self.state.plan.as_ref().unwrap();
                    plan.first_failure().map(|(id, err)| format!("step {id:?} failed: {err}"))
                };
                self.state.failure_reason = reason.or_else(|| Some("a step was blocked".to_owned()));
                self.transition(HarnessStatus::Failed).await?;
                self.checkpoint().await;
                return Ok(());
            }

            let Some(step) = ready_step else {
                // Nothing ready, nothing failed, not complete: every remaining
                // step is already running or waiting on a gate resolution.
                return Ok(());
            };

            if gate::gate_required(self.state.autonomy_level, step.critical) && self.state.pending_gate.is_none() {
                self.open_gate(&step.id).await?;
                return Ok(());
            }

            self.dispatch_step(&step).await;
        }
    }

    async fn open_gate(&mut self, step_id: &str) -> Result<(), HarnessError> {
        let gate_id = format!("gate-{}-{}", self.state.harness_id, step_id);
        let gate = HumanGate::new(gate_id.clone(), step_id.to_owned(), Utc::now());
        self.state.pending_gate = Some(gate);
        self.emit(EventKind::HumanGate {
            gate_id,
            step_id: step_id.to_owned(),
            action: GateAction::Waiting,
            wait_duration_ms: None,
        })
        .await;
        self.transition(HarnessStatus::Paused).await?;
        self.checkpoint().await;
        Ok(())
    }

    async fn dispatch_step(&mut self, step: &Step) {
        if let Some(plan) = self.state.plan.as_mut() {
            plan.mark_running(&step.id);
        }

        if step.assigned_agent == self.state.agent_name {
            let context = PromptContext {
                task_id: self.state.task_id.clone(),
                step_id: step.id.clone(),
                description: step.description.clone(),
                prior_error: None,
            };
            let resume_snapshot = self.state.agent_loop_snapshot.take();
            match self.executor.run(context, &mut self.tool_manager, resume_snapshot).await {
                Ok(out) => {
                    self.state.agent_loop_snapshot = out.snapshot;
                    self.complete_step(&step.id, out.output).await;
                }
                Err(e) => {
                    self.fail_step(&step.id, e.to_string()).await;
                }
            }
        } else {
            self.dispatch_sub_agent_step(step).await;
        }
    }

    async fn dispatch_sub_agent_step(&mut self, step: &Step) {
        let Some(spawner) = self.sub_agent_spawner.clone() else {
            self.fail_step(&step.id, "no sub-agent spawner configured".to_owned()).await;
            return;
        };

        let mut prior_error: Option<String> = None;
        for attempt in 0..2u8 {
            let request = SubAgentSpawnRequest {
                parent_harness_id: self.state.harness_id.clone(),
                parent_depth: self.state.depth,
                agent_name: step.assigned_agent.clone(),
                task_id: step.id.clone(),
                description: step.description.clone(),
                prior_error: prior_error.clone(),
            };

            match spawner.spawn(request).await {
                Ok((sub_id, result)) => {
                    self.state.sub_agent_ids.push(sub_id.clone());
                    self.emit(EventKind::SubAgent { sub_agent_id: sub_id.clone(), event: SubAgentEventKind::Spawned })
                        .await;
                    self.state.sub_agent_results.insert(sub_id.clone(), result.clone());

                    if result.status == HarnessStatus::Completed {
                        self.emit(EventKind::SubAgent {
                            sub_agent_id: sub_id,
                            event: SubAgentEventKind::Completed,
                        })
                        .await;
                        self.complete_step(&step.id, result.output.unwrap_or_default()).await;
                        return;
                    }

                    self.emit(EventKind::SubAgent { sub_agent_id: sub_id, event: SubAgentEventKind::Failed }).await;
                    prior_error = Some(result.error.unwrap_or_else(|| "sub-agent failed".to_owned()));
                    self.state.sub_agent_retry_counts.insert(step.id.clone(), attempt + 1);
                    if attempt == 1 {
                        self.fail_step(&step.id, prior_error.unwrap()).await;
                        return;
                    }
                }
                Err(e) => {
                    self.fail_step(&step.id, e.to_string()).await;
                    return;
                }
            }
        }
    }

    async fn complete_step(&mut self, id: &str, output: String) {
        if let Some(plan) = self.state.plan.as_mut() {
            plan.complete_step(id, output);
        }
        self.checkpoint().await;
    }

    async fn fail_step(&mut self, id: &str, error: String) {
        if let Some(plan) = self.state.plan.as_mut() {
            plan.fail_step(id, error.clone());
        }
        self.emit(EventKind::StepFailed { step_id: id.to_owned(), error }).await;
        self.checkpoint().await;
    }

    async fn emit(&self, kind: EventKind) {
        self.emitter.emit(Event::new(self.state.harness_id.clone(), Utc::now(), kind)).await;
    }

    fn sync_tool_state(&mut self) {
        self.state.tool_call_history = self.tool_manager.history().to_vec();
        self.state.total_tool_calls = self.tool_manager.total_calls();
    }

    /// Checkpoints on the configured interval, independent of the
    /// step-boundary and gate checkpoints elsewhere in `drive()`. Guards
    /// against losing progress across a long-running step that never hits
    /// a step boundary within `checkpoint_interval_secs`.
    async fn maybe_periodic_checkpoint(&mut self) {
        let due = match self.state.last_checkpoint_at {
            None => true,
            Some(last) => {
                let elapsed_secs = (Utc::now() - last).num_seconds().max(0) as u64;
                elapsed_secs >= self.state.config.checkpoint_interval_secs
            }
        };
        if due {
            self.checkpoint().await;
        }
    }

    pub(crate) async fn checkpoint(&mut self) {
        self.sync_tool_state();
        self.state.checkpoint_count += 1;
        self.state.last_checkpoint_at = Some(Utc::now());
        if let Some(store) = self.store.clone() {
            let doc = serde_json::to_value(&self.state).expect("HarnessSnapshot always serializes");
            if let Err(e) = store.persist(&self.state.harness_id, doc, Some(&self.emitter)).await {
                tracing::warn!(harness_id = %self.state.harness_id, error = %e, "checkpoint write failed (non-fatal)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedExecutor;
    use crate::events::{EventSink, RecordingSink};
    use crate::plan::construct::deterministic_plan;
    use std::sync::Arc as StdArc;

    /// Delegates to a shared [`RecordingSink`] so the test can both hand an
    /// owned sink to the [`Emitter`] and keep a handle to inspect afterward.
    struct ArcSink(StdArc<RecordingSink>);

    #[async_trait]
    impl EventSink for ArcSink {
        async fn emit(&self, event: &Event) -> anyhow::Result<()> {
            self.0.emit(event).await
        }
    }

    fn recording_emitter() -> (Emitter, StdArc<RecordingSink>) {
        let sink = StdArc::new(RecordingSink::default());
        let emitter = Emitter::new(vec![Box::new(ArcSink(sink.clone()))]);
        (emitter, sink)
    }

    fn single_step_builder() -> PlanBuilder {
        StdArc::new(|task_id, agent, desc| Ok(deterministic_plan(task_id, agent, desc)))
    }

    fn harness(executor: StdArc<dyn AgentExecutor>, emitter: Emitter) -> AgentHarness {
        AgentHarness::new(
            "h-1",
            "MARS",
            "t-1",
            None,
            None,
            0,
            HarnessConfig { autonomy_level: 5, ..HarnessConfig::default() },
            single_step_builder(),
            executor,
            vec![],
            HashSet::new(),
            emitter,
            None,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn s1_lifecycle_completes_with_no_gates() {
        let (emitter, sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::succeeding("MARS", "done"));
        let mut h = harness(executor, emitter);

        h.start().await.unwrap();

        assert_eq!(h.status(), HarnessStatus::Completed);
        let result = h.result().unwrap();
        assert_eq!(result.output.as_deref(), Some("done"));
        assert_eq!(result.steps_completed, 1);
        assert_eq!(result.total_steps, 1);
        assert_eq!(result.tool_call_count, 0);

        let events = sink.recorded().await;
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::PlanCompleted)));
        assert!(events.iter().any(|e| matches!(&e.kind, EventKind::Checkpoint { .. })));
    }

    #[tokio::test]
    async fn gate_at_autonomy_one_suspends_then_approve_resumes() {
        let (emitter, _sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::succeeding("MARS", "done"));
        let mut h = AgentHarness::new(
            "h-2",
            "MARS",
            "t-2",
            None,
            None,
            0,
            HarnessConfig { autonomy_level: 1, ..HarnessConfig::default() },
            single_step_builder(),
            executor,
            vec![],
            HashSet::new(),
            emitter,
            None,
            None,
            Utc::now(),
        );

        h.start().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Paused);

        h.approve_gate().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Completed);
    }

    #[tokio::test]
    async fn gate_reject_leaves_harness_paused() {
        let (emitter, _sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::succeeding("MARS", "done"));
        let mut h = AgentHarness::new(
            "h-3",
            "MARS",
            "t-3",
            None,
            None,
            0,
            HarnessConfig { autonomy_level: 1, ..HarnessConfig::default() },
            single_step_builder(),
            executor,
            vec![],
            HashSet::new(),
            emitter,
            None,
            None,
            Utc::now(),
        );

        h.start().await.unwrap();
        h.reject_gate("stop").await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Paused);
    }

    #[tokio::test]
    async fn a_rejected_gate_frees_pending_gate_so_a_later_step_can_gate_again() {
        let (emitter, _sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::succeeding("MARS", "done"));
        // Autonomy 3 gates critical steps only; a single critical step is
        // always ready, so it is always the one gated.
        let builder: PlanBuilder = StdArc::new(|task_id, agent, desc| Ok(deterministic_plan(task_id, agent, desc)));
        let mut h = AgentHarness::new(
            "h-4",
            "MARS",
            "t-4",
            None,
            None,
            0,
            HarnessConfig { autonomy_level: 3, ..HarnessConfig::default() },
            builder,
            executor,
            vec![],
            HashSet::new(),
            emitter,
            None,
            None,
            Utc::now(),
        );

        h.start().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Paused);
        assert!(h.state.pending_gate.is_some());

        h.reject_gate("not yet").await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Paused);
        assert!(h.state.pending_gate.is_none(), "a rejected gate must not occupy pending_gate permanently");
        assert!(matches!(h.state.last_gate.as_ref().map(|g| g.status), Some(crate::gate::GateStatus::Rejected)));

        // Step "a" was never failed by the rejection, so resuming re-evaluates
        // the same ready step and opens a fresh gate rather than staying stuck.
        h.resume().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Paused);
        assert!(h.state.pending_gate.is_some(), "a fresh gate must be able to open after a rejection");

        h.approve_gate().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_harness_rejects_further_transitions() {
        let (emitter, _sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::succeeding("MARS", "done"));
        let mut h = harness(executor, emitter);
        h.start().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Completed);

        let err = h.pause().await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidTransition { .. }));
        assert_eq!(h.status(), HarnessStatus::Completed);
    }

    #[tokio::test]
    async fn local_step_failure_fails_the_harness() {
        let (emitter, sink) = recording_emitter();
        let executor = StdArc::new(ScriptedExecutor::failing_then_succeeding("MARS", "done", 99));
        let mut h = harness(executor, emitter);

        h.start().await.unwrap();
        assert_eq!(h.status(), HarnessStatus::Failed);
        let result = h.result().unwrap();
        assert!(result.error.is_some());

        let events = sink.recorded().await;
        assert!(events.iter().any(|e| matches!(&e.kind, EventKind::StepFailed { .. })));
    }
}
