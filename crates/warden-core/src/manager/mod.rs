//! Harness manager: allocates harness identifiers, tracks the live registry
//! of harnesses this process owns, enforces the sub-agent depth cap, and
//! resumes harnesses from checkpoints after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use warden_db::HarnessStatus;

use crate::config::{HarnessConfig, RuntimeConfig};
use crate::events::Emitter;
use crate::executor::AgentExecutor;
use crate::store::StoreBridge;
use crate::supervisor::{
    AgentHarness, HarnessError, HarnessResult, HarnessSnapshot, PlanBuilder, SubAgentResult, SubAgentSpawnRequest,
    SubAgentSpawner,
};
use crate::token::{self, TokenConfig};
use crate::toolcall::ToolExecutor;

/// Allocates harness identifiers. Abstracted so tests can get deterministic,
/// predictable ids instead of random UUIDs.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const _: () = {
    fn _assert_object_safe(_: &dyn IdGenerator) {}
};

/// Default generator: a random UUID v4 per harness.
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic generator for tests: `harness-0`, `harness-1`, ...
pub struct CountingIdGenerator {
    counter: std::sync::atomic::AtomicU64,
}

impl Default for CountingIdGenerator {
    fn default() -> Self {
        Self { counter: std::sync::atomic::AtomicU64::new(0) }
    }
}

impl IdGenerator for CountingIdGenerator {
    fn generate(&self) -> String {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("harness-{n}")
    }
}

/// Builds the tool set and permitted-tool set a freshly constructed harness
/// should start with. A factory rather than a fixed value because
/// `Box<dyn ToolExecutor>` is not `Clone`.
pub type ToolSetFactory =
    Arc<dyn Fn() -> (Vec<Box<dyn ToolExecutor>>, std::collections::HashSet<String>) + Send + Sync>;

/// Builds a fresh [`Emitter`] wired to this process's sinks. A factory for
/// the same reason as [`ToolSetFactory`]: sinks aren't `Clone`.
pub type EmitterFactory = Arc<dyn Fn() -> Emitter + Send + Sync>;

/// Owns every harness this process is driving, and doubles as the
/// [`SubAgentSpawner`] a harness calls into when a step is delegated to a
/// different agent. Holds a weak handle to itself so a spawned sub-harness
/// can be given an `Arc<dyn SubAgentSpawner>` capable of spawning further
/// sub-harnesses of its own, up to the configured depth cap.
pub struct HarnessManager {
    id_gen: Arc<dyn IdGenerator>,
    executors: HashMap<String, Arc<dyn AgentExecutor>>,
    plan_builder: PlanBuilder,
    tool_set: ToolSetFactory,
    emitter_factory: EmitterFactory,
    store: Option<Arc<StoreBridge>>,
    token_config: TokenConfig,
    default_config: HarnessConfig,
    max_depth: u32,
    harnesses: Mutex<HashMap<String, AgentHarness>>,
    self_handle: Weak<HarnessManager>,
}

impl HarnessManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id_gen: Arc<dyn IdGenerator>,
        executors: HashMap<String, Arc<dyn AgentExecutor>>,
        plan_builder: PlanBuilder,
        tool_set: ToolSetFactory,
        emitter_factory: EmitterFactory,
        store: Option<Arc<StoreBridge>>,
        runtime_config: &RuntimeConfig,
    ) -> Arc<Self> {
        let token_config = TokenConfig::new(runtime_config.spawn_token_secret.clone().into_bytes());
        let default_config = runtime_config.default_harness_config;
        let max_depth = default_config.max_depth;

        Arc::new_cyclic(|weak| Self {
            id_gen,
            executors,
            plan_builder,
            tool_set,
            emitter_factory,
            store,
            token_config,
            default_config,
            max_depth,
            harnesses: Mutex::new(HashMap::new()),
            self_handle: weak.clone(),
        })
    }

    /// An `Arc<dyn SubAgentSpawner>` pointing back at this manager, handed
    /// to every harness it constructs so delegated steps can recurse.
    fn spawner_handle(&self) -> Arc<dyn SubAgentSpawner> {
        self.self_handle.upgrade().expect("manager outlives every harness it constructs") as Arc<dyn SubAgentSpawner>
    }

    #[allow(clippy::too_many_arguments)]
    fn build_harness(
        &self,
        harness_id: String,
        agent_name: &str,
        task_id: &str,
        description: Option<String>,
        parent_harness_id: Option<String>,
        depth: u32,
        config: HarnessConfig,
    ) -> Result<AgentHarness, HarnessError> {
        let executor = self.executors.get(agent_name).cloned().ok_or_else(|| {
            HarnessError::UnrecoverableAgentError(format!("no executor registered for agent {agent_name:?}"))
        })?;
        let (tools, permitted) = (self.tool_set)();
        let emitter = (self.emitter_factory)();
        Ok(AgentHarness::new(
            harness_id,
            agent_name,
            task_id,
            description,
            parent_harness_id,
            depth,
            config,
            self.plan_builder.clone(),
            executor,
            tools,
            permitted,
            emitter,
            self.store.clone(),
            Some(self.spawner_handle()),
            Utc::now(),
        ))
    }

    /// Allocate an id and construct a new top-level harness (depth 0, no
    /// parent). Does not start it.
    pub async fn create(
        &self,
        agent_name: &str,
        task_id: &str,
        description: Option<String>,
        config: Option<HarnessConfig>,
    ) -> Result<String, HarnessError> {
        let harness_id = self.id_gen.generate();
        let config = config.unwrap_or(self.default_config);
        let mut harness = self.build_harness(harness_id.clone(), agent_name, task_id, description, None, 0, config)?;
        harness.checkpoint().await;
        self.harnesses.lock().await.insert(harness_id.clone(), harness);
        Ok(harness_id)
    }

    pub async fn start(&self, harness_id: &str) -> Result<(), HarnessError> {
        self.with_harness(harness_id, |h| Box::pin(h.start())).await
    }

    pub async fn pause(&self, harness_id: &str) -> Result<(), HarnessError> {
        self.with_harness(harness_id, |h| Box::pin(h.pause())).await
    }

    pub async fn resume(&self, harness_id: &str) -> Result<(), HarnessError> {
        self.with_harness(harness_id, |h| Box::pin(h.resume())).await
    }

    pub async fn stop(&self, harness_id: &str) -> Result<(), HarnessError> {
        self.with_harness(harness_id, |h| Box::pin(h.stop())).await
    }

    pub async fn approve_gate(&self, harness_id: &str) -> Result<(), HarnessError> {
        self.with_harness(harness_id, |h| Box::pin(h.approve_gate())).await
    }

    pub async fn reject_gate(&self, harness_id: &str, reason: String) -> Result<(), HarnessError> {
        self.with_harness(harness_id, move |h| Box::pin(h.reject_gate(reason.clone()))).await
    }

    async fn with_harness<F>(&self, harness_id: &str, f: F) -> Result<(), HarnessError>
    where
        F: for<'a> FnOnce(
            &'a mut AgentHarness,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), HarnessError>> + Send + 'a>>,
    {
        let mut guard = self.harnesses.lock().await;
        let harness = guard
            .get_mut(harness_id)
            .ok_or_else(|| HarnessError::UnrecoverableAgentError(format!("no such harness: {harness_id:?}")))?;
        f(harness).await
    }

    pub async fn status(&self, harness_id: &str) -> Option<HarnessStatus> {
        self.harnesses.lock().await.get(harness_id).map(|h| h.status())
    }

    pub async fn result(&self, harness_id: &str) -> Option<HarnessResult> {
        self.harnesses.lock().await.get(harness_id).and_then(|h| h.result())
    }

    /// Full snapshot of a harness currently held by this process, for
    /// display surfaces (CLI, REST, TUI) that need more than the status enum.
    pub async fn snapshot(&self, harness_id: &str) -> Option<HarnessSnapshot> {
        self.harnesses.lock().await.get(harness_id).map(|h| h.snapshot())
    }

    /// List every harness this process currently holds, in no particular
    /// order.
    pub async fn list(&self) -> Vec<(String, HarnessStatus)> {
        self.harnesses.lock().await.iter().map(|(id, h)| (id.clone(), h.status())).collect()
    }

    /// Load a harness's last checkpoint from the store and reattach it to
    /// this manager's registry, resuming its drive loop if it was running.
    pub async fn resume_from_checkpoint(&self, harness_id: &str) -> Result<(), HarnessError> {
        let store =
            self.store.clone().ok_or_else(|| HarnessError::StoreUnavailable("no store configured".to_owned()))?;

        let doc = store
            .restore(harness_id, None)
            .await
            .map_err(|e| HarnessError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| HarnessError::UnrecoverableAgentError(format!("no checkpoint for {harness_id:?}")))?;

        let snapshot: HarnessSnapshot = serde_json::from_value(doc.json)
            .map_err(|e| HarnessError::UnrecoverableAgentError(format!("malformed checkpoint: {e}")))?;

        let was_running = snapshot.status == HarnessStatus::Running;
        let executor = self.executors.get(&snapshot.agent_name).cloned().ok_or_else(|| {
            HarnessError::UnrecoverableAgentError(format!(
                "no executor registered for agent {:?}",
                snapshot.agent_name
            ))
        })?;
        let (tools, permitted) = (self.tool_set)();
        let emitter = (self.emitter_factory)();

        let mut harness = AgentHarness::from_snapshot(
            snapshot,
            self.plan_builder.clone(),
            executor,
            tools,
            permitted,
            emitter,
            self.store.clone(),
            Some(self.spawner_handle()),
        );

        if was_running {
            harness.resume().await?;
        }

        self.harnesses.lock().await.insert(harness_id.to_owned(), harness);
        Ok(())
    }
}

#[async_trait]
impl SubAgentSpawner for HarnessManager {
    async fn spawn(&self, request: SubAgentSpawnRequest) -> Result<(String, SubAgentResult), HarnessError> {
        let depth = request.parent_depth + 1;
        if depth >= self.max_depth {
            return Err(HarnessError::DepthExceeded);
        }

        let harness_id = self.id_gen.generate();
        let _spawn_token = token::generate_token(&self.token_config, &harness_id, depth);

        let mut config = self.default_config;
        // Sub-agents run synchronously inside the parent's dispatch loop; a
        // human gate would deadlock the spawn call, so delegated work
        // always runs at full autonomy.
        config.autonomy_level = 5;

        let mut harness = self.build_harness(
            harness_id.clone(),
            &request.agent_name,
            &request.task_id,
            Some(request.description.clone()),
            Some(request.parent_harness_id),
            depth,
            config,
        )?;

        tracing::info!(harness_id = %harness_id, depth, agent = %request.agent_name, "spawning sub-agent");

        let outcome = harness.start().await;
        let status = harness.status();
        let harness_result = harness.result();
        self.harnesses.lock().await.insert(harness_id.clone(), harness);

        if let Err(e) = outcome {
            return Ok((
                harness_id,
                SubAgentResult { status: HarnessStatus::Failed, output: None, error: Some(e.to_string()) },
            ));
        }

        Ok((
            harness_id,
            SubAgentResult {
                status,
                output: harness_result.as_ref().and_then(|r| r.output.clone()),
                error: harness_result.and_then(|r| r.error),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::executor::ScriptedExecutor;
    use crate::plan::construct::deterministic_plan;
    use std::collections::HashSet;

    fn test_manager(max_depth: u32) -> Arc<HarnessManager> {
        let mut executors: HashMap<String, Arc<dyn AgentExecutor>> = HashMap::new();
        executors.insert("MARS".to_owned(), Arc::new(ScriptedExecutor::succeeding("MARS", "main done")));
        executors.insert("VENUS".to_owned(), Arc::new(ScriptedExecutor::succeeding("VENUS", "sub done")));

        let plan_builder: PlanBuilder = Arc::new(|task_id, agent, desc| Ok(deterministic_plan(task_id, agent, desc)));
        let tool_set: ToolSetFactory = Arc::new(|| (vec![], HashSet::new()));
        let emitter_factory: EmitterFactory = Arc::new(|| Emitter::new(vec![Box::new(RecordingSink::default())]));

        let mut runtime_config = RuntimeConfig::new("postgresql://x/y", "/tmp/warden-test-fallback");
        runtime_config.default_harness_config.autonomy_level = 5;
        runtime_config.default_harness_config.max_depth = max_depth;

        HarnessManager::new(
            Arc::new(CountingIdGenerator::default()),
            executors,
            plan_builder,
            tool_set,
            emitter_factory,
            None,
            &runtime_config,
        )
    }

    #[tokio::test]
    async fn create_and_start_completes_a_single_agent_harness() {
        let manager = test_manager(3);
        let id = manager.create("MARS", "t-1", None, None).await.unwrap();
        manager.start(&id).await.unwrap();

        assert_eq!(manager.status(&id).await, Some(HarnessStatus::Completed));
        let result = manager.result(&id).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("main done"));
    }

    #[tokio::test]
    async fn list_reports_every_owned_harness() {
        let manager = test_manager(3);
        let a = manager.create("MARS", "t-1", None, None).await.unwrap();
        let b = manager.create("MARS", "t-2", None, None).await.unwrap();

        let listed = manager.list().await;
        let ids: Vec<&String> = listed.iter().map(|(id, _)| id).collect();
        assert!(ids.contains(&&a));
        assert!(ids.contains(&&b));
    }

    #[tokio::test]
    async fn depth_cap_of_zero_rejects_any_sub_agent_spawn() {
        let manager = test_manager(0);
        let request = SubAgentSpawnRequest {
            parent_harness_id: "parent".to_owned(),
            parent_depth: 0,
            agent_name: "VENUS".to_owned(),
            task_id: "t-sub".to_owned(),
            description: "delegated work".to_owned(),
            prior_error: None,
        };

        let err = manager.spawn(request).await.unwrap_err();
        assert!(matches!(err, HarnessError::DepthExceeded));
    }

    #[tokio::test]
    async fn spawn_at_depth_equal_to_the_cap_is_rejected_not_just_beyond_it() {
        let manager = test_manager(2);

        // A request from a parent at depth 1 would spawn a child at depth 2,
        // exactly at the cap: must be rejected.
        let at_cap = SubAgentSpawnRequest {
            parent_harness_id: "parent".to_owned(),
            parent_depth: 1,
            agent_name: "VENUS".to_owned(),
            task_id: "t-sub".to_owned(),
            description: "delegated work".to_owned(),
            prior_error: None,
        };
        let err = manager.spawn(at_cap).await.unwrap_err();
        assert!(matches!(err, HarnessError::DepthExceeded));

        // A request from a parent at depth 0 spawns a child at depth 1,
        // still under the cap: must succeed.
        let under_cap = SubAgentSpawnRequest {
            parent_harness_id: "parent".to_owned(),
            parent_depth: 0,
            agent_name: "VENUS".to_owned(),
            task_id: "t-sub".to_owned(),
            description: "delegated work".to_owned(),
            prior_error: None,
        };
        let (_, result) = manager.spawn(under_cap).await.unwrap();
        assert_eq!(result.status, HarnessStatus::Completed);
    }

    #[tokio::test]
    async fn pause_on_a_terminal_harness_is_rejected() {
        let manager = test_manager(3);
        let id = manager.create("MARS", "t-1", None, None).await.unwrap();
        manager.start(&id).await.unwrap();

        // Autonomy 5 means no gates, so start() already drove the harness
        // to completion; pausing a terminal harness must be rejected.
        let err = manager.pause(&id).await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn sub_agent_step_runs_to_completion_via_the_manager() {
        let manager = test_manager(3);
        let request = SubAgentSpawnRequest {
            parent_harness_id: "parent".to_owned(),
            parent_depth: 0,
            agent_name: "VENUS".to_owned(),
            task_id: "t-sub".to_owned(),
            description: "delegated work".to_owned(),
            prior_error: None,
        };

        let (sub_id, result) = manager.spawn(request).await.unwrap();
        assert_eq!(result.status, HarnessStatus::Completed);
        assert_eq!(result.output.as_deref(), Some("sub done"));
        assert_eq!(manager.status(&sub_id).await, Some(HarnessStatus::Completed));
    }
}
