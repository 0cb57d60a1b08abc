//! Integration tests for harness durability: checkpointing to a real
//! Postgres-backed store, crash recovery across a fresh `HarnessManager`,
//! and the human-gate approve/reject path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use warden_core::config::{HarnessConfig, RuntimeConfig};
use warden_core::events::Emitter;
use warden_core::executor::{AgentExecutor, ScriptedExecutor};
use warden_core::manager::{CountingIdGenerator, EmitterFactory, HarnessManager, ToolSetFactory};
use warden_core::plan::construct::deterministic_plan;
use warden_core::store::{JsonFileStore, PostgresStore, StoreBridge};
use warden_core::supervisor::{HarnessError, PlanBuilder};
use warden_db::HarnessStatus;

use warden_test_utils::{create_test_db, drop_test_db};

fn build_manager(pool: sqlx::PgPool, fallback_dir: std::path::PathBuf, default_config: HarnessConfig) -> Arc<HarnessManager> {
    let mut executors: HashMap<String, Arc<dyn AgentExecutor>> = HashMap::new();
    executors.insert("MARS".to_owned(), Arc::new(ScriptedExecutor::succeeding("MARS", "main done")));

    let plan_builder: PlanBuilder = Arc::new(|task_id, agent, desc| Ok(deterministic_plan(task_id, agent, desc)));
    let tool_set: ToolSetFactory = Arc::new(|| (vec![], HashSet::new()));
    let emitter_factory: EmitterFactory = Arc::new(|| Emitter::new(vec![]));

    let store = StoreBridge::new(Box::new(PostgresStore::new(pool)), Box::new(JsonFileStore::new(fallback_dir)));

    let mut runtime_config = RuntimeConfig::new("unused", "unused");
    runtime_config.default_harness_config = default_config;

    HarnessManager::new(
        Arc::new(CountingIdGenerator::default()),
        executors,
        plan_builder,
        tool_set,
        emitter_factory,
        Some(Arc::new(store)),
        &runtime_config,
    )
}

#[tokio::test]
async fn a_fresh_manager_reattaches_a_harness_from_its_last_checkpoint() {
    let (pool, db_name) = create_test_db().await;
    warden_db::pool::run_migrations(&pool, warden_db::pool::default_migrations_path()).await.unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    let autonomy_five = HarnessConfig { autonomy_level: 5, ..HarnessConfig::default() };

    let harness_id = {
        let manager = build_manager(pool.clone(), tmp.path().to_path_buf(), autonomy_five);
        let id = manager.create("MARS", "task-durable", None, None).await.unwrap();
        assert!(manager.status(&id).await.is_some(), "create() should checkpoint immediately");
        id
    };

    // Simulate a new process: a fresh manager, with nothing in memory, reattaches
    // the same harness from its last checkpoint and can drive it to completion.
    let manager = build_manager(pool.clone(), tmp.path().to_path_buf(), autonomy_five);
    assert!(manager.status(&harness_id).await.is_none());

    manager.resume_from_checkpoint(&harness_id).await.unwrap();
    assert_eq!(manager.status(&harness_id).await, Some(HarnessStatus::Created));

    manager.start(&harness_id).await.unwrap();
    assert_eq!(manager.status(&harness_id).await, Some(HarnessStatus::Completed));

    let result = manager.result(&harness_id).await.unwrap();
    assert_eq!(result.output.as_deref(), Some("main done"));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn a_pending_gate_survives_a_process_boundary_and_can_be_approved_later() {
    let (pool, db_name) = create_test_db().await;
    warden_db::pool::run_migrations(&pool, warden_db::pool::default_migrations_path()).await.unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    // autonomy_level 1 forces a human gate on every step, including the
    // deterministic single critical step built by `deterministic_plan`.
    let gated = HarnessConfig { autonomy_level: 1, ..HarnessConfig::default() };

    let harness_id = {
        let manager = build_manager(pool.clone(), tmp.path().to_path_buf(), gated);
        let id = manager.create("MARS", "task-gated", None, None).await.unwrap();
        manager.start(&id).await.unwrap();
        assert_eq!(manager.status(&id).await, Some(HarnessStatus::Paused));
        id
    };

    let manager = build_manager(pool.clone(), tmp.path().to_path_buf(), gated);
    manager.resume_from_checkpoint(&harness_id).await.unwrap();
    let snapshot = manager.snapshot(&harness_id).await.unwrap();
    assert!(snapshot.pending_gate.is_some());

    manager.approve_gate(&harness_id).await.unwrap();
    assert_eq!(manager.status(&harness_id).await, Some(HarnessStatus::Completed));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resuming_an_unknown_harness_id_is_a_checked_error() {
    let (pool, db_name) = create_test_db().await;
    warden_db::pool::run_migrations(&pool, warden_db::pool::default_migrations_path()).await.unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    let manager = build_manager(pool.clone(), tmp.path().to_path_buf(), HarnessConfig::default());

    let err = manager.resume_from_checkpoint("does-not-exist").await.unwrap_err();
    assert!(matches!(err, HarnessError::UnrecoverableAgentError(_)));

    drop_test_db(&db_name).await;
}
