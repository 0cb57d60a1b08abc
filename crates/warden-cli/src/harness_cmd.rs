//! `warden` harness lifecycle commands: create, start, pause, resume, stop,
//! list, and crash-recovery resume, plus gate approve/reject.
//!
//! Every invocation is a fresh process, so each command (besides `create`)
//! first reattaches the target harness from its last checkpoint before
//! acting on it. `build_manager` wires the same stack `serve_cmd` and the
//! TUI dashboard use, so a harness created by one CLI invocation is visible
//! to the next regardless of which surface touches it.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use warden_core::config::RuntimeConfig;
use warden_core::executor::AgentExecutor;
use warden_core::executor::process::ProcessAgentExecutor;
use warden_core::manager::{HarnessManager, UuidIdGenerator};
use warden_core::plan::construct::deterministic_plan;
use warden_core::store::{JsonFileStore, PostgresStore, StoreBridge};
use warden_core::toolcall::ToolExecutor;
use warden_core::toolcall::shell::ShellCommandTool;

/// Build the manager the whole CLI/REST/TUI surface shares: a single
/// `default` agent backed by `WARDEN_AGENT_BINARY` (falling back to `cat`,
/// which echoes the prompt context back as the step output -- useful for
/// exercising the lifecycle without a real agent binary on hand).
pub fn build_manager(pool: PgPool, runtime_config: &RuntimeConfig) -> Arc<HarnessManager> {
    let binary = std::env::var("WARDEN_AGENT_BINARY").unwrap_or_else(|_| "cat".to_owned());
    let agent_name = std::env::var("WARDEN_AGENT_NAME").unwrap_or_else(|_| "default".to_owned());

    let mut executors: std::collections::HashMap<String, Arc<dyn AgentExecutor>> = std::collections::HashMap::new();
    executors.insert(agent_name.clone(), Arc::new(ProcessAgentExecutor::new(agent_name.clone(), binary, Vec::new())));

    let plan_builder = Arc::new(move |task_id: &str, agent_name: &str, description: &str| {
        Ok(deterministic_plan(task_id, agent_name, description))
    });

    let tool_set = Arc::new(|| {
        let tools: Vec<Box<dyn ToolExecutor>> = vec![Box::new(ShellCommandTool)];
        let permitted: HashSet<String> = tools.iter().map(|t| t.name().to_owned()).collect();
        (tools, permitted)
    });

    let emitter_factory = Arc::new(|| warden_core::events::Emitter::new(vec![Box::new(warden_core::events::TracingSink)]));

    let store = StoreBridge::new(
        Box::new(PostgresStore::new(pool)),
        Box::new(JsonFileStore::new(runtime_config.fallback_dir.clone())),
    );

    HarnessManager::new(
        Arc::new(UuidIdGenerator),
        executors,
        plan_builder,
        tool_set,
        emitter_factory,
        Some(Arc::new(store)),
        runtime_config,
    )
}

fn default_agent_name() -> String {
    std::env::var("WARDEN_AGENT_NAME").unwrap_or_else(|_| "default".to_owned())
}

pub async fn run_create(manager: &HarnessManager, task_id: &str, description: &str) -> Result<()> {
    let agent_name = default_agent_name();
    let description = if description.is_empty() { None } else { Some(description.to_owned()) };
    let harness_id = manager
        .create(&agent_name, task_id, description, None)
        .await
        .context("failed to create harness")?;
    println!("{harness_id}");
    Ok(())
}

pub async fn run_start(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    if manager.status(harness_id).await.is_none() {
        manager.resume_from_checkpoint(harness_id).await.context("failed to load harness checkpoint")?;
    }
    manager.start(harness_id).await.context("failed to start harness")?;
    print_status(manager, harness_id).await
}

pub async fn run_pause(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    reattach(manager, harness_id).await?;
    manager.pause(harness_id).await.context("failed to pause harness")?;
    print_status(manager, harness_id).await
}

pub async fn run_resume(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    reattach(manager, harness_id).await?;
    manager.resume(harness_id).await.context("failed to resume harness")?;
    print_status(manager, harness_id).await
}

pub async fn run_stop(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    reattach(manager, harness_id).await?;
    manager.stop(harness_id).await.context("failed to stop harness")?;
    print_status(manager, harness_id).await
}

pub async fn run_resume_from_checkpoint(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    manager.resume_from_checkpoint(harness_id).await.context("failed to resume from checkpoint")?;
    print_status(manager, harness_id).await
}

pub async fn run_approve_gate(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    reattach(manager, harness_id).await?;
    manager.approve_gate(harness_id).await.context("failed to approve gate")?;
    print_status(manager, harness_id).await
}

pub async fn run_reject_gate(manager: &HarnessManager, harness_id: &str, reason: String) -> Result<()> {
    reattach(manager, harness_id).await?;
    manager.reject_gate(harness_id, reason).await.context("failed to reject gate")?;
    print_status(manager, harness_id).await
}

pub async fn run_status(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    reattach(manager, harness_id).await?;
    print_status(manager, harness_id).await
}

/// List every harness the store knows about, not just ones this process has
/// touched -- each row is reconstructed from its last checkpoint alone, so
/// listing never requires a matching executor to be registered.
pub async fn run_list(pool: &PgPool) -> Result<()> {
    let rows = warden_db::queries::checkpoints::list_harnesses(pool).await.context("failed to list harnesses")?;
    if rows.is_empty() {
        println!("No harnesses found.");
        return Ok(());
    }
    println!("{:<38} {:<12} {:<20} {:<36} {:<20}", "HARNESS", "STATUS", "AGENT", "TASK", "UPDATED");
    for row in rows {
        println!(
            "{:<38} {:<12} {:<20} {:<36} {:<20}",
            row.harness_id,
            format!("{:?}", row.status),
            row.agent_name,
            row.task_id,
            row.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

async fn reattach(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    if manager.status(harness_id).await.is_none() {
        manager.resume_from_checkpoint(harness_id).await.context("failed to load harness checkpoint")?;
    }
    Ok(())
}

async fn print_status(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    let snapshot = manager
        .snapshot(harness_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("harness {harness_id} not held by this process"))?;

    println!("harness:   {}", snapshot.harness_id);
    println!("agent:     {}", snapshot.agent_name);
    println!("task:      {}", snapshot.task_id);
    println!("status:    {:?}", snapshot.status);
    println!("created:   {}", snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("updated:   {}", snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("depth:     {}", snapshot.depth);
    println!("checkpoints: {}", snapshot.checkpoint_count);
    if let Some(gate) = &snapshot.pending_gate {
        println!("pending gate: step {} ({:?})", gate.step_id, gate.status);
    }
    if let Some(reason) = &snapshot.failure_reason {
        println!("failure:   {reason}");
    }
    if let Some(result) = manager.result(harness_id).await {
        println!("steps:     {}/{}", result.steps_completed, result.total_steps);
        println!("tool calls: {}", result.tool_call_count);
        if let Some(output) = &result.output {
            println!("output:\n{output}");
        }
    }
    Ok(())
}

/// `warden db-init`: create the database (if absent) and run migrations.
pub async fn run_db_init(resolved: &crate::config::WardenConfig) -> Result<()> {
    warden_db::pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = warden_db::pool::create_pool(&resolved.db_config).await?;
    let migrations_path = warden_db::pool::default_migrations_path();
    warden_db::pool::run_migrations(&db_pool, migrations_path).await?;

    let counts = warden_db::pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }
    db_pool.close().await;
    println!("warden db-init complete.");
    Ok(())
}
