mod config;
mod gate_cmd;
mod harness_cmd;
mod serve_cmd;
#[cfg(test)]
mod test_util;
mod tui;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use warden_core::config::{HarnessConfigOverrides, RuntimeConfig};
use warden_db::pool;

use config::WardenConfig;

#[derive(Parser)]
#[command(name = "warden", about = "Durable agent harness runtime")]
struct Cli {
    /// Database URL (overrides WARDEN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(flatten)]
    harness: HarnessArgs,

    #[command(subcommand)]
    command: Commands,
}

/// CLI-flag layer of the harness-policy precedence chain (highest
/// precedence, above `WARDEN_*` env vars and the config file's `[harness]`
/// table).
#[derive(Args, Debug, Default)]
struct HarnessArgs {
    /// Maximum total tool calls across a harness's lifetime (overrides WARDEN_MAX_TOTAL_TOOL_CALLS)
    #[arg(long, global = true)]
    max_total_tool_calls: Option<u32>,
    /// Maximum retry attempts for a transiently failing tool call (overrides WARDEN_MAX_TOOL_RETRIES)
    #[arg(long, global = true)]
    max_tool_retries: Option<u32>,
    /// Base backoff in milliseconds, doubled on each retry (overrides WARDEN_BASE_BACKOFF_MS)
    #[arg(long, global = true)]
    base_backoff_ms: Option<u64>,
    /// Per-tool-call timeout in milliseconds (overrides WARDEN_TOOL_CALL_TIMEOUT_MS)
    #[arg(long, global = true)]
    tool_call_timeout_ms: Option<u64>,
    /// Seconds between periodic checkpoints while running (overrides WARDEN_CHECKPOINT_INTERVAL_SECS)
    #[arg(long, global = true)]
    checkpoint_interval_secs: Option<u64>,
    /// Maximum sub-agent spawn depth (overrides WARDEN_MAX_DEPTH)
    #[arg(long, global = true)]
    max_depth: Option<u32>,
    /// Autonomy level 1-5 controlling human-gate placement (overrides WARDEN_AUTONOMY_LEVEL)
    #[arg(long, global = true)]
    autonomy_level: Option<u8>,
}

impl From<&HarnessArgs> for HarnessConfigOverrides {
    fn from(args: &HarnessArgs) -> Self {
        Self {
            max_total_tool_calls: args.max_total_tool_calls,
            max_tool_retries: args.max_tool_retries,
            base_backoff_ms: args.base_backoff_ms,
            tool_call_timeout_ms: args.tool_call_timeout_ms,
            checkpoint_interval_secs: args.checkpoint_interval_secs,
            max_depth: args.max_depth,
            autonomy_level: args.autonomy_level,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a warden config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/warden")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the warden database (requires config file or env vars)
    DbInit,
    /// Create a new harness for a task
    Create {
        /// Task ID the harness will work on
        task_id: String,
        /// Human-readable task description
        #[arg(default_value = "")]
        description: String,
    },
    /// Start a created harness
    Start {
        /// Harness ID to start
        harness_id: String,
    },
    /// Pause a running harness
    Pause {
        /// Harness ID to pause
        harness_id: String,
    },
    /// Resume a paused harness
    Resume {
        /// Harness ID to resume
        harness_id: String,
    },
    /// Stop a harness
    Stop {
        /// Harness ID to stop
        harness_id: String,
    },
    /// Reattach a harness from its last checkpoint without acting on it
    Reattach {
        /// Harness ID to reattach
        harness_id: String,
    },
    /// Show a harness's current status
    Status {
        /// Harness ID to show
        harness_id: String,
    },
    /// List every harness known to the store
    List,
    /// Approve or reject a harness's pending human gate
    Gate {
        #[command(subcommand)]
        command: GateCommands,
    },
    /// Run the REST API server
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Launch interactive TUI dashboard
    Dashboard,
    /// Print a shell completion script to stdout
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum GateCommands {
    /// Approve the pending gate
    Approve {
        /// Harness ID whose gate to approve
        harness_id: String,
    },
    /// Reject the pending gate
    Reject {
        /// Harness ID whose gate to reject
        harness_id: String,
        /// Reason for rejection
        reason: String,
    },
}

/// Execute the `warden init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
    }

    let token_secret = config::generate_token_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection { url: db_url.to_string() },
        auth: config::AuthSection { token_secret: token_secret.clone() },
        harness: HarnessConfigOverrides::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!();
    println!("Next: run `warden db-init` to create and migrate the database.");

    Ok(())
}

/// Build the runtime config shared by every harness-touching command: the
/// resolved database URL and harness policy (each CLI flag > env > config
/// file > default) combined with whatever the process environment supplies
/// for the fallback store directory and spawn token secret.
fn build_runtime_config(resolved: &WardenConfig) -> RuntimeConfig {
    let mut runtime_config = RuntimeConfig::from_env();
    runtime_config.database_url = resolved.db_config.database_url.clone();
    runtime_config.default_harness_config = resolved.harness_config;
    runtime_config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            harness_cmd::run_db_init(&resolved).await?;
        }
        Commands::Create { task_id, description } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_create(&manager, &task_id, &description).await;
            db_pool.close().await;
            result?;
        }
        Commands::Start { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_start(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Pause { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_pause(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Resume { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_resume(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Stop { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_stop(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Reattach { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_resume_from_checkpoint(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Status { harness_id } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = harness_cmd::run_status(&manager, &harness_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::List => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = harness_cmd::run_list(&db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Gate { command } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = match command {
                GateCommands::Approve { harness_id } => gate_cmd::run_approve(&manager, &harness_id).await,
                GateCommands::Reject { harness_id, reason } => gate_cmd::run_reject(&manager, &harness_id, reason).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = serve_cmd::run_serve(manager, db_pool.clone(), &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Dashboard => {
            let resolved = WardenConfig::resolve(cli.database_url.as_deref(), &HarnessConfigOverrides::from(&cli.harness))?;
            let runtime_config = build_runtime_config(&resolved);
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let manager = harness_cmd::build_manager(db_pool.clone(), &runtime_config);
            let result = tui::run_dashboard(manager, db_pool.clone()).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
