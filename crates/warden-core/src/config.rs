//! Runtime configuration for the harness supervisor.
//!
//! Mirrors the precedence convention used elsewhere in the stack: an
//! explicit constructor argument wins, then an environment variable, then a
//! config file, then a built-in default.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-harness policy knobs. Persisted alongside harness state so a resumed
/// harness reapplies the same policy rather than process defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Maximum total tool calls (executed + rejected) across the harness's
    /// lifetime.
    pub max_total_tool_calls: u32,
    /// Maximum retry attempts for a transiently failing tool call.
    pub max_tool_retries: u32,
    /// Base backoff, doubled on each retry.
    pub base_backoff_ms: u64,
    /// Per-call timeout.
    pub tool_call_timeout_ms: u64,
    /// Interval between periodic checkpoints while running.
    pub checkpoint_interval_secs: u64,
    /// Maximum sub-agent spawn depth.
    pub max_depth: u32,
    /// Autonomy level (1-5) controlling human-gate placement.
    pub autonomy_level: u8,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_total_tool_calls: 100,
            max_tool_retries: 3,
            base_backoff_ms: 1000,
            tool_call_timeout_ms: 30_000,
            checkpoint_interval_secs: 300,
            max_depth: 3,
            autonomy_level: 3,
        }
    }
}

impl HarnessConfig {
    /// Resolve a `HarnessConfig` from layered, optional overrides in
    /// increasing order of precedence: config file, then environment, then
    /// CLI flag. A field left unset (`None`) at every layer keeps the
    /// built-in default.
    pub fn resolve(
        file: Option<&HarnessConfigOverrides>,
        env: &HarnessConfigOverrides,
        cli: &HarnessConfigOverrides,
    ) -> Self {
        let mut cfg = Self::default();
        if let Some(file) = file {
            file.apply_to(&mut cfg);
        }
        env.apply_to(&mut cfg);
        cli.apply_to(&mut cfg);
        cfg
    }
}

/// Per-field overrides for [`HarnessConfig`], one optional slot per knob.
/// Used to thread the config-file/env-var/CLI-flag precedence chain through
/// a single merge routine instead of duplicating per-field precedence logic
/// at each layer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfigOverrides {
    pub max_total_tool_calls: Option<u32>,
    pub max_tool_retries: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub tool_call_timeout_ms: Option<u64>,
    pub checkpoint_interval_secs: Option<u64>,
    pub max_depth: Option<u32>,
    pub autonomy_level: Option<u8>,
}

impl HarnessConfigOverrides {
    /// Read overrides from `WARDEN_MAX_TOTAL_TOOL_CALLS`, `WARDEN_MAX_TOOL_RETRIES`,
    /// `WARDEN_BASE_BACKOFF_MS`, `WARDEN_TOOL_CALL_TIMEOUT_MS`,
    /// `WARDEN_CHECKPOINT_INTERVAL_SECS`, `WARDEN_MAX_DEPTH`, and
    /// `WARDEN_AUTONOMY_LEVEL`. A var that is unset or fails to parse is
    /// treated as absent rather than an error, consistent with the
    /// fallback-to-default convention used elsewhere in this module.
    pub fn from_env() -> Self {
        Self {
            max_total_tool_calls: env_parse("WARDEN_MAX_TOTAL_TOOL_CALLS"),
            max_tool_retries: env_parse("WARDEN_MAX_TOOL_RETRIES"),
            base_backoff_ms: env_parse("WARDEN_BASE_BACKOFF_MS"),
            tool_call_timeout_ms: env_parse("WARDEN_TOOL_CALL_TIMEOUT_MS"),
            checkpoint_interval_secs: env_parse("WARDEN_CHECKPOINT_INTERVAL_SECS"),
            max_depth: env_parse("WARDEN_MAX_DEPTH"),
            autonomy_level: env_parse("WARDEN_AUTONOMY_LEVEL"),
        }
    }

    fn apply_to(&self, cfg: &mut HarnessConfig) {
        if let Some(v) = self.max_total_tool_calls {
            cfg.max_total_tool_calls = v;
        }
        if let Some(v) = self.max_tool_retries {
            cfg.max_tool_retries = v;
        }
        if let Some(v) = self.base_backoff_ms {
            cfg.base_backoff_ms = v;
        }
        if let Some(v) = self.tool_call_timeout_ms {
            cfg.tool_call_timeout_ms = v;
        }
        if let Some(v) = self.checkpoint_interval_secs {
            cfg.checkpoint_interval_secs = v;
        }
        if let Some(v) = self.max_depth {
            cfg.max_depth = v;
        }
        if let Some(v) = self.autonomy_level {
            cfg.autonomy_level = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Connection URL for the primary (Postgres) store.
    pub database_url: String,
    /// Directory for the fallback JSON-file store.
    pub fallback_dir: PathBuf,
    /// Default per-harness policy, used unless a caller overrides it.
    pub default_harness_config: HarnessConfig,
    /// HMAC secret used to mint sub-agent spawn tokens.
    pub spawn_token_secret: String,
}

impl RuntimeConfig {
    const DEFAULT_FALLBACK_DIR: &str = "./warden-fallback-store";
    const DEFAULT_SPAWN_SECRET: &str = "warden-dev-secret-change-me";

    /// Build configuration from the environment, falling back to defaults.
    ///
    /// Priority: env var, then built-in default. Use [`Self::new`] directly
    /// in tests to bypass the environment entirely.
    pub fn from_env() -> Self {
        let database_url = env::var("WARDEN_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost:5432/warden".to_owned());
        let fallback_dir = env::var("WARDEN_FALLBACK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_FALLBACK_DIR));
        let spawn_token_secret = env::var("WARDEN_SPAWN_TOKEN_SECRET")
            .unwrap_or_else(|_| Self::DEFAULT_SPAWN_SECRET.to_owned());
        let default_harness_config =
            HarnessConfig::resolve(None, &HarnessConfigOverrides::from_env(), &HarnessConfigOverrides::default());

        Self {
            database_url,
            fallback_dir,
            default_harness_config,
            spawn_token_secret,
        }
    }

    /// Build an explicit configuration, bypassing the environment.
    pub fn new(database_url: impl Into<String>, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: database_url.into(),
            fallback_dir: fallback_dir.into(),
            default_harness_config: HarnessConfig::default(),
            spawn_token_secret: Self::DEFAULT_SPAWN_SECRET.to_owned(),
        }
    }
}
