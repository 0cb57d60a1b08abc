//! `warden gate` commands: approve or reject a harness's pending human gate.

use anyhow::Result;

use warden_core::manager::HarnessManager;

use crate::harness_cmd;

pub async fn run_approve(manager: &HarnessManager, harness_id: &str) -> Result<()> {
    harness_cmd::run_approve_gate(manager, harness_id).await?;
    println!("Gate on {harness_id} approved.");
    Ok(())
}

pub async fn run_reject(manager: &HarnessManager, harness_id: &str, reason: String) -> Result<()> {
    harness_cmd::run_reject_gate(manager, harness_id, reason).await?;
    println!("Gate on {harness_id} rejected.");
    Ok(())
}
