//! TUI application state and data model.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use warden_core::manager::HarnessManager;

/// Which view the TUI is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    HarnessList,
    HarnessDetail(String),
    Help,
}

/// Row shown in the harness list, reconstructed straight from the store so
/// it reflects every harness ever created, not just the ones this process
/// has reattached.
#[derive(Debug, Clone)]
pub struct HarnessRow {
    pub harness_id: String,
    pub agent_name: String,
    pub task_id: String,
    pub status: String,
}

/// Application state for the TUI.
pub struct App {
    pub manager: Arc<HarnessManager>,
    pub pool: PgPool,
    pub current_view: View,
    pub rows: Vec<HarnessRow>,
    pub selected: usize,
    pub detail: Option<warden_core::supervisor::HarnessSnapshot>,
    pub tick_rate: Duration,
    pub should_quit: bool,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(manager: Arc<HarnessManager>, pool: PgPool) -> Self {
        Self {
            manager,
            pool,
            current_view: View::HarnessList,
            rows: Vec::new(),
            selected: 0,
            detail: None,
            tick_rate: Duration::from_secs(1),
            should_quit: false,
            status_message: None,
        }
    }

    /// Refresh data based on the current view.
    pub async fn refresh(&mut self) -> Result<()> {
        match self.current_view.clone() {
            View::HarnessList => self.refresh_rows().await?,
            View::HarnessDetail(id) => self.refresh_detail(&id).await?,
            View::Help => {}
        }
        Ok(())
    }

    async fn refresh_rows(&mut self) -> Result<()> {
        let summaries = warden_db::queries::checkpoints::list_harnesses(&self.pool).await?;
        self.rows = summaries
            .into_iter()
            .map(|r| HarnessRow {
                harness_id: r.harness_id,
                agent_name: r.agent_name,
                task_id: r.task_id,
                status: format!("{:?}", r.status),
            })
            .collect();
        if self.selected >= self.rows.len() && !self.rows.is_empty() {
            self.selected = self.rows.len() - 1;
        }
        Ok(())
    }

    async fn refresh_detail(&mut self, harness_id: &str) -> Result<()> {
        if self.manager.status(harness_id).await.is_none() {
            let _ = self.manager.resume_from_checkpoint(harness_id).await;
        }
        self.detail = self.manager.snapshot(harness_id).await;
        Ok(())
    }

    // -- Navigation --

    pub fn navigate_back(&mut self) {
        match &self.current_view {
            View::HarnessList => self.should_quit = true,
            View::HarnessDetail(_) => self.current_view = View::HarnessList,
            View::Help => self.current_view = View::HarnessList,
        }
    }

    pub fn navigate_enter(&mut self) {
        if let View::HarnessList = &self.current_view {
            if let Some(row) = self.rows.get(self.selected) {
                self.current_view = View::HarnessDetail(row.harness_id.clone());
            }
        }
    }

    pub fn move_up(&mut self) {
        if let View::HarnessList = &self.current_view {
            if self.selected > 0 {
                self.selected -= 1;
            }
        }
    }

    pub fn move_down(&mut self) {
        if let View::HarnessList = &self.current_view {
            if !self.rows.is_empty() && self.selected < self.rows.len() - 1 {
                self.selected += 1;
            }
        }
    }

    pub fn show_help(&mut self) {
        self.current_view = View::Help;
    }

    fn selected_harness_id(&self) -> Option<String> {
        match &self.current_view {
            View::HarnessDetail(id) => Some(id.clone()),
            View::HarnessList => self.rows.get(self.selected).map(|r| r.harness_id.clone()),
            View::Help => None,
        }
    }

    // -- Actions --

    pub async fn start_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            if self.manager.status(&id).await.is_none() {
                self.manager.resume_from_checkpoint(&id).await?;
            }
            self.manager.start(&id).await?;
            self.status_message = Some(format!("Started {id}"));
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn pause_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            self.manager.pause(&id).await?;
            self.status_message = Some(format!("Paused {id}"));
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn resume_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            self.manager.resume(&id).await?;
            self.status_message = Some(format!("Resumed {id}"));
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn stop_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            self.manager.stop(&id).await?;
            self.status_message = Some(format!("Stopped {id}"));
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn approve_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            self.manager.approve_gate(&id).await?;
            self.status_message = Some(format!("Gate on {id} approved"));
            self.refresh().await?;
        }
        Ok(())
    }

    pub async fn reject_selected(&mut self) -> Result<()> {
        if let Some(id) = self.selected_harness_id() {
            self.manager.reject_gate(&id, "rejected from dashboard".to_owned()).await?;
            self.status_message = Some(format!("Gate on {id} rejected"));
            self.refresh().await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_navigation() {
        let view = View::HarnessDetail("harness-1".to_owned());
        assert_ne!(view, View::HarnessList);

        let view = View::Help;
        assert_ne!(view, View::HarnessList);
    }
}
