//! Tool Selection Panel.
//!
//! Two selections are kept side by side: `applied` (what the backend last
//! confirmed) and `draft` (what the user is editing). Applying sends the
//! draft and adopts the server's echo as the new baseline for both; cancel
//! copies `applied` back over `draft` without a request.
//!
//! Phase changes go through [`next_phase`], a plain transition table.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::wire::{InternalToolEntry, McpToolEntry, ToolMode, ToolSelectionRequest, ToolSelectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPhase {
    Idle,
    Loading,
    Editing,
    Applying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Load,
    Loaded,
    LoadFailed,
    Apply,
    Applied,
    ApplyFailed,
    Cancel,
}

/// Transition table; `None` means the action is not allowed in that phase.
pub fn next_phase(phase: PanelPhase, action: PanelAction) -> Option<PanelPhase> {
    use PanelAction::*;
    use PanelPhase::*;
    match (phase, action) {
        (Idle | Editing, Load) => Some(Loading),
        (Loading, Loaded) => Some(Editing),
        (Loading, LoadFailed) => Some(Idle),
        (Editing, Apply) => Some(Applying),
        (Applying, Applied) => Some(Editing),
        (Applying, ApplyFailed) => Some(Editing),
        (Editing, Cancel) => Some(Editing),
        _ => None,
    }
}

/// One complete selection: mode plus enabled ids per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSelection {
    pub mode: ToolMode,
    pub internal: BTreeSet<String>,
    pub mcp: BTreeSet<String>,
}

impl ToolSelection {
    fn from_state(state: &ToolSelectionState) -> Self {
        Self {
            mode: state.mode,
            internal: state.internal.iter().filter(|t| t.applied).map(|t| t.id.clone()).collect(),
            mcp: state.mcp.iter().filter(|t| t.applied).map(|t| t.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolPanel {
    session_id: String,
    phase: PanelPhase,
    internal_tools: Vec<InternalToolEntry>,
    mcp_tools: Vec<McpToolEntry>,
    mcp_available: bool,
    mcp_reason: Option<String>,
    applied: ToolSelection,
    draft: ToolSelection,
    status: Option<String>,
}

impl ToolPanel {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: PanelPhase::Idle,
            internal_tools: Vec::new(),
            mcp_tools: Vec::new(),
            mcp_available: false,
            mcp_reason: None,
            applied: ToolSelection::default(),
            draft: ToolSelection::default(),
            status: None,
        }
    }

    fn step(&mut self, action: PanelAction) -> Result<()> {
        match next_phase(self.phase, action) {
            Some(next) => {
                self.phase = next;
                Ok(())
            }
            None => Err(ClientError::validation(format!(
                "tool panel cannot {action:?} while {:?}",
                self.phase
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Loading / applying
    // -----------------------------------------------------------------------

    pub fn begin_load(&mut self) -> Result<()> {
        self.step(PanelAction::Load)?;
        self.status = Some("Loading tools…".to_string());
        Ok(())
    }

    pub fn load_succeeded(&mut self, state: ToolSelectionState) -> Result<()> {
        self.step(PanelAction::Loaded)?;
        self.adopt(state);
        Ok(())
    }

    pub fn load_failed(&mut self) -> Result<()> {
        self.step(PanelAction::LoadFailed)?;
        self.status = Some("Unable to load tools".to_string());
        Ok(())
    }

    /// Build the request for the current draft and enter `Applying`.
    pub fn begin_apply(&mut self) -> Result<ToolSelectionRequest> {
        self.step(PanelAction::Apply)?;
        self.status = Some("Applying…".to_string());
        Ok(ToolSelectionRequest {
            session_id: self.session_id.clone(),
            mode: self.draft.mode,
            enabled_internal_tools: self.draft.internal.iter().cloned().collect(),
            enabled_mcp_tools: self.draft.mcp.iter().cloned().collect(),
        })
    }

    pub fn apply_succeeded(&mut self, echo: ToolSelectionState) -> Result<()> {
        self.step(PanelAction::Applied)?;
        self.adopt(echo);
        self.status = Some(format!("{} tool(s) enabled", self.applied_count()));
        Ok(())
    }

    /// The draft survives a failed apply so the user can retry.
    pub fn apply_failed(&mut self) -> Result<()> {
        self.step(PanelAction::ApplyFailed)?;
        self.status = Some("Unable to apply tool selection".to_string());
        Ok(())
    }

    /// Throw the draft away.
    pub fn cancel(&mut self) -> Result<()> {
        self.step(PanelAction::Cancel)?;
        self.draft = self.applied.clone();
        self.status = None;
        Ok(())
    }

    fn adopt(&mut self, state: ToolSelectionState) {
        self.applied = ToolSelection::from_state(&state);
        self.draft = self.applied.clone();
        self.mcp_available = state.mcp_enabled;
        self.mcp_reason = state.reason;
        self.internal_tools = state.internal;
        self.mcp_tools = state.mcp;
        self.status = None;
    }

    /// GET the session's selection and make it the baseline.
    pub async fn load(&mut self, client: &ChatClient) -> Result<()> {
        self.begin_load()?;
        match client.tool_selection(&self.session_id).await {
            Ok(state) => self.load_succeeded(state),
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "tool selection load failed");
                self.load_failed()?;
                Err(e)
            }
        }
    }

    /// POST the draft; the echoed selection becomes the baseline.
    pub async fn apply(&mut self, client: &ChatClient) -> Result<()> {
        let request = self.begin_apply()?;
        match client.apply_tool_selection(&request).await {
            Ok(echo) => {
                self.apply_succeeded(echo)?;
                info!(
                    session_id = %self.session_id,
                    mode = %self.applied.mode,
                    enabled = self.applied_count(),
                    "tool selection applied"
                );
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "tool selection apply failed");
                self.apply_failed()?;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Draft editing
    // -----------------------------------------------------------------------

    pub fn set_mode(&mut self, mode: ToolMode) -> bool {
        if self.phase != PanelPhase::Editing {
            return false;
        }
        self.draft.mode = mode;
        true
    }

    pub fn set_internal(&mut self, id: &str, enabled: bool) -> bool {
        if self.phase != PanelPhase::Editing || !self.internal_tools.iter().any(|t| t.id == id) {
            return false;
        }
        toggle(&mut self.draft.internal, id, enabled);
        true
    }

    /// Ignored while the external category is disabled for the draft.
    pub fn set_mcp(&mut self, id: &str, enabled: bool) -> bool {
        if self.phase != PanelPhase::Editing
            || !self.draft_external_enabled()
            || !self.mcp_tools.iter().any(|t| t.id == id)
        {
            return false;
        }
        toggle(&mut self.draft.mcp, id, enabled);
        true
    }

    fn external_enabled(&self, selection: &ToolSelection) -> bool {
        selection.mode == ToolMode::Agent && self.mcp_available
    }

    /// Whether external tools can be edited in the draft.
    pub fn draft_external_enabled(&self) -> bool {
        self.external_enabled(&self.draft)
    }

    /// Whether external tools are usable under the confirmed selection.
    pub fn applied_external_enabled(&self) -> bool {
        self.external_enabled(&self.applied)
    }

    /// Enabled tools as last confirmed; external tools count only when usable.
    pub fn applied_count(&self) -> usize {
        count(&self.applied, self.external_enabled(&self.applied))
    }

    pub fn draft_count(&self) -> usize {
        count(&self.draft, self.external_enabled(&self.draft))
    }

    pub fn is_dirty(&self) -> bool {
        self.draft != self.applied
    }

    pub fn phase(&self) -> PanelPhase {
        self.phase
    }

    pub fn applied(&self) -> &ToolSelection {
        &self.applied
    }

    pub fn draft(&self) -> &ToolSelection {
        &self.draft
    }

    pub fn internal_tools(&self) -> &[InternalToolEntry] {
        &self.internal_tools
    }

    pub fn mcp_tools(&self) -> &[McpToolEntry] {
        &self.mcp_tools
    }

    /// Why external tools are unavailable, when the backend says so.
    pub fn mcp_reason(&self) -> Option<&str> {
        self.mcp_reason.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

fn toggle(set: &mut BTreeSet<String>, id: &str, enabled: bool) {
    if enabled {
        set.insert(id.to_string());
    } else {
        set.remove(id);
    }
}

fn count(selection: &ToolSelection, external: bool) -> usize {
    selection.internal.len() + if external { selection.mcp.len() } else { 0 }
}
