//! Install State Machine
//!
//! The authoritative source of truth for where a run is. Transitions are
//! validated: stages cannot be skipped, the machine only moves forward, and
//! the destructive disk stage needs an explicit confirmation.
//!
//! # Stage Flow
//!
//! ```text
//! Start
//!     ↓
//! ValidateConfig
//!     ↓
//! PrepareDisk        (destructive)
//!     ↓
//! InstallBase
//!     ↓
//! ConfigureSystem
//!     ↓
//! InstallProfiles
//!     ↓
//! Finalize
//!     ↓
//! Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use std::fmt;

use thiserror::Error;

use crate::error::Stage;

/// Installation stages in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstallStage {
    Start = 0,
    ValidateConfig = 1,
    /// Partitioning and formatting the target disk. Requires confirmation.
    PrepareDisk = 2,
    /// pacstrap, fstab, network config, installer copy
    InstallBase = 3,
    ConfigureSystem = 4,
    /// Non-fatal per profile
    InstallProfiles = 5,
    Finalize = 6,
    /// Terminal
    Done = 7,
    /// Terminal
    Failed = 255,
}

impl InstallStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::PrepareDisk)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::ValidateConfig),
            Self::ValidateConfig => Some(Self::PrepareDisk),
            Self::PrepareDisk => Some(Self::InstallBase),
            Self::InstallBase => Some(Self::ConfigureSystem),
            Self::ConfigureSystem => Some(Self::InstallProfiles),
            Self::InstallProfiles => Some(Self::Finalize),
            Self::Finalize => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "Starting installation",
            Self::ValidateConfig => "Validating configuration",
            Self::PrepareDisk => "Preparing disk",
            Self::InstallBase => "Installing base system",
            Self::ConfigureSystem => "Configuring system",
            Self::InstallProfiles => "Installing profiles",
            Self::Finalize => "Finalizing installation",
            Self::Done => "Installation complete",
            Self::Failed => "Installation failed",
        }
    }

    /// Progress checkpoint reported when the stage is entered.
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::Start | Self::ValidateConfig => 0,
            Self::PrepareDisk => 5,
            Self::InstallBase => 15,
            Self::ConfigureSystem => 35,
            Self::InstallProfiles => 55,
            Self::Finalize => 80,
            Self::Done => 100,
            Self::Failed => 0,
        }
    }

    /// Progress checkpoint reported when the stage's work has finished.
    pub const fn completion_percent(self) -> u8 {
        match self {
            Self::Start => 0,
            Self::ValidateConfig => 5,
            Self::PrepareDisk => 10,
            Self::InstallBase => 30,
            Self::ConfigureSystem => 50,
            Self::InstallProfiles => 70,
            Self::Finalize => 95,
            Self::Done => 100,
            Self::Failed => 0,
        }
    }

    /// Error tag for failures raised while this stage runs.
    pub const fn error_stage(self) -> Option<Stage> {
        match self {
            Self::ValidateConfig => Some(Stage::ConfigValidation),
            Self::PrepareDisk => Some(Stage::Disk),
            Self::InstallBase => Some(Stage::Bootstrap),
            Self::ConfigureSystem => Some(Stage::Configure),
            Self::InstallProfiles => Some(Stage::Profile),
            Self::Finalize => Some(Stage::Finalize),
            Self::Start | Self::Done | Self::Failed => None,
        }
    }

    /// All stages in order (excluding Failed)
    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Start,
            Self::ValidateConfig,
            Self::PrepareDisk,
            Self::InstallBase,
            Self::ConfigureSystem,
            Self::InstallProfiles,
            Self::Finalize,
            Self::Done,
        ]
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    #[error("Cannot skip from {from} to {to} (must transition through intermediate stages)")]
    SkippedStage {
        from: InstallStage,
        to: InstallStage,
    },

    #[error("Cannot go backwards from {from} to {to} (installation is forward-only)")]
    BackwardTransition {
        from: InstallStage,
        to: InstallStage,
    },

    #[error(
        "Cannot transition from terminal state {from} (installation is {})",
        if *from == InstallStage::Done { "complete" } else { "failed" }
    )]
    FromTerminalState { from: InstallStage },

    #[error("Stage {stage} requires explicit confirmation (destructive operation)")]
    MissingConfirmation { stage: InstallStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: InstallStage },
}

/// Tracks one installation run.
///
/// # Example
///
/// ```
/// use gxinstall::install_state::{InstallerContext, InstallStage};
///
/// let mut ctx = InstallerContext::new();
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_stage(), InstallStage::ValidateConfig);
///
/// // The disk stage is destructive and needs confirmation
/// assert!(ctx.advance().is_err());
/// ctx.confirm_destructive_operations();
/// assert_eq!(ctx.advance().unwrap(), InstallStage::PrepareDisk);
/// ```
#[derive(Debug, Clone)]
pub struct InstallerContext {
    current: InstallStage,
    failed_at: Option<InstallStage>,
    /// (stage, unix timestamp) per transition
    stage_history: Vec<(InstallStage, u64)>,
    destructive_confirmed: bool,
}

impl Default for InstallerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallerContext {
    pub fn new() -> Self {
        Self {
            current: InstallStage::Start,
            failed_at: None,
            stage_history: Vec::with_capacity(InstallStage::all_stages().len()),
            destructive_confirmed: false,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> InstallStage {
        self.current
    }

    #[inline]
    pub fn failed_at(&self) -> Option<InstallStage> {
        self.failed_at
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == InstallStage::Done
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == InstallStage::Failed
    }

    pub fn stage_history(&self) -> &[(InstallStage, u64)] {
        &self.stage_history
    }

    /// One-way flag; must be set before entering `PrepareDisk`.
    pub fn confirm_destructive_operations(&mut self) {
        self.destructive_confirmed = true;
    }

    #[inline]
    pub fn is_destructive_confirmed(&self) -> bool {
        self.destructive_confirmed
    }

    /// Advance to the next stage in sequence.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Done or Failed
    /// - `MissingConfirmation` if entering a destructive stage without confirmation
    pub fn advance(&mut self) -> Result<InstallStage, InstallTransitionError> {
        let next_stage = self
            .current
            .next()
            .ok_or(InstallTransitionError::FromTerminalState { from: self.current })?;

        if next_stage.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: next_stage });
        }

        self.record_stage_transition(next_stage);
        self.current = next_stage;
        Ok(next_stage)
    }

    /// Transition to `target`, which must be the immediate next stage.
    ///
    /// # Errors
    ///
    /// - `AlreadyAtStage` if target is the current stage
    /// - `BackwardTransition` if target is before current
    /// - `SkippedStage` if target is not the immediate next stage
    /// - `FromTerminalState` if current is a terminal state
    /// - `MissingConfirmation` if entering a destructive stage without confirmation
    pub fn transition_to(
        &mut self,
        target: InstallStage,
    ) -> Result<InstallStage, InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        if target == self.current {
            return Err(InstallTransitionError::AlreadyAtStage { stage: target });
        }

        // Failed is only reachable through fail()
        if target == InstallStage::Failed {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.order() < self.current.order() {
            return Err(InstallTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        if self.current.next() != Some(target) {
            return Err(InstallTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }

        if target.is_destructive() && !self.destructive_confirmed {
            return Err(InstallTransitionError::MissingConfirmation { stage: target });
        }

        self.record_stage_transition(target);
        self.current = target;
        Ok(target)
    }

    /// Mark the run as failed, remembering the stage it failed in.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already at Done or Failed
    pub fn fail(&mut self) -> Result<(), InstallTransitionError> {
        if self.current.is_terminal() {
            return Err(InstallTransitionError::FromTerminalState { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record_stage_transition(InstallStage::Failed);
        self.current = InstallStage::Failed;
        Ok(())
    }

    fn record_stage_transition(&mut self, stage: InstallStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.stage_history.push((stage, timestamp));
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // InstallStage Tests
    // =========================================================================

    #[test]
    fn test_stage_order_is_sequential() {
        for (i, stage) in InstallStage::all_stages().iter().enumerate() {
            assert_eq!(stage.order() as usize, i, "Stage {:?} should have order {}", stage, i);
        }
    }

    #[test]
    fn test_stage_next_forms_chain() {
        let mut current = InstallStage::Start;
        let mut count = 0;

        while let Some(next) = current.next() {
            current = next;
            count += 1;
            assert!(count < 20, "Infinite loop detected in stage chain");
        }

        assert_eq!(current, InstallStage::Done);
        assert_eq!(count, 7);
    }

    #[test]
    fn test_only_prepare_disk_is_destructive() {
        for stage in InstallStage::all_stages() {
            assert_eq!(
                stage.is_destructive(),
                *stage == InstallStage::PrepareDisk,
                "{:?}",
                stage
            );
        }
    }

    #[test]
    fn test_checkpoints_are_monotonic() {
        let mut last = 0u8;
        for stage in InstallStage::all_stages() {
            assert!(stage.progress_percent() >= last, "{:?} regresses", stage);
            assert!(stage.completion_percent() >= stage.progress_percent());
            last = stage.completion_percent();
        }
        assert_eq!(InstallStage::Done.progress_percent(), 100);
    }

    #[test]
    fn test_checkpoint_values() {
        let pairs: Vec<(u8, u8)> = InstallStage::all_stages()[2..7]
            .iter()
            .map(|s| (s.progress_percent(), s.completion_percent()))
            .collect();
        assert_eq!(pairs, vec![(5, 10), (15, 30), (35, 50), (55, 70), (80, 95)]);
    }

    #[test]
    fn test_error_stage_mapping() {
        assert_eq!(InstallStage::PrepareDisk.error_stage(), Some(Stage::Disk));
        assert_eq!(InstallStage::InstallBase.error_stage(), Some(Stage::Bootstrap));
        assert_eq!(InstallStage::InstallProfiles.error_stage(), Some(Stage::Profile));
        assert_eq!(InstallStage::Done.error_stage(), None);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(InstallStage::Start.to_string(), "Starting installation");
        assert_eq!(InstallStage::PrepareDisk.to_string(), "Preparing disk");
        assert_eq!(InstallStage::Done.to_string(), "Installation complete");
    }

    // =========================================================================
    // InstallerContext Tests
    // =========================================================================

    #[test]
    fn test_context_starts_at_start() {
        let ctx = InstallerContext::new();
        assert_eq!(ctx.current_stage(), InstallStage::Start);
        assert!(!ctx.is_complete());
        assert!(!ctx.is_failed());
    }

    #[test]
    fn test_advance_through_all_stages() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();

        let mut count = 0;
        while ctx.advance().is_ok() {
            count += 1;
            assert!(count < 20, "Infinite loop detected");
        }

        assert!(ctx.is_complete());
        assert_eq!(count, 7);
    }

    #[test]
    fn test_cannot_advance_from_done() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();
        while ctx.current_stage() != InstallStage::Done {
            ctx.advance().expect("Should advance");
        }

        let err = ctx.advance().unwrap_err();
        assert!(matches!(err, InstallTransitionError::FromTerminalState { .. }));
        assert!(err.to_string().contains("complete"));
    }

    #[test]
    fn test_cannot_advance_from_failed() {
        let mut ctx = InstallerContext::new();
        ctx.advance().expect("Should advance to ValidateConfig");
        ctx.fail().expect("Should fail");

        let err = ctx.advance().unwrap_err();
        assert!(matches!(err, InstallTransitionError::FromTerminalState { .. }));
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn test_cannot_skip_stages() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();

        let err = ctx.transition_to(InstallStage::PrepareDisk).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));

        ctx.advance().expect("Should advance");
        let err = ctx.transition_to(InstallStage::InstallBase).unwrap_err();
        assert!(matches!(err, InstallTransitionError::SkippedStage { .. }));
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();
        ctx.advance().expect("ValidateConfig");
        ctx.advance().expect("PrepareDisk");
        ctx.advance().expect("InstallBase");

        let err = ctx.transition_to(InstallStage::ValidateConfig).unwrap_err();
        assert!(matches!(err, InstallTransitionError::BackwardTransition { .. }));
    }

    #[test]
    fn test_cannot_transition_to_same_stage() {
        let mut ctx = InstallerContext::new();
        ctx.advance().expect("ValidateConfig");

        let err = ctx.transition_to(InstallStage::ValidateConfig).unwrap_err();
        assert!(matches!(err, InstallTransitionError::AlreadyAtStage { .. }));
    }

    #[test]
    fn test_failed_only_through_fail() {
        let mut ctx = InstallerContext::new();
        assert!(ctx.transition_to(InstallStage::Failed).is_err());
        assert_eq!(ctx.current_stage(), InstallStage::Start);
    }

    #[test]
    fn test_destructive_stage_requires_confirmation() {
        let mut ctx = InstallerContext::new();
        ctx.advance().expect("ValidateConfig");

        let err = ctx.advance().unwrap_err();
        assert!(matches!(err, InstallTransitionError::MissingConfirmation { .. }));
        assert_eq!(ctx.current_stage(), InstallStage::ValidateConfig);

        ctx.confirm_destructive_operations();
        ctx.advance().expect("Should advance to PrepareDisk");
        assert_eq!(ctx.current_stage(), InstallStage::PrepareDisk);
    }

    #[test]
    fn test_fail_records_failed_at_stage() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();
        ctx.advance().expect("ValidateConfig");
        ctx.advance().expect("PrepareDisk");
        ctx.advance().expect("InstallBase");

        ctx.fail().expect("Should fail");

        assert!(ctx.is_failed());
        assert_eq!(ctx.failed_at(), Some(InstallStage::InstallBase));
        assert_eq!(ctx.stage_history().last().map(|h| h.0), Some(InstallStage::Failed));
    }

    #[test]
    fn test_cannot_fail_from_terminal_state() {
        let mut ctx = InstallerContext::new();
        ctx.confirm_destructive_operations();
        while ctx.current_stage() != InstallStage::Done {
            ctx.advance().expect("Should advance");
        }

        let err = ctx.fail().unwrap_err();
        assert!(matches!(err, InstallTransitionError::FromTerminalState { .. }));
    }

    #[test]
    fn test_stage_history_is_recorded() {
        let mut ctx = InstallerContext::new();
        assert!(ctx.stage_history().is_empty());

        ctx.advance().expect("ValidateConfig");
        assert_eq!(ctx.stage_history().len(), 1);
        assert_eq!(ctx.stage_history()[0].0, InstallStage::ValidateConfig);
    }

    #[test]
    fn test_error_display() {
        let err = InstallTransitionError::SkippedStage {
            from: InstallStage::Start,
            to: InstallStage::PrepareDisk,
        };
        let msg = err.to_string();
        assert!(msg.contains("Cannot skip"));
        assert!(msg.contains("Starting installation"));
        assert!(msg.contains("Preparing disk"));
    }
}
