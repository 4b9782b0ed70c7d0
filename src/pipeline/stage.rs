//! Stage navigation and completion rules.
//!
//! Stages 1-3 and 5 complete only on an explicit user action. Stage 4
//! completes on its own as soon as a positive ratio exists. The two kinds
//! are kept apart as [`StageTransition`] variants.

use crate::models::{Stage, StageStatus};

/// What caused a stage to complete automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTrigger {
    PositiveRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    /// User confirmed the stage.
    ManualConfirm(Stage),
    /// A data condition completed the stage without confirmation.
    AutoComplete { stage: Stage, trigger: AutoTrigger },
}

impl StageTransition {
    pub fn stage(&self) -> Stage {
        match self {
            StageTransition::ManualConfirm(stage) => *stage,
            StageTransition::AutoComplete { stage, .. } => *stage,
        }
    }

    /// Set the completion flag. Returns whether it changed.
    pub fn apply(self, status: &mut StageStatus) -> bool {
        let stage = self.stage();
        let changed = !status.is_complete(stage);
        status.set(stage, true);
        if changed {
            match self {
                StageTransition::ManualConfirm(_) => {
                    tracing::info!(stage = stage.number(), "Stage confirmed");
                }
                StageTransition::AutoComplete { trigger, .. } => {
                    tracing::info!(stage = stage.number(), ?trigger, "Stage auto-completed");
                }
            }
        }
        changed
    }
}

/// Whether the user may move from `current` to `target`.
///
/// A stage is reachable when it is at most one past the current stage and
/// at most one past the highest confirmed stage.
pub fn can_enter(current: Stage, status: &StageStatus, target: u8) -> bool {
    let Some(target) = Stage::new(target) else {
        return false;
    };
    let highest = status.highest_complete().map_or(0, Stage::number);
    target.number() <= current.number() + 1 && target.number() <= highest + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_assessment_stays_on_first_stage() {
        let status = StageStatus::default();
        assert!(can_enter(Stage::FOUNDING, &status, 1));
        assert!(!can_enter(Stage::FOUNDING, &status, 2));
        assert!(!can_enter(Stage::FOUNDING, &status, 0));
    }

    #[test]
    fn confirmed_stage_unlocks_the_next_only() {
        let mut status = StageStatus::default();
        StageTransition::ManualConfirm(Stage::FOUNDING).apply(&mut status);
        assert!(can_enter(Stage::FOUNDING, &status, 2));
        assert!(!can_enter(Stage::FOUNDING, &status, 3));
        assert!(!can_enter(Stage::PROGRESS, &status, 3));
    }

    #[test]
    fn going_back_is_always_allowed() {
        let mut status = StageStatus::default();
        for stage in [Stage::FOUNDING, Stage::PROGRESS, Stage::EVIDENCE] {
            StageTransition::ManualConfirm(stage).apply(&mut status);
        }
        assert!(can_enter(Stage::RATIO, &status, 1));
        assert!(can_enter(Stage::RATIO, &status, 4));
        assert!(!can_enter(Stage::RATIO, &status, 5));
        assert!(!can_enter(Stage::REPORT, &status, 6));
    }

    #[test]
    fn auto_completion_reports_first_change_only() {
        let mut status = StageStatus::default();
        let t = StageTransition::AutoComplete {
            stage: Stage::RATIO,
            trigger: AutoTrigger::PositiveRatio,
        };
        assert!(t.apply(&mut status));
        assert!(!t.apply(&mut status));
        assert!(status.stage4_complete);
    }
}
