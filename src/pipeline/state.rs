//! Run state for the generation pipeline.
//!
//! A run moves through a fixed, linear stage sequence. The stage enum is the
//! whole transition table; each stage knows the progress milestone and task
//! status it reports on entry. [`PipelineState`] is the shared snapshot the
//! stage sequence commits into, so a deadline expiry can still finalize from
//! whatever the last completed stage left behind.

use std::collections::BTreeMap;

use crate::agents::ImplementationPlan;
use crate::progress::TaskStatus;

/// Stages of a generation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Produce an implementation plan from the documentation.
    Planning,
    /// Generate server source files from the plan.
    Coding,
    /// Derive service identity and register the template.
    Validation,
    /// Persist artifacts and close out the run.
    Completion,
}

impl PipelineStage {
    /// The next stage, or `None` after the last one.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Planning => Some(Self::Coding),
            Self::Coding => Some(Self::Validation),
            Self::Validation => Some(Self::Completion),
            Self::Completion => None,
        }
    }

    /// Progress milestone reported when the stage begins.
    pub fn milestone(self) -> u8 {
        match self {
            Self::Planning => 25,
            Self::Coding => 50,
            Self::Validation => 75,
            Self::Completion => 90,
        }
    }

    /// Task status reported while the stage runs.
    pub fn status(self) -> TaskStatus {
        match self {
            Self::Planning => TaskStatus::Planning,
            Self::Coding => TaskStatus::Coding,
            Self::Validation => TaskStatus::Validating,
            Self::Completion => TaskStatus::Finalizing,
        }
    }

    /// Step description reported when the stage begins.
    pub fn step_description(self) -> &'static str {
        match self {
            Self::Planning => "Planning implementation",
            Self::Coding => "Generating code",
            Self::Validation => "Validating output",
            Self::Completion => "Writing artifacts",
        }
    }
}

/// Accumulated state of one generation run.
///
/// Committed stage by stage; the deadline arm reads whatever is here when
/// time runs out.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Parsed implementation plan, defaulted when planning degraded.
    pub plan: ImplementationPlan,
    /// Plan text fed to the coding prompt.
    pub plan_text: String,
    /// Whether the plan was parsed from model output.
    pub plan_parsed: bool,
    /// Generated files keyed by relative filename.
    pub generated_code: BTreeMap<String, String>,
    /// Verbatim last model response.
    pub raw_response: Option<String>,
    /// Service name registered during validation.
    pub service_name: Option<String>,
    /// Template id minted during validation.
    pub template_id: Option<String>,
    /// Server id minted during validation.
    pub server_id: Option<String>,
    /// Relative filenames persisted to disk.
    pub files_written: Vec<String>,
    /// Whether the fallback skeleton was synthesized.
    pub fallback_used: bool,
    /// Accumulated degradation notes.
    pub error: Option<String>,
    /// Last stage that committed its results.
    pub completed_stage: Option<PipelineStage>,
}

impl PipelineState {
    /// Appends a degradation note, joining multiple notes with `"; "`.
    pub fn record_error(&mut self, message: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(message);
            }
            None => self.error = Some(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sequence_is_linear() {
        assert_eq!(PipelineStage::Planning.next(), Some(PipelineStage::Coding));
        assert_eq!(PipelineStage::Coding.next(), Some(PipelineStage::Validation));
        assert_eq!(
            PipelineStage::Validation.next(),
            Some(PipelineStage::Completion)
        );
        assert_eq!(PipelineStage::Completion.next(), None);
    }

    #[test]
    fn test_stage_milestones_increase() {
        let mut stage = PipelineStage::Planning;
        let mut last = 0;
        loop {
            assert!(stage.milestone() > last);
            last = stage.milestone();
            match stage.next() {
                Some(next) => stage = next,
                None => break,
            }
        }
        assert_eq!(last, 90);
    }

    #[test]
    fn test_stage_statuses() {
        assert_eq!(PipelineStage::Planning.status(), TaskStatus::Planning);
        assert_eq!(PipelineStage::Coding.status(), TaskStatus::Coding);
        assert_eq!(PipelineStage::Validation.status(), TaskStatus::Validating);
        assert_eq!(PipelineStage::Completion.status(), TaskStatus::Finalizing);
    }

    #[test]
    fn test_record_error_accumulates() {
        let mut state = PipelineState::default();
        assert!(state.error.is_none());

        state.record_error("planning failed");
        assert_eq!(state.error.as_deref(), Some("planning failed"));

        state.record_error("coding failed");
        assert_eq!(
            state.error.as_deref(),
            Some("planning failed; coding failed")
        );
    }
}
