//! LLM agents for the generation pipeline.
//!
//! Two agents drive a run: the [`planner::PlannerAgent`] turns the request
//! and fetched documentation into an implementation plan, and the
//! [`coder::CoderAgent`] turns that plan into server source files. Both
//! absorb model failures into their outcomes so the pipeline always reaches
//! finalization.

pub mod coder;
pub mod planner;

pub use coder::{
    CodeOutcome, CoderAgent, CoderSettings, DEFAULT_CODING_MODEL, DEFAULT_CODING_TEMPERATURE,
};
pub use planner::{
    ImplementationPlan, PlanOutcome, PlannedTool, PlannerAgent, PlannerSettings,
    DEFAULT_DOC_WINDOW_CHARS, DEFAULT_PLANNING_MODEL, DEFAULT_PLANNING_TEMPERATURE,
};

/// Default completion token cap shared by both agents.
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 8192;
