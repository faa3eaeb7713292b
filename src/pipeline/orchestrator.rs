//! Orchestrator driving a generation request through the pipeline stages.
//!
//! `PipelineOrchestrator` owns the collaborators a run needs:
//! - Progress tracking for polling clients
//! - Planning and coding agents sharing one retrying LLM client
//! - Template registration for newly generated servers
//! - Artifact persistence under the configured output root
//!
//! A run never fails outright. Stage failures are absorbed into the
//! shared [`PipelineState`] and the report carries `success: true` with
//! the degradation notes in its `error` field, so callers always get a
//! task id they can poll and an artifact directory they can read.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::{CoderAgent, ImplementationPlan, PlannerAgent};
use crate::artifacts::ArtifactWriter;
use crate::llm::{CompletionProvider, RetryingCompletionClient};
use crate::progress::{ProgressRecord, ProgressStore, ProgressUpdate, TaskStatus};
use crate::templates::TemplateStore;

use super::config::PipelineConfig;
use super::state::{PipelineStage, PipelineState};

/// Stand-in raw response when the deadline expires before any model call
/// returned. Keeps the artifact directory non-empty for timed-out runs.
const TIMEOUT_PLACEHOLDER: &str =
    "No model output was captured before the pipeline deadline expired.";

/// Final report of a generation run.
///
/// `success` is always `true`: the pipeline degrades instead of failing,
/// and anything that went wrong along the way is described in `error`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    /// Always `true`. Clients poll progress for the real outcome.
    pub success: bool,
    /// Task id for progress polling and artifact lookup.
    pub task_id: String,
    /// Template id when one was registered or minted.
    pub template_id: Option<String>,
    /// Server id paired with the template id.
    pub server_id: Option<String>,
    /// Human-readable name of the generated server.
    pub service_name: String,
    /// One-line summary of the implementation plan, when one parsed.
    pub plan_summary: Option<String>,
    /// Relative filenames persisted under the task directory.
    pub files_written: Vec<String>,
    /// Whether the placeholder skeleton was written instead of model output.
    pub fallback_used: bool,
    /// Summary line for display.
    pub message: String,
    /// Accumulated degradation notes, if any stage fell back.
    pub error: Option<String>,
}

impl GenerationReport {
    /// True when every stage ran without recording a degradation.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Coordinates planning, coding, validation, and artifact persistence
/// for a single generation request at a time.
pub struct PipelineOrchestrator {
    progress: ProgressStore,
    templates: Arc<dyn TemplateStore>,
    planner: PlannerAgent,
    coder: CoderAgent,
    artifacts: ArtifactWriter,
    config: PipelineConfig,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Create an orchestrator around the given provider and stores.
    ///
    /// Both agents share one retrying client built from the config's
    /// retry policy; artifacts land under `config.artifact_root`.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        templates: Arc<dyn TemplateStore>,
        progress: ProgressStore,
        config: PipelineConfig,
    ) -> Self {
        let llm = Arc::new(RetryingCompletionClient::with_policy(
            provider,
            config.max_attempts,
            config.retry_delay,
        ));
        Self {
            planner: PlannerAgent::new(Arc::clone(&llm)),
            coder: CoderAgent::new(llm),
            artifacts: ArtifactWriter::new(config.artifact_root.clone()),
            progress,
            templates,
            config,
        }
    }

    /// The progress store runs are tracked in.
    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// The artifact writer runs persist through.
    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one generation request.
    ///
    /// `existing_task_id` resumes tracking under a caller-chosen id and
    /// skips template registration; `None` mints a fresh task id and
    /// registers a template during validation. The whole run races the
    /// configured deadline: on expiry the stages are dropped where they
    /// stand, whatever the state holds is persisted, and the task is
    /// marked timed out with its last recorded progress intact.
    #[instrument(skip(self, user_id, request_message, documentation_text), fields(task_id))]
    pub async fn submit(
        &self,
        user_id: Option<&str>,
        request_message: &str,
        documentation_text: &str,
        existing_task_id: Option<&str>,
    ) -> GenerationReport {
        let task_id = existing_task_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mint_identity = existing_task_id.is_none();
        tracing::Span::current().record("task_id", task_id.as_str());

        info!(
            request_chars = request_message.len(),
            documentation_chars = documentation_text.len(),
            "Starting generation run"
        );
        self.progress.start_task(&task_id);
        self.progress.update_progress(
            &task_id,
            ProgressUpdate::new()
                .progress(10)
                .status(TaskStatus::Processing)
                .step("Processing request")
                .message("Generation request accepted"),
        );

        let state = Arc::new(Mutex::new(PipelineState::default()));
        let stages = self.run_stages(
            &task_id,
            mint_identity,
            user_id,
            request_message,
            documentation_text,
            Arc::clone(&state),
        );
        let timed_out = tokio::time::timeout(self.config.pipeline_timeout, stages)
            .await
            .is_err();

        let final_state = lock_state(&state).clone();
        if timed_out {
            self.finalize_timeout(&task_id, final_state).await
        } else {
            self.finalize_completed(&task_id, final_state)
        }
    }

    /// Look up the current progress record for a task.
    pub fn get_progress(&self, task_id: &str) -> Option<ProgressRecord> {
        self.progress.get_progress(task_id)
    }

    /// Run the four stages in order, committing results into `state`
    /// after each one. Cancellation-safe: no lock is held across an
    /// await, so dropping this future at a deadline leaves `state` at
    /// the last committed stage.
    async fn run_stages(
        &self,
        task_id: &str,
        mint_identity: bool,
        user_id: Option<&str>,
        request: &str,
        documentation: &str,
        state: Arc<Mutex<PipelineState>>,
    ) {
        // Planning.
        self.enter_stage(task_id, PipelineStage::Planning);
        let plan_outcome = self
            .planner
            .plan(request, documentation, &self.config.planner_settings())
            .await;
        {
            let mut s = lock_state(&state);
            match &plan_outcome.error {
                Some(err) => {
                    s.record_error(err);
                    self.progress.update_progress(
                        task_id,
                        ProgressUpdate::new().message(format!("Planning degraded: {err}")),
                    );
                }
                None => {
                    self.progress.update_progress(
                        task_id,
                        ProgressUpdate::new().message(format!(
                            "Plan ready: {} ({} tools)",
                            plan_outcome.plan.display_name(),
                            plan_outcome.plan.tool_count()
                        )),
                    );
                }
            }
            s.plan_parsed = plan_outcome.parsed();
            s.plan = plan_outcome.plan;
            s.plan_text = plan_outcome.plan_text;
            if plan_outcome.raw_response.is_some() {
                s.raw_response = plan_outcome.raw_response;
            }
            s.completed_stage = Some(PipelineStage::Planning);
        }

        // Coding.
        self.enter_stage(task_id, PipelineStage::Coding);
        let plan_text = lock_state(&state).plan_text.clone();
        let code_outcome = self
            .coder
            .generate(request, &plan_text, &self.config.coder_settings())
            .await;
        {
            let mut s = lock_state(&state);
            match &code_outcome.error {
                Some(err) => {
                    s.record_error(err);
                    self.progress.update_progress(
                        task_id,
                        ProgressUpdate::new().message(format!("Coding degraded: {err}")),
                    );
                }
                None => {
                    self.progress.update_progress(
                        task_id,
                        ProgressUpdate::new()
                            .message(format!("Generated {} files", code_outcome.file_count())),
                    );
                }
            }
            s.generated_code = code_outcome.files;
            if code_outcome.raw_response.is_some() {
                s.raw_response = code_outcome.raw_response;
            }
            s.completed_stage = Some(PipelineStage::Coding);
        }

        // Validation. Identity comes from the plan when it parsed, and
        // from the request text otherwise.
        self.enter_stage(task_id, PipelineStage::Validation);
        let (service_name, description) = {
            let s = lock_state(&state);
            if s.plan_parsed {
                (
                    s.plan.display_name().to_string(),
                    s.plan.display_description().to_string(),
                )
            } else {
                (
                    derive_service_name(request),
                    ImplementationPlan::DEFAULT_DESCRIPTION.to_string(),
                )
            }
        };
        if mint_identity {
            match self
                .templates
                .create(&service_name, &description, user_id)
                .await
            {
                Ok(record) => {
                    info!(template_id = %record.template_id, server_id = %record.server_id, "Registered template");
                    let mut s = lock_state(&state);
                    s.template_id = Some(record.template_id);
                    s.server_id = Some(record.server_id);
                }
                Err(err) => {
                    warn!(error = %err, "Template registration failed; minting local ids");
                    let mut s = lock_state(&state);
                    s.record_error(&format!("Template registration failed: {err}"));
                    s.template_id = Some(Uuid::new_v4().to_string());
                    s.server_id = Some(Uuid::new_v4().to_string());
                }
            }
        }
        {
            let mut s = lock_state(&state);
            s.service_name = Some(service_name);
            s.completed_stage = Some(PipelineStage::Validation);
        }

        // Completion. Artifacts are written per file; a partial write
        // is recorded but does not abort the run.
        self.enter_stage(task_id, PipelineStage::Completion);
        let (files, raw) = {
            let s = lock_state(&state);
            (s.generated_code.clone(), s.raw_response.clone())
        };
        let write_report = self.artifacts.persist(task_id, &files, raw.as_deref()).await;
        {
            let mut s = lock_state(&state);
            if write_report.has_failures() {
                let failed: Vec<&str> = write_report
                    .failed
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect();
                s.record_error(&format!(
                    "Some artifacts failed to write: {}",
                    failed.join(", ")
                ));
            }
            s.files_written = write_report.written;
            s.fallback_used = write_report.fallback_used;
            s.completed_stage = Some(PipelineStage::Completion);
        }
    }

    /// Record stage entry: milestone progress, status, and step label.
    fn enter_stage(&self, task_id: &str, stage: PipelineStage) {
        info!(stage = ?stage, "Entering stage");
        self.progress.update_progress(
            task_id,
            ProgressUpdate::new()
                .progress(stage.milestone())
                .status(stage.status())
                .step(stage.step_description()),
        );
    }

    /// Finalize a run whose stages all returned before the deadline.
    fn finalize_completed(&self, task_id: &str, state: PipelineState) -> GenerationReport {
        let record = self
            .progress
            .finish_task(task_id, true, state.error.clone());
        info!(
            files = state.files_written.len(),
            fallback = state.fallback_used,
            status = %record.status,
            "Generation run finished"
        );
        self.build_report(
            task_id,
            state,
            "MCP server generated successfully".to_string(),
        )
    }

    /// Finalize a run cut off by the deadline.
    ///
    /// The last recorded progress value is kept; only status, step, and
    /// error change. Artifacts are persisted from the state snapshot
    /// unless the completion stage already wrote them.
    async fn finalize_timeout(&self, task_id: &str, mut state: PipelineState) -> GenerationReport {
        let timeout_secs = self.config.pipeline_timeout.as_secs();
        warn!(timeout_secs, "Generation run hit the deadline");
        state.record_error(&format!("Pipeline timed out after {timeout_secs} seconds"));

        if state.completed_stage != Some(PipelineStage::Completion) {
            if state.generated_code.is_empty() && state.raw_response.is_none() {
                state.raw_response = Some(TIMEOUT_PLACEHOLDER.to_string());
            }
            let write_report = self
                .artifacts
                .persist(task_id, &state.generated_code, state.raw_response.as_deref())
                .await;
            state.files_written = write_report.written;
            state.fallback_used = write_report.fallback_used;
        }

        let error_text = state
            .error
            .clone()
            .unwrap_or_else(|| format!("Pipeline timed out after {timeout_secs} seconds"));
        self.progress.update_progress(
            task_id,
            ProgressUpdate::new()
                .status(TaskStatus::Timeout)
                .step("Timed out")
                .message("MCP server generation timed out")
                .error(error_text),
        );

        self.build_report(task_id, state, "MCP server generation timed out".to_string())
    }

    fn build_report(
        &self,
        task_id: &str,
        state: PipelineState,
        message: String,
    ) -> GenerationReport {
        let plan_summary = state.plan_parsed.then(|| {
            format!(
                "{} ({} tools)",
                state.plan.display_name(),
                state.plan.tool_count()
            )
        });
        let service_name = state
            .service_name
            .unwrap_or_else(|| state.plan.display_name().to_string());
        GenerationReport {
            success: true,
            task_id: task_id.to_string(),
            template_id: state.template_id,
            server_id: state.server_id,
            service_name,
            plan_summary,
            files_written: state.files_written,
            fallback_used: state.fallback_used,
            message,
            error: state.error,
        }
    }
}

/// Lock the shared state, absorbing poisoning from a panicked stage.
fn lock_state(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Derive a service name from the request text when no plan is
/// available. Takes the first few words so the name stays short.
fn derive_service_name(request: &str) -> String {
    let snippet: Vec<&str> = request.split_whitespace().take(6).collect();
    if snippet.is_empty() {
        ImplementationPlan::DEFAULT_SERVICE_NAME.to_string()
    } else {
        format!("MCP Server for {}", snippet.join(" "))
    }
}
