//! Stage semantics for the analysis state machine
//!
//! The state machine is represented as data: the runtime driver loops over a
//! [`Stage`] marker, calls [`advance`] for the current stage, and publishes a
//! snapshot after every transition. Suspension is a [`StageTransition`]
//! variant, not a blocked call stack — the driver parks the state and the
//! marker, and resumption re-enters here with the approval decision injected.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use novel_analyzer_sdk::{
    log_found, log_parallel_complete, log_parallel_start, log_warning, AnalysisReport,
    ApprovalRequest, StepStatus,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::client::AnalysisClient;
use crate::analysis::types::{AnalysisState, ChunkAnalysis, ChunkPayload, Stage};
use crate::loader;
use crate::store::ResultStore;

/// Canonical step names exposed to observers
pub const STEP_LOAD_FILES: &str = "load_files";
pub const STEP_ANALYZE: &str = "analyze";
pub const STEP_AGGREGATE: &str = "aggregate";

/// Collaborators and segmentation knobs shared by every run
pub struct WorkflowContext {
    pub project_dir: PathBuf,
    pub max_chunk_chars: usize,
    pub chunk_overlap: usize,
    pub client: Arc<dyn AnalysisClient>,
    pub store: Arc<dyn ResultStore>,
}

/// Outcome of advancing one stage
pub enum StageTransition {
    /// Proceed to the given stage
    Next(Stage),
    /// Park the state and wait for an external approval decision
    Suspended(ApprovalRequest),
    /// The run is terminal
    Finished,
}

/// Execute the handler for `stage`, mutating `state`
///
/// Stage-local failures (unreadable files, individual analyze tasks) are
/// absorbed into the state; an `Err` here is fatal for the run.
pub async fn advance(
    ctx: &WorkflowContext,
    state: &mut AnalysisState,
    stage: Stage,
) -> Result<StageTransition> {
    match stage {
        Stage::Load => load(ctx, state),
        Stage::RequestApproval => Ok(request_approval(state)),
        Stage::Dispatch => Ok(dispatch(state)),
        Stage::Analyze => Ok(analyze(ctx, state).await),
        Stage::Aggregate => aggregate(ctx, state).await,
        Stage::Persist => persist(ctx, state).await,
        Stage::Done => Ok(StageTransition::Finished),
    }
}

fn load(ctx: &WorkflowContext, state: &mut AnalysisState) -> Result<StageTransition> {
    let paths = loader::read_text_files(&ctx.project_dir)?;
    log_found!(paths.len(), "text files");

    let outcome = loader::build_chunks(&paths, ctx.max_chunk_chars, ctx.chunk_overlap);
    for error in &outcome.errors {
        log_warning!("Skipping unreadable file: {}", error);
    }

    state.file_errors = outcome.errors;
    state.expected_chunks = outcome.chunks.len();
    state.chunk_inputs = outcome.chunks;
    state.steps.set(STEP_LOAD_FILES, StepStatus::Completed);
    state.steps.set(STEP_ANALYZE, StepStatus::Pending);
    // Make sure observers see an (empty) result from the first snapshot on
    if state.aggregated.is_none() {
        state.aggregated = Some(AnalysisReport::default());
    }

    Ok(StageTransition::Next(Stage::RequestApproval))
}

fn request_approval(state: &mut AnalysisState) -> StageTransition {
    // Re-entry after resume: the decision is already recorded
    if state.approval.is_some() {
        return StageTransition::Next(Stage::Dispatch);
    }
    StageTransition::Suspended(approval_request(&state.chunk_inputs))
}

fn dispatch(state: &mut AnalysisState) -> StageTransition {
    state.steps.set(STEP_ANALYZE, StepStatus::Running);

    if state.effective_chunks().is_empty() {
        return StageTransition::Next(Stage::Aggregate);
    }
    StageTransition::Next(Stage::Analyze)
}

async fn analyze(ctx: &WorkflowContext, state: &mut AnalysisState) -> StageTransition {
    let chunks = state.effective_chunks().to_vec();
    log_parallel_start!(chunks.len(), "chunks");

    let mut tasks = FuturesUnordered::new();
    for chunk in chunks {
        let client = ctx.client.clone();
        tasks.push(async move {
            let extraction = client.analyze_chunk(&chunk.text).await;
            (chunk, extraction)
        });
    }

    // Collect in completion order; one task's failure never blocks siblings
    let mut completed = 0usize;
    while let Some((chunk, extraction)) = tasks.next().await {
        match extraction {
            Ok(extraction) => {
                completed += 1;
                state.push_result(ChunkAnalysis {
                    chunk_id: chunk.identifier,
                    source_path: chunk.source_path.display().to_string(),
                    characters: extraction.characters,
                    scenes: extraction.scenes,
                });
            }
            Err(e) => {
                log_warning!("Analysis of chunk {} failed: {:#}", chunk.identifier, e);
                state.task_errors.push(format!("{}: {:#}", chunk.identifier, e));
            }
        }
    }
    log_parallel_complete!(completed, "chunks");

    StageTransition::Next(Stage::Aggregate)
}

async fn aggregate(ctx: &WorkflowContext, state: &mut AnalysisState) -> Result<StageTransition> {
    state.steps.set(STEP_ANALYZE, StepStatus::Completed);
    state.steps.set(STEP_AGGREGATE, StepStatus::Running);

    let extraction = if state.chunk_results.is_empty() {
        Default::default()
    } else {
        ctx.client
            .aggregate(&state.chunk_results)
            .await
            .context("Aggregation failed")?
    };

    state.aggregated = Some(AnalysisReport {
        characters: extraction.characters,
        scenes: extraction.scenes,
        generated_at: Some(Utc::now()),
        output_path: None,
    });

    Ok(StageTransition::Next(Stage::Persist))
}

async fn persist(ctx: &WorkflowContext, state: &mut AnalysisState) -> Result<StageTransition> {
    state.steps.set(STEP_AGGREGATE, StepStatus::Completed);

    let report = state
        .aggregated
        .clone()
        .ok_or_else(|| anyhow!("No aggregated report to persist"))?;
    let path = ctx
        .store
        .write(&report)
        .await
        .context("Failed to persist analysis report")?;

    if let Some(report) = state.aggregated.as_mut() {
        report.output_path = Some(path.display().to_string());
    }
    state.output_path = Some(path);

    Ok(StageTransition::Next(Stage::Done))
}

/// Snapshot offered to the approver before the expensive analysis phase
fn approval_request(chunks: &[ChunkPayload]) -> ApprovalRequest {
    let files: BTreeSet<String> = chunks
        .iter()
        .filter_map(|chunk| {
            chunk
                .source_path
                .file_name()
                .and_then(|name| name.to_str())
                .map(String::from)
        })
        .collect();

    ApprovalRequest {
        chunk_count: chunks.len(),
        total_characters: chunks.iter().map(ChunkPayload::char_len).sum(),
        files: files.into_iter().collect(),
    }
}
