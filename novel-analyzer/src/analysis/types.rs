//! Data structures for the analysis workflow

use novel_analyzer_sdk::{
    AnalysisReport, ApprovalResponse, CharacterProfile, SceneSummary, StepList,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One unit of dispatch: a bounded slice of a single manuscript file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Unique within a run: `{stem}-{order}-{uuid6}`
    pub identifier: String,
    pub source_path: PathBuf,
    /// Zero-based position within the source file
    pub order: usize,
    pub text: String,
}

impl ChunkPayload {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Characters and scenes returned by the extraction collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub characters: Vec<CharacterProfile>,
    pub scenes: Vec<SceneSummary>,
}

/// One partial result contributed by a single analyze task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub chunk_id: String,
    pub source_path: String,
    pub characters: Vec<CharacterProfile>,
    pub scenes: Vec<SceneSummary>,
}

/// Next-stage marker for the state machine
///
/// Stored alongside the parked [`AnalysisState`] while a run is suspended,
/// so resumption re-enters the stage sequence exactly where it left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    RequestApproval,
    Dispatch,
    Analyze,
    Aggregate,
    Persist,
    Done,
}

/// Full mutable run context threaded through every stage
///
/// Owned exclusively by the engine driver. During fan-out the driver is the
/// only writer: analyze tasks hand their results back and the driver appends
/// them, so the accumulator needs no locking.
#[derive(Debug, Clone, Default)]
pub struct AnalysisState {
    pub chunk_inputs: Vec<ChunkPayload>,
    pub expected_chunks: usize,
    /// Append-only; arrival order follows task completion, not source order
    pub chunk_results: Vec<ChunkAnalysis>,
    /// Absent until the approval stage resolves
    pub approval: Option<ApprovalResponse>,
    /// Absent until aggregation completes
    pub aggregated: Option<AnalysisReport>,
    /// Absent until the report is persisted
    pub output_path: Option<PathBuf>,
    pub steps: StepList,
    /// Per-file load errors, absorbed without aborting the run
    pub file_errors: Vec<String>,
    /// Isolated analyze-task failures, absorbed without aborting the run
    pub task_errors: Vec<String>,
}

impl AnalysisState {
    /// Append a partial result as a fan-out task completes
    pub fn push_result(&mut self, result: ChunkAnalysis) {
        self.chunk_results.push(result);
    }

    /// Chunks the fan-out will actually dispatch: none after a rejection
    pub fn effective_chunks(&self) -> &[ChunkPayload] {
        match self.approval {
            Some(ApprovalResponse { approved: false }) => &[],
            _ => &self.chunk_inputs,
        }
    }
}
