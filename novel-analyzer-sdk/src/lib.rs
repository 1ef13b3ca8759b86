use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export async trait for convenience
pub use async_trait::async_trait;

/// Lifecycle status of an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Idle,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
}

/// Status of a single pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
}

/// One named step in the pipeline progress view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepItem {
    pub name: String,
    pub status: StepStatus,
}

/// Ordered list of pipeline steps with upsert-by-name semantics
///
/// Setting a step that already exists replaces its entry in place,
/// preserving its position; a new name is appended at the end. Steps are
/// never removed within a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepList(Vec<StepItem>);

impl StepList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Upsert a step by name
    pub fn set(&mut self, name: impl Into<String>, status: StepStatus) {
        let name = name.into();
        match self.0.iter_mut().find(|step| step.name == name) {
            Some(step) => step.status = status,
            None => self.0.push(StepItem { name, status }),
        }
    }

    /// Look up a step's status by name
    pub fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.0
            .iter()
            .find(|step| step.name == name)
            .map(|step| step.status)
    }

    pub fn items(&self) -> &[StepItem] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A character extracted from the manuscript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
}

/// A scene extracted from the manuscript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub title: String,
    pub summary: String,
}

/// The consolidated analysis report
///
/// `generated_at` is stamped when aggregation completes; `output_path` is
/// recorded after persistence and omitted from the persisted artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub characters: Vec<CharacterProfile>,
    pub scenes: Vec<SceneSummary>,
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Snapshot offered to the approver while the run is suspended
///
/// Serialized camelCase to match the UI contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub chunk_count: usize,
    pub total_characters: usize,
    pub files: Vec<String>,
}

/// Decision supplied by the approver to resume a suspended run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
}

/// View model published to observers after every stage transition
///
/// This is the sole contract visible to UI consumers: `approval` is present
/// only while the run is suspended, `error` only once the run has failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub steps: StepList,
    pub result: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSnapshot {
    /// Empty snapshot for a run that has not started any stage yet
    pub fn idle() -> Self {
        Self {
            status: RunStatus::Idle,
            steps: StepList::new(),
            result: None,
            approval: None,
            error: None,
        }
    }
}

/// Handle identifying a started run
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: Uuid,
}

impl RunHandle {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Runtime trait for driving analysis runs
///
/// This provides a unified API for any consumer (CLI, HTTP surface, TUI):
/// start a run, resume it across the approval gate, and observe progress
/// snapshots without knowledge of the engine's internal state.
#[async_trait]
pub trait AnalysisRuntime: Send + Sync {
    /// Start a new run; the returned handle keys every other operation
    async fn start_run(&self) -> RuntimeResult<RunHandle>;

    /// Supply the approval decision for a suspended run and resume it
    async fn resume_run(&self, run_id: &Uuid, response: ApprovalResponse) -> RuntimeResult<()>;

    /// Subscribe to snapshots from a run
    async fn subscribe(
        &self,
        run_id: &Uuid,
    ) -> RuntimeResult<tokio::sync::broadcast::Receiver<RunSnapshot>>;

    /// Snapshot history for a run, oldest first (optionally the last `limit`)
    async fn get_snapshots(
        &self,
        run_id: &Uuid,
        limit: Option<usize>,
    ) -> RuntimeResult<Vec<RunSnapshot>>;

    /// Current status of a run
    async fn get_status(&self, run_id: &Uuid) -> RuntimeResult<RunStatus>;
}

// ============================================================================
// Console Logging Macros
// ============================================================================
// Colored console output for human-readable run logs, used by the engine
// and the CLI binary.
// ============================================================================

/// Logs the start of a pipeline stage with a header.
///
/// # Example
/// ```
/// use novel_analyzer_sdk::log_stage_start;
/// log_stage_start!("load_files", "Reading manuscript files");
/// ```
///
/// Outputs:
/// ```text
/// ═══ STAGE load_files ═══
/// Reading manuscript files
/// ```
#[macro_export]
macro_rules! log_stage_start {
    ($stage:expr, $description:expr) => {
        println!("\x1b[1;36m═══ STAGE {} ═══\x1b[0m", $stage);
        println!("\x1b[36m{}\x1b[0m", $description);
    };
}

/// Logs the completion of a pipeline stage.
///
/// # Example
/// ```
/// use novel_analyzer_sdk::log_stage_complete;
/// log_stage_complete!("load_files");
/// ```
///
/// Outputs:
/// ```text
/// ✓ Stage load_files complete
/// ```
#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr) => {
        println!("\x1b[32m✓ Stage {} complete\x1b[0m", $stage);
    };
}

/// Logs the start of parallel execution.
///
/// # Example
/// ```
/// use novel_analyzer_sdk::log_parallel_start;
/// log_parallel_start!(3, "chunks");
/// ```
///
/// Outputs:
/// ```text
/// → Analyzing 3 chunks in parallel
/// ```
#[macro_export]
macro_rules! log_parallel_start {
    ($num_items:expr, $item_type:expr) => {
        println!(
            "\x1b[36m→ Analyzing {} {} in parallel\x1b[0m",
            $num_items, $item_type
        );
    };
}

/// Logs the completion of parallel execution.
#[macro_export]
macro_rules! log_parallel_complete {
    ($num_items:expr, $item_type:expr) => {
        println!("\x1b[32m✓ {} {} analyzed\x1b[0m", $num_items, $item_type);
    };
}

/// Logs the number of items found.
///
/// # Example
/// ```
/// use novel_analyzer_sdk::log_found;
/// log_found!(3, "text files");
/// ```
///
/// Outputs:
/// ```text
/// Found 3 text files
/// ```
#[macro_export]
macro_rules! log_found {
    ($count:expr, $item_type:expr) => {
        println!("\x1b[36mFound {} {}\x1b[0m", $count, $item_type);
    };
}

/// Logs an informational message.
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs that a file has been saved.
///
/// # Example
/// ```
/// use novel_analyzer_sdk::log_file_saved;
/// log_file_saved!("./analysis/analysis-20250101-120000.json");
/// ```
///
/// Outputs:
/// ```text
/// ✓ Saved: ./analysis/analysis-20250101-120000.json
/// ```
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        println!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}
