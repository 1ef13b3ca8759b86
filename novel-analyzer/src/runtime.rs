//! Run runtime: registry, driver tasks, and the suspend/resume boundary
//!
//! Each run lives in an in-memory registry keyed by run id. A spawned driver
//! task takes the run's state out of its entry, advances the stage machine,
//! and parks the state back when the run suspends at the approval gate or
//! reaches a terminal status. `resume` injects the approval decision and
//! re-spawns the driver at the recorded stage marker. Suspended state does
//! not survive a process restart.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use novel_analyzer_sdk::{
    async_trait, AnalysisRuntime, ApprovalRequest, ApprovalResponse, RunHandle, RunSnapshot,
    RunStatus, RuntimeResult,
};

use crate::analysis::client::OpenAiAnalysisClient;
use crate::analysis::types::{AnalysisState, Stage};
use crate::analysis::workflow::{self, StageTransition, WorkflowContext};
use crate::config::Settings;
use crate::store::FsResultStore;

/// Internal state for one run
struct RunEntry {
    status: RunStatus,
    /// Next-stage marker; resumption re-enters the sequence here
    stage: Stage,
    /// Parked while suspended or terminal; taken by the driver while advancing
    state: Option<AnalysisState>,
    snapshots_tx: broadcast::Sender<RunSnapshot>,
    /// Persistent buffer of all snapshots for historical retrieval
    history: Arc<Mutex<Vec<RunSnapshot>>>,
}

type RunMap = Arc<Mutex<HashMap<Uuid, RunEntry>>>;

/// Workflow engine and run registry
pub struct AnalysisEngine {
    ctx: Arc<WorkflowContext>,
    runs: RunMap,
}

impl AnalysisEngine {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build an engine wired to the OpenAI-backed client and the filesystem
    /// store described by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let project_dir = settings.resolved_project_dir()?;
        let output_dir = settings.resolved_output_dir()?;

        Ok(Self::new(WorkflowContext {
            project_dir,
            max_chunk_chars: settings.max_chunk_chars,
            chunk_overlap: settings.chunk_overlap,
            client: Arc::new(OpenAiAnalysisClient::new(settings)),
            store: Arc::new(FsResultStore::new(output_dir)),
        }))
    }

    /// Start a new run and spawn its driver task
    pub async fn start(&self) -> Result<RunHandle> {
        let (handle, _rx) = self.start_with_subscription().await?;
        Ok(handle)
    }

    /// Start a new run, subscribing before the driver is spawned so the
    /// caller cannot miss the first snapshot
    pub async fn start_with_subscription(
        &self,
    ) -> Result<(RunHandle, broadcast::Receiver<RunSnapshot>)> {
        let run_id = Uuid::new_v4();
        // Capacity covers every stage transition of a run with room to spare
        let (snapshots_tx, rx) = broadcast::channel(256);

        let entry = RunEntry {
            status: RunStatus::Running,
            stage: Stage::Load,
            state: Some(AnalysisState::default()),
            snapshots_tx,
            history: Arc::new(Mutex::new(Vec::new())),
        };
        self.runs.lock().unwrap().insert(run_id, entry);

        let runs = self.runs.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            drive_run(run_id, runs, ctx).await;
        });

        Ok((RunHandle::new(run_id), rx))
    }

    /// Supply the approval decision for a suspended run and resume it
    pub async fn resume(&self, run_id: &Uuid, response: ApprovalResponse) -> Result<()> {
        {
            let mut runs = self.runs.lock().unwrap();
            let entry = runs
                .get_mut(run_id)
                .ok_or_else(|| anyhow!("Run not found: {}", run_id))?;
            if entry.status != RunStatus::AwaitingApproval {
                anyhow::bail!("Run {} is not awaiting approval", run_id);
            }
            let state = entry
                .state
                .as_mut()
                .ok_or_else(|| anyhow!("Run state unavailable: {}", run_id))?;
            state.approval = Some(response);
            entry.status = RunStatus::Running;
        }

        let runs = self.runs.clone();
        let ctx = self.ctx.clone();
        let run_id = *run_id;
        tokio::spawn(async move {
            drive_run(run_id, runs, ctx).await;
        });

        Ok(())
    }

    /// Subscribe to snapshots from a run
    pub fn watch(&self, run_id: &Uuid) -> Result<broadcast::Receiver<RunSnapshot>> {
        let runs = self.runs.lock().unwrap();
        let entry = runs
            .get(run_id)
            .ok_or_else(|| anyhow!("Run not found: {}", run_id))?;
        Ok(entry.snapshots_tx.subscribe())
    }

    /// Snapshot history for a run, oldest first
    pub fn history(&self, run_id: &Uuid, limit: Option<usize>) -> Result<Vec<RunSnapshot>> {
        let runs = self.runs.lock().unwrap();
        let entry = runs
            .get(run_id)
            .ok_or_else(|| anyhow!("Run not found: {}", run_id))?;

        let buffer = entry.history.lock().unwrap();
        let snapshots = if let Some(limit) = limit {
            buffer.iter().rev().take(limit).rev().cloned().collect()
        } else {
            buffer.clone()
        };
        Ok(snapshots)
    }

    /// Current status of a run
    pub fn status(&self, run_id: &Uuid) -> Result<RunStatus> {
        let runs = self.runs.lock().unwrap();
        let entry = runs
            .get(run_id)
            .ok_or_else(|| anyhow!("Run not found: {}", run_id))?;
        Ok(entry.status.clone())
    }

    /// Drop terminal runs, freeing their retained state
    pub fn cleanup_finished_runs(&self) {
        let mut runs = self.runs.lock().unwrap();
        runs.retain(|_, entry| {
            matches!(
                entry.status,
                RunStatus::Running | RunStatus::AwaitingApproval
            )
        });
    }
}

#[async_trait]
impl AnalysisRuntime for AnalysisEngine {
    async fn start_run(&self) -> RuntimeResult<RunHandle> {
        Ok(self.start().await?)
    }

    async fn resume_run(&self, run_id: &Uuid, response: ApprovalResponse) -> RuntimeResult<()> {
        Ok(self.resume(run_id, response).await?)
    }

    async fn subscribe(
        &self,
        run_id: &Uuid,
    ) -> RuntimeResult<broadcast::Receiver<RunSnapshot>> {
        Ok(self.watch(run_id)?)
    }

    async fn get_snapshots(
        &self,
        run_id: &Uuid,
        limit: Option<usize>,
    ) -> RuntimeResult<Vec<RunSnapshot>> {
        Ok(self.history(run_id, limit)?)
    }

    async fn get_status(&self, run_id: &Uuid) -> RuntimeResult<RunStatus> {
        Ok(self.status(run_id)?)
    }
}

/// Advance a run from its current stage marker until it suspends, finishes,
/// or fails
async fn drive_run(run_id: Uuid, runs: RunMap, ctx: Arc<WorkflowContext>) {
    // Take the parked state and marker; never hold the lock across an await
    let (mut state, mut stage) = {
        let mut runs = runs.lock().unwrap();
        let Some(entry) = runs.get_mut(&run_id) else {
            return;
        };
        let Some(state) = entry.state.take() else {
            return;
        };
        (state, entry.stage)
    };

    loop {
        match workflow::advance(&ctx, &mut state, stage).await {
            Ok(StageTransition::Next(next)) => {
                stage = next;
                // Stage::Done is immediately terminal; skip the interim view
                if next != Stage::Done {
                    let snapshot = build_snapshot(RunStatus::Running, &state, None, None);
                    park_and_publish(&runs, &run_id, None, stage, RunStatus::Running, snapshot);
                }
            }
            Ok(StageTransition::Suspended(request)) => {
                let snapshot = build_snapshot(
                    RunStatus::AwaitingApproval,
                    &state,
                    Some(request),
                    None,
                );
                park_and_publish(
                    &runs,
                    &run_id,
                    Some(state),
                    Stage::RequestApproval,
                    RunStatus::AwaitingApproval,
                    snapshot,
                );
                return;
            }
            Ok(StageTransition::Finished) => {
                let snapshot = build_snapshot(RunStatus::Completed, &state, None, None);
                park_and_publish(
                    &runs,
                    &run_id,
                    Some(state),
                    Stage::Done,
                    RunStatus::Completed,
                    snapshot,
                );
                return;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let snapshot =
                    build_snapshot(RunStatus::Failed, &state, None, Some(message));
                park_and_publish(
                    &runs,
                    &run_id,
                    Some(state),
                    stage,
                    RunStatus::Failed,
                    snapshot,
                );
                return;
            }
        }
    }
}

/// View model exposed to observers; internal state fields never leak
fn build_snapshot(
    status: RunStatus,
    state: &AnalysisState,
    approval: Option<ApprovalRequest>,
    error: Option<String>,
) -> RunSnapshot {
    RunSnapshot {
        status,
        steps: state.steps.clone(),
        result: state.aggregated.clone(),
        approval,
        error,
    }
}

/// Update the run entry (optionally parking the state), then broadcast the
/// snapshot and append it to the history buffer
fn park_and_publish(
    runs: &RunMap,
    run_id: &Uuid,
    state: Option<AnalysisState>,
    stage: Stage,
    status: RunStatus,
    snapshot: RunSnapshot,
) {
    let history = {
        let mut runs = runs.lock().unwrap();
        let Some(entry) = runs.get_mut(run_id) else {
            return;
        };
        entry.stage = stage;
        entry.status = status;
        if state.is_some() {
            entry.state = state;
        }
        let _ = entry.snapshots_tx.send(snapshot.clone());
        entry.history.clone()
    };
    history.lock().unwrap().push(snapshot);
}
