use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use novel_analyzer::cli::Args;
use novel_analyzer::config::Settings;
use novel_analyzer::runtime::AnalysisEngine;
use novel_analyzer_sdk::{
    log_info, log_warning, ApprovalRequest, ApprovalResponse, RunSnapshot, RunStatus, StepItem,
    StepStatus,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut settings = Settings::from_env()?;
    if let Some(dir) = &args.dir {
        settings.project_text_dir = PathBuf::from(dir);
    }
    if let Some(output) = &args.output {
        settings.analysis_output_dir = PathBuf::from(output);
    }
    if let Some(max_chars) = args.max_chars {
        settings.max_chunk_chars = max_chars;
    }
    if let Some(overlap) = args.overlap {
        settings.chunk_overlap = overlap;
    }
    if let Some(model) = &args.model {
        settings.openai_model = model.clone();
    }

    let engine = AnalysisEngine::from_settings(&settings)?;
    let (handle, mut snapshots) = engine.start_with_subscription().await?;
    log_info!("Run started: {}", handle.id());

    let mut rendered_steps: Vec<StepItem> = Vec::new();
    loop {
        match snapshots.recv().await {
            Ok(snapshot) => {
                render_steps(&snapshot, &mut rendered_steps);

                match snapshot.status {
                    RunStatus::AwaitingApproval => {
                        let request = snapshot
                            .approval
                            .as_ref()
                            .context("Suspended run published no approval request")?;
                        let approved = args.yes || prompt_for_approval(request)?;
                        if !approved {
                            log_warning!("Analysis rejected; an empty report will be written");
                        }
                        engine.resume(handle.id(), ApprovalResponse { approved }).await?;
                    }
                    RunStatus::Completed => {
                        let output_path = snapshot
                            .result
                            .as_ref()
                            .and_then(|report| report.output_path.clone())
                            .context("Completed run published no output path")?;
                        println!("Analysis complete: {}", output_path);
                        return Ok(());
                    }
                    RunStatus::Failed => {
                        let error = snapshot
                            .error
                            .unwrap_or_else(|| "unknown error".to_string());
                        anyhow::bail!("Analysis run failed: {}", error);
                    }
                    _ => {}
                }
            }
            // Snapshots are small; a lagged receiver just catches up
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => {
                anyhow::bail!("Run ended without a terminal snapshot");
            }
        }
    }
}

/// Print step transitions as they change
fn render_steps(snapshot: &RunSnapshot, rendered: &mut Vec<StepItem>) {
    for step in snapshot.steps.items() {
        if rendered.iter().any(|seen| seen == step) {
            continue;
        }
        let marker = match step.status {
            StepStatus::Pending => "·",
            StepStatus::Running => "→",
            StepStatus::Completed => "✓",
        };
        println!("{} {}", marker, step.name);
        rendered.retain(|seen| seen.name != step.name);
        rendered.push(step.clone());
    }
}

/// Show the approval request and read a y/n decision from stdin
fn prompt_for_approval(request: &ApprovalRequest) -> Result<bool> {
    println!();
    println!(
        "About to analyze {} chunks ({} characters) from {} file(s):",
        request.chunk_count,
        request.total_characters,
        request.files.len()
    );
    for file in &request.files {
        println!("  - {}", file);
    }
    print!("Proceed with analysis? [y/N] ");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read approval decision")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
