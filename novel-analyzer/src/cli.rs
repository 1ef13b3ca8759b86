//! CLI argument parsing for the analyzer

use clap::Parser;

/// Novel Analyzer CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "novel-analyzer",
    about = "Analyzes novel manuscripts for characters and scenes"
)]
pub struct Args {
    /// Directory containing manuscript .txt files (overrides PROJECT_TEXT_DIR)
    #[arg(short, long)]
    pub dir: Option<String>,

    /// Output directory for analysis reports (overrides ANALYSIS_OUTPUT_DIR)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Maximum characters per chunk (default: 20000)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Character overlap carried between consecutive chunks
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Model used by the extraction backend (overrides OPENAI_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Approve the analysis phase without prompting
    #[arg(short = 'y', long, action = clap::ArgAction::SetTrue)]
    pub yes: bool,
}
