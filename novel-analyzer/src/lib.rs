// Analysis workflow module
pub mod analysis;

// CLI argument parsing
pub mod cli;

// Configuration module
pub mod config;

// Text loading and segmentation module
pub mod loader;

// Run runtime module
pub mod runtime;

// Result persistence module
pub mod store;
