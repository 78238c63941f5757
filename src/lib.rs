pub mod args;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod notify;
pub mod records;
pub mod remove;
pub mod report;
pub mod rest;
pub mod scan;
pub mod server;
pub mod sweep;
pub mod utils;

#[cfg(test)]
mod testing;

pub use args::Args;
pub use cleanup::{execute, print_summary, RunOptions};
pub use config::Config;
pub use error::CleanupError;
pub use records::RunSummary;
