//! CLI module for the experimentation decisions service
//!
//! Provides subcommands:
//! - `serve`: HTTP API plus the data layer forwarder
//! - `decide`: resolve one test and print it as JSON

pub mod decide;
pub mod serve;

use clap::{Parser, Subcommand};

/// Experimentation decisions - cached, subscribable A/B test assignments
#[derive(Parser)]
#[command(name = "experimentation-decisions")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve,

    /// Resolve one experimentation test and print it
    Decide(decide::DecideArgs),
}
