//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{InstallAgentCommand, OnboardCommand, ValidateConfigCommand};
use std::ffi::OsString;

/// Connects Kubernetes clusters to Azure Arc
#[derive(Debug, Parser, Clone)]
#[command(name = "arc-onboard")]
#[command(version)]
#[command(about = "Connect a Kubernetes cluster to Azure Arc", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to provisioning configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Install the Arc agents on the cluster
    InstallAgent(InstallAgentCommand),

    /// Connect the cluster and install the IoT Operations extension
    Onboard(OnboardCommand),

    /// Validate a provisioning configuration
    ValidateConfig(ValidateConfigCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
