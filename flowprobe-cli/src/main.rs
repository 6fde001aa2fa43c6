//! flowprobe — supervise a flow-collection daemon through one test run.
//!
//! # Usage
//!
//! ```text
//! flowprobe run <role> [--program CMD] [--limit N] [--pdu N,ADDR,PORT] [--tcp FILE,ADDR,PORT]
//!               [--copy FILE:DIR] [--move FILE:DIR] [--copy-after FILE:DIR] [--move-after FILE:DIR]
//!               [--basedir DIR] [--daemon-timeout SECS] [--config FILE] [-- EXTRA...]
//! flowprobe profile <role> [--json] [--config FILE]
//! flowprobe port
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{port::PortArgs, profile::ProfileArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "flowprobe",
    version,
    about = "Run a flow-collection daemon under supervision and judge the result",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage directories, launch the daemon, feed it data, and report.
    Run(RunArgs),

    /// Print the built-in profile of a daemon role.
    Profile(ProfileArgs),

    /// Print a currently unused TCP port.
    Port(PortArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Profile(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Port(args) => args.run().map(|()| ExitCode::SUCCESS),
    }
}
