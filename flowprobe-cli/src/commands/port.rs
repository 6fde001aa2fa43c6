//! `flowprobe port` — pick a port for a daemon to listen on.

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct PortArgs {}

impl PortArgs {
    pub fn run(self) -> Result<()> {
        let port = flowprobe_harness::ephemeral_port().context("could not bind an ephemeral port")?;
        println!("{port}");
        Ok(())
    }
}
