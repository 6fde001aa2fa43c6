//! `flowprobe profile` — show what the harness knows about a role.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flowprobe_core::{DaemonRole, HarnessConfig};

/// Arguments for `flowprobe profile`.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Daemon role: flowpack, flowappend, or flowcap.
    pub role: DaemonRole,

    /// Emit JSON instead of YAML.
    #[arg(long)]
    pub json: bool,

    /// Apply pattern overrides from a harness config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ProfileArgs {
    pub fn run(self) -> Result<()> {
        let mut profile = self.role.profile();
        if let Some(path) = &self.config {
            let config = HarnessConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            profile.patterns.apply(&config.patterns);
        }

        if self.json {
            let json =
                serde_json::to_string_pretty(&profile).context("failed to serialize profile")?;
            println!("{json}");
        } else {
            let yaml = serde_yaml::to_string(&profile).context("failed to serialize profile")?;
            print!("{yaml}");
        }
        Ok(())
    }
}
