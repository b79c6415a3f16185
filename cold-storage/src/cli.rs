use clap::{Args, Parser, Subcommand};
use config::Configuration;
use log::info;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

#[derive(Debug, Parser, Clone)]
#[command(author, about, version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to the configuration file in YAML format.
    ///
    /// Built-in defaults apply when the file is left out.
    #[arg(long, env = "CS_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the log4rs configuration file in YAML format.
    ///
    /// Logs go to the console, filtered by `RUST_LOG`, when left out.
    #[arg(long, env = "CS_LOG_CONFIG")]
    log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// File holding one event body per line.
    #[arg(long)]
    pub input: PathBuf,

    /// Partition the events are attributed to.
    #[arg(long, default_value = "0")]
    pub partition: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, then print the effective values.
    Validate(CommonArgs),

    /// Write the events of a file through one partition processor into an in-memory container.
    Replay(ReplayArgs),
}

impl CommonArgs {
    pub fn init_log(&self) -> anyhow::Result<()> {
        let Some(config_path) = self.log.as_deref() else {
            ulog::init_console_log("info")?;
            return Ok(());
        };

        if !config_path.is_file() {
            anyhow::bail!("{} is not a file", config_path.display());
        }

        log4rs::init_file(config_path, Default::default())?;
        info!("Log initialized");
        Ok(())
    }

    pub fn create_config(&self) -> anyhow::Result<Configuration> {
        let mut configuration = match self.config.as_deref() {
            Some(path) => Configuration::from_file(path)?,
            None => Configuration::default(),
        };
        configuration.check_and_apply()?;
        Ok(configuration)
    }
}

impl ReplayArgs {
    pub fn read_bodies(&self) -> anyhow::Result<Vec<String>> {
        read_bodies(&self.input)
    }
}

/// Non-blank lines of `path`, in order.
fn read_bodies(path: &Path) -> anyhow::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut bodies = vec![];
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            bodies.push(line);
        }
    }
    Ok(bodies)
}
