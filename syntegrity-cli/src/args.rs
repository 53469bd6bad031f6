use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use syntegrity::config::AppConfig;
use syntegrity::pipeline::RunOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GitAuth {
    Ssh,
    Https,
}

impl GitAuth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Https => "https",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "syntegrity-dagger",
    about = "Run CI/CD pipelines for Go projects",
    disable_version_flag = true
)]
pub struct Cli {
    /// Pipeline to run.
    #[arg(long)]
    pub pipeline: Option<String>,
    /// Target environment.
    #[arg(long = "env", value_name = "ENV")]
    pub environment: Option<String>,
    /// Minimum statement coverage, in percent.
    #[arg(long)]
    pub coverage: Option<f64>,
    /// Skip the push and release steps.
    #[arg(long)]
    pub skip_push: bool,
    /// Run only setup and build.
    #[arg(long)]
    pub only_build: bool,
    /// Run only setup, build and test.
    #[arg(long)]
    pub only_test: bool,
    /// Enable debug logging.
    #[arg(long, short)]
    pub verbose: bool,
    /// Git ref to build and tag.
    #[arg(long)]
    pub git_ref: Option<String>,
    /// Git transport used to fetch private modules.
    #[arg(long, value_enum)]
    pub git_auth: Option<GitAuth>,
    /// Run a single step instead of the whole pipeline.
    #[arg(long)]
    pub step: Option<String>,
    /// List available pipelines and exit.
    #[arg(long)]
    pub list_pipelines: bool,
    /// List the steps that would be registered and exit.
    #[arg(long)]
    pub list_steps: bool,
    /// Path to a YAML config file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    /// Print version information and exit.
    #[arg(long)]
    pub version: bool,
    /// Run toolchains on the host instead of in containers.
    #[arg(long)]
    pub local: bool,
    /// Project directory.
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,
}

impl Cli {
    /// Applies flags over the file and environment layers.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(pipeline) = &self.pipeline {
            config.pipeline.name.clone_from(pipeline);
        }
        if let Some(environment) = &self.environment {
            config.pipeline.environment.clone_from(environment);
        }
        if let Some(coverage) = self.coverage {
            config.pipeline.coverage = coverage;
        }
        if let Some(git_ref) = &self.git_ref {
            config.git.git_ref.clone_from(git_ref);
        }
        if let Some(auth) = self.git_auth {
            config.git.protocol = auth.as_str().to_string();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            skip_push: self.skip_push,
            only_build: self.only_build,
            only_test: self.only_test,
            step: self.step.clone(),
        }
    }
}
