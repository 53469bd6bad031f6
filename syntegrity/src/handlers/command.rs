//! Step handlers that run external commands on the host or in a container.

use crate::cancellation::StepContext;
use crate::core::{Artifact, StepConfig};
use crate::steps::StepHandler;
use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program to run.
    pub program: String,
    /// Arguments, passed without a shell.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    /// Creates a command line.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Splits a whitespace-separated command line.
    ///
    /// Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRunner {
    /// Spawn programs directly in `dir`.
    Host {
        /// Working directory.
        dir: PathBuf,
    },
    /// Run programs in a throwaway container with `source` mounted.
    Container {
        /// Container image.
        image: String,
        /// Host directory mounted into the container.
        source: PathBuf,
        /// Mount point and working directory inside the container.
        workdir: String,
    },
}

impl CommandRunner {
    /// Creates a host runner.
    pub fn host(dir: impl Into<PathBuf>) -> Self {
        Self::Host { dir: dir.into() }
    }

    /// Creates a container runner mounting `source` at `/src`.
    pub fn container(image: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self::Container {
            image: image.into(),
            source: source.into(),
            workdir: "/src".to_string(),
        }
    }

    /// Returns the host directory commands operate on.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        match self {
            Self::Host { dir } => dir,
            Self::Container { source, .. } => source,
        }
    }

    /// Returns a host runner over the same directory.
    #[must_use]
    pub fn on_host(&self) -> Self {
        Self::host(self.source_dir())
    }

    /// Builds the process for `line`.
    #[must_use]
    pub fn command(&self, line: &CommandLine) -> tokio::process::Command {
        match self {
            Self::Host { dir } => {
                let mut cmd = tokio::process::Command::new(&line.program);
                cmd.args(&line.args).current_dir(dir);
                cmd.envs(line.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                cmd
            }
            Self::Container {
                image,
                source,
                workdir,
            } => {
                let mut cmd = tokio::process::Command::new("docker");
                cmd.args(["run", "--rm", "-v"])
                    .arg(format!("{}:{workdir}", source.display()))
                    .args(["-w", workdir.as_str()]);
                for (key, value) in &line.env {
                    cmd.arg("-e").arg(format!("{key}={value}"));
                }
                cmd.arg(image).arg(&line.program).args(&line.args);
                cmd
            }
        }
    }

    /// Runs `line` to completion and returns its combined output.
    ///
    /// The process is killed if the context finishes first.
    pub async fn run(&self, ctx: &StepContext, line: &CommandLine) -> anyhow::Result<String> {
        let mut cmd = self.command(line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %line, runner = self.kind(), "Running command");
        let output = ctx
            .run(cmd.output())
            .await?
            .with_context(|| format!("failed to start `{line}`"))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(command = %line, output = %text.trim_end(), "Command finished");

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            anyhow::bail!("`{line}` exited with status {code}: {}", last_lines(&text, 5));
        }
        Ok(text)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Host { .. } => "host",
            Self::Container { .. } => "container",
        }
    }
}

/// An artifact a step leaves in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Artifact name.
    pub name: String,
    /// Path relative to the source directory.
    pub path: PathBuf,
    /// Artifact type, e.g. `binary`.
    pub artifact_type: String,
}

/// A step served by [`CommandStepHandler`].
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Declared config.
    pub config: StepConfig,
    /// Commands run in order.
    pub commands: Vec<CommandLine>,
    /// Minimum statement coverage parsed from the final command's output.
    pub coverage_gate: Option<f64>,
    /// Artifact recorded after the commands succeed.
    pub artifact: Option<ArtifactSpec>,
    /// Run on the host even with a container runner.
    pub host_only: bool,
}

impl StepDefinition {
    /// Creates a definition with no commands.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            commands: Vec::new(),
            coverage_gate: None,
            artifact: None,
            host_only: false,
        }
    }

    /// Appends a command.
    #[must_use]
    pub fn command(mut self, line: CommandLine) -> Self {
        self.commands.push(line);
        self
    }

    /// Sets a coverage gate.
    #[must_use]
    pub fn with_coverage_gate(mut self, threshold: f64) -> Self {
        self.coverage_gate = Some(threshold);
        self
    }

    /// Records an artifact on success.
    #[must_use]
    pub fn with_artifact(
        mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        artifact_type: impl Into<String>,
    ) -> Self {
        self.artifact = Some(ArtifactSpec {
            name: name.into(),
            path: path.into(),
            artifact_type: artifact_type.into(),
        });
        self
    }

    /// Forces host execution.
    #[must_use]
    pub fn host_only(mut self) -> Self {
        self.host_only = true;
        self
    }
}

/// Runs the commands of a set of step definitions.
#[derive(Debug)]
pub struct CommandStepHandler {
    runner: CommandRunner,
    steps: HashMap<String, StepDefinition>,
}

impl CommandStepHandler {
    /// Creates a handler serving `definitions`.
    pub fn new(
        runner: CommandRunner,
        definitions: impl IntoIterator<Item = StepDefinition>,
    ) -> Self {
        Self {
            runner,
            steps: definitions
                .into_iter()
                .map(|def| (def.config.name.clone(), def))
                .collect(),
        }
    }

    /// Returns the names of the served steps, sorted.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.steps.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the runner.
    #[must_use]
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn definition(&self, step_name: &str) -> anyhow::Result<&StepDefinition> {
        self.steps
            .get(step_name)
            .with_context(|| format!("no commands defined for step '{step_name}'"))
    }
}

#[async_trait]
impl StepHandler for CommandStepHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.steps.contains_key(step_name)
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        let definition = self.definition(step_name)?;
        let runner = if definition.host_only {
            self.runner.on_host()
        } else {
            self.runner.clone()
        };

        let mut last_output = String::new();
        for line in &definition.commands {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            last_output = runner.run(ctx, line).await?;
            ctx.write_output(&format!("$ {line}"));
            if !last_output.is_empty() {
                ctx.write_output(&last_output);
            }
        }

        if let Some(threshold) = definition.coverage_gate {
            let coverage = parse_coverage(&last_output)?
                .context("coverage summary not found in test output")?;
            if coverage < threshold {
                anyhow::bail!("coverage {coverage:.1}% below threshold {threshold}%");
            }
            ctx.write_output(&format!("coverage {coverage:.1}% meets threshold {threshold}%"));
        }

        if let Some(spec) = &definition.artifact {
            let path = runner.source_dir().join(&spec.path);
            let artifact = Artifact::from_file(&spec.name, &path, &spec.artifact_type)
                .with_context(|| format!("artifact {} not produced", path.display()))?;
            ctx.add_artifact(artifact);
        }
        Ok(())
    }

    fn step_info(&self, step_name: &str) -> StepConfig {
        self.steps
            .get(step_name)
            .map_or_else(|| StepConfig::new(step_name), |def| def.config.clone())
    }

    fn validate(&self, step_name: &str, config: &StepConfig) -> anyhow::Result<()> {
        let definition = self.definition(step_name)?;
        if config.name != step_name {
            anyhow::bail!("config name '{}' does not match step '{step_name}'", config.name);
        }
        if definition.commands.is_empty() {
            anyhow::bail!("step '{step_name}' has no commands");
        }
        if config.depends_on.iter().any(|dep| dep == step_name) {
            anyhow::bail!("step '{step_name}' cannot depend on itself");
        }
        if let Some(threshold) = definition.coverage_gate {
            if !(0.0..=100.0).contains(&threshold) {
                anyhow::bail!("coverage threshold {threshold} is outside 0..=100");
            }
        }
        Ok(())
    }
}

/// Extracts total statement coverage from `go tool cover -func` output.
pub fn parse_coverage(output: &str) -> anyhow::Result<Option<f64>> {
    let pattern = Regex::new(r"total:\s+\(statements\)\s+([0-9]+(?:\.[0-9]+)?)%")?;
    pattern
        .captures(output)
        .map(|caps| caps[1].parse::<f64>().map_err(anyhow::Error::from))
        .transpose()
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(count)..].join(" | ")
}
