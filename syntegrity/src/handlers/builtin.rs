//! Built-in steps for Go projects.

use super::{CommandLine, CommandRunner, CommandStepHandler, StepDefinition};
use crate::config::AppConfig;
use crate::core::StepConfig;
use crate::errors::EngineResult;
use crate::pipeline::RunOptions;
use crate::steps::{StepHandler, StepRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const MINUTE: Duration = Duration::from_secs(60);

/// Returns the definitions of the standard Go steps for `config`.
///
/// Optional steps disabled in the config are left out, and dependencies on
/// steps that were left out are dropped.
#[must_use]
pub fn go_steps(config: &AppConfig, options: &RunOptions) -> Vec<StepDefinition> {
    let binary = binary_name(config);
    let tag = image_tag(config);
    let image = config.registry.image_ref(&tag);

    let mut steps = vec![
        StepDefinition::new(
            go_config(config, "setup", "Download and verify module dependencies", &[])
                .required()
                .with_retries(2)
                .with_timeout(10 * MINUTE),
        )
        .command(go(["mod", "download"]))
        .command(go(["mod", "verify"])),
        StepDefinition::new(
            go_config(config, "build", "Compile every package", &["setup"])
                .required()
                .with_timeout(15 * MINUTE),
        )
        .command(go(["build", "./..."])),
        StepDefinition::new(
            go_config(config, "test", "Run tests with coverage", &["build"])
                .required()
                .with_timeout(20 * MINUTE)
                .with_condition("coverage", config.pipeline.coverage.to_string()),
        )
        .command(go(["test", "-coverprofile=coverage.out", "./..."]))
        .command(go(["tool", "cover", "-func=coverage.out"]))
        .with_coverage_gate(config.pipeline.coverage),
    ];

    if config.security.enable_linting {
        steps.push(
            StepDefinition::new(
                go_config(config, "lint", "Run golangci-lint", &["setup"])
                    .parallel()
                    .with_timeout(10 * MINUTE),
            )
            .command(CommandLine::new("golangci-lint", ["run", "./..."])),
        );
    }
    if config.security.enable_vuln_check {
        steps.push(
            StepDefinition::new(
                go_config(config, "security", "Scan for known vulnerabilities", &["setup"])
                    .parallel()
                    .with_timeout(10 * MINUTE),
            )
            .command(CommandLine::new("govulncheck", ["./..."])),
        );
    }

    steps.push(
        StepDefinition::new(
            go_config(config, "tag", "Resolve the revision being shipped", &["test", "lint"])
                .required()
                .with_metadata("tag", serde_json::json!(tag)),
        )
        .command(CommandLine::new("git", ["rev-parse", "--short", "HEAD"]))
        .host_only(),
    );
    steps.push(
        StepDefinition::new(
            go_config(config, "package", "Build the release binary", &["build", "tag"])
                .required()
                .with_timeout(15 * MINUTE),
        )
        .command(
            go(["build", "-trimpath", "-ldflags=-s -w", "-o"])
                .arg(format!("dist/{binary}"))
                .arg(".")
                .with_env("CGO_ENABLED", "0"),
        )
        .with_artifact(binary.clone(), format!("dist/{binary}"), "binary"),
    );

    if !options.skip_push {
        steps.push(
            StepDefinition::new(
                go_config(config, "push", "Build and push the container image", &["package"])
                    .with_retries(2)
                    .with_timeout(10 * MINUTE)
                    .with_metadata("image", serde_json::json!(image)),
            )
            .command(CommandLine::new("docker", ["build", "-t", image.as_str(), "."]))
            .command(CommandLine::new("docker", ["push", image.as_str()]))
            .host_only(),
        );
        if config.release.enabled {
            steps.push(release_step(config, &binary, &tag));
        }
    }

    prune_dependencies(steps)
}

/// Registers the standard Go steps on `registry` behind one shared handler.
///
/// Returns the registered step names.
pub fn register_go_steps(
    registry: &StepRegistry,
    runner: CommandRunner,
    config: &AppConfig,
    options: &RunOptions,
) -> EngineResult<Vec<String>> {
    let handler = Arc::new(CommandStepHandler::new(runner, go_steps(config, options)));
    let names = handler.step_names();
    for name in &names {
        registry.register_step(name, handler.clone() as Arc<dyn StepHandler>)?;
    }
    info!(steps = names.len(), "Registered built-in Go steps");
    Ok(names)
}

fn release_step(config: &AppConfig, binary: &str, tag: &str) -> StepDefinition {
    let mut step = StepDefinition::new(
        go_config(config, "release", "Publish release binaries", &["push"])
            .with_timeout(20 * MINUTE)
            .with_metadata("platforms", serde_json::json!(config.release.platforms)),
    );

    if config.release.use_goreleaser {
        step = step.command(CommandLine::new("goreleaser", ["release", "--clean"]));
    } else {
        for platform in &config.release.platforms {
            let (os, arch) = platform.split_once('/').unwrap_or((platform.as_str(), "amd64"));
            step = step.command(
                go(["build", "-trimpath", "-o"])
                    .arg(format!("dist/{binary}-{os}-{arch}"))
                    .arg(".")
                    .with_env("GOOS", os)
                    .with_env("GOARCH", arch)
                    .with_env("CGO_ENABLED", "0"),
            );
        }
    }

    if config.release.create_github_release && !config.release.use_goreleaser {
        step = step
            .command(CommandLine::new("gh", ["release", "create", tag, "--generate-notes"]))
            .host_only();
    }
    step
}

fn go_config(config: &AppConfig, name: &str, description: &str, deps: &[&str]) -> StepConfig {
    StepConfig::new(name)
        .with_description(description)
        .depends_on(deps.iter().copied())
        .with_condition("environment", config.pipeline.environment.clone())
        .with_metadata("lang", serde_json::json!("go"))
        .with_metadata("goVersion", serde_json::json!(config.pipeline.go_version))
}

fn go<const N: usize>(args: [&str; N]) -> CommandLine {
    CommandLine::new("go", args)
}

fn prune_dependencies(mut steps: Vec<StepDefinition>) -> Vec<StepDefinition> {
    let present: HashSet<String> = steps.iter().map(|s| s.config.name.clone()).collect();
    for step in &mut steps {
        step.config.depends_on.retain(|dep| present.contains(dep));
    }
    steps
}

fn binary_name(config: &AppConfig) -> String {
    if config.registry.image.is_empty() {
        "app".to_string()
    } else {
        config.registry.image.clone()
    }
}

fn image_tag(config: &AppConfig) -> String {
    if config.git.git_ref.is_empty() {
        format!("{}-latest", config.pipeline.environment)
    } else {
        config.git.git_ref.replace('/', "-")
    }
}
