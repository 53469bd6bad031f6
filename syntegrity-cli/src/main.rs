use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use syntegrity::cancellation::{CancellationToken, ShutdownRegistry, StepContext};
use syntegrity::config::AppConfig;
use syntegrity::handlers::{register_go_steps, CommandRunner};
use syntegrity::hooks::HookManager;
use syntegrity::observability;
use syntegrity::pipeline::{PipelineCatalog, PipelineExecutor};
use syntegrity::steps::StepRegistry;
use tracing::{info, warn};

mod args;
mod exit_codes;

use args::Cli;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("syntegrity-dagger {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(exit_codes::SUCCESS);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::FAILURE);
        }
    };

    let exit_code = match rt.block_on(run(cli)) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::FAILURE
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    observability::init_tracing(&config.logging.level, config.logging.json);

    let catalog = PipelineCatalog::builtin();
    if cli.list_pipelines {
        for pipeline in catalog.list() {
            println!("{:<12} {}", pipeline.name, pipeline.description);
        }
        return Ok(());
    }

    let workdir = std::fs::canonicalize(&cli.workdir)
        .with_context(|| format!("workdir {} not found", cli.workdir.display()))?;
    let runner = if cli.local {
        CommandRunner::host(&workdir)
    } else {
        CommandRunner::container(format!("golang:{}", config.pipeline.go_version), &workdir)
    };

    let options = cli.run_options();
    let registry = Arc::new(StepRegistry::new());
    let registered = register_go_steps(&registry, runner, &config, &options)?;

    if cli.list_steps {
        for name in registry.get_execution_order()? {
            let info = registry.get_step_info(&name)?;
            let kind = if info.config.required { "required" } else { "optional" };
            println!("{name:<10} {kind:<9} {}", info.config.description);
        }
        return Ok(());
    }

    let token = Arc::new(CancellationToken::new());
    let ctx = StepContext::with_token(token.clone());
    let shutdown = ShutdownRegistry::new();
    register_signal_handler(&shutdown, token);
    register_workspace_cleanup(&shutdown, &workdir);

    let executor = PipelineExecutor::new(registry, Arc::new(HookManager::new()));
    let pipeline_name = config.pipeline.name.clone();

    let outcome = match &options.step {
        Some(step) => {
            info!(pipeline = %pipeline_name, step = %step, "Running single step");
            executor.execute_step(&ctx, &pipeline_name, step).await
        }
        None => {
            let steps =
                catalog.resolve(&pipeline_name, &config.pipeline.steps, &registered, &options)?;
            executor.execute_pipeline(&ctx, &pipeline_name, &steps).await
        }
    };

    if let Ok(lines) = executor.get_pipeline_logs(&pipeline_name) {
        for line in lines {
            println!("{line}");
        }
    }

    let failed = shutdown.close_all(CLOSE_TIMEOUT).await;
    if !failed.is_empty() {
        warn!(resources = ?failed, "Some resources failed to close");
    }

    outcome.map_err(Into::into)
}

fn register_signal_handler(shutdown: &ShutdownRegistry, token: Arc<CancellationToken>) {
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling pipeline");
            token.cancel("interrupted");
        }
    });
    shutdown.register("signal-handler", move || async move {
        listener.abort();
        anyhow::Ok(())
    });
}

fn register_workspace_cleanup(shutdown: &ShutdownRegistry, workdir: &Path) {
    let profile = workdir.join("coverage.out");
    shutdown.register("coverage-profile", move || async move {
        match tokio::fs::remove_file(&profile).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("removing {}", profile.display()))),
        }
    });
}
