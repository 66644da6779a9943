mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use release_matrix::compile::CompilerInvoker;
use release_matrix::config::MatrixConfig;
use release_matrix::job::{JobReport, Pipeline};
use release_matrix::matrix::{self, MatrixOrchestrator};
use release_matrix::release::{self, Trigger};
use release_matrix::{Bootstrapper, Credential, Platform, Publisher};

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every selected job succeeded.
async fn real_main() -> Result<bool> {
    let args = cli::Args::parse();

    match args.sub {
        cli::Cmd::Run {
            event,
            platforms,
            dry_run,
            config,
            binary,
        } => run_matrix(event, platforms, dry_run, config, binary).await,
        cli::Cmd::Plan { config, binary } => {
            let cfg = MatrixConfig::load(config.as_deref(), binary.as_deref())
                .context("Failed to load configuration")?;
            print_plan(&cfg);
            Ok(true)
        }
    }
}

async fn run_matrix(
    event: Option<PathBuf>,
    platforms: Vec<Platform>,
    dry_run: bool,
    config_path: Option<PathBuf>,
    binary: Option<String>,
) -> Result<bool> {
    let cfg = MatrixConfig::load(config_path.as_deref(), binary.as_deref())
        .context("Failed to load configuration")?;

    let event_path = release::event_path(event)?;
    let trigger = release::load_event(&event_path)
        .with_context(|| format!("Failed to load release event from {}", event_path.display()))?;
    let release = match trigger {
        Trigger::Created(release) => release,
        Trigger::Ignored { action } => {
            info!("Release action `{action}` is not a creation, nothing to do");
            return Ok(true);
        }
    };

    let credential = Credential::from_env(&cfg.token_env).map(Arc::new);
    if credential.is_none() && !dry_run {
        warn!(
            "{} is not set; every publish step will fail",
            cfg.token_env
        );
    }

    let bootstrapper = Bootstrapper::new(&cfg).context("Failed to create download client")?;
    let compiler = CompilerInvoker::new(&cfg);
    let publisher = Publisher::new(&cfg, credential)
        .context("Failed to create upload client")?
        .dry_run(dry_run);
    let pipeline = Arc::new(Pipeline::new(bootstrapper, compiler, publisher));

    let selected = if platforms.is_empty() {
        cfg.platforms.clone()
    } else {
        platforms
    };
    let orchestrator =
        MatrixOrchestrator::new(pipeline, cfg.workspace_dir.clone()).with_platforms(&selected);

    let reports = orchestrator.run(Arc::new(release)).await;
    print!("{}", matrix::summary(&reports));
    Ok(reports.iter().all(JobReport::is_success))
}

fn print_plan(cfg: &MatrixConfig) {
    let compiler = CompilerInvoker::new(cfg);
    for platform in Platform::all() {
        let spec = platform.spec();
        let workspace = cfg.workspace_dir.join(platform.id());
        println!("{platform} ({})", spec.target_triple);
        if spec.bootstrap.is_empty() {
            println!("  bootstrap:    (none)");
        }
        for step in spec.bootstrap {
            println!("  bootstrap:    {step}");
        }
        println!(
            "  output:       {}",
            compiler.output_path(spec, &workspace).display()
        );
        println!("  asset:        {}", spec.asset_name(&cfg.binary));
        println!("  content type: {}", spec.content_type);
    }
}
