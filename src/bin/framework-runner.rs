use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use framework_runner::artifact_cache::transport::parse_location;
use framework_runner::artifact_cache::{ArtifactReference, Console, DefaultTransport};
use framework_runner::launch::{DryRunExecutor, ProcessExecutor};
use framework_runner::maven::{settings, RemoteRepository, RepositoryDownloader, VersionResolver};
use framework_runner::platform::ConfiguredPlatformBuilder;
use framework_runner::process::ExitOutcome;
use framework_runner::{Configuration, LaunchOrchestrator, LaunchOutcome};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  framework-runner launch <config.toml> [--dry-run] [bundle-url...]\n  framework-runner resolve latest <group> <artifact> [config.toml]\n  framework-runner resolve snapshot <group> <artifact> <version> [config.toml]"
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [launch, config, rest @ ..] if launch == "launch" => launch_platform(Path::new(config), rest),
        [resolve, latest, group, artifact] if resolve == "resolve" && latest == "latest" => {
            resolve_latest(group, artifact, None)
        }
        [resolve, latest, group, artifact, config] if resolve == "resolve" && latest == "latest" => {
            resolve_latest(group, artifact, Some(Path::new(config)))
        }
        [resolve, snapshot, group, artifact, version]
            if resolve == "resolve" && snapshot == "snapshot" =>
        {
            resolve_snapshot(group, artifact, version, None)
        }
        [resolve, snapshot, group, artifact, version, config]
            if resolve == "resolve" && snapshot == "snapshot" =>
        {
            resolve_snapshot(group, artifact, version, Some(Path::new(config)))
        }
        _ => bail!(usage()),
    }
}

fn launch_platform(config_path: &Path, rest: &[String]) -> Result<ExitCode> {
    let config = Configuration::load(config_path)?;

    let mut dry_run = false;
    let mut locations: Vec<&str> = config.bundles.iter().map(String::as_str).collect();
    for arg in rest {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{}", usage()),
            location => locations.push(location),
        }
    }
    let bundles = locations
        .into_iter()
        .map(|location| {
            parse_location(location)
                .map(ArtifactReference::new)
                .with_context(|| format!("invalid bundle location '{location}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    let transport = Arc::new(DefaultTransport::new()?);
    let builder = ConfiguredPlatformBuilder::new(config.platform.clone());
    // A dry run prints only the JSON command on stdout.
    let console = if dry_run { Console::Stderr } else { Console::Stdout };
    let orchestrator = LaunchOrchestrator::new(builder, transport).with_console(console);

    console.say(&format!("[launch] {}", config_path.display()));
    let outcome = if dry_run {
        orchestrator.launch(config, &bundles, DryRunExecutor::new(std::io::stdout()))?
    } else {
        orchestrator.launch(config, &bundles, ProcessExecutor::new())?
    };

    Ok(match outcome {
        LaunchOutcome::Supervised(ExitOutcome::Exited(status)) => {
            println!("[launch] platform exited with {status}");
            exit_code(status.code())
        }
        LaunchOutcome::Supervised(ExitOutcome::Terminated) => {
            println!("[launch] platform terminated");
            ExitCode::from(130)
        }
        LaunchOutcome::Delegated => ExitCode::SUCCESS,
    })
}

fn exit_code(code: Option<i32>) -> ExitCode {
    match code.map(u8::try_from) {
        Some(Ok(code)) => ExitCode::from(code),
        _ => ExitCode::FAILURE,
    }
}

fn resolve_latest(group: &str, artifact: &str, config: Option<&Path>) -> Result<ExitCode> {
    let downloader = downloader(config)?;
    let version = VersionResolver::new(&downloader).resolve_latest(group, artifact)?;
    println!("{version}");
    Ok(ExitCode::SUCCESS)
}

fn resolve_snapshot(
    group: &str,
    artifact: &str,
    version: &str,
    config: Option<&Path>,
) -> Result<ExitCode> {
    let downloader = downloader(config)?;
    let resolved = VersionResolver::new(&downloader).resolve_snapshot(group, artifact, version)?;
    println!("{resolved}");
    Ok(ExitCode::SUCCESS)
}

fn downloader(config: Option<&Path>) -> Result<RepositoryDownloader> {
    let config = match config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::default(),
    };

    let local = match config.local_repository {
        Some(local) => local,
        None => RepositoryDownloader::default_local_repository()
            .context("no home directory for the local repository; set local_repository")?,
    };

    let remotes = if config.repositories.is_empty() {
        vec![RemoteRepository::central()?]
    } else {
        config
            .repositories
            .iter()
            .map(|repo| RemoteRepository::new(repo.id.clone(), &repo.url))
            .collect::<Result<Vec<_>>>()?
    };

    let credentials = match settings::default_settings_path() {
        Some(path) => settings::load_credentials(&path)?,
        None => Vec::new(),
    };

    Ok(RepositoryDownloader::new(&local, remotes)?.with_credentials(credentials))
}
