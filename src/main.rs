use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use armada::cli::{Cli, Commands, Display};
use armada::config::{ProjectConfig, StatePaths};
use armada::error::{ArmadaError, Result};
use armada::git::validate_repo_name;
use armada::health::HealthPatrol;
use armada::notification::Notifier;
use armada::scheduler::MissionScheduler;
use armada::store::MissionStore;
use armada::worker::{AgentCommand, GhPrProvider};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("armada=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("armada=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let paths = StatePaths::from_env();
    let repo = resolve_repo(cli.repo)?;
    let display = Display::new();

    match cli.command {
        Commands::Init => {
            let dir = paths.repo_state_dir(&repo);
            let config = ProjectConfig::default();
            config.save(&dir).await?;
            println!("wrote {}", dir.join("config.toml").display());
            Ok(())
        }

        Commands::Run { description, yes } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let mission = scheduler.start(&description, yes).await?;
            display.print_mission_detail(&mission);
            if !yes {
                println!(
                    "Run `armada approve {}` to execute this plan.",
                    mission.mission_id
                );
            }
            Ok(())
        }

        Commands::Status { mission_id } => {
            let store = MissionStore::new(paths.clone());
            let mission = match mission_id {
                Some(id) => store.read(&repo, &id).await?,
                None => store.latest(&repo).await?.ok_or_else(|| {
                    ArmadaError::MissionNotFound {
                        repo: repo.clone(),
                        mission_id: "(latest)".to_string(),
                    }
                })?,
            };
            display.print_mission_detail(&mission);
            Ok(())
        }

        Commands::List => {
            let store = MissionStore::new(paths.clone());
            let missions = store.list(&repo).await?;
            if missions.is_empty() {
                println!("No missions for {}.", repo);
            }
            for mission in &missions {
                display.print_mission_summary(mission);
            }
            Ok(())
        }

        Commands::Approve { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let mission = scheduler.approve(&id).await?;
            display.print_mission_detail(&mission);
            Ok(())
        }

        Commands::Resume { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let mission = scheduler.resume(&id).await?;
            display.print_mission_detail(&mission);
            Ok(())
        }

        Commands::Recover { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let mission = scheduler.recover(&id).await?;
            display.print_mission_detail(&mission);
            Ok(())
        }

        Commands::Abort { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let mission = scheduler.abort(&id).await?;
            display.print_mission_summary(&mission);
            Ok(())
        }

        Commands::PrStatus { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let state = scheduler.pr_status(&id).await?;
            println!("{} pull request: {}", id, state);
            Ok(())
        }

        Commands::Patrol { mission_id, watch } => {
            let config = ProjectConfig::load(&paths.repo_state_dir(&repo)).await?;
            let store = MissionStore::new(paths.clone());
            let patrol = HealthPatrol::new(paths.clone(), config.health.clone());
            let notifier = Notifier::new(paths.clone(), repo.clone(), config.notify_hook.clone());

            if watch {
                let interval = Duration::from_secs(config.health.interval_secs);
                loop {
                    let inspected = patrol.patrol_all(&store, &repo, &notifier).await?;
                    println!("patrolled {} in-progress missions", inspected);
                    tokio::time::sleep(interval).await;
                }
            }

            let id = resolve_mission_id(&store, &repo, mission_id).await?;
            let mission = store.read(&repo, &id).await?;
            let report = patrol.patrol(&mission, &notifier).await?;

            if report.is_healthy() {
                println!("{} is healthy.", id);
            } else {
                println!("{} alerts raised.", report.alerts.len());
            }
            Ok(())
        }

        Commands::Cleanup { mission_id } => {
            let scheduler = build_scheduler(&paths, &repo).await?;
            let id = resolve_mission_id(scheduler.store(), &repo, mission_id).await?;
            let mission = scheduler.cleanup(&id).await?;
            display.print_mission_summary(&mission);
            Ok(())
        }
    }
}

/// Repository from `--repo`/`ARMADA_REPO`, falling back to the current
/// directory's name.
fn resolve_repo(flag: Option<String>) -> Result<String> {
    let repo = match flag {
        Some(repo) => repo,
        None => std::env::current_dir()?
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| ArmadaError::InvalidRepoName("(current directory)".to_string()))?,
    };
    validate_repo_name(&repo)?;
    Ok(repo)
}

async fn resolve_mission_id(
    store: &MissionStore,
    repo: &str,
    mission_id: Option<String>,
) -> Result<String> {
    match mission_id {
        Some(id) => Ok(id),
        None => store
            .latest(repo)
            .await?
            .map(|m| m.mission_id)
            .ok_or_else(|| ArmadaError::MissionNotFound {
                repo: repo.to_string(),
                mission_id: "(latest)".to_string(),
            }),
    }
}

async fn build_scheduler(paths: &StatePaths, repo: &str) -> Result<MissionScheduler> {
    let config = ProjectConfig::load(&paths.repo_state_dir(repo)).await?;

    let agent = Arc::new(AgentCommand::new(paths.clone(), config.clone()));
    let notifier = Arc::new(Notifier::new(
        paths.clone(),
        repo,
        config.notify_hook.clone(),
    ));

    MissionScheduler::new(
        paths.clone(),
        config,
        repo,
        agent.clone(),
        agent.clone(),
        agent,
        Arc::new(GhPrProvider::new(paths.clone())),
        notifier,
    )
}
