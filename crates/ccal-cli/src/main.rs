use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ccal_storage::{connect, migrate, PgContestStore, PgPool, PgUserStore, StoreError};
use ccal_sync::{build_scheduler, load_source_registry, Cadence, SourceRegistry, SyncConfig, SyncPipeline};
use ccal_web::{AppState, WebConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Debug, Parser)]
#[command(name = "ccal")]
#[command(about = "Contest calendar: feed sync, status lifecycle and read API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run startup jobs, the scheduler and the web API.
    Serve,
    /// One fetch-and-store cycle.
    Sync,
    /// One status lifecycle scan.
    Lifecycle,
    /// One solution backfill pass.
    Backfill,
    /// Apply database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    // Nothing runs without a working store.
    let pool = connect(&config.database_url)
        .await
        .context("connecting to the contest store")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            migrate(&pool).await?;
            println!("migrations applied");
        }
        Commands::Sync => {
            let pipeline = pipeline(&config, pool).await?;
            print_summary(finished("fetch", pipeline.run_fetch().await)?)?;
        }
        Commands::Lifecycle => {
            let pipeline = pipeline(&config, pool).await?;
            print_summary(finished("lifecycle", pipeline.run_lifecycle().await)?)?;
        }
        Commands::Backfill => {
            let pipeline = pipeline(&config, pool).await?;
            print_summary(finished("backfill", pipeline.run_backfill().await)?)?;
        }
        Commands::Serve => {
            migrate(&pool).await?;
            let web = WebConfig::from_env();
            let pipeline = Arc::new(pipeline(&config, pool.clone()).await?);

            let startup = pipeline.run_startup().await;
            info!(
                fetch = startup.fetch.is_some(),
                lifecycle = startup.lifecycle.is_some(),
                backfill = startup.backfill.is_some(),
                "startup jobs finished"
            );

            // Held for the life of the server; dropping it stops the jobs.
            let _scheduler = if config.scheduler_enabled {
                let cadence = Cadence {
                    fetch: config.fetch_interval,
                    lifecycle: config.lifecycle_interval,
                };
                let sched = build_scheduler(Arc::clone(&pipeline), cadence).await?;
                sched.start().await.context("starting scheduler")?;
                Some(sched)
            } else {
                warn!("scheduler disabled; only startup jobs ran");
                None
            };

            let state = AppState::new(
                Arc::new(PgContestStore::new(pool.clone())),
                Arc::new(PgUserStore::new(pool)),
                &web,
            )?;
            ccal_web::serve(state, web.port).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

async fn pipeline(config: &SyncConfig, pool: PgPool) -> Result<SyncPipeline> {
    let path = config.registry_path();
    let registry = if path.exists() {
        load_source_registry(&path).await?
    } else {
        warn!(path = %path.display(), "no source registry found, using built-in sources");
        SourceRegistry::builtin()
    };
    SyncPipeline::from_config(config, &registry, Arc::new(PgContestStore::new(pool)))
}

fn finished<T>(job: &str, outcome: Option<Result<T, StoreError>>) -> Result<T> {
    match outcome {
        Some(result) => result.with_context(|| format!("{job} job failed")),
        None => bail!("{job} job is already running"),
    }
}

fn print_summary<T: Serialize>(summary: T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
