//! broker-loadgen entry point.
//!
//! Parses the command line, sets up logging and runs one tool.

use std::process::ExitCode;

use clap::Parser;

use broker_loadgen::cli::{Cli, Command};
use broker_loadgen::config::EnvConfig;
use broker_loadgen::error::LoadgenError;
use broker_loadgen::postgres::{PgStore, insert, update};
use broker_loadgen::solace::archive::FsArchive;
use broker_loadgen::telemetry::init_tracing;
use broker_loadgen::{mqtt, solace};

#[tokio::main]
async fn main() -> ExitCode {
    let env = EnvConfig::from_env();
    let cli = Cli::parse();
    init_tracing(&env, cli.command.silent());

    match run(cli.command, &env).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Command, env: &EnvConfig) -> Result<(), LoadgenError> {
    match command {
        Command::MqttPub(args) => {
            let (settings, plan) = args.into_parts()?;
            mqtt::publisher::run(&settings, &plan, env).await?;
        }
        Command::MqttSub(args) => {
            let (settings, plan) = args.into_parts()?;
            mqtt::subscriber::run(&settings, &plan, env).await?;
        }
        Command::SolacePub(args) => {
            let (settings, plan) = args.into_parts()?;
            solace::publisher::run(&settings, &plan, env).await?;
        }
        Command::SolaceSub(args) => {
            let (settings, source, duration) = args.into_parts()?;
            solace::subscriber::run(&settings, &source, duration, env).await?;
        }
        Command::SolaceDrain(args) => {
            let (settings, plan, root) = args.into_parts()?;
            let archive = FsArchive::new(root);
            tracing::info!(root = %archive.root().display(), "archiving to local directory");
            solace::drain::run(&settings, &plan, &archive, env).await?;
        }
        Command::PgInsert(args) => {
            let plan = args.plan()?;
            let (settings, table) = args.db.connection()?;
            let store = PgStore::connect(&settings, &table, env.connect_timeout()).await?;
            let outcome = insert::run(&store, &store.statements().insert, &plan).await;
            store.close().await;
            outcome?;
        }
        Command::PgUpdate(args) => {
            let plan = args.plan()?;
            let (settings, table) = args.db.connection()?;
            let store = PgStore::connect(&settings, &table, env.connect_timeout()).await?;
            let outcome = update::run(&store, &store.statements().select_oldest, &plan).await;
            store.close().await;
            outcome?;
        }
    }
    Ok(())
}
