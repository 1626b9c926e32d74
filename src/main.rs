mod config;
mod discord;
mod export;
mod lookup;
mod member;
mod output;
mod source;
mod transform;
mod types;

use clap::Parser;
use config::{Settings, SourceSettings, Task};
use discord::DiscordHttp;
use export::{Run, RunStage};
use log::{error, info};
use lookup::ReferenceLookup;
use source::{GuildSource, SnapshotSource};
use std::process::ExitCode;
use types::ExportError;

async fn connect(source: &SourceSettings) -> Result<Box<dyn GuildSource>, ExportError> {
    Ok(match source {
        SourceSettings::Live {
            token,
            api_base,
            timeout,
        } => Box::new(DiscordHttp::connect(token, api_base, *timeout).await?),
        SourceSettings::Snapshot(path) => Box::new(SnapshotSource::load(path)?),
    })
}

async fn execute(
    source: &dyn GuildSource,
    settings: &Settings,
    run: &mut Run,
) -> Result<(), ExportError> {
    match &settings.task {
        Task::RoleMembers { role_ids } => {
            export::export_role_members(
                source,
                &settings.guild_id,
                role_ids,
                &settings.destination,
                run,
            )
            .await
        }
        Task::RoleLinks {
            role_map,
            profiles,
            concurrency,
        } => {
            let lookup = ReferenceLookup::load(role_map, profiles).map_err(|e| run.abort(e.into()))?;
            export::export_role_links(
                source,
                &settings.guild_id,
                &lookup,
                &settings.destination,
                *concurrency,
                run,
            )
            .await
        }
    }
}

async fn run_export(settings: Settings) -> Run {
    let mut run = Run::new();
    info!(
        target: "main",
        "{}",
        if settings.destination == output::Destination::Console {
            "Debugging..."
        } else {
            "Creating export files..."
        }
    );

    run.enter(RunStage::Connecting);
    let source = match connect(&settings.source).await {
        Ok(source) => source,
        Err(e) => {
            error!(target: "main", "Unable to connect: {e}");
            run.enter(RunStage::Failed);
            return run;
        }
    };

    if let Err(e) = execute(source.as_ref(), &settings, &mut run).await {
        error!(target: "main", "Export failed: {e}");
    }
    // Every artifact is closed by now.
    source.close().await;
    run
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let settings = match Settings::try_from(config::Cli::parse()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(target: "main", "Invalid configuration: {e}");
            Run::failed().report();
            return ExitCode::FAILURE;
        }
    };

    let run = run_export(settings).await;
    run.report();
    if run.stage() == RunStage::Done && !run.succeeded() {
        error!(target: "main", "Finished with {} skipped units.", run.summary().failed);
    }
    if run.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
