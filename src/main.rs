mod anthropic;
mod cli;
mod config;
mod draft;
mod engine;
mod error;
mod handoff;
mod notify;
mod orchestrator;
mod publish;
mod state_machine;
mod store;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use anthropic::AnthropicClient;
use cli::{Cli, Command};
use config::PresslineConfig;
use engine::{AnthropicEngine, ContentEngine, OfflineEngine};
use notify::{ConsoleNotifier, Notifier, WebhookNotifier};
use orchestrator::{Pipeline, RunOutcome, RunRequest};
use publish::{PublishTargets, WebhookSocialPoster, WordPressPublisher};
use store::{MemoryStore, NotionStore};
use ui::PhaseProgress;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "pressline=debug" } else { "pressline=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .init();

    let config = PresslineConfig::load(&cli.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Command::Demo => demo().await,
            command => {
                let pipeline = build_pipeline(&config)?;
                pipeline.start().await;
                execute(&pipeline, command).await
            }
        }
    })
}

fn build_pipeline(config: &PresslineConfig) -> Result<Pipeline> {
    if !config.notion.is_configured() {
        bail!("NOTION_TOKEN and NOTION_CONTENT_DB must be set (or [notion] in the config file)");
    }
    let store = Arc::new(NotionStore::new(&config.notion).context("creating Notion client")?);

    let engine: Arc<dyn ContentEngine> = if config.anthropic.api_key.is_empty() {
        warn!("ANTHROPIC_API_KEY not set, using the offline engine");
        Arc::new(OfflineEngine)
    } else {
        let client = AnthropicClient::new(config.anthropic.api_key.clone())?;
        Arc::new(AnthropicEngine::new(client, config.anthropic.model.clone()))
    };

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(ConsoleNotifier::default()),
    };

    let mut targets = PublishTargets::default();
    if let Some(wp) = &config.wordpress {
        targets.content = Some(Arc::new(WordPressPublisher::new(wp)?));
    }
    if let Some(url) = &config.social_webhook_url {
        targets.social = Some(Arc::new(WebhookSocialPoster::new(url.clone())?));
    }

    Ok(Pipeline::new(store, engine, notifier)
        .with_targets(targets)
        .with_timeouts(config.timeouts.to_timeouts()))
}

async fn execute(pipeline: &Pipeline, command: Command) -> Result<ExitCode> {
    let options = command.run_options();
    match command {
        Command::Run { topic, context, .. } => {
            let progress = PhaseProgress::start(&format!("Running pipeline for \"{topic}\""));
            let request = RunRequest {
                topic,
                context,
                options: options.unwrap_or_default(),
            };
            match pipeline.run_detached(request).await {
                Ok(outcome) => {
                    progress.run_finished(&outcome);
                    Ok(exit_code(matches!(outcome, RunOutcome::ReadyForReview(_))))
                }
                Err(err) => {
                    progress.failed(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Approve { id } => {
            let progress = PhaseProgress::start(&format!("Publishing {id}"));
            match pipeline.publish_detached(&id).await {
                Ok(report) => {
                    progress.publish_finished(&report);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    progress.failed(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Amend { id, instruction } => {
            let progress = PhaseProgress::start(&format!("Amending {id}"));
            match pipeline.amend_detached(&id, &instruction).await {
                Ok(report) => {
                    progress.amend_finished(&report);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    progress.failed(&err);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Pending => {
            ui::print_pending(&pipeline.list_pending().await);
            Ok(ExitCode::SUCCESS)
        }
        Command::Demo => demo().await,
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// End-to-end walk through the pipeline with in-process collaborators:
/// run, simulated restart, amend, approve.
async fn demo() -> Result<ExitCode> {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(OfflineEngine),
        Arc::new(ConsoleNotifier::default()),
    );

    println!("\n=== pressline demo ===\n");
    let topic = "rust in the linux kernel";
    let progress = PhaseProgress::start(&format!("Running pipeline for \"{topic}\""));
    let outcome = pipeline.run_detached(RunRequest::new(topic)).await?;
    progress.run_finished(&outcome);
    let ready = match outcome.into_result() {
        Ok(ready) => ready,
        Err(err) => {
            warn!(error = %err, "demo run did not reach review");
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("simulating a restart: dropping the handoff cache");
    pipeline.cache().clear();
    let restored = pipeline.start().await;
    info!(restored, "handoff cache rebuilt from the store");
    ui::print_pending(&pipeline.list_pending().await);

    let short = state_machine::short_id(&ready.job_id).to_string();
    let progress = PhaseProgress::start(&format!("Amending {short}"));
    let report = pipeline.amend_detached(&short, "add a section on tooling").await?;
    progress.amend_finished(&report);

    let progress = PhaseProgress::start(&format!("Publishing {short}"));
    let report = pipeline.publish_detached(&short).await?;
    progress.publish_finished(&report);

    let job = store.job(&ready.job_id);
    info!(status = ?job.map(|j| j.status), "final job status");
    Ok(ExitCode::SUCCESS)
}
