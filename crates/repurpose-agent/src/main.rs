//! repurpose: drug repurposing pipeline.
//! Entry point for the agent binary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use repurpose_common::events::spawn_stage;
use repurpose_common::SandboxClient;
use repurpose_ingestion::sources::arxiv::ArxivClient;
use repurpose_ingestion::sources::europepmc::EuropePmcClient;
use repurpose_ingestion::LiteratureSource;
use repurpose_molecules::{PubChemClient, RcsbClient, RunPodClient};
use repurpose_orchestrator::{ExpansionPolicy, Oracles, Pipeline, PipelineEvent, PipelineOutcome};
use repurpose_web::{build_router, AppState};
use secrecy::SecretString;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LiteratureKind};

#[derive(Parser)]
#[command(name = "repurpose", version)]
#[command(about = "Literature-driven drug repurposing with docking and iterative expansion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for one condition and print the resulting document
    Run {
        /// Condition name, e.g. "pancreatic cancer"
        condition: String,

        /// Print the whole outcome as JSON instead of Markdown
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record decisions but never expand the ligand set
        #[arg(long, default_value_t = false)]
        no_expansion: bool,
    },
    /// Serve the stage API over HTTP
    Serve {
        /// Bind address (overrides REPURPOSE_BIND and the config file)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn build_oracles(config: &Config) -> anyhow::Result<Oracles> {
    let client = SandboxClient::new()?;

    let llm = repurpose_llm::build_backend(&config.llm_settings(), &client)?;

    let literature: Arc<dyn LiteratureSource> = match config.literature.source {
        LiteratureKind::Arxiv => Arc::new(ArxivClient::new(client.clone())),
        LiteratureKind::Europepmc => Arc::new(EuropePmcClient::new(client.clone())),
    };
    info!(source = literature.name(), "Literature source configured");

    let docking_key = match config.docking.api_key.clone() {
        Some(key) => key,
        None => {
            warn!("RUNPOD_API_KEY is not set; docking jobs will be rejected by the endpoint");
            SecretString::from(String::new())
        }
    };
    let docking = RunPodClient::new(client.clone(), docking_key, config.docking.endpoint_id.clone())
        .with_samples_per_complex(config.docking.samples_per_complex);
    info!(endpoint = %config.docking.endpoint_id, "Docking endpoint configured");

    Ok(Oracles {
        llm,
        literature,
        structures: Arc::new(RcsbClient::new(client.clone())),
        compounds: Arc::new(PubChemClient::new(client)),
        docking: Arc::new(docking),
    })
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Progress { message } => info!("{message}"),
        PipelineEvent::Warning { message } => warn!("{message}"),
        PipelineEvent::Decision { round, decision } => {
            info!(round, action = %decision.action, "Decision: {}", decision.rationale)
        }
        PipelineEvent::Expansion { round, new_targets, new_ligands } => {
            info!(round, new_targets, new_ligands, "Expanded ligand set")
        }
        other => debug!(event = ?other, "Pipeline event"),
    }
}

fn render_markdown(outcome: &PipelineOutcome) -> String {
    outcome
        .final_document
        .clone()
        .or_else(|| outcome.report.clone())
        .unwrap_or_else(|| outcome.review_document.clone())
}

async fn run(
    config: &Config,
    condition: String,
    json: bool,
    output: Option<PathBuf>,
    no_expansion: bool,
) -> anyhow::Result<()> {
    let mut options = config.pipeline_options();
    if no_expansion {
        options.expansion = ExpansionPolicy::Never;
    }
    let pipeline = Pipeline::new(build_oracles(config)?).with_options(options);

    let mut events = spawn_stage::<PipelineEvent, _, _>(move |sink| async move {
        pipeline.run(&condition, &sink).await
    });

    let mut outcome = None;
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::Complete(done) => {
                outcome = Some(done);
                break;
            }
            PipelineEvent::Error { message } => anyhow::bail!("Pipeline failed: {message}"),
            other => log_event(&other),
        }
    }
    let outcome = outcome.ok_or_else(|| anyhow::anyhow!("Pipeline ended without a result"))?;

    info!(
        rounds = outcome.rounds,
        results = outcome.all_results.len(),
        proteins = outcome.protein_targets.len(),
        "Pipeline complete"
    );

    let rendered = if json {
        serde_json::to_string_pretty(&outcome)?
    } else {
        render_markdown(&outcome)
    };
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            info!(path = %path.display(), "Output written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn serve(config: &Config, bind: Option<String>) -> anyhow::Result<()> {
    let state = AppState::new(build_oracles(config)?, config.pipeline_options());
    let router = build_router(state);

    let bind_addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Stage API listening on http://{}", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("repurpose=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!(provider = %config.llm.provider, expansion = ?config.pipeline.expansion, "Configuration loaded");

    match cli.command {
        Command::Run { condition, json, output, no_expansion } => {
            run(&config, condition, json, output, no_expansion).await
        }
        Command::Serve { bind } => serve(&config, bind).await,
    }
}
