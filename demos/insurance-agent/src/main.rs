//! Health-insurance assistant that starts with a single bootstrap tool and
//! registers the rest of its capabilities by describing them.
//!
//! Each line read from stdin (or the task given on the command line) runs as
//! an independent task; the session is reset in between.

mod catalog;

use std::path::PathBuf;
use std::sync::Arc;

use agent_adapters::ollama::{OllamaAdapter, OllamaConfig};
use agent_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use agent_adapters::traits::{EmbeddingAdapter, ModelAdapter};
use agent_config::{AgentConfig, EmbeddingProvider, ModelConfig, ModelProvider};
use agent_kernel::{
    AdapterEmbedder, AgentKernel, CapabilityResolver, Dispatcher, SchedulerConfig, Session,
    TaskOutcome, TaskScheduler,
};
use agent_memory::{Embedder, LexicalEmbedder};
use agent_telemetry::LogFormat;
use agent_tools::ToolCatalog;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "insurance-agent", version, about)]
struct Cli {
    /// JSON configuration file; `AGENT_*` environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the policy documents.
    #[arg(long, default_value = "documents")]
    documents: PathBuf,

    /// Single-line log output.
    #[arg(long)]
    compact: bool,

    /// Run this task and exit instead of reading stdin.
    task: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.compact {
        LogFormat::Compact
    } else {
        LogFormat::Pretty
    };
    agent_telemetry::init_with("info", format)?;

    let config = AgentConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let catalog = Arc::new(catalog::insurance_catalog(cli.documents)?);
    let kernel = build_kernel(&config, catalog).await?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model,
        "insurance agent ready"
    );

    let mut session = Session::new();
    if let Some(task) = cli.task {
        return run(&kernel, &mut session, &task).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let task = line.trim();
        if task.is_empty() {
            continue;
        }
        if matches!(task, "exit" | "quit") {
            break;
        }
        if let Err(err) = run(&kernel, &mut session, task).await {
            warn!("{err:#}");
        }
        session.reset();
    }

    info!("bye");
    Ok(())
}

async fn run(kernel: &AgentKernel, session: &mut Session, task: &str) -> Result<()> {
    match kernel.run_task(session, task).await.context("task failed")? {
        TaskOutcome::StepBudgetExceeded { steps } => println!("(no answer after {steps} steps)"),
        outcome => println!("{}", outcome.answer().unwrap_or_default()),
    }
    Ok(())
}

async fn build_kernel(config: &AgentConfig, catalog: Arc<ToolCatalog>) -> Result<AgentKernel> {
    let embedder = embedder(config, &catalog)?;
    let resolver =
        CapabilityResolver::with_threshold(catalog, embedder, config.index.min_similarity)
            .await
            .context("building the capability index")?
            .with_cache();

    let dispatcher = Dispatcher::new(
        model_adapter(&config.model)?,
        Arc::new(resolver),
        config.dispatch.clone(),
    )
    .with_discovery_prompt()?;

    let scheduler = TaskScheduler::new(SchedulerConfig::from_count(config.scheduler_concurrency));
    Ok(AgentKernel::new(Arc::new(dispatcher), scheduler))
}

fn openai_config(model: &ModelConfig) -> Result<OpenAiConfig> {
    let mut openai = OpenAiConfig::new(model.model.as_str()).with_timeout(model.timeout());
    if let Some(variable) = model.api_key_env() {
        openai = openai.with_api_key_from(variable);
    }
    if let Some(base_url) = &model.base_url {
        openai = openai.with_base_url(base_url)?;
    }
    if let Some(temperature) = model.temperature {
        openai = openai.with_default_temperature(temperature);
    }
    if model.provider == ModelProvider::AzureOpenAi {
        let deployment = model
            .azure_deployment
            .as_deref()
            .context("azure_openai requires model.azure_deployment")?;
        openai = openai.with_azure_deployment(deployment, model.azure_api_version.as_str());
    }
    Ok(openai)
}

fn ollama_config(model: &ModelConfig) -> Result<OllamaConfig> {
    let mut ollama = OllamaConfig::new(model.model.as_str()).with_timeout(model.timeout());
    if let Some(base_url) = &model.base_url {
        ollama = ollama.with_base_url(base_url)?;
    }
    if let Some(temperature) = model.temperature {
        ollama = ollama.with_default_temperature(temperature);
    }
    Ok(ollama)
}

fn model_adapter(model: &ModelConfig) -> Result<Arc<dyn ModelAdapter>> {
    Ok(match model.provider {
        ModelProvider::OpenAi | ModelProvider::AzureOpenAi => {
            Arc::new(OpenAiAdapter::new(openai_config(model)?)?)
        }
        ModelProvider::Ollama => Arc::new(OllamaAdapter::new(ollama_config(model)?)?),
    })
}

fn embedder(config: &AgentConfig, catalog: &ToolCatalog) -> Result<Arc<dyn Embedder>> {
    let adapter: Arc<dyn EmbeddingAdapter> = match config.embeddings.provider {
        EmbeddingProvider::Lexical => {
            let descriptions = catalog.list().iter().map(|tool| tool.description());
            let fitted = LexicalEmbedder::fit(descriptions)?;
            return Ok(Arc::new(fitted));
        }
        EmbeddingProvider::OpenAi => {
            let mut openai = openai_config(&config.model)?;
            if let Some(model) = &config.embeddings.model {
                openai = openai.with_embedding_model(model.as_str());
            }
            Arc::new(OpenAiAdapter::new(openai)?)
        }
        EmbeddingProvider::Ollama => {
            let mut ollama = ollama_config(&config.model)?;
            if let Some(model) = &config.embeddings.model {
                ollama = ollama.with_embedding_model(model.as_str());
            }
            Arc::new(OllamaAdapter::new(ollama)?)
        }
    };
    Ok(Arc::new(AdapterEmbedder::new(adapter)))
}
