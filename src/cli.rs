//! Command-line interface.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::a2a::server::{self, ServerParams};
use crate::brain::{self, AgentRegistry, GenerateOptions};
use crate::brain::provider::Message;
use crate::config::Config;
use crate::logging;
use crate::memory::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "searchcrabs", version, about = "Web-research agent served over A2A", long_about = None)]
pub struct Cli {
    /// Extra config file layered over ~/.searchcrabs/config.toml
    #[arg(short, long, global = true, env = "SEARCHCRABS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the A2A HTTP server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask an agent a single question and print the reply
    Ask {
        /// Agent id
        #[arg(short, long, default_value = brain::agent::SEARCH_AGENT_ID)]
        agent: String,
        /// Memory thread to continue
        #[arg(short, long)]
        thread: Option<String>,
        /// The question
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// List configured agents
    Agents,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { bind, port } => serve(config, bind, port).await,
        Commands::Ask {
            agent,
            thread,
            prompt,
        } => ask(config, &agent, thread, prompt.join(" ")).await,
        Commands::Agents => list_agents(config).await,
    }
}

async fn build_registry(config: &Config, with_memory: bool) -> anyhow::Result<AgentRegistry> {
    let provider = brain::build_provider(&config.llm)?;
    let tools = brain::build_tools(config)?;

    let memory = if with_memory && config.memory.enabled {
        let path = config.memory_db_path();
        let store = MemoryStore::connect(&path)
            .await
            .with_context(|| format!("Failed to open memory database {}", path.display()))?;
        Some(store)
    } else {
        None
    };

    Ok(AgentRegistry::from_config(config, provider, &tools, memory))
}

async fn serve(mut config: Config, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let agents = build_registry(&config, true).await?;
    let params = ServerParams {
        bind: config.server.bind.clone(),
        port: config.server.port,
        production: config.server.production,
    };
    server::start_server(&params, agents).await
}

async fn ask(
    config: Config,
    agent_id: &str,
    thread: Option<String>,
    prompt: String,
) -> anyhow::Result<()> {
    let registry = build_registry(&config, thread.is_some()).await?;
    let agent = registry.get(agent_id).with_context(|| {
        format!(
            "Unknown agent '{}'. Available: {}",
            agent_id,
            registry.ids().join(", ")
        )
    })?;

    let options = GenerateOptions {
        thread_id: thread,
        resource_id: None,
    };
    let output = agent.generate(vec![Message::user(prompt)], &options).await?;

    println!("{}", output.text);
    tracing::info!(
        "{} steps, {} in / {} out tokens, ${:.6}",
        output.steps.len(),
        output.usage.input_tokens,
        output.usage.output_tokens,
        output.cost_usd
    );
    for score in &output.scores {
        tracing::info!("score {}: {:.2} ({})", score.scorer, score.score, score.reason);
    }
    Ok(())
}

async fn list_agents(config: Config) -> anyhow::Result<()> {
    let registry = build_registry(&config, false).await?;
    for agent in registry.iter() {
        let def = agent.definition();
        println!("{:<16} {:<20} tools: {}", def.id, def.name, def.tools.join(", "));
    }
    Ok(())
}
