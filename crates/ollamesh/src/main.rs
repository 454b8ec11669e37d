//! Command-line frontend for the ollamesh gateway.
//!
//! # Examples
//!
//! ```sh
//! # Stream a chat completion from the local node
//! ollamesh chat "Why is the sky blue?" --model llama3
//!
//! # Discover mesh peers on the LAN
//! ollamesh scan
//!
//! # Show the mesh inventory
//! ollamesh models
//!
//! # Provision a model, then free its memory
//! ollamesh pull qwen3:8b
//! ollamesh unload qwen3:8b
//! ```

use std::io::Write as _;

use clap::{Parser, Subcommand};

use ollamesh::client::NodeClient;
use ollamesh::config::DEFAULT_LOCAL_ENDPOINT;
use ollamesh::models::{NodeStatus, mesh_status};
use ollamesh::transport::RetryConfig;
use ollamesh::{CancelToken, Gateway, GatewaySettings, GenerateRequest};

/// Streaming inference gateway for a mesh of Ollama nodes.
#[derive(Parser)]
#[command(name = "ollamesh", version)]
struct Cli {
    /// Base URL of the local inference endpoint.
    #[arg(long, default_value = DEFAULT_LOCAL_ENDPOINT, global = true)]
    endpoint: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream one chat completion to stdout.
    Chat {
        /// The user message.
        message: String,

        /// Model to use; a "node/" prefix routes to that mesh node.
        #[arg(long, default_value = "llama3")]
        model: String,

        /// Sampling temperature.
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Also print the model's reasoning channel, dimmed to stderr.
        #[arg(long)]
        show_thinking: bool,
    },
    /// Probe well-known addresses for live mesh peers.
    Scan,
    /// Show local models and remote node health.
    Models,
    /// Download a model onto the endpoint, streaming progress.
    Pull { model: String },
    /// Ask the endpoint to evict a model from memory.
    Unload { model: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ollamesh=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ollamesh::Result<()> {
    match cli.command {
        Command::Chat {
            message,
            model,
            temperature,
            show_thinking,
        } => {
            let settings = GatewaySettings::new(&cli.endpoint, &model);
            let gateway = Gateway::new(settings)?;
            let cancel = CancelToken::new();
            let request = GenerateRequest::new(message).with_temperature(temperature);

            let stats = gateway
                .generate(&request, &cancel, |answer: Option<&str>, thought: Option<&str>, _thinking: bool| {
                    if let Some(text) = answer {
                        print!("{text}");
                        let _ = std::io::stdout().flush();
                    }
                    if show_thinking && let Some(text) = thought {
                        eprint!("{text}");
                    }
                })
                .await;

            println!();
            if let Some(stats) = stats {
                eprintln!(
                    "[{} tokens, {:.1} tok/s, {:.0} ms total]",
                    stats.eval_count, stats.tokens_per_second, stats.total_duration_ms,
                );
            }
        }
        Command::Scan => {
            let client = NodeClient::new()?;
            let found = ollamesh::discovery::scan_mesh(&client, &cli.endpoint).await;
            if found.is_empty() {
                println!("No mesh peers found.");
            }
            for node in found {
                println!("{}\t{}\t{}", node.id, node.name, node.url);
            }
        }
        Command::Models => {
            let client = NodeClient::new()?;
            let settings = GatewaySettings::new(&cli.endpoint, "");
            let status = mesh_status(&client, &settings, &RetryConfig::default()).await;
            if !status.connected {
                eprintln!("Local endpoint {} is unreachable.", cli.endpoint);
                std::process::exit(1);
            }
            for node in status.nodes {
                let state = match node.status {
                    NodeStatus::Online => "online",
                    NodeStatus::Offline => "offline",
                };
                let caps: Vec<String> =
                    node.capabilities.iter().map(|c| format!("{c:?}")).collect();
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    node.name,
                    state,
                    node.size,
                    node.family,
                    caps.join(","),
                );
            }
        }
        Command::Pull { model } => {
            let client = NodeClient::new()?;
            client.pull_model(&cli.endpoint, &model).await?;
        }
        Command::Unload { model } => {
            let client = NodeClient::new()?;
            client.unload_model(&cli.endpoint, &model).await?;
        }
    }
    Ok(())
}
