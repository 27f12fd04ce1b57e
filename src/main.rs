use callflow_rs::callflow::condition;
use callflow_rs::callflow::config::EngineConfig;
use callflow_rs::callflow::context::ExecutionContext;
use callflow_rs::callflow::graph::GraphExecutor;
use callflow_rs::callflow::nodes::NodeRegistry;
use callflow_rs::callflow::server::{self, AppState};
use callflow_rs::callflow::session::{SessionConfig, SessionEngine};
use callflow_rs::callflow::store::{load_graph, DirectoryStore, WorkflowStore};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a workflow file once and print the result
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,

        /// Initial context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },
    /// Check a workflow file and list its entry points
    Validate {
        /// Path to the workflow file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Serve the HTTP API and session WebSocket
    Serve {
        /// Address to bind, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Run { file, context } => {
            let graph = load_graph(&file)?;
            let initial = match context {
                Some(raw) => ExecutionContext::from_json(serde_json::from_str(&raw)?),
                None => ExecutionContext::new(),
            };

            let registry = Arc::new(NodeRegistry::builtin(&config.services()?));
            let executor = GraphExecutor::new(registry);
            let result = executor.execute(&graph, initial).await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Validate { file } => {
            let graph = load_graph(&file)?;
            let registry = NodeRegistry::builtin(&config.services()?);
            let executor = GraphExecutor::new(Arc::new(registry));

            println!(
                "{}: {} node(s), {} edge(s)",
                file.display(),
                graph.nodes.len(),
                graph.edges.len()
            );
            let triggers = executor.triggers(&graph);
            if triggers.is_empty() {
                println!("Warning: no trigger node, the workflow cannot start");
            }
            for node in triggers {
                println!("  entry point: {} ({})", node.id, node.display_name());
            }
            let mut unknown = false;
            for node in &graph.nodes {
                if executor.registry().resolve(&node.node_type).is_err() {
                    println!("  unknown type '{}' on node {}, will pass through", node.node_type, node.id);
                    unknown = true;
                }
                let expression = node.config_str("expression").or_else(|| node.config_str("condition"));
                if let Some(expression) = expression {
                    match condition::parse(expression) {
                        Ok(expr) => println!("  {} reads: {}", node.id, expr.variables().join(", ")),
                        Err(e) => println!("  {} has a bad condition, it will evaluate false: {}", node.id, e),
                    }
                }
            }
            if unknown {
                println!("Known types: {}", executor.registry().types().join(", "));
            }
        }
        Commands::Serve { bind } => {
            let subscriber = tracing_subscriber::fmt().with_target(false).finish();
            tracing::subscriber::set_global_default(subscriber)?;

            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let registry = Arc::new(NodeRegistry::builtin(&config.services()?));
            let directory = DirectoryStore::new(&config.workflows_dir);
            log::info!(
                "Serving workflows from {} ({} found)",
                directory.dir().display(),
                directory.list().await?.len()
            );
            let store: Arc<dyn WorkflowStore> = Arc::new(directory);

            let state = Arc::new(AppState {
                store: store.clone(),
                executor: Arc::new(GraphExecutor::new(registry.clone())),
                sessions: SessionEngine::new(registry, store, SessionConfig::from(&config)),
            });

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutting down");
                }
                signal.cancel();
            });

            server::serve(state, &bind, shutdown).await?;
        }
    }

    Ok(())
}
