//! Codegraph CLI: ask questions about a code graph from the terminal
//!
//! Builds the pipeline from a YAML config file and/or environment
//! variables, talking to Neo4j over HTTP and to the configured LLM provider.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codegraph_qa::{
    AppConfig, GraphDatabase, NLQPipeline, Neo4jHttpClient, PipelineResponse,
};
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "codegraph", version, about = "Natural-language questions over a code graph")]
struct Cli {
    /// YAML configuration file (environment variables override it)
    #[arg(long, global = true, env = "CODEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the codebase
    Ask {
        /// The question, in plain language
        question: String,
    },
    /// Translate a question to Cypher without running it
    Translate {
        question: String,
    },
    /// Print the schema description used in prompts
    Schema {
        /// Discard any cached schema and introspect again
        #[arg(long)]
        refresh: bool,
    },
    /// Check database connectivity
    Ping,
    /// Ask questions interactively
    Shell,
}

#[tokio::main]
async fn main() {
    // stdout carries answers and JSON; logs go to stderr
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Ping => run_ping(&config).await,
        Commands::Ask { question } => {
            let pipeline = build_pipeline(&config)?;
            run_ask(&pipeline, &question, &cli.format).await
        }
        Commands::Translate { question } => {
            let pipeline = build_pipeline(&config)?;
            let cypher = pipeline.text_to_cypher(&question).await?;
            println!("{}", cypher);
            Ok(())
        }
        Commands::Schema { refresh } => {
            let pipeline = build_pipeline(&config)?;
            run_schema(&pipeline, refresh, &cli.format).await
        }
        Commands::Shell => {
            let pipeline = build_pipeline(&config)?;
            run_shell(&pipeline, &cli.format).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::from_yaml_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn build_pipeline(config: &AppConfig) -> Result<NLQPipeline> {
    let pipeline = NLQPipeline::from_config(config).context("building the question pipeline")?;
    pipeline.schema_cache().spawn_preload();
    Ok(pipeline)
}

async fn run_ask(pipeline: &NLQPipeline, question: &str, format: &OutputFormat) -> Result<()> {
    let response = pipeline.run_pipeline(question).await;
    print_response(&response, format)
}

fn print_response(response: &PipelineResponse, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Text => {
            println!("{}\n", response.answer);

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.add_row(vec!["Query", response.generated_query.as_str()]);
            table.add_row(vec!["Steps".to_string(), response.steps.join(" → ")]);
            table.add_row(vec!["Explanation", response.explanation.as_str()]);
            if let Some(summary) = &response.records_summary {
                table.add_row(vec!["Results", summary.as_str()]);
            }
            if let Some(execution) = &response.execution {
                table.add_row(vec![
                    "Latency".to_string(),
                    format!("{:.1} ms", execution.latency_ms),
                ]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

async fn run_schema(pipeline: &NLQPipeline, refresh: bool, format: &OutputFormat) -> Result<()> {
    let cache = pipeline.schema_cache();
    if refresh {
        cache.invalidate();
    }
    let schema = cache.get_schema().await?;
    let status = cache.status();

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "schema": schema,
                "status": status,
                "stats": cache.stats(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!("{}", schema);
            println!("State:       {:?}", status.state);
            if let Some(created_at) = status.created_at {
                println!("Loaded at:   {}", created_at.to_rfc3339());
            }
            println!("TTL:         {} s", status.ttl_seconds);
        }
    }
    Ok(())
}

async fn run_ping(config: &AppConfig) -> Result<()> {
    let db = Neo4jHttpClient::new(&config.graph)?;
    info!(uri = %config.graph.uri, "Pinging graph database");
    db.ping()
        .await
        .with_context(|| format!("could not reach {}", config.graph.uri))?;
    println!("PONG ({})", config.graph.uri);
    Ok(())
}

async fn run_shell(pipeline: &NLQPipeline, format: &OutputFormat) -> Result<()> {
    println!("Codegraph Interactive Shell");
    println!("Ask a question, or :help for commands. :quit to exit.\n");

    info!("Interactive shell started");
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        eprint!("codegraph> ");

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match trimmed {
            ":quit" | ":exit" | ":q" => break,
            ":help" | ":h" => {
                println!("Commands:");
                println!("  :schema   Show the cached schema");
                println!("  :refresh  Reload the schema");
                println!("  :quit     Exit shell");
                println!("  <text>    Ask a question");
            }
            ":schema" | ":refresh" => {
                if let Err(e) = run_schema(pipeline, trimmed == ":refresh", format).await {
                    error!("Schema command failed: {:#}", e);
                }
            }
            question => {
                if let Err(e) = run_ask(pipeline, question, format).await {
                    error!("Question failed: {:#}", e);
                }
            }
        }
    }

    println!("Bye!");
    Ok(())
}
