//! Scigraph CLI
//!
//! Thin command-line wrapper over the core services:
//! - `extract`: run the extraction pipeline over documents from a JSON file
//! - `normalize`: resolve a surface form to its canonical identifier
//! - `paths`: multi-hop path discovery between two entities
//! - `query`: natural-language query against the graph
//! - `check`: validate a claim sentence against graph facts
//!
//! The graph backend is either the external Cypher endpoint (`--graph-url`)
//! or an in-memory store seeded from the extracted documents (default,
//! useful for local inspection).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use scigraph_client::{
    BreakerConfig, ChatClientConfig, CircuitBreaker, GuardedChatModel, HttpChatModel, RateLimiter,
};
use scigraph_core::{ChatModel, Document, GraphConfig, GraphReader, GraphWriter};
use scigraph_extract::{ExtractionPipeline, RelationInferrer};
use scigraph_normalize::{NormalizeOptions, Normalizer};
use scigraph_reason::{
    ConsistencyChecker, NlQueryService, PathExplainer, PathFinder, PathQuery,
};
use scigraph_store::{CypherGraphStore, MemoryGraph};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scigraph")]
#[command(
    author,
    version,
    about = "Scigraph: knowledge-graph construction and reasoning for scientific literature"
)]
struct Cli {
    /// Cypher HTTP endpoint (e.g. http://localhost:7474); omit for the
    /// in-memory store.
    #[arg(long, global = true)]
    graph_url: Option<String>,

    /// Graph database name for the Cypher endpoint.
    #[arg(long, global = true, default_value = "neo4j")]
    graph_db: String,

    /// Chat-completion endpoint base URL (or SCIGRAPH_LLM_URL); omit to
    /// run without the LLM passes.
    #[arg(long, global = true)]
    llm_url: Option<String>,

    /// Chat model name.
    #[arg(long, global = true, default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Configuration JSON; omit for built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract relations from documents in a JSON file (array of documents).
    Extract {
        /// Input documents (JSON array).
        input: PathBuf,
        /// Persist results into the graph store.
        #[arg(long)]
        persist: bool,
    },

    /// Normalize a surface form to a canonical identifier.
    Normalize {
        surface: String,
        /// Skip the LLM confirmation stage.
        #[arg(long)]
        skip_llm: bool,
    },

    /// Find paths between two entities.
    Paths {
        start: String,
        end: String,
        #[arg(long, default_value_t = 6)]
        max_hops: usize,
        /// Only report the shortest path.
        #[arg(long)]
        shortest: bool,
    },

    /// Run a natural-language query against the graph.
    Query { question: String },

    /// Check a claim sentence against graph facts.
    Check { claim: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scigraph=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let graph = open_graph(&cli)?;
    let chat = build_chat(&cli)?;

    match &cli.command {
        Commands::Extract { input, persist } => {
            let raw = std::fs::read_to_string(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let docs: Vec<Document> = serde_json::from_str(&raw).context("parsing documents")?;

            let mut pipeline = ExtractionPipeline::new(config.clone());
            if let Some(chat) = &chat {
                pipeline = pipeline.with_inferrer(Arc::new(RelationInferrer::new(
                    chat.clone(),
                    config.clone(),
                )));
            }
            let pipeline = pipeline.with_writer(graph.1.clone());

            let batch = pipeline.extract_batch(&docs).await;
            for result in &batch.results {
                println!(
                    "{} {} relation(s), {} contradiction(s)",
                    result.document_id.bold(),
                    result.relations.len(),
                    result.contradictions.len()
                );
                if *persist {
                    pipeline.persist(result).await?;
                }
            }
            for error in &batch.errors {
                eprintln!("{} {}: {}", "failed".red(), error.document_id, error.error);
            }
            let stats = pipeline.stats();
            println!(
                "\n{} processed={} relations={} approved={} pending={} rejected={} avg_conf={:.2}",
                "summary".green().bold(),
                stats.total_processed,
                stats.total_relations,
                stats.approved,
                stats.pending,
                stats.rejected,
                stats.average_confidence
            );
        }

        Commands::Normalize { surface, skip_llm } => {
            let mut normalizer = Normalizer::new(config.clone()).with_graph(graph.0.clone());
            if let Some(chat) = &chat {
                normalizer = normalizer.with_chat(chat.clone());
            }
            let opts = NormalizeOptions {
                skip_llm: *skip_llm,
                ..Default::default()
            };
            let result = normalizer.normalize(surface, &opts).await?;
            if result.was_normalized {
                println!(
                    "{} -> {} ({:?}, confidence {:.2})",
                    result.original.bold(),
                    result.normalized.green(),
                    result.stage,
                    result.confidence
                );
            } else {
                println!(
                    "{} left as-is ({:?}, best candidate {:.2})",
                    result.original.bold(),
                    result.stage,
                    result.confidence
                );
            }
        }

        Commands::Paths {
            start,
            end,
            max_hops,
            shortest,
        } => {
            let finder = PathFinder::new(graph.0.clone());
            let explainer = PathExplainer::new();
            let query = PathQuery::with_max_hops(*max_hops);
            let result = finder.find_paths(start, end, &query).await?;
            let paths = if *shortest {
                result.paths.into_iter().take(1).collect::<Vec<_>>()
            } else {
                result.paths
            };
            if paths.is_empty() {
                println!("no path within {max_hops} hop(s)");
            }
            for path in &paths {
                println!(
                    "{} (hops={}, score={:.3})",
                    explainer.explain(path).bold(),
                    path.hops,
                    path.score
                );
            }
        }

        Commands::Query { question } => {
            let mut service = NlQueryService::new(graph.0.clone());
            if let Some(chat) = &chat {
                service = service.with_chat(chat.clone());
            }
            let response = service
                .query(question)
                .await
                .map_err(|e| anyhow!(e.to_string()))?;
            println!("{} {}", "cypher:".dimmed(), response.graph_query);
            for row in &response.results {
                println!("{row}");
            }
            println!(
                "{} {} result(s), confidence {:.2}, {} ms",
                "done:".green(),
                response.results.len(),
                response.confidence,
                response.execution_time_ms
            );
        }

        Commands::Check { claim } => {
            let mut checker = ConsistencyChecker::new(graph.0.clone(), config.clone());
            if let Some(chat) = &chat {
                checker = checker.with_chat(chat.clone());
            }
            let claims = checker.extract_claims(claim).await;
            for fact in &claims {
                let result = checker.check(fact).await?;
                let verdict = if result.is_consistent {
                    "consistent".green()
                } else {
                    "inconsistent".red()
                };
                println!("{verdict} ({:.2}) {}", result.score, result.claim.text);
                for e in &result.supporting_evidence {
                    println!("  {} {:?}: {}", "+".green(), e.kind, e.detail);
                }
                for e in &result.contradicting_evidence {
                    println!("  {} {:?}: {}", "-".red(), e.kind, e.detail);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Arc<GraphConfig>> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            GraphConfig::from_json_str(&raw)?
        }
        None => GraphConfig::default(),
    };
    Ok(Arc::new(config))
}

type GraphHandles = (Arc<dyn GraphReader>, Arc<dyn GraphWriter>);

fn open_graph(cli: &Cli) -> Result<GraphHandles> {
    match &cli.graph_url {
        Some(url) => {
            let store = Arc::new(CypherGraphStore::new(url, &cli.graph_db)?);
            Ok((store.clone(), store))
        }
        None => {
            let store = Arc::new(MemoryGraph::new());
            Ok((store.clone(), store))
        }
    }
}

/// The chat endpoint behind its limiter/breaker pair. One pair per
/// endpoint, shared by every service in this process.
fn build_chat(cli: &Cli) -> Result<Option<Arc<dyn ChatModel>>> {
    let url = cli
        .llm_url
        .clone()
        .or_else(|| std::env::var("SCIGRAPH_LLM_URL").ok());
    let Some(url) = url else {
        return Ok(None);
    };
    let mut client_config = ChatClientConfig::new(url, cli.llm_model.clone());
    if let Ok(key) = std::env::var("SCIGRAPH_LLM_API_KEY") {
        client_config = client_config.with_api_key(key);
    }
    let inner = Arc::new(HttpChatModel::new(client_config)?);
    let guarded = GuardedChatModel::new(
        inner,
        Arc::new(RateLimiter::token_bucket(20, 5.0)),
        Arc::new(CircuitBreaker::new(
            "llm",
            BreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
            },
        )),
    );
    Ok(Some(Arc::new(guarded)))
}
