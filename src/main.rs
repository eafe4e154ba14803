//! Locus CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "locus")]
#[command(about = "Code graph indexing and hybrid retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (.toml, .yaml or .json); defaults plus LOCUS_* overrides otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the code graph and lexical index, then write both to the cache
    Index {
        /// Store embedding vectors inside the graph document
        #[arg(long)]
        inline_embeddings: bool,
    },
    /// Rank graph nodes against a free-text query
    Query {
        /// Query text
        text: String,

        /// Maximum number of matches
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only return nodes of these kinds (directory, file, class, function)
        #[arg(long = "kind", value_delimiter = ',')]
        kinds: Vec<String>,

        /// Only return nodes under this root-relative path
        #[arg(long)]
        path: Option<String>,

        /// Compute missing node embeddings before ranking
        #[arg(long)]
        on_demand: bool,
    },
    /// Print statistics for the cached graph
    Stats,
    /// Compute embeddings for every class and function ahead of queries
    Warm,
    /// Clear the cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env is not an error
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("locus={log_level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Index { inline_embeddings } => {
            commands::index(&cli.root, &config, inline_embeddings).await
        }
        Commands::Query {
            text,
            top_k,
            kinds,
            path,
            on_demand,
        } => {
            let options = commands::QueryOptions {
                top_k,
                kinds,
                path,
                on_demand,
            };
            commands::query(&cli.root, &config, &text, options).await
        }
        Commands::Stats => commands::stats(&cli.root, &config),
        Commands::Warm => commands::warm(&cli.root, &config).await,
        Commands::Clear => commands::clear(&cli.root, &config),
        Commands::Version => {
            println!("Locus v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
