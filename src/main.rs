//! # ragstack CLI
//!
//! Operator interface for the ragstack service.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragstack init` | Create the SQLite database and run schema migrations |
//! | `ragstack serve` | Start the HTTP API server |
//! | `ragstack project create <name>` | Create a project for a company |
//! | `ragstack project list` | List a company's projects |
//! | `ragstack ingest <file>` | Ingest a local file and wait for completion |
//! | `ragstack search "<query>"` | Run a similarity query against a project |
//!
//! ## Examples
//!
//! ```bash
//! ragstack --config ./config/ragstack.toml init
//! ragstack --config ./config/ragstack.toml project create "Handbook" --company acme
//! ragstack --config ./config/ragstack.toml ingest ./handbook.pdf --project <id> --company acme
//! ragstack --config ./config/ragstack.toml search "vacation policy" --project <id>
//! ragstack --config ./config/ragstack.toml serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use ragstack::blob::FsBlobStore;
use ragstack::embedding::{Embedder, EmbeddingClient};
use ragstack::ingest::{Ingestor, UploadRequest};
use ragstack::search::SearchService;
use ragstack::store::{SqliteStore, Store};
use ragstack::{config, db, migrate, models, server};

/// ragstack — multi-tenant RAG document ingestion and semantic search.
#[derive(Parser)]
#[command(
    name = "ragstack",
    about = "Multi-tenant RAG document ingestion and semantic search service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragstack.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (projects, documents, document_chunks). Idempotent.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Ingest a local file through the full pipeline, waiting for
    /// completion. Failures are recorded on the document and reported.
    Ingest {
        /// Path to the file to ingest (pdf, txt, md, csv).
        file: PathBuf,

        /// Project the document belongs to.
        #[arg(long)]
        project: String,

        /// Tenant the project belongs to.
        #[arg(long)]
        company: String,
    },

    /// Run a similarity query against a project's ready documents.
    Search {
        /// The query string.
        query: String,

        /// Project to search in.
        #[arg(long)]
        project: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project.
    Create {
        /// Project name.
        name: String,
        /// Tenant the project belongs to.
        #[arg(long)]
        company: String,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },
    /// List a company's projects.
    List {
        /// Tenant to list projects for.
        #[arg(long)]
        company: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragstack=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Project { action } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);
            match action {
                ProjectAction::Create {
                    name,
                    company,
                    description,
                } => {
                    let now = chrono::Utc::now().timestamp();
                    let project = models::Project {
                        id: Uuid::new_v4().to_string(),
                        company_id: company,
                        name,
                        description,
                        created_at: now,
                        updated_at: now,
                    };
                    store.create_project(&project).await?;
                    println!("project created");
                    println!("  id: {}", project.id);
                    println!("  name: {}", project.name);
                }
                ProjectAction::List { company } => {
                    let projects = store.list_projects(&company).await?;
                    if projects.is_empty() {
                        println!("No projects.");
                    }
                    for project in projects {
                        let stats = store.project_stats(&project.id).await?;
                        println!("{}  {}", project.id, project.name);
                        println!(
                            "    documents: {} ({} ready)",
                            stats.document_count, stats.ready_documents
                        );
                    }
                }
            }
            store.pool().close().await;
        }
        Commands::Ingest {
            file,
            project,
            company,
        } => {
            let pool = db::connect(&cfg).await?;
            let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
            let blobs = Arc::new(FsBlobStore::new(cfg.storage.root.clone()));
            let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&cfg.embedding)?);
            let ingestor = Ingestor::new(store, blobs, embedder, cfg.chunking.clone());

            let bytes = std::fs::read(&file)?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let req = UploadRequest {
                file_name,
                content_type: None,
                bytes,
                project_id: project,
                company_id: company,
            };

            let (doc, bytes) = ingestor.accept_upload(req).await?;
            println!("ingest {}", doc.name);
            println!("  document: {}", doc.id);
            let count = ingestor.process_document(&doc, &bytes).await?;
            println!("  chunks embedded: {}", count);
            println!("  status: ready");
            println!("ok");
        }
        Commands::Search {
            query,
            project,
            limit,
        } => {
            let pool = db::connect(&cfg).await?;
            let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
            let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&cfg.embedding)?);
            let service = SearchService::new(store, embedder, cfg.search.match_threshold);

            let results = service
                .search(&query, &project, limit.unwrap_or(cfg.search.default_limit))
                .await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} / {} (chunk {})",
                    i + 1,
                    result.similarity,
                    result.project_name,
                    result.document_name,
                    result.chunk_index
                );
                let excerpt: String = result.content.chars().take(240).collect();
                println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
                println!("    chunk id: {}", result.chunk_id);
                println!();
            }
        }
    }

    Ok(())
}
