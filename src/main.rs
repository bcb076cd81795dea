use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use ragdesk_backend::classifier::{predict_csv, PredictionOptions};
use ragdesk_backend::core::config::{ConfigService, Settings};
use ragdesk_backend::core::logging;
use ragdesk_backend::rag::{Indexer, VectorIndex};
use ragdesk_backend::server::router::{chatbot_router, classifier_router};
use ragdesk_backend::state::{self, ChatbotState, ClassifierState};

const SMOKE_QUERY: &str = "Apple releases new iPhone with AI features";

#[derive(Debug, Parser)]
#[command(name = "ragdesk", version, about = "RAG news classifier and stateful chatbot")]
struct Cli {
    /// Path to config.yml (falls back to RAGDESK_CONFIG_PATH, then ./config.yml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the news classifier API.
    Classifier(ServeArgs),
    /// Serve the chatbot API.
    Chatbot(ServeArgs),
    /// Embed the labeled training set into the vector index.
    InitVectorstore {
        #[arg(long, default_value = "dataset/train.csv")]
        dataset: PathBuf,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        /// Drop and rebuild the collection.
        #[arg(long)]
        recreate: bool,
    },
    /// Classify a CSV of articles and write a labeled copy.
    Predict {
        #[arg(long, default_value = "dataset/test.csv")]
        test_file: PathBuf,
        #[arg(long, default_value = "test_predictions.csv")]
        output: PathBuf,
        #[arg(long, default_value_t = 10)]
        batch_size: usize,
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        #[arg(long, default_value_t = 2)]
        requests_per_second: u32,
    },
}

#[derive(Debug, clap::Args)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConfigService::new(cli.config.clone());
    let mut settings = config
        .load_settings()
        .with_context(|| format!("Failed to load {}", config.config_path().display()))?;

    let stem = match &cli.command {
        Command::Classifier(_) => "classifier",
        Command::Chatbot(_) => "chatbot",
        Command::InitVectorstore { .. } => "init_vectorstore",
        Command::Predict { .. } => "predictions",
    };
    logging::init(&settings.logging.log_dir, stem);

    if let Ok(value) = serde_json::to_value(&settings) {
        tracing::debug!(config = %config.redact_sensitive_values(&value), "configuration loaded");
    }

    match cli.command {
        Command::Classifier(args) => {
            args.apply(&mut settings);
            run_classifier(settings).await
        }
        Command::Chatbot(args) => {
            args.apply(&mut settings);
            run_chatbot(settings).await
        }
        Command::InitVectorstore {
            dataset,
            batch_size,
            recreate,
        } => init_vectorstore(settings, dataset, batch_size, recreate).await,
        Command::Predict {
            test_file,
            output,
            batch_size,
            concurrency,
            requests_per_second,
        } => {
            let options = PredictionOptions {
                batch_size,
                concurrency,
                requests_per_second,
            };
            predict(settings, test_file, output, options).await
        }
    }
}

impl ServeArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

async fn bind(settings: &Settings) -> anyhow::Result<TcpListener> {
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

async fn run_classifier(settings: Settings) -> anyhow::Result<()> {
    let state = ClassifierState::initialize(&settings)
        .await
        .context("Failed to initialize classifier")?;

    let collection = &settings.classifier.collection_name;
    match state.index.collection_info(collection).await {
        Ok(Some(info)) => tracing::info!(
            collection = %info.name,
            vectors = info.total_vectors,
            "vector index ready"
        ),
        Ok(None) => tracing::warn!(
            collection = %collection,
            "collection missing; run `ragdesk init-vectorstore` before classifying"
        ),
        Err(err) => tracing::warn!("vector index check failed: {}", err),
    }

    let listener = bind(&settings).await?;
    let app = classifier_router(state.clone(), &settings.server);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown().await;
    Ok(())
}

async fn run_chatbot(settings: Settings) -> anyhow::Result<()> {
    let state = ChatbotState::initialize(&settings)
        .await
        .context("Failed to initialize chatbot")?;

    let listener = bind(&settings).await?;
    let app = chatbot_router(state.clone(), &settings.server);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown().await;
    Ok(())
}

async fn init_vectorstore(
    settings: Settings,
    dataset: PathBuf,
    batch_size: usize,
    recreate: bool,
) -> anyhow::Result<()> {
    let provider = state::build_provider(&settings)?;
    let index = state::open_vector_index(&settings).await?;
    let collection = settings.classifier.collection_name.clone();

    let indexer = Indexer::new(
        state::build_embedder(&settings, provider.clone()),
        index.clone(),
        collection.clone(),
    );
    let report = indexer
        .index_csv(&dataset, batch_size, recreate)
        .await
        .with_context(|| format!("Failed to index {}", dataset.display()))?;
    println!(
        "Indexed {} articles in {} batches ({} rows skipped)",
        report.indexed, report.batches, report.skipped
    );

    if let Some(info) = index.collection_info(&collection).await? {
        println!(
            "Collection '{}': {} vectors, dimension {}, status {}",
            info.name, info.total_vectors, info.dimension, info.status
        );
    }

    let query = state::build_embedder(&settings, provider).embed(SMOKE_QUERY).await?;
    let hits = index.search(&collection, &query, 3, None).await?;
    println!("Smoke query: {}", SMOKE_QUERY);
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{}] {:.3} {}",
            rank + 1,
            hit.example.label,
            hit.score,
            hit.example.text.chars().take(80).collect::<String>()
        );
    }

    index.close().await;
    Ok(())
}

async fn predict(
    settings: Settings,
    input: PathBuf,
    output: PathBuf,
    options: PredictionOptions,
) -> anyhow::Result<()> {
    let provider = state::build_provider(&settings)?;
    let index = state::open_vector_index(&settings).await?;
    let pipeline = state::build_classifier_pipeline(&settings, provider, index.clone());

    let summary = predict_csv(&pipeline, &input, &output, &options)
        .await
        .with_context(|| format!("Failed to classify {}", input.display()))?;

    println!(
        "Classified {}/{} articles in {:.1}s ({} failed), written to {}",
        summary.classified,
        summary.total,
        summary.elapsed.as_secs_f64(),
        summary.failed,
        output.display()
    );
    println!("Label distribution:");
    for (category, count) in &summary.distribution {
        println!("  {} ({}): {}", category.label(), category, count);
    }

    index.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to listen for SIGTERM: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
