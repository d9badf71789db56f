use chrono::Utc;
use clap::{Parser, Subcommand};
use compliance_rag_core::{
    ChatEngine, DocumentProcessor, GeminiEmbedder, GeminiGenerator, LopdfExtractor,
};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "compliance-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding uploaded PDFs, the vector index, and metadata.
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Embedding model name.
    #[arg(long, default_value = "embedding-001")]
    embedding_model: String,

    /// Completion model name.
    #[arg(long, default_value = "gemini-1.5-pro")]
    completion_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF file into the document store.
    Ingest {
        /// Path of the PDF to ingest.
        file: String,
        /// Store the document under this name instead of the file's own.
        #[arg(long)]
        name: Option<String>,
    },
    /// List all ingested documents.
    List,
    /// Delete a document and rebuild the index.
    Delete {
        /// Document id as shown by `list`.
        doc_id: String,
    },
    /// Rebuild the vector index from the stored PDFs.
    Rebuild,
    /// Retrieve the chunks most relevant to a query.
    Search {
        /// Search query.
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Ask a question and get a grounded, cited answer.
    Ask {
        /// The question to answer from the document collection.
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = GeminiEmbedder::new(cli.api_key.clone(), cli.embedding_model.clone());
    let mut processor = DocumentProcessor::open(&cli.data_dir, embedder, LopdfExtractor)
        .await
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %cli.data_dir,
        started_at = %Utc::now().to_rfc3339(),
        "compliance-rag boot"
    );

    match cli.command {
        Command::Ingest { file, name } => {
            let bytes = std::fs::read(&file)?;
            let fallback = Path::new(&file)
                .file_name()
                .and_then(|name| name.to_str())
                .map(ToString::to_string);
            let filename = name.or(fallback);

            let record = processor
                .ingest(&bytes, filename.as_deref())
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "ingested {} as {} ({} chunks)",
                record.filename, record.doc_id, record.chunk_count
            );
        }
        Command::List => {
            if processor.documents().is_empty() {
                println!("no documents ingested yet");
            }
            for (doc_id, record) in processor.documents() {
                println!(
                    "{doc_id}  {}  chunks={}  uploaded={}",
                    record.filename,
                    record.chunk_count,
                    record.uploaded_at.to_rfc3339()
                );
            }
        }
        Command::Delete { doc_id } => {
            processor
                .delete(&doc_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("deleted {doc_id}");
        }
        Command::Rebuild => {
            processor
                .rebuild_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("index rebuilt for {} document(s)", processor.documents().len());
        }
        Command::Search { query, top_k } => {
            let hits = processor.search(&query, top_k).await;
            if hits.is_empty() {
                println!("no results");
            }
            for hit in hits {
                println!(
                    "score={:.4} source={} doc_id={}",
                    hit.score, hit.source, hit.doc_id
                );
                println!("  {}", hit.text);
            }
        }
        Command::Ask { question } => {
            let generator = GeminiGenerator::new(cli.api_key.clone(), cli.completion_model.clone());
            let mut engine = ChatEngine::new(generator);

            let reply = engine.respond(&processor, &question).await;
            println!("{}", reply.answer);

            if !reply.sources.is_empty() {
                println!();
                println!("sources:");
                for source in reply.sources {
                    println!(
                        "  {} (score={:.4}, doc_id={})",
                        source.source, source.score, source.doc_id
                    );
                }
            }
        }
    }

    Ok(())
}
