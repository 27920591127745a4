//! Ingesta offline: lee los PDFs, los trocea y embebe, y los inserta en el
//! índice de Pinecone (creándolo si no existe).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use medibot::{
    config::{IngestConfig, EMBEDDING_DIMENSION},
    embeddings::{Embedder, FastEmbedder},
    ingest, logging,
    pinecone_client::PineconeClient,
    vector_store::PineconeStore,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "store_index", about = "Indexa un directorio de PDFs médicos en Pinecone")]
struct Args {
    /// Directorio con los PDFs (por defecto PDF_DIR o `pdfs`).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Borra y vuelve a crear el índice antes de insertar.
    #[arg(long)]
    recreate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();
    let args = Args::parse();

    let cfg = IngestConfig::from_env().context("Error al cargar la configuración")?;
    let pdf_dir = args.dir.unwrap_or_else(|| cfg.pipeline.pdf_dir.clone());
    let index_name = &cfg.pinecone.index_name;

    let embedder = FastEmbedder::load(&cfg.pipeline.embedding_cache_dir, EMBEDDING_DIMENSION)
        .context("Error cargando el modelo de embeddings")?;

    let pinecone = PineconeClient::new(&cfg.pinecone)?;
    if args.recreate {
        warn!("Recreando el índice '{index_name}': se perderán los vectores existentes.");
        pinecone.delete_index(index_name).await?;
    }
    let index = pinecone.ensure_index(index_name, embedder.dimension()).await?;
    let store = PineconeStore::new(pinecone, &index, cfg.pinecone.namespace.clone())?;

    info!("Indexando PDFs de {} en '{index_name}'...", pdf_dir.display());
    let summary = ingest::ingest_directory(&cfg.pipeline, &pdf_dir, &embedder, &store).await?;
    info!("¡Indexación completada! {summary}");
    Ok(())
}
