//! Ingesta de un directorio de PDFs en el índice vectorial:
//! carga por páginas → filtro de páginas → troceado → embeddings → upsert.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use mime_guess::MimeGuess;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    chunking::Chunker,
    config::PipelineConfig,
    embeddings::Embedder,
    models::{IndexRecord, PageRecord, RawPage},
    vector_store::VectorIndex,
};

/// Textos por llamada al embedder durante la ingesta.
const EMBED_BATCH_SIZE: usize = 256;

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_loaded: usize,
    pub pages_loaded: usize,
    pub pages_kept: usize,
    pub chunks_created: usize,
    pub vectors_upserted: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} PDFs, {} páginas leídas, {} conservadas. {} chunks, {} vectores insertados.",
            self.files_loaded,
            self.pages_loaded,
            self.pages_kept,
            self.chunks_created,
            self.vectors_upserted
        )
    }
}

fn is_pdf(path: &Path) -> bool {
    MimeGuess::from_path(path)
        .first_raw()
        .is_some_and(|mime| mime == "application/pdf")
}

/// Lee todos los PDFs de `root` (sin recursión salvo que se pida) y devuelve
/// una entrada por página. Cualquier fichero ilegible aborta la carga.
pub fn load_pdfs(root: &Path, recursive: bool) -> Result<Vec<RawPage>> {
    if !root.is_dir() {
        return Err(anyhow!("La ruta no es un directorio: {}", root.display()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut pages = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Error recorriendo {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_pdf(path) {
            continue;
        }

        let texts = pdf_extract::extract_text_by_pages(path)
            .map_err(|e| anyhow!("No se pudo extraer texto del PDF {}: {e}", path.display()))?;
        info!("Cargado {} ({} páginas)", path.display(), texts.len());

        pages.extend(texts.into_iter().enumerate().map(|(page, text)| RawPage {
            source: path.to_path_buf(),
            page,
            text,
        }));
    }

    Ok(pages)
}

/// Descarta la página 0 de cada fichero si `skip_first_page` está activo y
/// deja sólo `page_no` y texto.
pub fn filter_pages(pages: Vec<RawPage>, skip_first_page: bool) -> Vec<PageRecord> {
    pages
        .into_iter()
        .filter(|page| !(skip_first_page && page.page == 0))
        .map(|page| PageRecord {
            page_no: page.page,
            text: page.text,
        })
        .collect()
}

/// Ejecuta la ingesta completa del directorio configurado.
pub async fn ingest_directory(
    cfg: &PipelineConfig,
    root: &Path,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestionSummary> {
    let root_dir = root.to_path_buf();
    let recursive = cfg.pdf_recursive;
    // La extracción de texto es síncrona y costosa: fuera del runtime async.
    let pages = tokio::task::spawn_blocking(move || load_pdfs(&root_dir, recursive))
        .await
        .context("La tarea de lectura de PDFs terminó de forma inesperada")??;

    let files_loaded = count_sources(&pages);
    let chunker = Chunker::new(cfg.chunk_size, cfg.chunk_overlap)?;
    let mut summary = ingest_pages(pages, &chunker, cfg.skip_first_page, embedder, index).await?;
    summary.files_loaded = files_loaded;
    Ok(summary)
}

/// Número de ficheros distintos de los que proceden las páginas.
fn count_sources(pages: &[RawPage]) -> usize {
    pages
        .iter()
        .map(|page| page.source.as_path())
        .collect::<HashSet<_>>()
        .len()
}

/// Filtra, trocea, embebe e inserta páginas ya cargadas.
pub async fn ingest_pages(
    pages: Vec<RawPage>,
    chunker: &Chunker,
    skip_first_page: bool,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestionSummary> {
    let mut summary = IngestionSummary {
        pages_loaded: pages.len(),
        ..Default::default()
    };

    let records = filter_pages(pages, skip_first_page);
    summary.pages_kept = records.len();
    if summary.pages_kept < summary.pages_loaded {
        info!(
            "Filtro de páginas: {} de {} páginas descartadas.",
            summary.pages_loaded - summary.pages_kept,
            summary.pages_loaded
        );
    }

    let chunks = chunker.split(&records);
    summary.chunks_created = chunks.len();
    info!(
        "{} chunks generados (máx. {} caracteres, solapamiento {}).",
        chunks.len(),
        chunker.max_chars(),
        chunker.overlap()
    );

    for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        let index_records: Vec<IndexRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| IndexRecord {
                id: Uuid::new_v4().to_string(),
                values,
                text: chunk.text.clone(),
                page_no: chunk.page_no,
            })
            .collect();

        summary.vectors_upserted += index.upsert(&index_records).await?;
        debug!(batch = batch_no + 1, size = batch.len(), "Lote de chunks indexado");
    }

    Ok(summary)
}
