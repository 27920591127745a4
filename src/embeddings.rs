//! Embeddings locales con `fastembed` (`all-MiniLM-L6-v2`, 384 dimensiones).
//!
//! El modelo se carga una única vez por proceso y se comparte (vía `Arc`)
//! entre la ingesta y las consultas, de modo que chunks y preguntas se
//! proyectan en el mismo espacio.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::models::Embedding;

pub const MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Convierte texto en vectores de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar embedding de la pregunta"))
    }
}

pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedder {
    /// Carga el modelo (descargándolo a `cache_dir` la primera vez).
    /// Un fallo aquí es fatal: no hay modelo alternativo.
    pub fn load(cache_dir: &Path, dimension: usize) -> Result<Self> {
        info!("Cargando modelo de embeddings {MODEL_NAME}...");
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .with_context(|| format!("No se pudo cargar el modelo {MODEL_NAME}"))?;
        info!("Modelo de embeddings listo ({dimension} dimensiones).");

        Ok(Self {
            model: Arc::new(model),
            dimension,
            batch_size: 64,
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let batch = texts.to_vec();
        let batch_size = self.batch_size;
        // La inferencia es CPU intensiva: fuera del runtime async.
        let vectors = tokio::task::spawn_blocking(move || model.embed(batch, Some(batch_size)))
            .await
            .context("La tarea de embeddings terminó de forma inesperada")??;

        check_shape(texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }
}

/// Comprueba que hay un vector por texto y que todos tienen la dimensión esperada.
pub(crate) fn check_shape(expected: usize, dimension: usize, vectors: &[Embedding]) -> Result<()> {
    if vectors.len() != expected {
        return Err(anyhow!(
            "Número de embeddings ({}) distinto al número de textos ({})",
            vectors.len(),
            expected
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(anyhow!(
            "Embedding de dimensión {} (se esperaba {dimension})",
            bad.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EMBEDDING_DIMENSION;
    use crate::testing::HashEmbedder;
    use crate::vector_store::cosine_similarity;

    #[test]
    fn shape_mismatches_are_errors() {
        assert!(check_shape(2, 3, &[vec![0.0; 3]]).is_err());
        assert!(check_shape(1, 3, &[vec![0.0; 4]]).is_err());
        assert!(check_shape(1, 3, &[vec![0.0; 3]]).is_ok());
    }

    #[tokio::test]
    async fn embedding_the_same_text_twice_is_identical() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_query("What is hypertension?").await.unwrap();
        let b = embedder.embed_query("What is hypertension?").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), embedder.dimension());
        assert_eq!(embedder.dimension(), EMBEDDING_DIMENSION);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    #[ignore = "descarga el modelo all-MiniLM-L6-v2"]
    async fn fastembed_is_deterministic_and_384_wide() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = FastEmbedder::load(dir.path(), EMBEDDING_DIMENSION).unwrap();
        let texts = vec!["Hypertension is high blood pressure.".to_string()];
        let a = embedder.embed_documents(&texts).await.unwrap();
        let b = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(a[0].len(), embedder.dimension());
        assert!((cosine_similarity(&a[0], &b[0]) - 1.0).abs() < 1e-5);
    }
}
