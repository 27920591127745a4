//! Troceado de las páginas filtradas en ventanas solapadas de tamaño acotado.
//!
//! El corte es recursivo por niveles semánticos (párrafo, frase, palabra y,
//! en último caso, carácter): se intenta siempre el nivel más grueso que
//! quepa en la capacidad configurada. El tamaño se mide en caracteres.

use anyhow::{Context, Result};
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tracing::debug;

use crate::models::{Chunk, PageRecord};

pub struct Chunker {
    splitter: TextSplitter<Characters>,
    max_chars: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self> {
        anyhow::ensure!(max_chars > 0, "el tamaño máximo de chunk debe ser mayor que 0");
        let config = ChunkConfig::new(max_chars)
            .with_overlap(overlap)
            .with_context(|| {
                format!("solapamiento {overlap} inválido para chunks de {max_chars} caracteres")
            })?;

        Ok(Self {
            splitter: TextSplitter::new(config),
            max_chars,
            overlap,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Ventanas de un texto junto a su offset en bytes dentro del texto de entrada.
    pub fn windows<'s, 't: 's>(
        &'s self,
        text: &'t str,
    ) -> impl Iterator<Item = (usize, &'t str)> + 's {
        self.splitter.chunk_indices(text)
    }

    /// Trocea cada página conservando su `page_no`.
    pub fn split(&self, pages: &[PageRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            let before = chunks.len();
            chunks.extend(self.windows(&page.text).map(|(_, text)| Chunk {
                page_no: page.page_no,
                text: text.to_string(),
            }));
            debug!(page_no = page.page_no, chunks = chunks.len() - before, "Página troceada");
        }
        chunks
    }
}
