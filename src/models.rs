//! Modelos de dominio (páginas, chunks, registros del índice y turnos de conversación).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Vector de embedding (384 componentes para el modelo configurado).
pub type Embedding = Vec<f32>;

/// Una página extraída de un PDF de origen, tal cual sale del cargador.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub source: PathBuf,
    /// Índice de página dentro del fichero, empezando en 0.
    pub page: usize,
    pub text: String,
}

/// Página que sobrevive al filtro. Sólo conserva número de página y texto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_no: usize,
    pub text: String,
}

/// Ventana de texto acotada lista para embeber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub page_no: usize,
    pub text: String,
}

/// Unidad persistida en el índice vectorial.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub values: Embedding,
    pub text: String,
    pub page_no: usize,
}

/// Resultado de una búsqueda por similitud.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub page_no: Option<usize>,
    pub score: f32,
}

/// Un intercambio pregunta/respuesta de la conversación.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}
