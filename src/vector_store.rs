//! Pinecone como vector store de los chunks, y el recuperador top-k.
//!
//! API pública:
//!   - `VectorIndex` (upsert / query), implementado por `PineconeStore`.
//!   - `Retriever::retrieve(&str)`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::embeddings::Embedder;
use crate::models::{IndexRecord, RetrievedChunk};
use crate::pinecone_client::{IndexDescription, PineconeClient};

/// Límite de vectores por petición de upsert.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Clave de metadatos donde se guarda el texto del chunk.
const TEXT_KEY: &str = "text";
const PAGE_KEY: &str = "page_no";

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserta los registros y devuelve cuántos aceptó el servicio.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize>;

    /// Los `top_k` vecinos más cercanos por similitud coseno, de mayor a menor.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

pub struct PineconeStore {
    client: PineconeClient,
    data_url: Url,
    namespace: Option<String>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl PineconeStore {
    pub fn new(
        client: PineconeClient,
        index: &IndexDescription,
        namespace: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            client,
            data_url: index.data_url()?,
            namespace,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self
            .data_url
            .join(path)
            .with_context(|| format!("Ruta de Pinecone inválida: {path}"))?;
        let response = self
            .client
            .authorize(self.client.http().post(url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Error llamando a Pinecone ({path})"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Pinecone respondió {status} en {path}: {text}"));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        let mut total = 0;
        for (batch_no, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let vectors: Vec<UpsertVector<'_>> = batch
                .iter()
                .map(|record| UpsertVector {
                    id: &record.id,
                    values: &record.values,
                    metadata: json!({ TEXT_KEY: record.text, PAGE_KEY: record.page_no }),
                })
                .collect();

            let mut body = json!({ "vectors": vectors });
            if let Some(ns) = &self.namespace {
                body["namespace"] = json!(ns);
            }

            let response: UpsertResponse = self.post("vectors/upsert", &body).await?.json().await?;
            total += response.upserted_count;
            debug!(batch = batch_no + 1, upserted = response.upserted_count, "Lote insertado");
        }
        info!("{total} vectores insertados en Pinecone.");
        Ok(total)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(ns) = &self.namespace {
            body["namespace"] = json!(ns);
        }

        let response: QueryResponse = self.post("query", &body).await?.json().await?;
        Ok(response.into_chunks())
    }
}

impl QueryResponse {
    /// Las coincidencias sin texto en los metadatos no sirven como contexto.
    fn into_chunks(self) -> Vec<RetrievedChunk> {
        self.matches
            .into_iter()
            .filter_map(|m| {
                let metadata = m.metadata?;
                let text = metadata.get(TEXT_KEY)?.as_str()?.to_string();
                let page_no = metadata
                    .get(PAGE_KEY)
                    .and_then(Value::as_f64)
                    .map(|p| p as usize);
                Some(RetrievedChunk {
                    text,
                    page_no,
                    score: m.score,
                })
            })
            .collect()
    }
}

/// Política de consulta fija: los `top_k` chunks más similares a la pregunta.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let query_vec = self.embedder.embed_query(question).await?;
        let mut results = self.index.query(&query_vec, self.top_k).await?;

        // Nunca más de k resultados, ordenados por score no creciente.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(self.top_k);
        debug!(results = results.len(), "Chunks recuperados");
        Ok(results)
    }
}

/// Similitud coseno; 0 si alguno de los vectores es nulo.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
