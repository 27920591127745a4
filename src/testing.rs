//! Dobles de prueba: embedder determinista, índice en memoria y chat guionizado.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::EMBEDDING_DIMENSION;
use crate::embeddings::Embedder;
use crate::llm::{ChatModel, ComposedPrompt, DECLINE_CONVERSATIONAL, DECLINE_STATELESS};
use crate::models::{Embedding, IndexRecord, RetrievedChunk};
use crate::vector_store::{cosine_similarity, Retriever, VectorIndex};

pub const MEDICAL_CORPUS: &[&str] = &[
    "Hypertension, or high blood pressure, is a condition in which the force of the blood \
     against the artery walls is too high.",
    "Diabetes mellitus is a group of metabolic disorders characterized by high blood sugar levels.",
    "Asthma is a chronic inflammatory disease of the airways of the lungs.",
    "Migraine is a primary headache disorder characterized by recurrent headaches.",
];

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Bolsa de palabras proyectada por hash: mismo texto, mismo vector.
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
        }
    }
}

impl HashEmbedder {
    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Índice coseno exhaustivo en memoria.
#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<Vec<IndexRecord>>,
}

impl MemoryIndex {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let mut scored: Vec<RetrievedChunk> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| RetrievedChunk {
                text: r.text.clone(),
                page_no: Some(r.page_no),
                score: cosine_similarity(vector, &r.values),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Simula un LLM obediente: responde con el párrafo del contexto que
/// menciona la pregunta, o con la frase de rechazo de la instrucción.
#[derive(Default)]
pub struct ScriptedChat {
    prompts: Mutex<Vec<ComposedPrompt>>,
    fail: bool,
}

impl ScriptedChat {
    pub fn failing() -> Self {
        Self {
            prompts: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<ComposedPrompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &ComposedPrompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if self.fail {
            bail!("upstream unavailable");
        }

        let question = prompt
            .user
            .rsplit_once("Current question: ")
            .map(|(_, q)| q)
            .unwrap_or(&prompt.user);
        let context = prompt
            .system
            .split_once("\n\n")
            .map(|(_, ctx)| ctx)
            .unwrap_or("");
        let keywords: Vec<String> = tokens(question).filter(|t| t.len() >= 5).collect();

        let grounded = context.split("\n\n").find(|paragraph| {
            let words: Vec<String> = tokens(paragraph).collect();
            keywords.iter().any(|k| words.contains(k))
        });

        Ok(match grounded {
            Some(paragraph) => format!("According to the documents: {paragraph}"),
            None if prompt.system.contains(DECLINE_CONVERSATIONAL) => {
                DECLINE_CONVERSATIONAL.to_string()
            }
            None => DECLINE_STATELESS.to_string(),
        })
    }
}

/// Recuperador top-3 sobre `MEDICAL_CORPUS`.
pub async fn seeded_retriever() -> Retriever {
    let embedder = Arc::new(HashEmbedder::default());
    let index = Arc::new(MemoryIndex::default());
    let texts: Vec<String> = MEDICAL_CORPUS.iter().map(|t| t.to_string()).collect();
    let vectors = embedder.embed_documents(&texts).await.unwrap();
    let records: Vec<IndexRecord> = texts
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, values))| IndexRecord {
            id: Uuid::new_v4().to_string(),
            values,
            text,
            page_no: i + 1,
        })
        .collect();
    index.upsert(&records).await.unwrap();
    Retriever::new(embedder, index, 3)
}
