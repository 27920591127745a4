//! Consulta RAG: recuperar contexto de Pinecone y responder con el LLM.
//!
//! Flujo:
//!   1. Embedding de la pregunta y búsqueda top-k en el índice vectorial.
//!   2. Composición del prompt: instrucción de sistema + chunks recuperados
//!      + historial de la sesión (si la memoria está activa) + pregunta.
//!   3. El LLM responde; la respuesta se devuelve tal cual.
//!   4. Se guarda el turno en la memoria de la sesión.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    llm::{ChatModel, ComposedPrompt, PromptVariant},
    memory::ConversationStore,
    models::RetrievedChunk,
    vector_store::Retriever,
};

/// Construye el prompt final a partir de sus piezas.
pub fn compose_prompt(
    variant: PromptVariant,
    chunks: &[RetrievedChunk],
    history: &str,
    question: &str,
) -> ComposedPrompt {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    let system = if context.is_empty() {
        variant.instruction().to_string()
    } else {
        format!("{}\n\n{}", variant.instruction(), context)
    };

    let user = if history.is_empty() {
        question.to_string()
    } else {
        format!("Conversation history:\n{history}\nCurrent question: {question}")
    };

    ComposedPrompt { system, user }
}

pub struct RagPipeline {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
    variant: PromptVariant,
    memory: Option<Arc<ConversationStore>>,
}

impl RagPipeline {
    /// `memory = None` desactiva el historial y selecciona la variante sin estado.
    pub fn new(
        retriever: Retriever,
        chat: Arc<dyn ChatModel>,
        memory: Option<Arc<ConversationStore>>,
    ) -> Self {
        Self {
            retriever,
            chat,
            variant: PromptVariant::for_memory(memory.is_some()),
            memory,
        }
    }

    pub fn variant(&self) -> PromptVariant {
        self.variant
    }

    /// Responde a una pregunta dentro de una sesión.
    pub async fn rag_query(&self, question: &str, session_id: &str) -> Result<String> {
        info!(session = session_id, "Pregunta recibida: {question}");

        let Some(store) = &self.memory else {
            return self.answer(question, "").await;
        };

        let result = {
            // El candado se mantiene hasta guardar el turno.
            let session = store.session(session_id);
            let mut memory = session.lock().await;
            let history = memory.load();
            let result = self.answer(question, &history).await;
            if let Ok(answer) = &result {
                memory.save(question, answer);
                debug!(session = session_id, turns = memory.len(), "Turno guardado");
            }
            result
        };

        // Una sesión nueva cuya primera pregunta falla no se conserva.
        if result.is_err() {
            store.discard_if_empty(session_id);
        }
        result
    }

    async fn answer(&self, question: &str, history: &str) -> Result<String> {
        let chunks = self.retriever.retrieve(question).await?;
        if chunks.is_empty() {
            info!("Sin contexto recuperado; se responde con la frase de rechazo.");
            return Ok(self.variant.decline_phrase().to_string());
        }

        let prompt = compose_prompt(self.variant, &chunks, history, question);
        let answer = self.chat.complete(&prompt).await?;
        info!(chunks = chunks.len(), answer_chars = answer.chars().count(), "Respuesta generada");
        Ok(answer)
    }
}
