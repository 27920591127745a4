//! Abstracción sobre Rig para hablar con el endpoint de chat alojado
//! (compatible con OpenAI; por defecto el router de Hugging Face).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rig::agent::AgentBuilder;
// Trait para client.completion_model(...)
use rig::client::CompletionClient as _;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use crate::config::ChatConfig;

pub const DECLINE_STATELESS: &str = "I don't know";
pub const DECLINE_CONVERSATIONAL: &str =
    "I don't have information about that in my knowledge base";

const STATELESS_PROMPT: &str = "You are a helpful medical assistant that answers questions about \
medical conditions based on retrieved documents. \
Use only the following retrieved documents to answer the user's question accurately. \
If the retrieved documents do not contain relevant information, respond with 'I don't know'. \
Never hallucinate or make up medical information. Always base your answers on the retrieved documents. \
Keep the answer concise, empathetic and professional.";

const CONVERSATIONAL_PROMPT: &str = "You are a helpful medical assistant that answers questions \
about medical conditions based on retrieved documents. \
You have access to conversation history from the current session. \
Use the following retrieved documents to answer the user's question accurately. \
When relevant, reference previous parts of the conversation to provide consistent and contextual responses. \
If the retrieved documents do not contain relevant information, respond with \
'I don't have information about that in my knowledge base'. \
Never hallucinate or make up medical information. Always base your answers on the retrieved documents. \
Be empathetic and professional in your responses.";

/// Variante de instrucción de sistema. Cada una tiene su frase de rechazo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    Stateless,
    Conversational,
}

impl PromptVariant {
    pub fn for_memory(memory_enabled: bool) -> Self {
        if memory_enabled {
            Self::Conversational
        } else {
            Self::Stateless
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Stateless => STATELESS_PROMPT,
            Self::Conversational => CONVERSATIONAL_PROMPT,
        }
    }

    pub fn decline_phrase(self) -> &'static str {
        match self {
            Self::Stateless => DECLINE_STATELESS,
            Self::Conversational => DECLINE_CONVERSATIONAL,
        }
    }
}

/// Prompt final: mensaje de sistema (instrucción + contexto) y mensaje del usuario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Devuelve el texto generado tal cual.
    async fn complete(&self, prompt: &ComposedPrompt) -> Result<String>;
}

/// Cliente de chat sobre `rig` usando la API de chat completions.
pub struct RigChat {
    client: openai::Client,
    model: String,
    timeout: Option<std::time::Duration>,
}

impl RigChat {
    pub fn from_config(cfg: &ChatConfig) -> Result<Self> {
        if cfg.model.trim().is_empty() {
            return Err(anyhow!("CHAT_MODEL no puede estar vacío"));
        }
        let base_url = cfg.base_url.as_str().trim_end_matches('/');
        let client = openai::Client::builder(&cfg.api_token)
            .base_url(base_url)
            .build();

        Ok(Self {
            client,
            model: cfg.model.clone(),
            timeout: cfg.timeout,
        })
    }
}

#[async_trait]
impl ChatModel for RigChat {
    async fn complete(&self, prompt: &ComposedPrompt) -> Result<String> {
        // El router de Hugging Face sólo expone /chat/completions.
        let model = self.client.completion_model(&self.model).completions_api();
        let agent = AgentBuilder::new(model).preamble(&prompt.system).build();

        debug!(model = %self.model, "Llamando al modelo de chat");
        let request = agent.prompt(prompt.user.as_str());
        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .with_context(|| format!("El modelo de chat no respondió en {limit:?}"))??,
            None => request.await?,
        };
        Ok(answer)
    }
}
