//! Carga y validación de la configuración de la aplicación (Pinecone + LLM + pipeline).
//!
//! Todo se lee una única vez al arrancar. Los valores obligatorios que falten
//! o los valores inválidos abortan el arranque en lugar de fallar más tarde
//! en mitad de una petición.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

use crate::memory::DEFAULT_MAX_SESSIONS;

/// Dimensión de `all-MiniLM-L6-v2`.
pub const EMBEDDING_DIMENSION: usize = 384;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CHAT_BASE_URL: &str = "https://router.huggingface.co/v1";
const DEFAULT_CHAT_MODEL: &str = "openai/gpt-oss-20b:groq";
const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";

/// Conexión con el índice vectorial gestionado (Pinecone).
#[derive(Clone, Debug)]
pub struct PineconeConfig {
    pub api_key: String,
    pub index_name: String,
    pub control_url: Url,
    pub cloud: String,
    pub region: String,
    pub namespace: Option<String>,
}

impl PineconeConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = required(lookup, "PINECONE_API_KEY")?;
        let index_name = required(lookup, "PINECONE_INDEX_NAME")?;
        let control_url = parse_url(
            "PINECONE_CONTROL_URL",
            &lookup("PINECONE_CONTROL_URL").unwrap_or_else(|| DEFAULT_CONTROL_URL.to_string()),
        )?;

        Ok(Self {
            api_key,
            index_name,
            control_url,
            cloud: lookup("PINECONE_CLOUD").unwrap_or_else(|| "aws".to_string()),
            region: lookup("PINECONE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            namespace: lookup("PINECONE_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
        })
    }
}

/// Endpoint de chat compatible con OpenAI.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub api_token: String,
    pub base_url: Url,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl ChatConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_token = required(lookup, "HUGGINGFACEHUB_API_TOKEN")?;
        let base_url = parse_url(
            "CHAT_BASE_URL",
            &lookup("CHAT_BASE_URL").unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
        )?;
        let model = lookup("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let timeout = parse_opt::<u64>(lookup, "CHAT_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            api_token,
            base_url,
            model,
            timeout,
        })
    }
}

/// Política de ingesta y recuperación.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub pdf_dir: PathBuf,
    pub pdf_recursive: bool,
    pub skip_first_page: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embedding_cache_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("pdfs"),
            pdf_recursive: false,
            skip_first_page: false,
            chunk_size: 500,
            chunk_overlap: 20,
            top_k: 3,
            embedding_cache_dir: PathBuf::from(".fastembed_cache"),
        }
    }
}

impl PipelineConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            pdf_dir: lookup("PDF_DIR").map(PathBuf::from).unwrap_or(defaults.pdf_dir),
            pdf_recursive: parse_opt(lookup, "PDF_RECURSIVE")?.unwrap_or(defaults.pdf_recursive),
            skip_first_page: parse_opt(lookup, "SKIP_FIRST_PAGE")?
                .unwrap_or(defaults.skip_first_page),
            chunk_size: parse_opt(lookup, "CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_opt(lookup, "CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            top_k: parse_opt(lookup, "TOP_K")?.unwrap_or(defaults.top_k),
            embedding_cache_dir: lookup("EMBEDDING_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.embedding_cache_dir),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE debe ser mayor que 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.top_k == 0 {
            bail!("TOP_K debe ser mayor que 0");
        }
        Ok(())
    }
}

/// Configuración completa del servidor.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub memory_enabled: bool,
    /// Sesiones de conversación conservadas a la vez.
    pub max_sessions: usize,
    pub pinecone: PineconeConfig,
    pub chat: ChatConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_addr =
            lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
        if server_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!("SERVER_ADDR no es una dirección válida: {server_addr}");
        }
        let max_sessions = parse_opt(&lookup, "MAX_SESSIONS")?.unwrap_or(DEFAULT_MAX_SESSIONS);
        if max_sessions == 0 {
            bail!("MAX_SESSIONS debe ser mayor que cero");
        }

        Ok(Self {
            server_addr,
            memory_enabled: parse_opt(&lookup, "MEMORY_ENABLED")?.unwrap_or(true),
            max_sessions,
            pinecone: PineconeConfig::from_lookup(&lookup)?,
            chat: ChatConfig::from_lookup(&lookup)?,
            pipeline: PipelineConfig::from_lookup(&lookup)?,
        })
    }
}

/// Configuración del proceso de ingesta; no necesita credenciales del LLM.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub pinecone: PineconeConfig,
    pub pipeline: PipelineConfig,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            pinecone: PineconeConfig::from_lookup(&lookup)?,
            pipeline: PipelineConfig::from_lookup(&lookup)?,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("Falta {key} en el entorno"))
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Valor inválido para {key}: {raw}")),
        _ => Ok(None),
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("{key} no es una URL válida: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("PINECONE_API_KEY", "pc-key"),
        ("PINECONE_INDEX_NAME", "medical-chatbot-index"),
        ("HUGGINGFACEHUB_API_TOKEN", "hf-token"),
    ];

    #[test]
    fn defaults_match_the_documented_policy() {
        let cfg = AppConfig::from_lookup(lookup_from(REQUIRED)).unwrap();
        assert_eq!(cfg.server_addr, "0.0.0.0:8080");
        assert!(cfg.memory_enabled);
        assert_eq!(cfg.max_sessions, 1000);
        assert_eq!(cfg.pipeline.chunk_size, 500);
        assert_eq!(cfg.pipeline.chunk_overlap, 20);
        assert_eq!(cfg.pipeline.top_k, 3);
        assert!(!cfg.pipeline.skip_first_page);
        assert!(!cfg.pipeline.pdf_recursive);
        assert_eq!(cfg.chat.model, "openai/gpt-oss-20b:groq");
        assert_eq!(cfg.chat.base_url.as_str(), "https://router.huggingface.co/v1");
        assert!(cfg.chat.timeout.is_none());
        assert_eq!(cfg.pinecone.cloud, "aws");
        assert_eq!(cfg.pinecone.region, "us-east-1");
        assert!(cfg.pinecone.namespace.is_none());
    }

    #[test]
    fn missing_required_variable_is_reported_by_name() {
        let err = AppConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("HUGGINGFACEHUB_API_TOKEN"));
    }

    #[test]
    fn blank_required_variable_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("PINECONE_API_KEY", "   ");
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("PINECONE_API_KEY"));
    }

    #[test]
    fn ingestion_does_not_need_the_chat_token() {
        let cfg = IngestConfig::from_lookup(lookup_from(&REQUIRED[..2])).unwrap();
        assert_eq!(cfg.pinecone.index_name, "medical-chatbot-index");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CHUNK_SIZE", "20"));
        pairs.push(("CHUNK_OVERLAP", "20"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn flags_and_numbers_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[
            ("SKIP_FIRST_PAGE", "TRUE"),
            ("MEMORY_ENABLED", "false"),
            ("TOP_K", "5"),
            ("CHAT_TIMEOUT_SECS", "30"),
            ("PINECONE_NAMESPACE", "guides"),
        ]);
        let cfg = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(cfg.pipeline.skip_first_page);
        assert!(!cfg.memory_enabled);
        assert_eq!(cfg.pipeline.top_k, 5);
        assert_eq!(cfg.chat.timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.pinecone.namespace.as_deref(), Some("guides"));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TOP_K", "three"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("TOP_K"));
    }

    #[test]
    fn session_limit_must_be_positive() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_SESSIONS", "0"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        pairs.pop();
        pairs.push(("MAX_SESSIONS", "50"));
        let cfg = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(cfg.max_sessions, 50);
    }

    #[test]
    fn invalid_server_addr_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SERVER_ADDR", "localhost"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
