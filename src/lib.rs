//! Chatbot médico RAG: ingesta de PDFs en Pinecone y respuestas fundamentadas
//! con un LLM alojado.

pub mod api;
pub mod app_state;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod models;
pub mod pinecone_client;
pub mod rag;
pub mod vector_store;

#[cfg(test)]
mod testing;
