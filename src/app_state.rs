use std::sync::Arc;

use crate::rag::RagPipeline;

/// Contexto de la aplicación, construido una vez en `main` y compartido por
/// todos los handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}
