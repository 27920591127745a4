use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use medibot::{
    api,
    app_state::AppState,
    config::{self, EMBEDDING_DIMENSION},
    embeddings::{Embedder, FastEmbedder},
    llm::RigChat,
    logging,
    memory::ConversationStore,
    pinecone_client::PineconeClient,
    rag::RagPipeline,
    vector_store::{PineconeStore, Retriever},
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    logging::init();

    // 2. Cargar configuración (falla al arrancar si falta algo)
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Modelo de embeddings: un fallo aquí es fatal
    let embedder = Arc::new(
        FastEmbedder::load(&cfg.pipeline.embedding_cache_dir, EMBEDDING_DIMENSION)
            .context("Error cargando el modelo de embeddings")?,
    );

    // 4. Conectar al índice existente en Pinecone
    let pinecone = PineconeClient::new(&cfg.pinecone)?;
    let index = pinecone
        .describe_index(&cfg.pinecone.index_name)
        .await?
        .with_context(|| {
            format!(
                "El índice '{}' no existe; ejecuta primero `store_index`",
                cfg.pinecone.index_name
            )
        })?;
    index.check_compatible(embedder.dimension())?;
    info!("Conectado al índice '{}' ({}).", index.name, index.host);
    let store = Arc::new(PineconeStore::new(
        pinecone,
        &index,
        cfg.pinecone.namespace.clone(),
    )?);

    // 5. Pipeline RAG con memoria opcional
    let chat = Arc::new(RigChat::from_config(&cfg.chat)?);
    let memory = cfg
        .memory_enabled
        .then(|| Arc::new(ConversationStore::with_max_sessions(cfg.max_sessions)));
    let retriever = Retriever::new(embedder, store, cfg.pipeline.top_k);
    let pipeline = RagPipeline::new(retriever, chat, memory);
    info!(
        "Pipeline listo (top_k = {}, memoria = {}).",
        cfg.pipeline.top_k, cfg.memory_enabled
    );

    // 6. Router de la aplicación y ficheros estáticos
    let app_state = AppState {
        pipeline: Arc::new(pipeline),
    };
    let app = Router::new()
        .merge(api::create_router(app_state))
        .nest_service("/static", ServeDir::new("frontend/static"))
        .layer(TraceLayer::new_for_http());

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Señal de apagado recibida, iniciando cierre del servidor.");
}
