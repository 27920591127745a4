//! Plano de control de Pinecone: describir, crear y borrar el índice.
//!
//! API pública:
//!   - `PineconeClient::new(&PineconeConfig)`
//!   - `ensure_index(name, dimension)` (idempotente)
//!   - `describe_index(name)` / `delete_index(name)`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::config::PineconeConfig;

const API_VERSION: &str = "2024-07";
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READY_MAX_POLLS: u32 = 60;
const INDEX_METRIC: &str = "cosine";

#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

impl IndexDescription {
    /// URL base del plano de datos de este índice.
    pub fn data_url(&self) -> Result<Url> {
        let raw = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        Url::parse(&raw).with_context(|| format!("Host de índice inválido: {}", self.host))
    }

    /// Comprueba que el índice sirve para el modelo de embeddings:
    /// misma dimensión y métrica coseno.
    pub fn check_compatible(&self, dimension: usize) -> Result<()> {
        if self.dimension != dimension {
            bail!(
                "El índice '{}' existe con dimensión {} (se esperaba {dimension})",
                self.name,
                self.dimension
            );
        }
        if self.metric != INDEX_METRIC {
            bail!(
                "El índice '{}' usa la métrica '{}' (se esperaba '{INDEX_METRIC}')",
                self.name,
                self.metric
            );
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PineconeClient {
    http: Client,
    api_key: String,
    control_url: Url,
    cloud: String,
    region: String,
}

impl PineconeClient {
    pub fn new(cfg: &PineconeConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("No se pudo crear el cliente HTTP de Pinecone")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            control_url: cfg.control_url.clone(),
            cloud: cfg.cloud.clone(),
            region: cfg.region.clone(),
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Añade las cabeceras comunes de autenticación y versión.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn index_url(&self, name: &str) -> Result<Url> {
        self.control_url
            .join(&format!("indexes/{name}"))
            .with_context(|| format!("Nombre de índice inválido: {name}"))
    }

    /// Devuelve `None` si el índice no existe.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .authorize(self.http.get(self.index_url(name)?))
            .send()
            .await
            .context("Error consultando el índice en Pinecone")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Pinecone respondió {status} al describir '{name}': {body}"))
            }
        }
    }

    /// Garantiza que el índice exista con la dimensión dada y métrica coseno.
    /// Sólo lo crea si no existe; un índice existente incompatible es un error.
    /// Espera a que esté listo.
    pub async fn ensure_index(&self, name: &str, dimension: usize) -> Result<IndexDescription> {
        if let Some(existing) = self.describe_index(name).await? {
            existing.check_compatible(dimension)?;
            info!("Índice vectorial '{name}' ya existe.");
            return self.wait_until_ready(name, existing).await;
        }

        let body = json!({
            "name": name,
            "dimension": dimension,
            "metric": INDEX_METRIC,
            "spec": {
                "serverless": { "cloud": self.cloud, "region": self.region }
            }
        });
        let url = self
            .control_url
            .join("indexes")
            .context("URL de control de Pinecone inválida")?;
        let response = self
            .authorize(self.http.post(url))
            .json(&body)
            .send()
            .await
            .context("Error creando el índice en Pinecone")?;

        // 409: otro proceso lo creó entre la consulta y la creación.
        if !response.status().is_success() && response.status() != StatusCode::CONFLICT {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone respondió {status} al crear '{name}': {body}");
        }
        info!("Índice vectorial '{name}' creado ({dimension} dimensiones, coseno).");

        let created = self
            .describe_index(name)
            .await?
            .ok_or_else(|| anyhow!("El índice '{name}' no aparece tras crearlo"))?;
        self.wait_until_ready(name, created).await
    }

    async fn wait_until_ready(
        &self,
        name: &str,
        mut description: IndexDescription,
    ) -> Result<IndexDescription> {
        let mut polls = 0;
        while !description.status.ready {
            if polls >= READY_MAX_POLLS {
                bail!(
                    "El índice '{name}' no está listo (estado: {})",
                    description.status.state
                );
            }
            polls += 1;
            tokio::time::sleep(READY_POLL_INTERVAL).await;
            description = self
                .describe_index(name)
                .await?
                .ok_or_else(|| anyhow!("El índice '{name}' desapareció mientras se esperaba"))?;
        }
        Ok(description)
    }

    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let response = self
            .authorize(self.http.delete(self.index_url(name)?))
            .send()
            .await
            .context("Error borrando el índice en Pinecone")?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(()),
            status if status.is_success() => {}
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("Pinecone respondió {status} al borrar '{name}': {body}");
            }
        }

        // El borrado es asíncrono en Pinecone: esperar a que desaparezca.
        for _ in 0..READY_MAX_POLLS {
            if self.describe_index(name).await?.is_none() {
                info!("Índice vectorial '{name}' borrado.");
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        bail!("El índice '{name}' sigue existiendo tras borrarlo")
    }
}
