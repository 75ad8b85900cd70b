use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AppError;

/// City/state/country resolved from a postal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalPlace {
    pub city: String,
    pub state: String,
    pub country: String,
}

#[async_trait]
pub trait PostalLookup: Send + Sync {
    /// `Ok(None)` means the code is well formed but unknown.
    async fn lookup(&self, postal_code: &str) -> Result<Option<PostalPlace>, AppError>;
}

#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    uf: Option<String>,
    #[serde(default)]
    erro: Option<serde_json::Value>,
}

/// ViaCEP-compatible lookup (`GET {base}/{cep}/json`), cached for an hour.
#[derive(Clone)]
pub struct ViaCepClient {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, Option<PostalPlace>>,
}

impl ViaCepClient {
    pub fn new(base_url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create postal lookup client: {}", e))
            })?;

        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600))
            .max_capacity(20_000)
            .build();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn fetch(&self, postal_code: &str) -> Result<Option<PostalPlace>, AppError> {
        let url = format!("{}/{}/json", self.base_url, postal_code);
        tracing::info!("Looking up postal code {}", postal_code);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Postal lookup failed: {}", e)))?;

        // ViaCEP answers 400 for malformed codes; treat like "not found".
        if response.status().as_u16() == 400 || response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::Upstream {
                status: Some(response.status().as_u16()),
                message: "Postal lookup returned an error".to_string(),
            });
        }

        let body: ViaCepResponse = response.json().await.map_err(|e| {
            AppError::upstream(format!("Failed to parse postal lookup response: {}", e))
        })?;

        // `"erro": true` (or `"true"` on older deployments) marks an unknown code
        let unknown = match body.erro {
            Some(serde_json::Value::Bool(flag)) => flag,
            Some(serde_json::Value::String(flag)) => flag == "true",
            _ => false,
        };
        if unknown {
            tracing::debug!("Postal code {} not found", postal_code);
            return Ok(None);
        }

        match (body.localidade, body.uf) {
            (Some(city), Some(state)) if !city.is_empty() && !state.is_empty() => {
                Ok(Some(PostalPlace {
                    city,
                    state,
                    country: "Brasil".to_string(),
                }))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PostalLookup for ViaCepClient {
    async fn lookup(&self, postal_code: &str) -> Result<Option<PostalPlace>, AppError> {
        let cache_key = format!("cep:{}", postal_code);
        if let Some(cached) = self.cache.get(&cache_key).await {
            tracing::debug!("Postal code {} served from cache", postal_code);
            return Ok(cached);
        }

        // Errors are not cached; only resolved answers (found or unknown) are
        let place = self.fetch(postal_code).await?;
        self.cache.insert(cache_key, place.clone()).await;
        Ok(place)
    }
}
