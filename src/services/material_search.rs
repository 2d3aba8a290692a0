use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MaterialSearchConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub limit: usize,
    pub min_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// One ranked material returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub relevance: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, thiserror::Error)]
pub enum MaterialSearchError {
    #[error("material search is disabled")]
    Disabled,
    #[error("material search request timed out")]
    Timeout,
    #[error("material search network error: {0}")]
    Network(String),
    #[error("material search api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
}

impl From<reqwest::Error> for MaterialSearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Ranked retrieval of study materials, consumed as an opaque list.
#[async_trait]
pub trait MaterialSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, MaterialSearchError>;
}

#[derive(Debug, Clone)]
pub struct HttpMaterialSearch {
    config: MaterialSearchConfig,
    client: reqwest::Client,
}

impl HttpMaterialSearch {
    pub fn new(config: &MaterialSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Rejects a live (non-mock) configuration that has nowhere to send requests.
    pub fn validate_config(config: &MaterialSearchConfig) -> Result<(), String> {
        if config.enabled && !config.mock && config.api_url.trim().is_empty() {
            return Err(
                "MATERIAL_SEARCH_ENABLED=true with MATERIAL_SEARCH_MOCK=false requires MATERIAL_SEARCH_URL"
                    .to_string(),
            );
        }
        Ok(())
    }

    fn mock_hits(query: &SearchQuery) -> Vec<SearchHit> {
        let slug: String = query
            .query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        vec![SearchHit {
            id: format!("mock-{slug}"),
            title: format!("Review notes: {}", query.query),
            kind: query
                .source_type
                .clone()
                .unwrap_or_else(|| "material".to_string()),
            relevance: 0.85,
        }]
        .into_iter()
        .filter(|h| h.relevance >= query.min_score)
        .take(query.limit)
        .collect()
    }
}

#[async_trait]
impl MaterialSearch for HttpMaterialSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, MaterialSearchError> {
        if !self.config.enabled {
            return Err(MaterialSearchError::Disabled);
        }
        if self.config.mock {
            return Ok(Self::mock_hits(query));
        }

        let url = format!("{}/search", self.config.api_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(query);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %url, "Material search request failed");
            return Err(MaterialSearchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        let mut hits: Vec<SearchHit> = body
            .results
            .into_iter()
            .filter(|h| h.relevance >= query.min_score)
            .collect();
        hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        hits.truncate(query.limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(enabled: bool, mock: bool) -> MaterialSearchConfig {
        MaterialSearchConfig {
            enabled,
            mock,
            api_url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        }
    }

    fn query(min_score: f64) -> SearchQuery {
        SearchQuery {
            user_id: Some("user-1".to_string()),
            query: "Chain rule".to_string(),
            subject: Some("calculus".to_string()),
            limit: 5,
            min_score,
            source_type: Some("material".to_string()),
        }
    }

    #[tokio::test]
    async fn disabled_mode_returns_error() {
        let search = HttpMaterialSearch::new(&cfg(false, true));
        let result = search.search(&query(0.4)).await;
        assert!(matches!(result, Err(MaterialSearchError::Disabled)));
    }

    #[tokio::test]
    async fn mock_mode_returns_ranked_hit() {
        let search = HttpMaterialSearch::new(&cfg(true, true));
        let hits = search.search(&query(0.4)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mock-chain-rule");
        assert_eq!(hits[0].kind, "material");

        let none = search.search(&query(0.9)).await.unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn live_mode_requires_url() {
        assert!(HttpMaterialSearch::validate_config(&cfg(true, false)).is_err());
        assert!(HttpMaterialSearch::validate_config(&cfg(true, true)).is_ok());
        assert!(HttpMaterialSearch::validate_config(&cfg(false, false)).is_ok());
    }

    #[test]
    fn hits_use_type_on_the_wire() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"id":"m1","title":"Derivatives","type":"video","relevance":0.7}"#,
        )
        .unwrap();
        assert_eq!(hit.kind, "video");
        let json = serde_json::to_value(&query(0.4)).unwrap();
        assert_eq!(json["minScore"], 0.4);
        assert_eq!(json["sourceType"], "material");
    }
}
