use crate::infrastructure::error::InfraError;
use crate::infrastructure::query::{Direction, Query, Store};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote backend speaking a PostgREST-style dialect: equality filters as
/// `field=eq.value`, single-field ordering, `Prefer` headers for returned
/// representations and upsert conflict resolution.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RemoteStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote url: {error}")))?;
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InfraError::InvalidConfig(
                "remote api key must not be empty".to_string(),
            ));
        }

        // The transport gets a hard timeout so a hung backend cannot leave
        // callers loading forever.
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| InfraError::Store(format!("failed building http client: {error}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn collection_endpoint(&self, collection: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Store("remote base URL cannot be a base".to_string()))?;
            segments.push("rest");
            segments.push("v1");
            segments.push(collection);
        }
        Ok(url)
    }

    fn filter_text(value: &Value) -> String {
        match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    fn query_pairs(query: &Query) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (field, value) in query.filters() {
            pairs.push((field.clone(), format!("eq.{}", Self::filter_text(value))));
        }
        if let Some((field, direction)) = query.order() {
            let direction = match direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            pairs.push(("order".to_string(), format!("{field}.{direction}")));
        }
        if query.is_single() {
            pairs.push(("limit".to_string(), "1".to_string()));
        }
        pairs
    }

    fn conflict_key(rows: &[Value], fallback_key: Option<&str>) -> String {
        let any_has_id = rows
            .iter()
            .any(|row| row.get("id").map(|id| !id.is_null()).unwrap_or(false));
        if any_has_id {
            "id".to_string()
        } else {
            fallback_key.unwrap_or("id").to_string()
        }
    }

    fn http_error(collection: &str, status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("remote {collection} request failed: http {}", status.as_u16())
        } else {
            format!(
                "remote {collection} request failed: http {}; body={body}",
                status.as_u16()
            )
        };
        InfraError::Store(message)
    }

    async fn read_rows(
        collection: &str,
        response: reqwest::Response,
    ) -> Result<Vec<Value>, InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Store(format!("failed reading {collection} response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(collection, status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|error| {
            InfraError::Store(format!("invalid {collection} payload: {error}; body={body}"))
        })?;
        match parsed {
            Value::Array(rows) => Ok(rows),
            single @ Value::Object(_) => Ok(vec![single]),
            _ => Err(InfraError::Store(format!(
                "unexpected {collection} payload shape; body={body}"
            ))),
        }
    }
}

#[async_trait]
impl Store for RemoteStore {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .get(endpoint)
            .query(&Self::query_pairs(query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error selecting {collection}: {error}"))
            })?;
        Self::read_rows(collection, response).await
    }

    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error inserting into {collection}: {error}"))
            })?;
        Self::read_rows(collection, response).await
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .patch(endpoint)
            .query(&Self::query_pairs(query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error updating {collection}: {error}"))
            })?;
        Self::read_rows(collection, response).await
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<usize, InfraError> {
        let endpoint = self.collection_endpoint(collection)?;
        let response = self
            .client
            .delete(endpoint)
            .query(&Self::query_pairs(query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error deleting from {collection}: {error}"))
            })?;
        Ok(Self::read_rows(collection, response).await?.len())
    }

    async fn upsert(
        &self,
        collection: &str,
        rows: Vec<Value>,
        fallback_key: Option<&str>,
    ) -> Result<Vec<Value>, InfraError> {
        let mut endpoint = self.collection_endpoint(collection)?;
        endpoint
            .query_pairs_mut()
            .append_pair("on_conflict", &Self::conflict_key(&rows, fallback_key));

        let response = self
            .client
            .post(endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(|error| {
                InfraError::Store(format!("network error upserting into {collection}: {error}"))
            })?;
        Self::read_rows(collection, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_store() -> RemoteStore {
        RemoteStore::new("https://planner.example.com", "service-key").expect("valid store")
    }

    #[test]
    fn rejects_missing_credentials() {
        assert!(RemoteStore::new("not a url", "key").is_err());
        assert!(RemoteStore::new("https://planner.example.com", "   ").is_err());
    }

    #[test]
    fn collection_endpoint_targets_rest_v1() {
        let store = sample_store();
        let endpoint = store.collection_endpoint("slots").expect("endpoint");
        assert_eq!(
            endpoint.as_str(),
            "https://planner.example.com/rest/v1/slots"
        );
    }

    #[test]
    fn query_pairs_render_filters_order_and_limit() {
        let query = Query::new()
            .eq("profile_id", "prf-1")
            .eq("date", "2026-03-02")
            .order_by("time", Direction::Ascending)
            .single();

        let pairs = RemoteStore::query_pairs(&query);
        assert_eq!(
            pairs,
            vec![
                ("profile_id".to_string(), "eq.prf-1".to_string()),
                ("date".to_string(), "eq.2026-03-02".to_string()),
                ("order".to_string(), "time.asc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn numeric_filters_render_without_quotes() {
        let pairs = RemoteStore::query_pairs(&Query::new().eq("profile_id", 42));
        assert_eq!(pairs[0].1, "eq.42");
    }

    #[test]
    fn conflict_key_prefers_id_then_fallback() {
        let with_id = vec![json!({"id": "row-1", "user_id": "u1"})];
        assert_eq!(RemoteStore::conflict_key(&with_id, Some("user_id")), "id");

        let without_id = vec![json!({"user_id": "u1"})];
        assert_eq!(
            RemoteStore::conflict_key(&without_id, Some("user_id")),
            "user_id"
        );
        assert_eq!(RemoteStore::conflict_key(&without_id, None), "id");
    }
}
