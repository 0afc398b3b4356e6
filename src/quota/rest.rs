use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Quota, QuotaStore, QuotaType};
use crate::{ProcessingError, Result};

/// Quota store reached through a PostgREST-style data API
pub struct RestQuotaStore {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct DecrementRequest<'a> {
    user_id: &'a str,
    quota_type: QuotaType,
    amount: u32,
}

impl RestQuotaStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        format!("HTTP {}: {}", status, body)
    }
}

#[async_trait]
impl QuotaStore for RestQuotaStore {
    async fn decrement_quota(&self, user_id: &str, quota_type: QuotaType, amount: u32) -> Result<bool> {
        let url = format!("{}/rest/v1/rpc/decrement_quota", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&DecrementRequest {
                user_id,
                quota_type,
                amount,
            })
            .send()
            .await
            .map_err(|e| ProcessingError::QuotaStore(format!("request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProcessingError::QuotaStore(Self::error_body(response).await));
        }

        let reserved: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProcessingError::QuotaStore(format!("body: {}", e)))?;

        reserved
            .as_bool()
            .ok_or_else(|| ProcessingError::QuotaStore(format!("unexpected rpc result: {}", reserved)))
    }

    async fn fetch_quota(&self, user_id: &str) -> Result<Quota> {
        let url = format!("{}/rest/v1/processing_quota", self.base_url);
        let filter = format!("eq.{}", user_id);

        let response = self
            .client
            .get(&url)
            .query(&[("user_id", filter.as_str()), ("select", "*")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProcessingError::QuotaStore(format!("request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProcessingError::QuotaStore(Self::error_body(response).await));
        }

        let rows: Vec<Quota> = response
            .json()
            .await
            .map_err(|e| ProcessingError::QuotaStore(format!("body: {}", e)))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ProcessingError::QuotaStore(format!("no quota record for user {}", user_id)))
    }
}
