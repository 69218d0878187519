//! Razorpay provider adapter.
//!
//! Implements payment history pulls and webhook signature verification
//! against Razorpay's Payments API. Razorpay reports amounts in paise, which
//! are already minor units for INR, so normalization is a direct carry-over.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RazorpayConfig;
use crate::error::EngineError;
use crate::models::RemoteTransaction;
use crate::services::provider::{PaymentProvider, TransactionFilter};
use crate::services::signature::SignatureService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct RazorpayProvider {
    client: Client,
    config: RazorpayConfig,
    signatures: SignatureService,
}

/// Payment entity as returned by the Payments API.
#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    /// Amount in paise.
    amount: u64,
    currency: String,
    status: String,
    #[serde(default)]
    notes: serde_json::Value,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentCollection {
    items: Vec<PaymentEntity>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: String,
    description: String,
}

impl RazorpayProvider {
    pub fn new(config: RazorpayConfig, signatures: SignatureService) -> Self {
        Self {
            client: Client::new(),
            config,
            signatures,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Razorpay calls a settled payment "captured"; the engine vocabulary is
    /// "success".
    fn normalize_status(status: &str) -> String {
        match status {
            "captured" => "success".to_string(),
            other => other.to_string(),
        }
    }

    fn provider_status(status: &str) -> String {
        match status {
            "success" => "captured".to_string(),
            other => other.to_string(),
        }
    }

    fn normalize(entity: PaymentEntity) -> RemoteTransaction {
        RemoteTransaction {
            amount_minor: entity.amount as i64,
            currency: entity.currency,
            status: Self::normalize_status(&entity.status),
            notes: entity.notes,
            created_at: Utc
                .timestamp_opt(entity.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            id: entity.id,
        }
    }

    fn decode_error(status: StatusCode, body: String) -> EngineError {
        let error: ApiError = serde_json::from_str(&body).unwrap_or_else(|_| ApiError {
            error: ApiErrorDetail {
                code: "UNKNOWN".to_string(),
                description: body,
            },
        });
        tracing::error!(
            status = %status,
            code = %error.error.code,
            description = %error.error.description,
            "Razorpay API error"
        );
        EngineError::Provider(anyhow::anyhow!(
            "Razorpay error: {} - {}",
            error.error.code,
            error.error.description
        ))
    }
}

#[async_trait]
impl PaymentProvider for RazorpayProvider {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    async fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<RemoteTransaction>, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Razorpay credentials not configured"
            )));
        }

        let url = format!("{}/payments", self.config.api_base_url);
        let wanted = filter.status.as_deref().map(Self::provider_status);
        let mut transactions: Vec<RemoteTransaction> = Vec::new();
        let mut skip = 0u32;

        // Page until a short page. A sweep window can hold more settled
        // payments than one page; anything dropped here would never be
        // fetched again once the caller's checkpoint moves.
        loop {
            let mut request = self
                .client
                .get(&url)
                .timeout(REQUEST_TIMEOUT)
                .basic_auth(
                    &self.config.key_id,
                    Some(self.config.key_secret.expose_secret()),
                )
                .query(&[
                    ("count", PAGE_SIZE.to_string()),
                    ("skip", skip.to_string()),
                ]);

            if let Some(since) = filter.since {
                request = request.query(&[("from", since.timestamp().to_string())]);
            }

            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                return Err(Self::decode_error(status, body));
            }

            let collection: PaymentCollection = serde_json::from_str(&body)
                .map_err(|e| EngineError::Provider(anyhow::Error::new(e)))?;
            let page_len = collection.items.len();

            transactions.extend(
                collection
                    .items
                    .into_iter()
                    .filter(|p| wanted.as_deref().map_or(true, |w| p.status == w))
                    .map(Self::normalize),
            );

            if page_len < PAGE_SIZE as usize {
                break;
            }
            skip += PAGE_SIZE;
        }

        tracing::debug!(count = transactions.len(), "Fetched Razorpay payments");
        Ok(transactions)
    }

    async fn fetch_transaction(
        &self,
        id: &str,
    ) -> Result<Option<RemoteTransaction>, EngineError> {
        if !self.is_configured() {
            return Err(EngineError::Provider(anyhow::anyhow!(
                "Razorpay credentials not configured"
            )));
        }

        let url = format!("{}/payments/{}", self.config.api_base_url, id);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            // Razorpay answers 400 with an invalid-id error for unknown ids.
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::decode_error(status, body));
        }

        let entity: PaymentEntity = serde_json::from_str(&body)
            .map_err(|e| EngineError::Provider(anyhow::Error::new(e)))?;
        Ok(Some(Self::normalize(entity)))
    }

    fn verify_signature(&self, payload: &str, signature: &str, _timestamp: Option<&str>) -> bool {
        self.signatures.verify_razorpay(
            payload,
            signature,
            self.config.webhook_secret.expose_secret(),
        )
    }
}
