//! Payment API client (caller → payment service).

use std::time::Duration;

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::{CreatePaymentRequest, OperationResponse, PaymentCreated};

/// Typed HTTP client for the payment API.
///
/// Creating a payment only starts the evaluation; the decision arrives
/// asynchronously and is observed by polling [`get_payment`](Self::get_payment)
/// or [`wait_for_decision`](Self::wait_for_decision).
#[derive(Debug, Clone)]
pub struct PaymentClient {
    http: Client,
    base_url: Url,
}

impl PaymentClient {
    /// Create a new `PaymentClient`.
    ///
    /// * `base_url` – root URL of the payment service (e.g. `http://localhost:8080`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/payments` – submit a payment for risk evaluation.
    pub async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentCreated, ClientError> {
        let url = self.base_url.join("/api/payments")?;
        let resp = self.http.post(url).json(request).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/payments/{externalOperationId}` – read the current status.
    pub async fn get_payment(&self, operation_id: Uuid) -> Result<OperationResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/payments/{operation_id}"))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// Poll until the operation reaches a terminal status.
    ///
    /// Gives up with [`ClientError::StillEvaluating`] after `max_polls` reads.
    pub async fn wait_for_decision(
        &self,
        operation_id: Uuid,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<OperationResponse, ClientError> {
        for poll in 0..max_polls {
            let operation = self.get_payment(operation_id).await?;
            if operation.status.is_terminal() {
                return Ok(operation);
            }
            if poll + 1 < max_polls {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Err(ClientError::StillEvaluating {
            operation_id,
            polls: max_polls,
        })
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
