//! Stripe adapter over the REST API (form-encoded requests, no SDK)

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::{signature, CheckoutSession, CheckoutSessionRequest, PaymentGateway, WebhookEvent};
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: &str, webhook_secret: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EcommerceError::internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// POSTs a form, retrying once on transport failure or a 5xx answer.
    /// The idempotency key makes the retry safe.
    async fn post_form(&self, path: &str, form: &[(String, String)], idempotency_key: &str) -> Result<serde_json::Value> {
        let url = format!("{}{path}", self.api_base);
        let mut last_error = String::new();
        for attempt in 1..=2 {
            let sent = self
                .client
                .post(&url)
                .basic_auth(&self.secret_key, None::<&str>)
                .header("Idempotency-Key", idempotency_key)
                .form(form)
                .send()
                .await;
            let resp = match sent {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(path, attempt, error = %e, "stripe request failed");
                    last_error = e.to_string();
                    continue;
                }
            };
            let status = resp.status();
            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| EcommerceError::PaymentGateway(format!("invalid response: {e}")))?;
            if status.is_success() {
                return Ok(body);
            }
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            if status.is_server_error() {
                tracing::warn!(path, attempt, %status, error = %message, "stripe server error");
                last_error = format!("{status}: {message}");
                continue;
            }
            return Err(EcommerceError::PaymentGateway(format!("{status}: {message}")));
        }
        Err(EcommerceError::PaymentGateway(last_error))
    }
}

/// Form fields for a one-off payment session.
pub(crate) fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("client_reference_id".into(), request.transaction_id.to_string()),
    ];
    match &request.customer_id {
        Some(customer) => form.push(("customer".into(), customer.clone())),
        None => form.push(("customer_email".into(), request.customer_email.clone())),
    }
    for (i, line) in request.lines.iter().enumerate() {
        let key = |field: &str| format!("line_items[{i}]{field}");
        form.push((key("[quantity]"), line.quantity.to_string()));
        form.push((key("[price_data][currency]"), request.currency.as_str().to_string()));
        form.push((key("[price_data][unit_amount]"), line.unit_amount.to_string()));
        form.push((key("[price_data][product_data][name]"), line.name.clone()));
        if let Some(desc) = line.description.as_deref().filter(|d| !d.is_empty()) {
            form.push((key("[price_data][product_data][description]"), desc.to_string()));
        }
    }
    for (k, v) in &request.metadata {
        form.push((format!("metadata[{k}]"), v.clone()));
        form.push((format!("payment_intent_data[metadata][{k}]"), v.clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession> {
        let form = checkout_form(request);
        let key = format!("checkout-{}", request.transaction_id);
        let resp = self.post_form("/v1/checkout/sessions", &form, &key).await?;
        match (resp["id"].as_str(), resp["url"].as_str()) {
            (Some(id), Some(url)) => Ok(CheckoutSession {
                id: id.to_string(),
                url: url.to_string(),
            }),
            _ => Err(EcommerceError::PaymentGateway(
                "checkout session response without id/url".into(),
            )),
        }
    }

    async fn create_customer(&self, email: &str, name: &str, user_id: Uuid) -> Result<String> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let resp = self
            .post_form("/v1/customers", &form, &format!("customer-{user_id}"))
            .await?;
        resp["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| EcommerceError::PaymentGateway("customer response without id".into()))
    }

    fn parse_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        signature::verify(
            payload,
            signature_header,
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
            signature::DEFAULT_TOLERANCE_SECS,
        )?;
        WebhookEvent::from_payload(payload)
    }
}
