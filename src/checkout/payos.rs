use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use metrics::{counter, histogram};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, error, info, instrument, warn};

use super::{CancelOutcome, CheckoutError, CheckoutLink, CheckoutLinkRequest, CheckoutProvider};
use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

const SUCCESS_CODE: &str = "00";
const MAX_DESCRIPTION_CHARS: usize = 25;

/// Connection settings for the PayOS merchant API.
#[derive(Debug, Clone)]
pub struct PayOsConfig {
    pub base_url: String,
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    pub timeout: Duration,
}

impl From<&AppConfig> for PayOsConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.checkout_base_url.trim_end_matches('/').to_string(),
            client_id: cfg.checkout_client_id.clone(),
            api_key: cfg.checkout_api_key.clone(),
            checksum_key: cfg.checkout_checksum_key.clone(),
            timeout: cfg.checkout_timeout(),
        }
    }
}

/// Every PayOS response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinkBody<'a> {
    order_code: i64,
    amount: i64,
    description: &'a str,
    cancel_url: &'a str,
    return_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedLink {
    payment_link_id: String,
    checkout_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody<'a> {
    cancellation_reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct LinkInfo {
    status: String,
}

/// Callback body posted by PayOS when a link changes state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookPayload {
    pub code: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub success: bool,
    pub data: Value,
    pub signature: String,
}

impl WebhookPayload {
    pub fn order_code(&self) -> Option<i64> {
        self.data.get("orderCode").and_then(Value::as_i64)
    }

    /// Payment outcome code inside `data`, falling back to the envelope code.
    pub fn result_code(&self) -> &str {
        self.data
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or(&self.code)
    }
}

fn hmac_hex(key: &str, message: &str) -> Result<String, CheckoutError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| CheckoutError::InvalidRequest(format!("invalid checksum key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature PayOS expects on a create-link request.
pub fn sign_link_request(
    checksum_key: &str,
    order_code: i64,
    amount: i64,
    description: &str,
    cancel_url: &str,
    return_url: &str,
) -> Result<String, CheckoutError> {
    let data = format!(
        "amount={}&cancelUrl={}&description={}&orderCode={}&returnUrl={}",
        amount, cancel_url, description, order_code, return_url
    );
    hmac_hex(checksum_key, &data)
}

/// Signature over a webhook `data` object: keys sorted, `key=value` joined by `&`.
pub fn sign_webhook_data(checksum_key: &str, data: &Value) -> Result<String, CheckoutError> {
    let object = data
        .as_object()
        .ok_or_else(|| CheckoutError::InvalidResponse("webhook data is not an object".into()))?;

    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();

    let joined = keys
        .into_iter()
        .map(|key| {
            let value = match &object[key.as_str()] {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join("&");

    hmac_hex(checksum_key, &joined)
}

/// Checks a webhook signature in constant time.
pub fn verify_webhook(checksum_key: &str, payload: &WebhookPayload) -> bool {
    match sign_webhook_data(checksum_key, &payload.data) {
        Ok(expected) => constant_time_eq(&expected, &payload.signature.to_ascii_lowercase()),
        Err(e) => {
            warn!(error = %e, "Webhook signature could not be computed");
            false
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// HTTP adapter for the PayOS payment-request API.
#[derive(Clone)]
pub struct PayOsClient {
    client: reqwest::Client,
    config: PayOsConfig,
}

impl PayOsClient {
    pub fn new(config: PayOsConfig) -> Result<Self, CheckoutError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.client_id)
            .header("x-api-key", &self.config.api_key)
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, CheckoutError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(CheckoutError::Transport(format!(
                "provider returned HTTP {}",
                status
            )));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            CheckoutError::InvalidResponse(format!("HTTP {}: {}", status, e))
        })
    }

    #[instrument(skip(self))]
    async fn link_status(&self, order_code: i64) -> Result<String, CheckoutError> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/v2/payment-requests/{}", order_code))))
            .send()
            .await?;
        let envelope: Envelope<LinkInfo> = Self::read_envelope(response).await?;
        if envelope.code != SUCCESS_CODE {
            return Err(CheckoutError::Rejected {
                code: envelope.code,
                desc: envelope.desc,
            });
        }
        envelope
            .data
            .map(|info| info.status)
            .ok_or_else(|| CheckoutError::InvalidResponse("link info without data".into()))
    }
}

fn outcome_for_status(status: &str) -> Option<CancelOutcome> {
    match status.to_ascii_uppercase().as_str() {
        "PAID" => Some(CancelOutcome::AlreadyPaid),
        "CANCELLED" | "EXPIRED" => Some(CancelOutcome::AlreadyCancelled),
        _ => None,
    }
}

#[async_trait]
impl CheckoutProvider for PayOsClient {
    #[instrument(skip(self, request), fields(order_code = request.order_code))]
    async fn create_link(&self, request: &CheckoutLinkRequest) -> Result<CheckoutLink, CheckoutError> {
        if !request.amount.fract().is_zero() {
            return Err(CheckoutError::InvalidRequest(format!(
                "amount {} must be a whole number for bank checkout",
                request.amount
            )));
        }
        let amount = request
            .amount
            .to_i64()
            .filter(|a| *a > 0)
            .ok_or_else(|| {
                CheckoutError::InvalidRequest(format!("amount {} out of range", request.amount))
            })?;
        let description: String = request
            .description
            .chars()
            .take(MAX_DESCRIPTION_CHARS)
            .collect();

        let signature = sign_link_request(
            &self.config.checksum_key,
            request.order_code,
            amount,
            &description,
            &request.cancel_url,
            &request.return_url,
        )?;
        let body = CreateLinkBody {
            order_code: request.order_code,
            amount,
            description: &description,
            cancel_url: &request.cancel_url,
            return_url: &request.return_url,
            signature,
        };

        let start = Instant::now();
        let result = self
            .authorized(self.client.post(self.url("/v2/payment-requests")))
            .json(&body)
            .send()
            .await;
        histogram!("petcare_checkout.create_link.duration", start.elapsed());

        let response = result.map_err(|e| {
            error!(error = %e, "Checkout provider request failed");
            counter!("petcare_checkout.create_link.error", 1);
            CheckoutError::from(e)
        })?;
        let envelope: Envelope<CreatedLink> = Self::read_envelope(response).await?;

        if envelope.code != SUCCESS_CODE {
            warn!(code = %envelope.code, desc = %envelope.desc, "Checkout provider rejected link");
            counter!("petcare_checkout.create_link.rejected", 1);
            return Err(CheckoutError::Rejected {
                code: envelope.code,
                desc: envelope.desc,
            });
        }

        let created = envelope
            .data
            .ok_or_else(|| CheckoutError::InvalidResponse("link created without data".into()))?;
        info!(link_id = %created.payment_link_id, "Checkout link created");

        Ok(CheckoutLink {
            link_id: created.payment_link_id,
            checkout_url: created.checkout_url,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_link(&self, order_code: i64, reason: &str) -> Result<CancelOutcome, CheckoutError> {
        let start = Instant::now();
        let result = self
            .authorized(
                self.client
                    .post(self.url(&format!("/v2/payment-requests/{}/cancel", order_code))),
            )
            .json(&CancelBody {
                cancellation_reason: reason,
            })
            .send()
            .await;
        histogram!("petcare_checkout.cancel_link.duration", start.elapsed());

        let response = result.map_err(|e| {
            error!(error = %e, "Checkout provider cancel failed");
            counter!("petcare_checkout.cancel_link.error", 1);
            CheckoutError::from(e)
        })?;
        let envelope: Envelope<LinkInfo> = Self::read_envelope(response).await?;

        if envelope.code == SUCCESS_CODE {
            let outcome = envelope
                .data
                .as_ref()
                .and_then(|info| outcome_for_status(&info.status))
                .filter(|outcome| *outcome == CancelOutcome::AlreadyPaid)
                .unwrap_or(CancelOutcome::Cancelled);
            info!(?outcome, "Checkout link cancel acknowledged");
            return Ok(outcome);
        }

        // The provider refuses to cancel links that are no longer open; ask
        // what state the link is in instead.
        debug!(code = %envelope.code, desc = %envelope.desc, "Cancel refused, reading link state");
        let status = self.link_status(order_code).await?;
        match outcome_for_status(&status) {
            Some(outcome) => {
                info!(?outcome, %status, "Checkout link already closed");
                Ok(outcome)
            }
            None => Err(CheckoutError::Rejected {
                code: envelope.code,
                desc: envelope.desc,
            }),
        }
    }
}
