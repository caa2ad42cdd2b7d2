pub mod razorpay;
pub mod sandbox;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AppConfig;
use razorpay::RazorpayGateway;
use sandbox::SandboxGateway;

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
}

impl Payment {
    pub fn is_settled(&self) -> bool {
        matches!(self.status.as_str(), "authorized" | "captured")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProof {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &OrderRequest) -> anyhow::Result<Order>;

    async fn fetch_order(&self, order_id: &str) -> anyhow::Result<Order>;

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<Payment>;

    // over `order_id|payment_id`
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;
}

pub fn sign(secret: &str, data: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a hex HMAC-SHA256 signature.
pub fn verify_hmac(secret: &str, data: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

pub fn checkout_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

pub fn from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match config.payment_provider.as_str() {
        "razorpay" => {
            anyhow::ensure!(
                !config.razorpay_key_id.is_empty() && !config.razorpay_key_secret.is_empty(),
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set when PAYMENT_PROVIDER=razorpay"
            );
            if config.razorpay_webhook_secret.is_empty() {
                tracing::warn!("RAZORPAY_WEBHOOK_SECRET is not set, webhooks will be rejected");
            }
            tracing::info!("using Razorpay payment gateway (key: {})", config.razorpay_key_id);
            Ok(Arc::new(RazorpayGateway::new(
                config.razorpay_key_id.clone(),
                config.razorpay_key_secret.clone(),
                config.razorpay_webhook_secret.clone(),
            )))
        }
        "sandbox" => {
            tracing::warn!("using in-process sandbox payment gateway, no real charges are made");
            let secret = if config.razorpay_key_secret.is_empty() {
                "sandbox_secret"
            } else {
                config.razorpay_key_secret.as_str()
            };
            Ok(Arc::new(SandboxGateway::new(secret)))
        }
        other => anyhow::bail!("unknown PAYMENT_PROVIDER {other:?}, expected \"razorpay\" or \"sandbox\""),
    }
}
