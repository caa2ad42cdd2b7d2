use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{checkout_payload, verify_hmac, Order, OrderRequest, Payment, PaymentGateway};

const API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    base_url: String,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String, webhook_secret: String) -> Self {
        Self {
            key_id,
            key_secret,
            webhook_secret,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .context("failed to call Razorpay API")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse Razorpay response")?;

        if !status.is_success() {
            anyhow::bail!("Razorpay API error ({}): {}", status, data);
        }
        Ok(data)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, request: &OrderRequest) -> anyhow::Result<Order> {
        let body = json!({
            "amount": request.amount,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": request.notes,
        });

        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .context("failed to create Razorpay order")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse Razorpay order")?;

        if !status.is_success() {
            anyhow::bail!("Razorpay API error ({}): {}", status, data);
        }
        parse_order(&data)
    }

    async fn fetch_order(&self, order_id: &str) -> anyhow::Result<Order> {
        let data = self.get(&format!("/orders/{order_id}")).await?;
        parse_order(&data)
    }

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<Payment> {
        let data = self.get(&format!("/payments/{payment_id}")).await?;
        parse_payment(&data)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_hmac(
            &self.key_secret,
            checkout_payload(order_id, payment_id).as_bytes(),
            signature,
        )
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac(&self.webhook_secret, body, signature)
    }
}

fn str_field(data: &Value, key: &str) -> anyhow::Result<String> {
    data[key]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("missing {key} in Razorpay response"))
}

fn parse_order(data: &Value) -> anyhow::Result<Order> {
    // Razorpay sends `"notes": []` for orders created without notes.
    let notes = match &data["notes"] {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let value = v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string());
                (k.clone(), value)
            })
            .collect(),
        _ => BTreeMap::new(),
    };

    Ok(Order {
        id: str_field(data, "id")?,
        amount: data["amount"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("missing amount in Razorpay order"))?,
        currency: str_field(data, "currency")?,
        receipt: data["receipt"].as_str().unwrap_or_default().to_string(),
        status: str_field(data, "status")?,
        notes,
    })
}

pub(crate) fn parse_payment(data: &Value) -> anyhow::Result<Payment> {
    Ok(Payment {
        id: str_field(data, "id")?,
        order_id: str_field(data, "order_id")?,
        amount: data["amount"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("missing amount in Razorpay payment"))?,
        currency: str_field(data, "currency")?,
        status: str_field(data, "status")?,
        method: data["method"].as_str().map(|s| s.to_string()),
    })
}
