use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{checkout_payload, sign, verify_hmac, Order, OrderRequest, Payment, PaymentGateway, PaymentProof};

/// In-process processor for local runs and tests. Orders and payments live in
/// memory and are signed with a fixed secret.
pub struct SandboxGateway {
    key_id: String,
    secret: String,
    webhook_secret: String,
    counter: AtomicU64,
    orders: Mutex<HashMap<String, Order>>,
    payments: Mutex<HashMap<String, Payment>>,
}

impl SandboxGateway {
    pub fn new(secret: &str) -> Self {
        Self {
            key_id: "sandbox_key".to_string(),
            secret: secret.to_string(),
            webhook_secret: format!("{secret}_webhook"),
            counter: AtomicU64::new(1),
            orders: Mutex::new(HashMap::new()),
            payments: Mutex::new(HashMap::new()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_sbx{n:06}")
    }

    // Settles an order like a shopper completing checkout.
    pub fn pay(&self, order_id: &str, method: &str) -> anyhow::Result<PaymentProof> {
        let amount = {
            let mut orders = self
                .orders
                .lock()
                .map_err(|_| anyhow::anyhow!("sandbox order store poisoned"))?;
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| anyhow::anyhow!("unknown sandbox order {order_id}"))?;
            order.status = "paid".to_string();
            order.amount
        };
        self.record_payment(order_id, amount, "captured", method)
    }

    pub fn record_payment(
        &self,
        order_id: &str,
        amount: i64,
        status: &str,
        method: &str,
    ) -> anyhow::Result<PaymentProof> {
        let currency = {
            let orders = self
                .orders
                .lock()
                .map_err(|_| anyhow::anyhow!("sandbox order store poisoned"))?;
            orders
                .get(order_id)
                .map(|o| o.currency.clone())
                .ok_or_else(|| anyhow::anyhow!("unknown sandbox order {order_id}"))?
        };

        let payment = Payment {
            id: self.next_id("pay"),
            order_id: order_id.to_string(),
            amount,
            currency,
            status: status.to_string(),
            method: Some(method.to_string()),
        };
        let proof = PaymentProof {
            order_id: order_id.to_string(),
            payment_id: payment.id.clone(),
            signature: sign(&self.secret, checkout_payload(order_id, &payment.id).as_bytes()),
        };
        self.payments
            .lock()
            .map_err(|_| anyhow::anyhow!("sandbox payment store poisoned"))?
            .insert(payment.id.clone(), payment);
        Ok(proof)
    }

    pub fn sign_webhook(&self, body: &[u8]) -> String {
        sign(&self.webhook_secret, body)
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, request: &OrderRequest) -> anyhow::Result<Order> {
        let order = Order {
            id: self.next_id("order"),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: request.receipt.clone(),
            status: "created".to_string(),
            notes: request.notes.clone(),
        };
        self.orders
            .lock()
            .map_err(|_| anyhow::anyhow!("sandbox order store poisoned"))?
            .insert(order.id.clone(), order.clone());
        tracing::debug!(order_id = %order.id, amount = order.amount, "sandbox order created");
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> anyhow::Result<Order> {
        self.orders
            .lock()
            .map_err(|_| anyhow::anyhow!("sandbox order store poisoned"))?
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown sandbox order {order_id}"))
    }

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<Payment> {
        self.payments
            .lock()
            .map_err(|_| anyhow::anyhow!("sandbox payment store poisoned"))?
            .get(payment_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown sandbox payment {payment_id}"))
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_hmac(&self.secret, checkout_payload(order_id, payment_id).as_bytes(), signature)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_hmac(&self.webhook_secret, body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request() -> OrderRequest {
        OrderRequest {
            amount: 300_000,
            currency: "INR".to_string(),
            receipt: "rcpt_1_court1".to_string(),
            notes: BTreeMap::from([("user_id".to_string(), "alice".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_pay_produces_verifiable_proof() {
        let gateway = SandboxGateway::new("sandbox_secret");
        let order = gateway.create_order(&request()).await.unwrap();
        let proof = gateway.pay(&order.id, "upi").unwrap();

        assert!(gateway.verify_signature(&proof.order_id, &proof.payment_id, &proof.signature));

        let payment = gateway.fetch_payment(&proof.payment_id).await.unwrap();
        assert_eq!(payment.amount, 300_000);
        assert!(payment.is_settled());

        let fetched = gateway.fetch_order(&order.id).await.unwrap();
        assert_eq!(fetched.status, "paid");
        assert_eq!(fetched.notes.get("user_id").map(String::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_errors() {
        let gateway = SandboxGateway::new("sandbox_secret");
        assert!(gateway.fetch_order("order_missing").await.is_err());
        assert!(gateway.fetch_payment("pay_missing").await.is_err());
        assert!(gateway.pay("order_missing", "card").is_err());
    }

    #[test]
    fn test_webhook_signature() {
        let gateway = SandboxGateway::new("sandbox_secret");
        let body = br#"{"event":"payment.captured"}"#;
        let sig = gateway.sign_webhook(body);
        assert!(gateway.verify_webhook(body, &sig));
        assert!(!gateway.verify_webhook(b"{}", &sig));
    }
}
