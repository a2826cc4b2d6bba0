//! Payment gateway adapter and payment-record persistence.
//!
//! The gateway contract is consumed abstractly: `initiate` and `refund` are
//! callable from inside an open booking/refund transaction, and a failure of
//! either rolls that transaction back in full. The wire protocol behind the
//! contract is not this crate's concern.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::payment::{self, Entity as PaymentEntity, PaymentStatus};
use crate::errors::ServiceError;

/// Request passed to the gateway when opening a payment handshake.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub method_code: String,
    pub amount: Decimal,
    pub metadata: serde_json::Value,
}

/// Result of a successful initiation: where to send the purchaser, and the
/// gateway's reference for later refunds.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInitiation {
    pub payment_url: String,
    pub transaction_ref: String,
}

/// Acknowledgement of a refund instruction.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundAck {
    pub reference: String,
}

/// Abstract payment gateway contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ServiceError>;

    async fn refund(
        &self,
        transaction_ref: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundAck, ServiceError>;
}

/// HTTP implementation of the gateway contract.
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn initiate(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ServiceError> {
        let url = format!("{}/v1/payments", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(order_id = %request.order_id, error = %e, "Payment initiation request failed");
                ServiceError::Gateway("payment initiation unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(order_id = %request.order_id, status = %status, "Payment initiation rejected");
            return Err(ServiceError::Gateway(format!(
                "payment initiation rejected with status {}",
                status
            )));
        }

        response.json::<PaymentInitiation>().await.map_err(|e| {
            error!(order_id = %request.order_id, error = %e, "Malformed gateway initiation response");
            ServiceError::Gateway("malformed initiation response".to_string())
        })
    }

    #[instrument(skip(self), fields(transaction_ref, amount = %amount))]
    async fn refund(
        &self,
        transaction_ref: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<RefundAck, ServiceError> {
        let url = format!("{}/v1/refunds", self.base_url);
        let body = serde_json::json!({
            "transaction_ref": transaction_ref,
            "amount": amount,
            "reason": reason,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(transaction_ref, error = %e, "Refund request failed");
                ServiceError::Gateway("refund unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(transaction_ref, status = %status, "Refund rejected");
            return Err(ServiceError::Gateway(format!(
                "refund rejected with status {}",
                status
            )));
        }

        response.json::<RefundAck>().await.map_err(|e| {
            error!(transaction_ref, error = %e, "Malformed gateway refund response");
            ServiceError::Gateway("malformed refund response".to_string())
        })
    }
}

/// Inserts the pending payment row for a freshly created order, inside the
/// order-creation transaction.
pub async fn create_pending(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    amount: Decimal,
    method_code: &str,
    initiation: &PaymentInitiation,
    expires_at: DateTime<Utc>,
) -> Result<payment::Model, ServiceError> {
    let now = Utc::now();
    let model = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        amount: Set(amount),
        method_code: Set(method_code.to_string()),
        status: Set(PaymentStatus::Pending),
        transaction_ref: Set(Some(initiation.transaction_ref.clone())),
        gateway_response: Set(None),
        expires_at: Set(Some(expires_at)),
        created_at: Set(now),
        updated_at: Set(Some(now)),
    };

    model.insert(txn).await.map_err(ServiceError::db_error)
}

/// Loads the newest payment for an order without locking, for read-side
/// routing decisions.
pub async fn find_latest_for_order(
    db: &sea_orm::DatabaseConnection,
    order_id: Uuid,
) -> Result<Option<payment::Model>, ServiceError> {
    PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_desc(payment::Column::CreatedAt)
        .one(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Loads the newest payment for an order under an exclusive row lock.
pub async fn find_latest_for_order_locked(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<Option<payment::Model>, ServiceError> {
    PaymentEntity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .order_by_desc(payment::Column::CreatedAt)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)
}

/// Encodes a raw gateway payload for opaque storage. Never parsed again by
/// this crate and never surfaced to callers.
pub fn encode_gateway_blob(raw: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
}

type HmacSha256 = Hmac<Sha256>;

/// Verifies the HMAC-SHA256 signature a gateway attaches to webhook bodies.
/// The API layer calls this before handing a confirmation to
/// `BookingService::confirm_payment`.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn webhook_signature_round_trip() {
        let secret = "whsec_test";
        let body = br#"{"order_id":"abc","status":"completed"}"#;

        let signature = sign(secret, body);
        assert!(verify_webhook_signature(secret, body, &signature));
    }

    #[test]
    fn webhook_signature_rejects_tampering() {
        let secret = "whsec_test";
        let signature = sign(secret, b"original body");

        assert!(!verify_webhook_signature(secret, b"tampered body", &signature));
        assert!(!verify_webhook_signature("wrong secret", b"original body", &signature));
        assert!(!verify_webhook_signature(secret, b"original body", "not-hex"));
    }

    #[test]
    fn gateway_blob_is_opaque_base64() {
        let blob = encode_gateway_blob(r#"{"provider":"acme","card":"** 4242"}"#);
        assert!(!blob.contains("acme"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .unwrap();
        assert!(String::from_utf8(decoded).unwrap().contains("acme"));
    }
}
