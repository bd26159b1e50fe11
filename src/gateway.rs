use async_trait::async_trait;
use thiserror::Error;

use crate::models::Payment;

pub const PAYMENT_METHODS: &[&str] = &["demo_card", "demo_bank", "demo_wallet"];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Seam for the external payment processor. Settlement outcomes are
/// deterministic per gateway; the demo implementation approves every charge.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, payment: &Payment, method: &str) -> Result<(), GatewayError>;
}

/// Stand-in gateway used outside of a real processor integration.
pub struct DemoGateway;

#[async_trait]
impl PaymentGateway for DemoGateway {
    async fn charge(&self, payment: &Payment, method: &str) -> Result<(), GatewayError> {
        tracing::debug!(
            transaction_id = %payment.transaction_id,
            amount = payment.amount,
            method,
            "demo gateway approved charge"
        );
        Ok(())
    }
}
