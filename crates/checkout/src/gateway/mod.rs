//! Payment gateway capability and its implementations.

mod scripted;
mod simulated;

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use domain::{Money, PaymentMethod};

use crate::error::GatewayError;

pub use scripted::{ScriptedGateway, ScriptedOutcome};
pub use simulated::SimulatedGateway;

/// What the gateway is asked to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// The gateway's verdict on an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    /// Funds were authorized.
    Approved { gateway_reference: String },

    /// The payment was refused.
    Declined { reason: Option<String> },

    /// No verdict yet; it will arrive through the settlement webhook.
    Pending,
}

/// Gateway answer. The transaction id is assigned whatever the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub transaction_id: String,
    pub decision: GatewayDecision,
}

/// An external payment authorization provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Asks the gateway to authorize a payment.
    async fn authorize(&self, request: AuthorizationRequest)
    -> Result<Authorization, GatewayError>;
}
