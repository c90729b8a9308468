use std::time::Duration;

use async_trait::async_trait;
use domain::PaymentMethod;

use super::{Authorization, AuthorizationRequest, GatewayDecision, PaymentGateway};
use crate::error::GatewayError;

/// Stand-in for a real gateway: waits, then approves at random with a
/// method-dependent probability.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Probability that a payment with `method` is approved.
    pub fn approval_probability(method: PaymentMethod) -> f64 {
        match method {
            PaymentMethod::CreditCard | PaymentMethod::DebitCard | PaymentMethod::Upi => 0.8,
            PaymentMethod::NetBanking => 0.7,
            PaymentMethod::Wallet => 0.9,
            PaymentMethod::CashOnDelivery => 1.0,
        }
    }

    fn transaction_id() -> String {
        format!("TXN-{:032X}", rand::random::<u128>())
    }

    fn gateway_reference() -> String {
        format!("GW-{:012X}", rand::random::<u64>() & 0xFFFF_FFFF_FFFF)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[tracing::instrument(skip(self), fields(method = %request.method))]
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Authorization, GatewayError> {
        tokio::time::sleep(self.delay).await;

        let approved = rand::random_bool(Self::approval_probability(request.method));
        let decision = if approved {
            GatewayDecision::Approved {
                gateway_reference: Self::gateway_reference(),
            }
        } else {
            GatewayDecision::Declined { reason: None }
        };

        tracing::debug!(approved, "simulated gateway decided");
        Ok(Authorization {
            transaction_id: Self::transaction_id(),
            decision,
        })
    }
}
