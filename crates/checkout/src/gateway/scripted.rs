use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{Authorization, AuthorizationRequest, GatewayDecision, PaymentGateway};
use crate::error::GatewayError;

/// A canned gateway answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Approve,
    Decline(Option<String>),
    Pending,
    Fail(GatewayError),
}

#[derive(Debug)]
struct ScriptedState {
    queue: VecDeque<ScriptedOutcome>,
    fallback: ScriptedOutcome,
    delay: Duration,
    calls: Vec<AuthorizationRequest>,
    next_id: u32,
}

impl Default for ScriptedState {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: ScriptedOutcome::Approve,
            delay: Duration::ZERO,
            calls: Vec::new(),
            next_id: 0,
        }
    }
}

/// Deterministic gateway for testing.
///
/// Answers with queued outcomes first, then with the fallback outcome
/// (approve unless configured otherwise). Transaction ids are sequential.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedGateway {
    /// Creates a gateway that approves every payment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that answers every payment with `outcome`.
    pub fn always(outcome: ScriptedOutcome) -> Self {
        let gateway = Self::new();
        gateway.set_fallback(outcome);
        gateway
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an outcome for the next unanswered call.
    pub fn push(&self, outcome: ScriptedOutcome) {
        self.state().queue.push_back(outcome);
    }

    /// Sets the outcome used once the queue is empty.
    pub fn set_fallback(&self, outcome: ScriptedOutcome) {
        self.state().fallback = outcome;
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    /// Returns the requests received so far.
    pub fn calls(&self) -> Vec<AuthorizationRequest> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Authorization, GatewayError> {
        let delay = self.state().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let (outcome, seq) = {
            let mut state = self.state();
            state.calls.push(request);
            state.next_id += 1;
            let outcome = state
                .queue
                .pop_front()
                .unwrap_or_else(|| state.fallback.clone());
            (outcome, state.next_id)
        };

        let decision = match outcome {
            ScriptedOutcome::Approve => GatewayDecision::Approved {
                gateway_reference: format!("GW-{seq:012}"),
            },
            ScriptedOutcome::Decline(reason) => GatewayDecision::Declined { reason },
            ScriptedOutcome::Pending => GatewayDecision::Pending,
            ScriptedOutcome::Fail(err) => return Err(err),
        };

        Ok(Authorization {
            transaction_id: format!("TXN-{seq:08}"),
            decision,
        })
    }
}
