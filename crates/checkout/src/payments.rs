//! Payment settlement.

use std::time::{Duration, Instant};

use common::{OrderId, UserId};
use domain::{Order, OrderStatus, Payment, PaymentStatus};
use store::{PAYMENT_ORDER_CONSTRAINT, Store, StoreError, Transaction};

use crate::compensation::restore_order_stock;
use crate::error::{CheckoutError, Result};
use crate::gateway::{AuthorizationRequest, GatewayDecision, PaymentGateway};
use crate::orders::owned_order;
use crate::requests::ProcessPayment;

/// Failure reason recorded when the gateway declines without saying why.
pub const DECLINED_REASON: &str = "Payment declined by gateway";

/// Failure reason recorded when the gateway does not answer in time.
pub const TIMEOUT_REASON: &str = "Payment gateway timed out";

/// How long to wait for the gateway by default.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one settlement attempt, gateway errors already folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Approved {
        transaction_id: String,
        gateway_reference: Option<String>,
    },
    Declined {
        transaction_id: Option<String>,
        reason: String,
    },
    Pending {
        transaction_id: String,
    },
}

/// Application service for the payment side of checkout.
pub struct PaymentService<S: Store, G: PaymentGateway> {
    store: S,
    gateway: G,
    gateway_timeout: Duration,
}

impl<S: Store, G: PaymentGateway> PaymentService<S, G> {
    /// Creates a new payment service with the default gateway timeout.
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            store,
            gateway,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Sets how long a gateway call may take before the payment fails.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Pays for a pending order.
    ///
    /// The order is confirmed on approval. On a decline, gateway error or
    /// timeout the payment is marked failed, the order's stock is restored
    /// and the order is cancelled. A pending gateway answer leaves both the
    /// payment and the order waiting for the webhook.
    ///
    /// Runs as two units of work with the gateway call between them, so no
    /// store lock is held while the gateway is busy. The PROCESSING payment
    /// committed by the first one keeps the order from being paid twice or
    /// cancelled in the meantime.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.method))]
    pub async fn process_payment(&self, request: ProcessPayment) -> Result<Payment> {
        let payment = self.open_payment(&request).await?;

        let settlement = self.authorize(&payment).await;

        let mut tx = self.store.begin().await?;
        let locked = tx
            .lock_payment(payment.id())
            .await?
            .ok_or_else(|| CheckoutError::not_found("Payment", payment.id()))?;
        let (order, payment, restored) = settle_locked(&mut tx, locked, settlement).await?;
        tx.commit().await?;

        record_settlement(&order, &payment, restored);
        Ok(payment)
    }

    /// Returns the payment of an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment_for_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Payment> {
        let mut tx = self.store.begin().await?;
        let order = owned_order(&mut tx, order_id, user_id, false).await?;
        let payment = tx
            .find_payment_for_order(order.id())
            .await?
            .ok_or_else(|| {
                CheckoutError::NotFound(format!("Payment not found for order: {order_id}"))
            })?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Settles a payment that is still awaiting the gateway, as reported by
    /// the gateway's asynchronous callback.
    ///
    /// Already settled payments are rejected without any change, so a
    /// repeated callback is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn settle_by_transaction(
        &self,
        transaction_id: &str,
        success: bool,
    ) -> Result<Payment> {
        let mut tx = self.store.begin().await?;

        let payment = tx
            .lock_payment_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| {
                CheckoutError::NotFound(format!(
                    "Payment not found with transaction id: {transaction_id}"
                ))
            })?;

        let settlement = if success {
            Settlement::Approved {
                transaction_id: transaction_id.to_string(),
                gateway_reference: None,
            }
        } else {
            Settlement::Declined {
                transaction_id: None,
                reason: DECLINED_REASON.to_string(),
            }
        };

        let (order, payment, restored) = settle_locked(&mut tx, payment, settlement).await?;
        tx.commit().await?;

        record_settlement(&order, &payment, restored);
        Ok(payment)
    }

    /// Checks the order can be paid and commits its PROCESSING payment.
    async fn open_payment(&self, request: &ProcessPayment) -> Result<Payment> {
        let mut tx = self.store.begin().await?;

        let order = owned_order(&mut tx, request.order_id, request.user_id, true).await?;
        if order.status() != OrderStatus::Pending {
            return Err(CheckoutError::InvalidPaymentState {
                status: order.status(),
            });
        }
        if tx.find_payment_for_order(order.id()).await?.is_some() {
            return Err(CheckoutError::DuplicatePayment(order.id()));
        }

        let payment = Payment::start(&order, request.method);
        tx.insert_payment(&payment)
            .await
            .map_err(|e| duplicate_or_store(e, order.id()))?;
        tx.commit().await?;

        Ok(payment)
    }

    /// Calls the gateway under the configured timeout.
    async fn authorize(&self, payment: &Payment) -> Settlement {
        let request = AuthorizationRequest {
            payment_id: payment.id(),
            order_id: payment.order_id(),
            amount: payment.amount(),
            method: payment.method(),
        };

        let started = Instant::now();
        let answer = tokio::time::timeout(self.gateway_timeout, self.gateway.authorize(request)).await;
        metrics::histogram!("payment_gateway_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match answer {
            Ok(Ok(auth)) => match auth.decision {
                GatewayDecision::Approved { gateway_reference } => Settlement::Approved {
                    transaction_id: auth.transaction_id,
                    gateway_reference: Some(gateway_reference),
                },
                GatewayDecision::Declined { reason } => Settlement::Declined {
                    transaction_id: Some(auth.transaction_id),
                    reason: reason.unwrap_or_else(|| DECLINED_REASON.to_string()),
                },
                GatewayDecision::Pending => Settlement::Pending {
                    transaction_id: auth.transaction_id,
                },
            },
            Ok(Err(err)) => {
                tracing::warn!(payment_id = %payment.id(), error = %err, "payment gateway failed");
                Settlement::Declined {
                    transaction_id: None,
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(
                    payment_id = %payment.id(),
                    timeout_ms = self.gateway_timeout.as_millis() as u64,
                    "payment gateway timed out"
                );
                Settlement::Declined {
                    transaction_id: None,
                    reason: TIMEOUT_REASON.to_string(),
                }
            }
        }
    }
}

/// Applies `settlement` to a payment locked by the caller.
///
/// The payment must still be awaiting settlement, and an approval needs the
/// order to still be pending. Nothing is written otherwise.
async fn settle_locked<T: Transaction>(
    tx: &mut T,
    mut payment: Payment,
    settlement: Settlement,
) -> Result<(Order, Payment, u64)> {
    if payment.status() != PaymentStatus::Processing {
        return Err(CheckoutError::InvalidState(format!(
            "Payment is already settled with status: {}",
            payment.status()
        )));
    }

    let mut order = tx
        .lock_order(payment.order_id())
        .await?
        .ok_or_else(|| CheckoutError::not_found("Order", payment.order_id()))?;
    if matches!(settlement, Settlement::Approved { .. }) && order.status() != OrderStatus::Pending
    {
        return Err(CheckoutError::InvalidState(format!(
            "Order is no longer awaiting payment: {}",
            order.status()
        )));
    }

    let restored = apply_settlement(tx, &mut order, &mut payment, settlement).await?;
    Ok((order, payment, restored))
}

/// Writes a settlement to the payment and order. Returns the units of stock
/// restored.
async fn apply_settlement<T: Transaction>(
    tx: &mut T,
    order: &mut Order,
    payment: &mut Payment,
    settlement: Settlement,
) -> Result<u64> {
    let mut restored = 0;

    match settlement {
        Settlement::Approved {
            transaction_id,
            gateway_reference,
        } => {
            payment.mark_success(transaction_id, gateway_reference)?;
            // Checked pending under its row lock by `settle_locked`.
            order.confirm()?;
            tx.update_order(order).await?;
        }
        Settlement::Declined {
            transaction_id,
            reason,
        } => {
            if let Some(transaction_id) = transaction_id {
                payment.record_transaction(transaction_id)?;
            }
            payment.mark_failed(reason)?;
            if order.status() == OrderStatus::Pending {
                restored = restore_order_stock(tx, order).await?;
                order.cancel()?;
                tx.update_order(order).await?;
            }
        }
        Settlement::Pending { transaction_id } => {
            payment.record_transaction(transaction_id)?;
        }
    }

    tx.update_payment(payment).await?;
    Ok(restored)
}

fn duplicate_or_store(err: StoreError, order_id: OrderId) -> CheckoutError {
    if err.unique_constraint() == Some(PAYMENT_ORDER_CONSTRAINT) {
        CheckoutError::DuplicatePayment(order_id)
    } else {
        CheckoutError::Store(err)
    }
}

fn record_settlement(order: &Order, payment: &Payment, restored: u64) {
    metrics::counter!("payments_processed_total", "status" => payment.status().as_str())
        .increment(1);

    match payment.status() {
        PaymentStatus::Success => {
            tracing::info!(order_id = %order.id(), payment_id = %payment.id(), "payment succeeded");
        }
        PaymentStatus::Failed => {
            if order.status() == OrderStatus::Cancelled && restored > 0 {
                metrics::counter!("orders_cancelled_total", "reason" => "payment_failed")
                    .increment(1);
                metrics::counter!("stock_units_restored_total").increment(restored);
            }
            tracing::warn!(
                order_id = %order.id(),
                payment_id = %payment.id(),
                reason = payment.failure_reason().unwrap_or_default(),
                "payment failed"
            );
        }
        _ => {
            tracing::info!(
                order_id = %order.id(),
                transaction_id = payment.transaction_id().unwrap_or_default(),
                "payment awaiting gateway settlement"
            );
        }
    }
}
