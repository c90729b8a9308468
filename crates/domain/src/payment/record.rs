use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::Order;
use crate::value_objects::Money;

use super::{PaymentMethod, PaymentStatus};

/// Payment row as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The single payment attempt for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    order_id: OrderId,
    /// Copied from the order total when the attempt starts.
    amount: Money,
    status: PaymentStatus,
    method: PaymentMethod,
    /// Assigned by the gateway; unique across payments.
    transaction_id: Option<String>,
    gateway_reference: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    /// Starts a payment attempt for `order`, in `Processing`.
    pub fn start(order: &Order, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id: order.id(),
            amount: order.total_amount(),
            status: PaymentStatus::Processing,
            method,
            transaction_id: None,
            gateway_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_storage(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            order_id: record.order_id,
            amount: record.amount,
            status: record.status,
            method: record.method,
            transaction_id: record.transaction_id,
            gateway_reference: record.gateway_reference,
            failure_reason: record.failure_reason,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn record(&self) -> PaymentRecord {
        PaymentRecord {
            id: self.id,
            order_id: self.order_id,
            amount: self.amount,
            status: self.status,
            method: self.method,
            transaction_id: self.transaction_id.clone(),
            gateway_reference: self.gateway_reference.clone(),
            failure_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn gateway_reference(&self) -> Option<&str> {
        self.gateway_reference.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    pub fn can_be_refunded(&self) -> bool {
        self.is_successful()
    }

    /// Records the gateway transaction id while the payment awaits settlement.
    pub fn record_transaction(&mut self, transaction_id: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_processing("record transaction for")?;
        self.transaction_id = Some(transaction_id.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Settles the payment as successful.
    pub fn mark_success(
        &mut self,
        transaction_id: impl Into<String>,
        gateway_reference: Option<String>,
    ) -> Result<(), DomainError> {
        self.ensure_processing("mark successful")?;
        self.status = PaymentStatus::Success;
        self.transaction_id = Some(transaction_id.into());
        if gateway_reference.is_some() {
            self.gateway_reference = gateway_reference;
        }
        self.failure_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Settles the payment as failed.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_processing("mark failed")?;
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_processing(&self, action: &'static str) -> Result<(), DomainError> {
        if !self.status.is_awaiting_settlement() {
            return Err(DomainError::InvalidPaymentTransition {
                current: self.status,
                action,
            });
        }
        Ok(())
    }
}
