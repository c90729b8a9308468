use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Settlement status of a payment.
///
/// A payment is created in `Processing` and reaches `Success` or `Failed`
/// when the gateway answers, either inline or through the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    /// Returns true if the gateway may still settle a payment in this status.
    pub fn is_awaiting_settlement(&self) -> bool {
        matches!(self, PaymentStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "payment status",
                value: s.to_string(),
            })
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
    CashOnDelivery,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::Upi,
        PaymentMethod::NetBanking,
        PaymentMethod::Wallet,
        PaymentMethod::CashOnDelivery,
    ];

    /// Cash on delivery captures no funds up front.
    pub fn captures_funds(&self) -> bool {
        !matches!(self, PaymentMethod::CashOnDelivery)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::NetBanking => "NET_BANKING",
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "payment method",
                value: s.to_string(),
            })
    }
}
