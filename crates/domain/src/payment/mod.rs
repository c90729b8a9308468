//! Payment record and its settlement statuses.

mod record;
mod state;

pub use record::{Payment, PaymentRecord};
pub use state::{PaymentMethod, PaymentStatus};
