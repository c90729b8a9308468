//! Order aggregate and related types.

mod aggregate;
mod item;
mod state;

pub use aggregate::{Order, OrderRecord};
pub use item::OrderItem;
pub use state::OrderStatus;
