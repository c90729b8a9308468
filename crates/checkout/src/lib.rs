//! Checkout workflows for the storefront backend.
//!
//! - [`OrderService`] places orders (validating every line against the
//!   catalog and taking its stock), answers order queries and cancels orders
//!   with compensating stock restoration.
//! - [`PaymentService`] settles the single payment attempt of an order
//!   through an injected [`PaymentGateway`], confirming the order on approval
//!   or restoring stock and cancelling it on failure.
//!
//! Each public operation is one unit of work on a [`store::Store`].

mod compensation;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod payments;
pub mod requests;

pub use error::{CheckoutError, GatewayError, Result};
pub use gateway::{
    Authorization, AuthorizationRequest, GatewayDecision, PaymentGateway, ScriptedGateway,
    ScriptedOutcome, SimulatedGateway,
};
pub use orders::OrderService;
pub use payments::{DECLINED_REASON, DEFAULT_GATEWAY_TIMEOUT, PaymentService, TIMEOUT_REASON};
pub use requests::{OrderLine, PlaceOrder, ProcessPayment};
