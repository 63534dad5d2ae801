//! Application layer: event dispatch and the consumers built on top of it.

pub mod checkout;
pub mod dispatcher;
pub mod handlers;
pub mod session;
