//! Action handlers, one module per action family. Each handler takes the
//! shared state plus a parsed-and-validated payload and returns a typed
//! response; the router turns both into the wire envelope.

pub mod accounts;
pub mod admin;
pub mod backtest;
pub mod bot;
pub mod price;
pub mod provider;
pub mod response;
pub mod trade;
