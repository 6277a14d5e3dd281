//! Quote source and broker gateway collaborators.
//!
//! The engine only ever sees the `QuoteSource` and `BrokerGateway` traits.
//! Concrete wiring lives here:
//! - `AlpacaClient`: market data + order routing over the Alpaca REST API
//! - `FailoverSource`: primary/fallback quote pair, transparent to callers
//! - `PaperBroker`: fills orders at the currently quoted price
//! - `mock`: scripted doubles for tests

mod alpaca;
mod failover;
pub mod mock;
mod paper;
mod traits;
mod types;

pub use alpaca::AlpacaClient;
pub use failover::FailoverSource;
pub use paper::PaperBroker;
pub use traits::{BrokerGateway, QuoteSource};
pub use types::*;
