//! Exchange-facing collaborators of the execution core.
//!
//! Venue clients (REST/WebSocket, reconnects) live outside this crate. The
//! core only sees the traits below plus the shared data types. The paper
//! exchange implements every trait in memory.

pub mod mock;
mod traits;
mod types;

pub use mock::{PaperAccount, PaperExchange};
#[cfg(test)]
pub use traits::MockOrderGateway;
pub use traits::{HealthSource, MarketDataFeed, OrderGateway};
pub use types::*;
