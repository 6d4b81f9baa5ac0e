//! # Spot Arbitrage Engine
//!
//! Execution and risk core for cross-exchange spot arbitrage.
//!
//! ## Architecture
//!
//! - `config`: Configuration management, profiles and validation
//! - `tick`: Tick scope tracking and the REST-during-evaluation guard
//! - `exchange`: Collaborator traits, shared types and the paper exchange
//! - `execution`: Fill simulation and the per-tick orchestrator
//! - `risk`: Risk gateway, live safety guard, watchdog and quant metrics
//! - `position`: Position book, stop losses and exposure rebalancing
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod position;
pub mod risk;
pub mod tick;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
