//! # capfolio
//!
//! Market-cap weighted cryptocurrency portfolio rebalancer.
//!
//! The pipeline: raw market-cap snapshots are reduced to one candidate
//! per day ([`sampler`]), smoothed with an EMA ([`smoothing`]), ranked
//! and weighted into a target allocation ([`target`]), and finally
//! diffed against the current balance and executed as sell-then-buy
//! order phases ([`engine`]).
//!
//! Exchange connectivity and persistence are injected: implement
//! [`exchange::Exchange`] and [`marketcap::MarketCapRepository`] (tests
//! use [`mock::MockExchange`]). The crate never schedules itself — when
//! to run is the caller's concern.
//!
//! ```no_run
//! use capfolio::config::Config;
//! use capfolio::engine::RebalanceEngine;
//! use capfolio::mock::MockExchange;
//! use capfolio::target::compute_target_allocation;
//! use capfolio::verify::SystemClock;
//!
//! let exchange = MockExchange::builder("EUR").build();
//! let config = Config::default();
//! let histories = vec![]; // from a MarketCapRepository
//! let targets = compute_target_allocation(&config, &histories, chrono::Utc::now())?;
//!
//! let engine = RebalanceEngine::new(&exchange, &SystemClock);
//! let orders = engine.rebalance(&config, &targets, None)?;
//! # Ok::<(), capfolio::error::Error>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod market;
pub mod marketcap;
pub mod mock;
pub mod order;
pub mod portfolio;
pub mod sampler;
pub mod smoothing;
pub mod target;
pub mod verify;

pub use config::Config;
pub use engine::{AllocationDiff, RebalanceEngine};
pub use error::{Error, Result};
pub use exchange::{Exchange, MarketStatus};
pub use market::Market;
pub use marketcap::{MarketCapRepository, MarketCapSample};
pub use order::{Order, OrderRequest, OrderSide, OrderStatus};
pub use portfolio::{Allocation, Balance};
pub use target::AbsoluteAllocation;
