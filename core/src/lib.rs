//! Loyalty tier engine for a per-unit billed roofing SaaS.
//!
//! Clients move between Casual, Pro and Elite on their monthly unit volume.
//! Volume above a tier's minimum banks protection months that hold a tier
//! through a slow month; upgrades can pay a one-time cashback credit.

pub mod batch;
pub mod cashback;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod maintenance;
pub mod promotion;
pub mod protection_ledger;
pub mod report;
pub mod state;
pub mod store;
pub mod tier_table;
pub mod types;
pub mod units;

pub use engine::LoyaltyEngine;
pub use error::{LoyaltyError, LoyaltyResult};
pub use types::{ClientId, TierId, Units, YearMonth};
