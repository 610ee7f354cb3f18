//! TKOIN Shared Types
//!
//! Pure data types shared by the settlement server and its tooling:
//! - TKOIN amounts in base units (9 decimals)
//! - Verification tiers and the staking thresholds that derive them
//! - Lifecycle states for agents, stakes, slashing events, burn proposals
//!   and P2P orders, each with an explicit transition table
//!
//! Nothing in this crate performs I/O. Transition tables live here so that
//! every storage path validates a state change the same way before it
//! issues its conditional update.

pub mod amount;
pub mod error;
pub mod governance;
pub mod order;
pub mod status;
pub mod tier;

pub use amount::*;
pub use error::*;
pub use governance::*;
pub use order::*;
pub use status::*;
pub use tier::*;
