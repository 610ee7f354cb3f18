//! Mock Infrastructure for Settlement E2E Testing
//!
//! - MockChain: fixed on-chain balances and treasury snapshot
//! - TestContext: temp database, migrations and wired services

pub mod test_fixtures;

pub use mock_chain::*;
pub use test_fixtures::*;
