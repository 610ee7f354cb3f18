//! Log sanitization helpers
//!
//! Use through the `log_wallet!`, `log_id!` and `log_secret!` macros.

pub mod sanitize;
