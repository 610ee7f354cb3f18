// Log redaction macros (declared before the modules that use them)
#[macro_export]
macro_rules! log_id {
    ($id:expr) => {
        $crate::logging::sanitize::sanitize_id($id)
    };
}

#[macro_export]
macro_rules! log_wallet {
    ($addr:expr) => {
        $crate::logging::sanitize::sanitize_wallet($addr)
    };
}

#[macro_export]
macro_rules! log_secret {
    ($secret:expr) => {
        $crate::logging::sanitize::sanitize_secret($secret)
    };
}

#[macro_export]
macro_rules! log_signature {
    ($sig:expr) => {
        $crate::logging::sanitize::sanitize_signature($sig)
    };
}

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod schema;
pub mod services;
pub mod telemetry;
