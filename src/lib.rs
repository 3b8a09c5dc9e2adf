pub mod baseline;
pub mod cli;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod inventory;
pub mod release;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod util;
