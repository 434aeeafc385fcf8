//! tabdash daemon: one shared settings object, usage fetchers for the dashboard
//! cards, and periodic cookie forwarding, served to UI contexts over local TCP.

pub mod broadcast;
pub mod client;
pub mod config_store;
pub mod cookies;
pub mod daemon;
pub mod errors;
pub mod favicon;
pub mod fetchers;
pub mod formatters;
pub mod router;
pub mod scheduler;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod validation;

pub use errors::{TabdashError, TabdashResult};
