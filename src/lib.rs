pub mod alert_types;
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lapi;
pub mod observability;
pub mod scheduler;
pub mod sync;
pub mod ws;

mod state;

pub use config::*;
pub use state::*;
