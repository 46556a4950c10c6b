mod api;
mod client;
#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod types;

pub use api::*;
pub use client::*;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::*;
pub use types::*;
