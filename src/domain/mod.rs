mod alert;
mod decision;
pub mod duration;
mod host;
mod view;

pub use alert::*;
pub use decision::*;
pub use duration::{compute_expires_at, parse_duration_ms};
pub use host::*;
pub use view::*;
