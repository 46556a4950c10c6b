mod broadcast;
mod handler;
mod messages;

pub use broadcast::{Broadcaster, Channel, Subscription};
pub use handler::ws_handler;
pub use messages::WsMessage;
