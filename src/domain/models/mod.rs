pub mod group;
pub mod message;

pub use group::MessageGroup;
pub use message::{Message, MessageStatus, NewMessage, StatusCounts};
