pub mod message;

pub use message::{
    Message, MessageFilter, MessageStatus, NewMessage, SentEligibility, validate_message_id,
};
