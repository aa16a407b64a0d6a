pub mod message;
pub mod message_recipient;
pub mod user;
