pub mod chat;
pub mod paper;
