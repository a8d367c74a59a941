pub mod ai;
pub mod booking;
pub mod chatbot;
pub mod conflict;
pub mod lifecycle;
pub mod receipts;
pub mod scheduling;
pub mod sessions;
