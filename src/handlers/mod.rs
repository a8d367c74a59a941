pub mod admin;
pub mod appointments;
pub mod chatbot;
pub mod health;
pub mod identity;
