pub mod admin;
pub mod chat;
pub mod health;
pub mod refresh_token;
pub mod user;
