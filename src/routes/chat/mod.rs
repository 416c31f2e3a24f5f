mod handler;
pub mod model;

pub use handler::{delete_history, delete_message, get_history, list_histories, send_message};
