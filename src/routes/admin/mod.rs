mod handler;
pub mod model;

pub use handler::{
    change_role, create_user, delete_user, get_user, list_users, statistics, toggle_active,
    update_user,
};
