mod enums;
mod models;

pub use enums::{Role, Visibility};
pub use models::*;
