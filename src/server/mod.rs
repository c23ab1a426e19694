mod admin;
mod interactions;
mod router;
mod tags;
mod users;
mod videos;

pub mod access;
pub mod dto;
pub mod response;
pub mod validation;

pub use router::{AppState, create_router};
