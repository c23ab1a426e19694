mod helpers;
mod middleware;
mod token;

pub use helpers::{TokenValidationError, ValidatedToken, extract_token_from_header, validate_token};
pub use middleware::{AuthError, OptionalUser, RequireAdmin, RequireUser};
pub use token::{TokenGenerator, parse_token};
