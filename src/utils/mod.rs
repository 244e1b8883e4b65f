//! FastCMS Utilities
//!
//! Small helpers shared by the services.

pub mod crypto;
pub mod file;
pub mod filters;
pub mod jwt;
pub mod text;
pub mod time;
pub mod version;

pub use crypto::{get_random_string, HashingScheme, PasswordHasher};
pub use filters::{parse_filters, Filter, Operator};
pub use jwt::{JwtAlgorithm, JwtHandler, TokenPayload};
pub use text::slugify;
pub use time::current_time;
pub use version::package_version;
