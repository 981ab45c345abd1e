//! Authentication primitives for Society Hub
//!
//! - [`token`]: HS256 bearer tokens that carry the caller's role and society
//! - [`password`]: Argon2id hashing for stored credentials

pub mod error;
pub mod password;
pub mod token;

pub use error::AuthError;
pub use password::{hash_password, validate_password_strength, verify_password};
pub use token::{extract_bearer_token, issue_token, validate_token, Claims, Role};
