//! Shared utilities.

pub mod identifiers;

pub use identifiers::{
    generate_client_id, generate_secure_token, generate_session_id, SECURE_TOKEN_LENGTH,
};
