//! Credential handling: token decoding, validity windows and the auth context
//! passed to rule evaluation.

/// The auth context derived from decoded claims.
pub mod claims;
/// JWT decoding and validity-window checks.
pub mod token_validator;

pub use claims::AuthClaims;
pub use token_validator::{normalize, Claims, TokenValidator};
