//! Authentication adapters.
//!
//! Implementations of the `TokenVerifier` port:
//!
//! - `jwks` - Production verifier against a published JWKS
//! - `dev` - Permissive verifier for local development
//! - `mock` - Test implementation mapping fixed tokens to claims

mod dev;
mod jwks;
mod mock;

pub use dev::DevTokenVerifier;
pub use jwks::{HttpJwksFetcher, JwksConfig, JwksFetcher, JwksTokenVerifier};
pub use mock::MockTokenVerifier;
