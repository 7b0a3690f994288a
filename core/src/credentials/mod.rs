//! Credential handling: caller-scoped lookup and per-provider rotation pools.

pub mod lookup;
pub mod rotation;

pub use lookup::{CredentialLookup, LookupError, ResolvedCredential, StaticCredentialLookup};
pub use rotation::{CredentialRotationManager, RotationError};
