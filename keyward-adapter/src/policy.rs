//! Authorization seam.
//!
//! The policy engine lives outside this crate; a deployment only knows how to
//! obtain one through its deferred factory.

/// Decides whether an authenticated request may access a resource.
pub trait PolicyEnforcer: Send + Sync {
    /// Returns `true` when `method` on `path` is permitted for the caller
    /// described by the validated token `claims`.
    fn authorize(&self, method: &str, path: &str, claims: &serde_json::Value) -> bool;
}
