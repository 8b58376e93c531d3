//! Signature provider seam for the visibility-timeout adapter.

use message_worker_core::Result;

/// Validates the cryptographic signature of a raw queue envelope before it is
/// dispatched. Real verifiers are external collaborators; a failure is
/// treated like a handler failure (reported, then rejected for retry).
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, raw_body: &str) -> Result<()>;
}

/// Accepts every envelope; for deployments without signed messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVerifier;

impl SignatureVerifier for NullVerifier {
    fn verify(&self, _raw_body: &str) -> Result<()> {
        Ok(())
    }
}
