// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer credential handling and the session-invalid seam.
//!
//! A 401 anywhere in the subsystem triggers exactly one global reaction:
//! the transport that saw it calls [`SessionGuard::on_session_invalid`] and
//! fails the in-flight operation with `CarelinkError::Auth`. Other in-flight
//! operations are left to fail (or succeed) independently. The guard is
//! injected at transport construction rather than living in module-level
//! mutable state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An opaque bearer credential.
///
/// Session mechanics (issuance, refresh, storage) are an external concern;
/// the core only assumes a credential exists and can be rendered as an
/// `Authorization: Bearer` header value.
#[derive(Clone)]
pub struct BearerToken(Arc<String>);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(token.into()))
    }

    /// Renders the full `Authorization` header value.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the credential itself.
        f.write_str("BearerToken(..)")
    }
}

/// Receives the single global "session invalid" notification.
pub trait SessionGuard: Send + Sync {
    /// Called when any request in the subsystem receives a 401.
    fn on_session_invalid(&self);
}

/// A [`SessionGuard`] that records whether it fired.
///
/// Useful as a default in binaries and as an assertion point in tests.
#[derive(Debug, Default)]
pub struct LatchingSessionGuard {
    invalidated: AtomicBool,
}

impl LatchingSessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any transport has reported a 401.
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }
}

impl SessionGuard for LatchingSessionGuard {
    fn on_session_invalid(&self) {
        if !self.invalidated.swap(true, Ordering::SeqCst) {
            tracing::warn!("bearer credential rejected; session marked invalid");
        }
    }
}
