//! Common traits for objcache.

use std::sync::Arc;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// RELEASE CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached value that holds resources needing explicit release.
///
/// Caches built with one of the `*_closable` constructors call `close` exactly
/// once when an entry is deleted or swept. Errors are logged by the cache and
/// never propagated to the caller that triggered the removal.
///
/// Overwriting a key with `set` does not close the replaced value.
pub trait Closable {
    /// Releases the resources held by this value.
    fn close(&self) -> Result<()>;
}

impl<T: Closable + ?Sized> Closable for Arc<T> {
    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

impl<T: Closable + ?Sized> Closable for Box<T> {
    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
