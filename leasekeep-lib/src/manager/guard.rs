use log::warn;
use std::ops::Deref;

use crate::{Lease, LeaseManager, Result};

/// Releases the lease it holds when dropped.
///
/// Obtained from [`LeaseManager::lease_guard`]. A guard may hold no lease at
/// all if the acquire found nothing, in which case dropping it does nothing.
/// Release failures during drop cannot be returned and are logged instead;
/// call [`LeaseGuard::release`] to observe them.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lease immediately"]
pub struct LeaseGuard<'a> {
    manager: &'a LeaseManager,
    lease: Option<Lease>,
}

impl<'a> LeaseGuard<'a> {
    pub(crate) fn new(manager: &'a LeaseManager, lease: Option<Lease>) -> Self {
        Self { manager, lease }
    }

    /// The held lease, if any
    #[must_use]
    pub const fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// Release now and report the outcome
    ///
    /// # Errors
    ///
    /// Returns the storage error if the release fails.
    pub fn release(mut self) -> Result<Option<Lease>> {
        match self.lease.take() {
            Some(lease) => self.manager.release(&lease),
            None => Ok(None),
        }
    }

    /// Keep the lease beyond the guard's lifetime.
    /// The caller becomes responsible for releasing it.
    #[must_use]
    pub fn into_inner(mut self) -> Option<Lease> {
        self.lease.take()
    }
}

impl Deref for LeaseGuard<'_> {
    type Target = Option<Lease>;

    fn deref(&self) -> &Self::Target {
        &self.lease
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(e) = self.manager.release(&lease) {
                warn!("Failed to release lease {}: {e}", lease.id);
            }
        }
    }
}
