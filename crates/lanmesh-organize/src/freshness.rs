//! Freshness policies applied to incoming descriptors.
//!
//! The default accepts everything; replay protection comes from the
//! strictly increasing `vf` check, not from the clock.

use std::fmt;

use chrono::Utc;

use crate::descriptor::Descriptor;

/// Decides whether a descriptor is recent enough to admit.
pub trait FreshnessPolicy: fmt::Debug + Send + Sync {
    /// Returns `true` if the descriptor may be admitted.
    fn is_fresh(&self, descriptor: &Descriptor) -> bool;
}

/// Accepts every descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FreshnessPolicy for AcceptAll {
    fn is_fresh(&self, _descriptor: &Descriptor) -> bool {
        true
    }
}

/// Treats `vf` as a Unix publish timestamp valid for `dt` seconds, with
/// `max_skew_secs` of tolerance on both ends.
#[derive(Debug, Clone, Copy)]
pub struct ValidityWindow {
    /// Allowed clock skew in seconds.
    pub max_skew_secs: u64,
}

impl ValidityWindow {
    /// Creates a window with the given skew tolerance.
    #[must_use]
    pub fn new(max_skew_secs: u64) -> Self {
        Self { max_skew_secs }
    }

    /// Checks the descriptor against an explicit clock reading.
    #[must_use]
    pub fn is_fresh_at(&self, descriptor: &Descriptor, now: u64) -> bool {
        let published = descriptor.vf();
        let not_before = published.saturating_sub(self.max_skew_secs);
        let not_after = published
            .saturating_add(descriptor.dt())
            .saturating_add(self.max_skew_secs);
        (not_before..=not_after).contains(&now)
    }
}

impl FreshnessPolicy for ValidityWindow {
    fn is_fresh(&self, descriptor: &Descriptor) -> bool {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        self.is_fresh_at(descriptor, now)
    }
}
