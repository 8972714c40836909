use std::collections::HashMap;

use proclog_common::types::identity::Identity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentitySetError {
    #[error("identity set is full ({capacity} entries), refusing to record more processes")]
    CapacityExhausted { capacity: usize },
}

/// Every process identity seen so far, keyed by pid.
///
/// The set only grows. Its size is bounded by `capacity`; an insertion past
/// that bound is reported as [`IdentitySetError::CapacityExhausted`] and
/// leaves the set unchanged.
#[derive(Debug)]
pub struct IdentitySet {
    identities: HashMap<u32, Identity>,
    capacity: usize,
}

impl IdentitySet {
    pub fn new(capacity: usize) -> Self {
        Self {
            identities: HashMap::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.identities.contains_key(&pid)
    }

    pub fn get(&self, pid: u32) -> Option<&Identity> {
        self.identities.get(&pid)
    }

    /// Fails when one more identity would not fit.
    pub fn ensure_room(&self) -> Result<(), IdentitySetError> {
        if self.identities.len() >= self.capacity {
            return Err(IdentitySetError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Adds `identity`. Returns `Ok(false)` without touching the set when the
    /// pid is already known, the first-seen identity wins.
    pub fn insert(&mut self, identity: Identity) -> Result<bool, IdentitySetError> {
        if self.contains(identity.pid) {
            return Ok(false);
        }
        self.ensure_room()?;
        self.identities.insert(identity.pid, identity);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
