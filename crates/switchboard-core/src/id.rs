//! Registry-assigned service identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Globally unique identity of a published service.
///
/// A `ServiceId` is two independent 64-bit random draws. Callers never build
/// one themselves: the [`ServiceLookup`](crate::ServiceLookup) mints a fresh
/// ID the first time an item without an ID is registered.
///
/// Equality and hashing compare the two halves only. The hex form used by
/// [`Display`](fmt::Display) is computed once and cached.
pub struct ServiceId {
    most_sig: u64,
    least_sig: u64,
    hex: OnceLock<String>,
}

impl ServiceId {
    pub(crate) fn generate() -> Self {
        Self::from_parts(rand::random(), rand::random())
    }

    pub(crate) fn from_parts(most_sig: u64, least_sig: u64) -> Self {
        Self {
            most_sig,
            least_sig,
            hex: OnceLock::new(),
        }
    }

    /// Returns the most significant 64 bits.
    pub fn most_significant_bits(&self) -> u64 {
        self.most_sig
    }

    /// Returns the least significant 64 bits.
    pub fn least_significant_bits(&self) -> u64 {
        self.least_sig
    }

    fn hex(&self) -> &str {
        self.hex.get_or_init(|| {
            let m = self.most_sig;
            let l = self.least_sig;
            format!(
                "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
                m >> 32,
                (m >> 16) & 0xffff,
                m & 0xffff,
                l >> 48,
                l & 0xffff_ffff_ffff
            )
        })
    }
}

impl Clone for ServiceId {
    fn clone(&self) -> Self {
        Self {
            most_sig: self.most_sig,
            least_sig: self.least_sig,
            hex: self.hex.clone(),
        }
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        self.most_sig == other.most_sig && self.least_sig == other.least_sig
    }
}

impl Eq for ServiceId {}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.most_sig.hash(state);
        self.least_sig.hash(state);
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_cached_text() {
        let a = ServiceId::from_parts(1, 2);
        let b = ServiceId::from_parts(1, 2);
        let _ = a.to_string();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_hex_is_stable() {
        let id = ServiceId::from_parts(0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210);
        assert_eq!(id.to_string(), "01234567-89ab-cdef-fedc-ba9876543210");
        assert_eq!(id.to_string(), id.clone().to_string());
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(ServiceId::generate(), ServiceId::generate());
    }
}
