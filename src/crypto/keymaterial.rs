//! Wiping byte buffers and constant-time comparison for secret material.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// A byte buffer holding secret material.
///
/// The buffer is zeroized on drop and on every explicit [`KeyMaterial::wipe`]
/// call. Equality is constant-time over the buffer's contents; a wiped
/// instance compares unequal to everything, including another wiped instance.
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
    wiped: bool,
}

impl KeyMaterial {
    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
            wiped: false,
        }
    }

    /// Take ownership of an existing buffer as key material.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            wiped: false,
        }
    }

    /// Borrow the contents. Returns an empty slice once wiped.
    pub fn as_bytes(&self) -> &[u8] {
        if self.wiped {
            &[]
        } else {
            &self.bytes
        }
    }

    /// Number of live bytes (zero once wiped).
    pub fn len(&self) -> usize {
        if self.wiped { 0 } else { self.bytes.len() }
    }

    /// True if there are no live bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if this instance has been wiped.
    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Overwrite the buffer with zeros and mark it wiped.
    pub fn wipe(&mut self) {
        self.bytes.zeroize();
        self.bytes.clear();
        self.wiped = true;
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        if self.wiped || other.wiped {
            return false;
        }
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for KeyMaterial {}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.len())
            .field("wiped", &self.wiped)
            .finish()
    }
}

/// Zeroize an arbitrary byte container after use.
pub fn secure_wipe(bytes: &mut [u8]) {
    bytes.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_clears_contents_and_length() {
        let mut km = KeyMaterial::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(km.len(), 4);
        km.wipe();
        assert_eq!(km.len(), 0);
        assert!(km.is_wiped());
        assert!(km.as_bytes().is_empty());
    }

    #[test]
    fn equality_is_constant_time_and_content_based() {
        let a = KeyMaterial::from_vec(vec![9u8; 32]);
        let b = KeyMaterial::from_vec(vec![9u8; 32]);
        let c = KeyMaterial::from_vec(vec![1u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn wiped_instance_equals_nothing() {
        let mut a = KeyMaterial::from_vec(vec![9u8; 32]);
        let b = KeyMaterial::from_vec(vec![9u8; 32]);
        a.wipe();
        assert_ne!(a, b);
        let mut c = KeyMaterial::from_vec(vec![9u8; 32]);
        c.wipe();
        assert_ne!(a, c);
    }

}
