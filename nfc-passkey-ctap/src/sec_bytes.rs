//! Secure byte storage for session secrets
//!
//! Holds pinUvAuthTokens and large-blob keys for the lifetime of one session.
//! Backed by `secstr::SecVec`, which mlocks the allocation and zeroes it on drop.

use secstr::SecVec;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct SecBytes {
    inner: SecVec<u8>,
}

impl SecBytes {
    /// Move `data` into protected storage
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: SecVec::from(data),
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.inner.unsecure().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scoped access to the secret
    ///
    /// Prefer this to holding a slice; the borrow ends with the closure.
    pub fn with_bytes<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        let result = f(self.inner.unsecure());
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
        result
    }

    /// Copy into a fixed-size array that is zeroed on drop
    ///
    /// `None` if the length differs from `N`.
    pub fn to_array<const N: usize>(&self) -> Option<Zeroizing<[u8; N]>> {
        self.with_bytes(|bytes| {
            if bytes.len() != N {
                return None;
            }
            let mut arr = Zeroizing::new([0u8; N]);
            arr.copy_from_slice(bytes);
            Some(arr)
        })
    }
}

impl core::fmt::Debug for SecBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecBytes")
            .field("len", &self.len())
            .field("data", &"<redacted>")
            .finish()
    }
}

impl PartialEq for SecBytes {
    fn eq(&self, other: &Self) -> bool {
        self.inner
            .unsecure()
            .ct_eq(other.inner.unsecure())
            .into()
    }
}

impl Eq for SecBytes {}
