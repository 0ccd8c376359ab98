use std::collections::HashMap;
use std::os::raw::c_char;
use std::sync::Mutex;

/// A buffer handed across the boundary: NUL-terminated, `len` excludes the
/// terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    pub ptr: *mut c_char,
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    Unknown,
}

/// Owns every buffer returned to a foreign caller until the caller hands
/// it back. Keys are buffer addresses; an address is present exactly while
/// its buffer is live.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    live: Mutex<HashMap<usize, Box<[u8]>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Box<[u8]>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copies `text` into fresh NUL-terminated storage and records it.
    pub fn allocate_and_register(&self, text: &str) -> BufferHandle {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        let mut storage = bytes.into_boxed_slice();
        let ptr = storage.as_mut_ptr().cast::<c_char>();
        let addr = ptr as usize;
        let previous = self.table().insert(addr, storage);
        debug_assert!(previous.is_none(), "live buffer address reused");
        tracing::trace!(addr, len = text.len(), "registered buffer");
        BufferHandle {
            ptr,
            len: text.len(),
        }
    }

    /// Drops the buffer at `ptr` if this registry issued it and it is still
    /// live. Null and foreign addresses are reported as `Unknown`.
    pub fn release(&self, ptr: *const c_char) -> Release {
        if ptr.is_null() {
            return Release::Unknown;
        }
        let addr = ptr as usize;
        let removed = self.table().remove(&addr);
        match removed {
            Some(storage) => {
                drop(storage);
                tracing::trace!(addr, "released buffer");
                Release::Released
            }
            None => {
                tracing::warn!(addr, "release of unknown buffer ignored");
                Release::Unknown
            }
        }
    }

    pub fn contains(&self, ptr: *const c_char) -> bool {
        self.table().contains_key(&(ptr as usize))
    }

    pub fn live_count(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn buffers_are_nul_terminated_copies() {
        let registry = OwnershipRegistry::new();
        let handle = registry.allocate_and_register("abc");
        assert_eq!(handle.len, 3);
        let text = unsafe { CStr::from_ptr(handle.ptr) };
        assert_eq!(text.to_str().expect("utf8"), "abc");
        assert!(registry.contains(handle.ptr));
        assert_eq!(registry.release(handle.ptr), Release::Released);
        assert!(!registry.contains(handle.ptr));
    }

    #[test]
    fn release_is_idempotent() {
        let registry = OwnershipRegistry::new();
        let handle = registry.allocate_and_register("");
        assert_eq!(registry.release(handle.ptr), Release::Released);
        assert_eq!(registry.release(handle.ptr), Release::Unknown);
        assert_eq!(registry.release(std::ptr::null()), Release::Unknown);
        let stray = 0u8;
        assert_eq!(
            registry.release((&stray as *const u8).cast::<c_char>()),
            Release::Unknown
        );
        assert_eq!(registry.live_count(), 0);
    }
}
