//! C ABI for rendering Go templates against JSON documents.
//!
//! `RenderTemplate`/`FreeString` keep the legacy single-string contract:
//! output verbatim, or `LABEL: message` on failure. The `gotmpl_*_v1`
//! functions return the same buffers with an explicit status instead.
//! Every returned buffer is owned by the bridge's [`OwnershipRegistry`]
//! until the caller releases it.

#![allow(clippy::missing_safety_doc)]

mod config;
mod outcome;
mod pipeline;
mod registry;

use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use once_cell::sync::OnceCell;

pub use config::{BridgeConfig, DEFAULT_TEMPLATE_NAME};
pub use outcome::{encode_legacy, encode_v1, ErrorKind, GotmplStatus, RenderFailure, RenderOutcome};
pub use pipeline::render;
pub use registry::{BufferHandle, OwnershipRegistry, Release};

pub const ABI_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GotmplRenderResult {
    pub ptr: *mut c_char,
    pub len: usize,
    pub status: GotmplStatus,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotmplFreeStatus {
    Released = 0,
    Unknown = 1,
}

impl From<Release> for GotmplFreeStatus {
    fn from(release: Release) -> Self {
        match release {
            Release::Released => GotmplFreeStatus::Released,
            Release::Unknown => GotmplFreeStatus::Unknown,
        }
    }
}

/// A registry plus the policy renders run under.
#[derive(Debug, Default)]
pub struct Bridge {
    registry: OwnershipRegistry,
    config: BridgeConfig,
}

static GLOBAL: OnceCell<Bridge> = OnceCell::new();

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            registry: OwnershipRegistry::new(),
            config,
        }
    }

    /// The process-wide bridge behind the exported functions. Its config is
    /// read from the environment on first use.
    pub fn global() -> &'static Bridge {
        GLOBAL.get_or_init(|| Bridge::new(BridgeConfig::from_env()))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn render(&self, template: &str, data: &str) -> RenderOutcome {
        let outcome = pipeline::render(&self.config, template, data);
        match &outcome {
            Ok(text) => tracing::debug!(bytes = text.len(), "render succeeded"),
            Err(failure) => {
                tracing::debug!(kind = %failure.kind, bytes = failure.message.len(), "render failed")
            }
        }
        outcome
    }

    /// Renders from caller-owned C strings. Null inputs and panics come
    /// back as failures.
    ///
    /// # Safety
    /// Non-null inputs must be valid NUL-terminated strings for the whole
    /// call.
    pub unsafe fn render_c(&self, template: *const c_char, data: *const c_char) -> RenderOutcome {
        catch_unwind(AssertUnwindSafe(|| {
            let template = pipeline::marshal_input(template, "template")?;
            let data = pipeline::marshal_input(data, "data")?;
            self.render(&template, &data)
        }))
        .unwrap_or_else(|_| {
            tracing::error!("render panicked");
            Err(RenderFailure::new(ErrorKind::Internal, "render panicked"))
        })
    }

    /// Legacy contract: one registered string per call.
    ///
    /// # Safety
    /// See [`Bridge::render_c`].
    pub unsafe fn render_legacy(&self, template: *const c_char, data: *const c_char) -> *mut c_char {
        let outcome = self.render_c(template, data);
        self.registry.allocate_and_register(&encode_legacy(&outcome)).ptr
    }

    /// # Safety
    /// See [`Bridge::render_c`].
    pub unsafe fn render_v1(&self, template: *const c_char, data: *const c_char) -> GotmplRenderResult {
        let outcome = self.render_c(template, data);
        let (status, payload) = encode_v1(&outcome);
        let handle = self.registry.allocate_and_register(payload);
        GotmplRenderResult {
            ptr: handle.ptr,
            len: handle.len,
            status,
        }
    }

    pub fn release(&self, ptr: *const c_char) -> Release {
        self.registry.release(ptr)
    }
}

#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn RenderTemplate(template: *const c_char, data: *const c_char) -> *mut c_char {
    catch_unwind(|| Bridge::global().render_legacy(template, data)).unwrap_or(std::ptr::null_mut())
}

/// Releases a string returned by `RenderTemplate` or `gotmpl_render_v1`.
/// Null, unknown and already released pointers are ignored.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn FreeString(ptr: *mut c_char) {
    let _ = catch_unwind(|| Bridge::global().release(ptr));
}

#[no_mangle]
pub extern "C" fn gotmpl_abi_version() -> u32 {
    ABI_VERSION
}

#[no_mangle]
pub unsafe extern "C" fn gotmpl_render_v1(
    template: *const c_char,
    data: *const c_char,
) -> GotmplRenderResult {
    catch_unwind(|| Bridge::global().render_v1(template, data)).unwrap_or(GotmplRenderResult {
        ptr: std::ptr::null_mut(),
        len: 0,
        status: GotmplStatus::Internal,
    })
}

#[no_mangle]
pub unsafe extern "C" fn gotmpl_free_v1(ptr: *mut c_char) -> GotmplFreeStatus {
    catch_unwind(|| Bridge::global().release(ptr))
        .map(GotmplFreeStatus::from)
        .unwrap_or(GotmplFreeStatus::Unknown)
}

#[no_mangle]
pub extern "C" fn gotmpl_live_buffers_v1() -> usize {
    catch_unwind(|| Bridge::global().registry().live_count()).unwrap_or(0)
}
