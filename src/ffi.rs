//! This file contains the C ABI a native harness loads us through. The harness
//! hands every call a `HarnessVtable` with its filter callbacks and config,
//! and we hand back one heap allocated `ModuleInstance` per loaded module so
//! several modules can live in one process without sharing any state.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

use std::ffi::{CStr, CString};

use libc::{c_char, c_int, c_void};

use crate::err::MalformErr;
use crate::filter::{FilterHandle, FilterRegistry, HarnessConfig, ModuleCtx};
use crate::mutators::{create_module, IncompletePolicy, ModuleStatus, PacketModule};

/// `filter(harness, path)`: handle >= 0, or negative if the path is unknown
pub type CreateFilterFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int;

/// `register_filter(harness, handle)`: non-zero if the filter is tracked
pub type RegisterFilterFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;

/// `read_filter(harness, handle)`: non-zero if the element matched
pub type ReadFilterFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;

/// Harness capabilities as seen from C
#[repr(C)]
pub struct HarnessVtable {
    pub harness: *mut c_void,
    pub config: *mut HarnessConfig,
    pub filter: Option<CreateFilterFn>,
    pub register_filter: Option<RegisterFilterFn>,
    pub read_filter: Option<ReadFilterFn>,
}

// Adapts the vtable callbacks to `FilterRegistry`
struct VtableRegistry<'a> {
    vtable: &'a HarnessVtable,
}

impl FilterRegistry for VtableRegistry<'_> {
    fn create_filter(&mut self, element_path: &str) -> Result<FilterHandle, MalformErr> {
        let Some(filter) = self.vtable.filter else {
            return Err(MalformErr::from("Harness provides no filter callback"));
        };

        let Ok(path) = CString::new(element_path) else {
            return Err(MalformErr::from("Element path contains a NUL byte"));
        };

        let raw = unsafe { filter(self.vtable.harness, path.as_ptr()) };
        if raw < 0 {
            return Err(MalformErr::from(&format!(
                "Harness rejected element '{}' ({})",
                element_path, raw
            )));
        }

        Ok(FilterHandle::new(raw as u32))
    }

    fn register_filter(&mut self, handle: FilterHandle) -> bool {
        let Some(register) = self.vtable.register_filter else {
            return false;
        };

        unsafe { register(self.vtable.harness, handle.raw() as c_int) != 0 }
    }

    fn read_filter(&self, handle: FilterHandle) -> bool {
        let Some(read) = self.vtable.read_filter else {
            return false;
        };

        unsafe { read(self.vtable.harness, handle.raw() as c_int) != 0 }
    }
}

/// One loaded module plus its cached name for `malform_module_name`
pub struct ModuleInstance {
    module: Box<dyn PacketModule>,
    name: CString,
}

// Build a context from the vtable and run `f` with it, config changes are
// written back to the harness afterwards
fn with_ctx<F>(vtable: &HarnessVtable, f: F) -> ModuleStatus
where
    F: FnOnce(&mut ModuleCtx<'_>) -> ModuleStatus,
{
    let mut config = if vtable.config.is_null() {
        HarnessConfig::default()
    } else {
        unsafe { *vtable.config }
    };

    let mut registry = VtableRegistry { vtable };
    let status = f(&mut ModuleCtx::new(&mut registry, &mut config));

    if !vtable.config.is_null() {
        unsafe { *vtable.config = config };
    }

    status
}

// Borrow the packet as a slice, `None` for anything we can't trust
unsafe fn packet<'a>(pkt_buf: *mut u8, pkt_length: c_int) -> Option<&'a mut [u8]> {
    if pkt_length < 0 {
        return None;
    }

    if pkt_length == 0 {
        return Some(&mut []);
    }

    if pkt_buf.is_null() {
        return None;
    }

    Some(std::slice::from_raw_parts_mut(pkt_buf, pkt_length as usize))
}

/// Create a module by name, null if the name is unknown. Free with
/// `malform_module_free`.
///
/// # Safety
/// `name` must be null or a valid NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn malform_module_new(name: *const c_char) -> *mut ModuleInstance {
    if name.is_null() {
        return std::ptr::null_mut();
    }

    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return std::ptr::null_mut();
    };

    let Ok(module) = create_module(name, IncompletePolicy::default()) else {
        return std::ptr::null_mut();
    };

    let Ok(name) = CString::new(module.name()) else {
        return std::ptr::null_mut();
    };

    Box::into_raw(Box::new(ModuleInstance { module, name }))
}

/// # Safety
/// `instance` must be null or come from `malform_module_new`, and is invalid
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn malform_module_free(instance: *mut ModuleInstance) {
    if !instance.is_null() {
        drop(Box::from_raw(instance));
    }
}

/// Module name, owned by the instance
///
/// # Safety
/// `instance` must be null or a live instance.
#[no_mangle]
pub unsafe extern "C" fn malform_module_name(instance: *const ModuleInstance) -> *const c_char {
    match instance.as_ref() {
        Some(instance) => instance.name.as_ptr(),
        None => std::ptr::null(),
    }
}

/// # Safety
/// `instance` and `vtable` must be null or valid, the vtable's `config` must
/// be null or point to a live `HarnessConfig`.
#[no_mangle]
pub unsafe extern "C" fn malform_setup(
    instance: *mut ModuleInstance,
    vtable: *const HarnessVtable,
) -> c_int {
    let (Some(instance), Some(vtable)) = (instance.as_mut(), vtable.as_ref()) else {
        return ModuleStatus::Failed.as_raw();
    };

    with_ctx(vtable, |ctx| instance.module.setup(ctx)).as_raw()
}

/// # Safety
/// As `malform_setup`, plus `pkt_buf` must point to `pkt_length` bytes.
#[no_mangle]
pub unsafe extern "C" fn malform_tx_pre_dissection(
    instance: *mut ModuleInstance,
    pkt_buf: *mut u8,
    pkt_length: c_int,
    vtable: *const HarnessVtable,
) -> c_int {
    let (Some(instance), Some(vtable)) = (instance.as_mut(), vtable.as_ref()) else {
        return ModuleStatus::Failed.as_raw();
    };

    let Some(pkt) = packet(pkt_buf, pkt_length) else {
        return ModuleStatus::Failed.as_raw();
    };

    with_ctx(vtable, |ctx| instance.module.tx_pre_dissection(pkt, ctx)).as_raw()
}

/// # Safety
/// As `malform_tx_pre_dissection`, the buffer must also be writable.
#[no_mangle]
pub unsafe extern "C" fn malform_tx_post_dissection(
    instance: *mut ModuleInstance,
    pkt_buf: *mut u8,
    pkt_length: c_int,
    vtable: *const HarnessVtable,
) -> c_int {
    let (Some(instance), Some(vtable)) = (instance.as_mut(), vtable.as_ref()) else {
        return ModuleStatus::Failed.as_raw();
    };

    let Some(pkt) = packet(pkt_buf, pkt_length) else {
        return ModuleStatus::Failed.as_raw();
    };

    with_ctx(vtable, |ctx| instance.module.tx_post_dissection(pkt, ctx)).as_raw()
}
