//! This file contains the contract between a packet module and the harness
//! that loads it. The harness owns dissection and filter matching; a module
//! only ever sees it through the `FilterRegistry` capability handed over in a
//! `ModuleCtx`, never through a global.

use crate::err::MalformErr;

/// Opaque slot id the harness hands out for a watched protocol element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterHandle(u32);

impl FilterHandle {
    pub const fn new(raw: u32) -> Self {
        FilterHandle(raw)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Everything a module needs from the harness filter engine
pub trait FilterRegistry {
    /// Bind a handle to a dot-separated element path, e.g.
    /// `nr-rrc.rrcSetup_element`. Fails when the dissector can't name it.
    fn create_filter(&mut self, element_path: &str) -> Result<FilterHandle, MalformErr>;

    /// Ask the harness to track `handle` during the upcoming decode. Returns
    /// false when the harness couldn't take it, which only means the query
    /// for this cycle will come back false.
    fn register_filter(&mut self, handle: FilterHandle) -> bool;

    /// Did the element bound to `handle` match in the current decode
    fn read_filter(&self, handle: FilterHandle) -> bool;
}

/// Harness options a module is allowed to touch
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    pub global_timeout: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            global_timeout: true,
        }
    }
}

/// The capability bundle passed to every lifecycle call
pub struct ModuleCtx<'a> {
    pub registry: &'a mut dyn FilterRegistry,
    pub config: &'a mut HarnessConfig,
}

impl<'a> ModuleCtx<'a> {
    pub fn new(registry: &'a mut dyn FilterRegistry, config: &'a mut HarnessConfig) -> Self {
        ModuleCtx { registry, config }
    }
}
