//! This file contains the `PacketModule` trait every harness-loadable module
//! implements, the generic table-driven module all of our modules are built
//! from, and the factory that creates them by name. To add a module, write a
//! `ModuleDef` in its own file in this folder and list it in `MODULES`. See
//! rrc_setup.rs for an example.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

use crate::err::MalformErr;
use crate::filter::{FilterHandle, ModuleCtx};
use crate::table::{AppliedCount, MutationTable};
use crate::prompt_warn;

pub mod rrc_setup;
use rrc_setup::RRC_SETUP;

/// Every module we know how to build
static MODULES: [&ModuleDef; 1] = [&RRC_SETUP];

/// Integer status handed back to the harness
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleStatus {
    Unchanged,
    Mutated,
    Failed,
}

impl ModuleStatus {
    pub fn as_raw(&self) -> i32 {
        match self {
            ModuleStatus::Unchanged => 0,
            ModuleStatus::Mutated => 1,
            ModuleStatus::Failed => -1,
        }
    }
}

/// What to do when a matched packet is too short for the whole table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IncompletePolicy {
    /// Write whatever fits and report the packet as mutated
    Partial,

    /// Leave the packet alone unless every entry fits
    #[default]
    Suppress,
}

impl IncompletePolicy {
    pub fn from_name(name: &str) -> Result<Self, MalformErr> {
        match name {
            "partial" => Ok(IncompletePolicy::Partial),
            "suppress" => Ok(IncompletePolicy::Suppress),
            _ => Err(MalformErr::from(&format!(
                "Unrecognized incomplete policy '{}'",
                name
            ))),
        }
    }
}

/// Per-instance counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleStats {
    pub cycles: usize,       // Pre-dissection calls
    pub unregistered: usize, // Cycles the harness refused our filter
    pub matched: usize,      // Cycles our element showed up
    pub mutated: usize,      // Packets we reported as mutated
    pub incomplete: usize,   // Mutated packets missing some entries
    pub suppressed: usize,   // Matched packets left alone because of length
}

/// Trait all harness modules must implement, one call per lifecycle hook
pub trait PacketModule {
    /// Human readable name the harness logs and selects us by
    fn name(&self) -> &str;

    /// Runs once at load time, anything but `Unchanged` means don't call us
    fn setup(&mut self, ctx: &mut ModuleCtx<'_>) -> ModuleStatus;

    /// Runs before the harness decodes an outbound packet
    fn tx_pre_dissection(&mut self, pkt: &[u8], ctx: &mut ModuleCtx<'_>) -> ModuleStatus;

    /// Runs after the decode, may rewrite bytes but never the length
    fn tx_post_dissection(&mut self, pkt: &mut [u8], ctx: &mut ModuleCtx<'_>) -> ModuleStatus;

    /// Read-only accessor for the counters
    fn stats(&self) -> ModuleStats;
}

/// Compile-time description of a table-driven module
#[derive(Debug)]
pub struct ModuleDef {
    pub name: &'static str,
    pub element_path: &'static str,
    pub table: MutationTable<'static>,
    pub log_line: &'static str,
}

/// Watches one protocol element and stamps its table over every outbound
/// packet the element shows up in
pub struct TableModule {
    def: &'static ModuleDef,
    policy: IncompletePolicy,
    filter: Option<FilterHandle>,
    registered: bool, // Harness took our filter for the current cycle
    last_applied: Option<AppliedCount>,
    stats: ModuleStats,
}

impl TableModule {
    pub fn new(def: &'static ModuleDef, policy: IncompletePolicy) -> Self {
        TableModule {
            def,
            policy,
            filter: None,
            registered: false,
            last_applied: None,
            stats: ModuleStats::default(),
        }
    }

    pub fn def(&self) -> &'static ModuleDef {
        self.def
    }

    pub fn policy(&self) -> IncompletePolicy {
        self.policy
    }

    /// The handle bound at setup, `None` until setup succeeds
    pub fn filter(&self) -> Option<FilterHandle> {
        self.filter
    }

    /// What the table did to the most recent matched packet of this cycle
    pub fn last_applied(&self) -> Option<AppliedCount> {
        self.last_applied
    }
}

impl PacketModule for TableModule {
    fn name(&self) -> &str {
        self.def.name
    }

    fn setup(&mut self, ctx: &mut ModuleCtx<'_>) -> ModuleStatus {
        // Our one mutation must not race an unrelated fuzzing timeout
        ctx.config.global_timeout = false;

        match ctx.registry.create_filter(self.def.element_path) {
            Ok(handle) => {
                self.filter = Some(handle);
                ModuleStatus::Unchanged
            }
            Err(e) => {
                prompt_warn!("{}: setup failed: {}", self.def.name, e);
                self.filter = None;
                ModuleStatus::Failed
            }
        }
    }

    fn tx_pre_dissection(&mut self, _pkt: &[u8], ctx: &mut ModuleCtx<'_>) -> ModuleStatus {
        let Some(handle) = self.filter else {
            return ModuleStatus::Failed;
        };

        self.stats.cycles += 1;
        self.last_applied = None;

        // A refused registration just means no match this cycle
        self.registered = ctx.registry.register_filter(handle);
        if !self.registered {
            prompt_warn!(
                "{}: harness refused to track '{}', packet left alone",
                self.def.name,
                self.def.element_path
            );
            self.stats.unregistered += 1;
        }

        ModuleStatus::Unchanged
    }

    fn tx_post_dissection(&mut self, pkt: &mut [u8], ctx: &mut ModuleCtx<'_>) -> ModuleStatus {
        let Some(handle) = self.filter else {
            return ModuleStatus::Failed;
        };

        // Only query filters we registered for this packet
        if !std::mem::take(&mut self.registered) || !ctx.registry.read_filter(handle) {
            return ModuleStatus::Unchanged;
        }

        self.stats.matched += 1;
        let table = self.def.table;

        if self.policy == IncompletePolicy::Suppress && !table.fits(pkt.len()) {
            prompt_warn!(
                "{}: packet is 0x{:X} bytes, table needs 0x{:X}, mutation suppressed",
                self.def.name,
                pkt.len(),
                table.required_len()
            );

            self.stats.suppressed += 1;
            self.last_applied = Some(AppliedCount {
                applied: 0,
                total: table.len(),
            });
            return ModuleStatus::Unchanged;
        }

        let count = table.apply(pkt);
        self.last_applied = Some(count);

        if count.is_none() {
            return ModuleStatus::Unchanged;
        }

        if !count.is_complete() {
            prompt_warn!(
                "{}: only {}/{} table entries fit a 0x{:X} byte packet",
                self.def.name,
                count.applied,
                count.total,
                pkt.len()
            );
            self.stats.incomplete += 1;
        }

        self.stats.mutated += 1;
        prompt_warn!("{}", self.def.log_line);
        ModuleStatus::Mutated
    }

    fn stats(&self) -> ModuleStats {
        self.stats
    }
}

/// Definitions of every module the factory can build
pub fn available_modules() -> &'static [&'static ModuleDef] {
    &MODULES
}

/// Look a module definition up by name, case-insensitively
pub fn find_module(name: &str) -> Result<&'static ModuleDef, MalformErr> {
    MODULES
        .iter()
        .copied()
        .find(|def| def.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| MalformErr::from(&format!("Unrecognized module '{}'", name)))
}

/// Simple factory to create modules by name
pub fn create_module(
    name: &str,
    policy: IncompletePolicy,
) -> Result<Box<dyn PacketModule>, MalformErr> {
    let def = find_module(name)?;
    Ok(Box::new(TableModule::new(def, policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::SimHarness;
    use crate::table::MutationEntry;

    const ENTRIES: [MutationEntry; 2] = [MutationEntry::new(4, 0xee), MutationEntry::new(12, 0xff)];

    static TEST_DEF: ModuleDef = ModuleDef {
        name: "Test",
        element_path: "proto.thing",
        table: MutationTable::new(&ENTRIES),
        log_line: "test packet malformed",
    };

    fn loaded(policy: IncompletePolicy) -> (TableModule, SimHarness) {
        let mut harness = SimHarness::new(&["proto.thing", "proto.other"]);
        let mut module = TableModule::new(&TEST_DEF, policy);
        assert_eq!(module.setup(&mut harness.ctx()), ModuleStatus::Unchanged);
        (module, harness)
    }

    fn cycle(
        module: &mut TableModule,
        harness: &mut SimHarness,
        pkt: &mut [u8],
        present: &[&str],
    ) -> ModuleStatus {
        harness.begin_cycle();
        assert_eq!(
            module.tx_pre_dissection(pkt, &mut harness.ctx()),
            ModuleStatus::Unchanged
        );
        harness.dissect(present);
        module.tx_post_dissection(pkt, &mut harness.ctx())
    }

    #[test]
    fn status_codes() {
        assert_eq!(ModuleStatus::Unchanged.as_raw(), 0);
        assert_eq!(ModuleStatus::Mutated.as_raw(), 1);
        assert!(ModuleStatus::Failed.as_raw() < 0);
    }

    #[test]
    fn policy_names() {
        assert_eq!(IncompletePolicy::from_name("partial").unwrap(), IncompletePolicy::Partial);
        assert_eq!(IncompletePolicy::from_name("suppress").unwrap(), IncompletePolicy::Suppress);
        assert!(IncompletePolicy::from_name("maybe").is_err());
        assert_eq!(IncompletePolicy::default(), IncompletePolicy::Suppress);
    }

    #[test]
    fn setup_disables_timeout_and_binds_filter() {
        let (module, harness) = loaded(IncompletePolicy::Suppress);
        assert!(!harness.config.global_timeout);
        assert!(module.filter().is_some());
        assert_eq!(module.name(), "Test");
    }

    #[test]
    fn setup_fails_on_unknown_element() {
        let mut harness = SimHarness::new(&["proto.other"]);
        let mut module = TableModule::new(&TEST_DEF, IncompletePolicy::Suppress);
        assert_eq!(module.setup(&mut harness.ctx()), ModuleStatus::Failed);
        assert!(module.filter().is_none());

        // Nothing after a failed setup does anything
        let mut pkt = vec![0u8; 16];
        harness.begin_cycle();
        assert_eq!(module.tx_pre_dissection(&pkt, &mut harness.ctx()), ModuleStatus::Failed);
        harness.dissect(&["proto.thing"]);
        assert_eq!(module.tx_post_dissection(&mut pkt, &mut harness.ctx()), ModuleStatus::Failed);
        assert_eq!(pkt, vec![0u8; 16]);
        assert_eq!(module.stats(), ModuleStats::default());
    }

    #[test]
    fn match_mutates() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0u8; 16];

        let status = cycle(&mut module, &mut harness, &mut pkt, &["proto.thing"]);
        assert_eq!(status, ModuleStatus::Mutated);
        assert_eq!(pkt[4], 0xee);
        assert_eq!(pkt[12], 0xff);
        assert_eq!(pkt.len(), 16);
        assert!(module.last_applied().unwrap().is_complete());

        let stats = module.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.mutated, 1);
    }

    #[test]
    fn no_match_leaves_packet() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0x5au8; 16];

        let status = cycle(&mut module, &mut harness, &mut pkt, &["proto.other"]);
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(pkt, vec![0x5au8; 16]);
        assert!(module.last_applied().is_none());
    }

    #[test]
    fn skipped_registration_never_matches() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0u8; 16];

        // Decode runs without our pre-dissection hook having been called
        harness.begin_cycle();
        harness.dissect(&["proto.thing"]);
        let status = module.tx_post_dissection(&mut pkt, &mut harness.ctx());
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(pkt, vec![0u8; 16]);
    }

    #[test]
    fn post_without_pre_never_queries() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0u8; 16];

        // Registered and matched once, then a second post call for the
        // same cycle must not reuse that registration
        assert_eq!(
            cycle(&mut module, &mut harness, &mut pkt, &["proto.thing"]),
            ModuleStatus::Mutated
        );

        let mut next = vec![0u8; 16];
        let status = module.tx_post_dissection(&mut next, &mut harness.ctx());
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(next, vec![0u8; 16]);
        assert_eq!(module.stats().mutated, 1);
    }

    #[test]
    fn refused_registration_degrades_to_unchanged() {
        let mut harness = SimHarness::new(&["proto.thing"]).with_tracking_limit(0);
        let mut module = TableModule::new(&TEST_DEF, IncompletePolicy::Suppress);
        assert_eq!(module.setup(&mut harness.ctx()), ModuleStatus::Unchanged);

        let mut pkt = vec![0u8; 16];
        let status = cycle(&mut module, &mut harness, &mut pkt, &["proto.thing"]);
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(pkt, vec![0u8; 16]);
        assert_eq!(module.stats().unregistered, 1);
    }

    #[test]
    fn suppress_policy_skips_short_packet() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0u8; 8];

        let status = cycle(&mut module, &mut harness, &mut pkt, &["proto.thing"]);
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(pkt, vec![0u8; 8]);
        assert_eq!(
            module.last_applied(),
            Some(AppliedCount { applied: 0, total: 2 })
        );
        assert_eq!(module.stats().suppressed, 1);
    }

    #[test]
    fn partial_policy_writes_what_fits() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Partial);
        let mut pkt = vec![0u8; 8];

        let status = cycle(&mut module, &mut harness, &mut pkt, &["proto.thing"]);
        assert_eq!(status, ModuleStatus::Mutated);
        assert_eq!(pkt[4], 0xee);
        assert_eq!(
            module.last_applied(),
            Some(AppliedCount { applied: 1, total: 2 })
        );
        assert_eq!(module.stats().incomplete, 1);

        // Nothing fits at all
        let mut tiny = vec![0u8; 3];
        let status = cycle(&mut module, &mut harness, &mut tiny, &["proto.thing"]);
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(tiny, vec![0u8; 3]);
    }

    #[test]
    fn factory_by_name() {
        let module = create_module("mediatek", IncompletePolicy::Suppress).unwrap();
        assert_eq!(module.name(), "Mediatek");
        assert!(create_module("nope", IncompletePolicy::Suppress).is_err());
        assert!(!available_modules().is_empty());
    }
}
