//! This file contains `SimHarness`, an in-process stand-in for the fuzzing
//! harness. It knows a fixed set of element paths, hands out filter slots for
//! them, and fakes the decode pass: the caller says which elements appeared
//! in the packet and every filter registered for the cycle is matched against
//! that list. The `apply` subcommand and the module tests both drive packets
//! through it.

use crate::err::MalformErr;
use crate::filter::{FilterHandle, FilterRegistry, HarnessConfig, ModuleCtx};
use crate::mutators::{ModuleStatus, PacketModule};

// One watched element
#[derive(Clone, Debug)]
struct FilterSlot {
    path: String,     // Element path the slot is bound to
    registered: bool, // Tracked for the current cycle
    matched: bool,    // Seen in the current decode
}

/// Filter bookkeeping, split out from the harness so a `ModuleCtx` can borrow
/// it next to the config
#[derive(Clone, Debug, Default)]
pub struct SimRegistry {
    known: Vec<String>,           // Paths the fake dissector can name
    slots: Vec<FilterSlot>,       // Indexed by handle
    tracking_limit: Option<usize>, // Max filters tracked per cycle
}

impl SimRegistry {
    fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.registered).count()
    }

    fn slot(&self, handle: FilterHandle) -> Option<&FilterSlot> {
        self.slots.get(handle.raw() as usize)
    }
}

impl FilterRegistry for SimRegistry {
    fn create_filter(&mut self, element_path: &str) -> Result<FilterHandle, MalformErr> {
        if !self.known.iter().any(|p| p == element_path) {
            return Err(MalformErr::from(&format!(
                "Unknown protocol element '{}'",
                element_path
            )));
        }

        let handle = FilterHandle::new(self.slots.len() as u32);
        self.slots.push(FilterSlot {
            path: element_path.to_string(),
            registered: false,
            matched: false,
        });

        Ok(handle)
    }

    fn register_filter(&mut self, handle: FilterHandle) -> bool {
        // Registering twice in a cycle is a no-op
        match self.slot(handle) {
            None => return false,
            Some(slot) if slot.registered => return true,
            Some(_) => (),
        }

        if let Some(limit) = self.tracking_limit {
            if self.active() >= limit {
                return false;
            }
        }

        self.slots[handle.raw() as usize].registered = true;
        true
    }

    fn read_filter(&self, handle: FilterHandle) -> bool {
        self.slot(handle)
            .map(|s| s.registered && s.matched)
            .unwrap_or(false)
    }
}

/// Fake harness: registry, config, and a cycle counter
#[derive(Clone, Debug, Default)]
pub struct SimHarness {
    pub registry: SimRegistry,
    pub config: HarnessConfig,
    cycles: usize,
}

impl SimHarness {
    /// Harness whose dissector recognises exactly `known` element paths
    pub fn new<S: AsRef<str>>(known: &[S]) -> Self {
        SimHarness {
            registry: SimRegistry {
                known: known.iter().map(|p| p.as_ref().to_string()).collect(),
                ..Default::default()
            },
            config: HarnessConfig::default(),
            cycles: 0,
        }
    }

    /// Cap how many filters can be tracked in one cycle
    pub fn with_tracking_limit(mut self, limit: usize) -> Self {
        self.registry.tracking_limit = Some(limit);
        self
    }

    /// Borrow the capabilities a module gets to see
    pub fn ctx(&mut self) -> ModuleCtx<'_> {
        ModuleCtx::new(&mut self.registry, &mut self.config)
    }

    /// Start a new outbound packet, nothing carries over from the last one
    pub fn begin_cycle(&mut self) {
        for slot in self.registry.slots.iter_mut() {
            slot.registered = false;
            slot.matched = false;
        }

        self.cycles += 1;
    }

    /// Fake decode pass, `present` lists the element paths found in the packet
    pub fn dissect<S: AsRef<str>>(&mut self, present: &[S]) {
        for slot in self.registry.slots.iter_mut() {
            slot.matched =
                slot.registered && present.iter().any(|p| p.as_ref() == slot.path);
        }
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Push one outbound packet through a module the way the real harness
    /// would: pre-dissection hook, decode, post-dissection hook
    pub fn transmit<S: AsRef<str>>(
        &mut self,
        module: &mut dyn PacketModule,
        pkt: &mut [u8],
        present: &[S],
    ) -> ModuleStatus {
        self.begin_cycle();

        let status = module.tx_pre_dissection(pkt, &mut self.ctx());
        if status == ModuleStatus::Failed {
            return status;
        }

        self.dissect(present);
        module.tx_post_dissection(pkt, &mut self.ctx())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELEMENT: &str = "nr-rrc.rrcSetup_element";

    #[test]
    fn unknown_path_is_rejected() {
        let mut harness = SimHarness::new(&[ELEMENT]);
        let err = harness
            .registry
            .create_filter("nr-rrc.bogus")
            .unwrap_err();
        assert!(err.message().contains("nr-rrc.bogus"));
    }

    #[test]
    fn query_needs_registration() {
        let mut harness = SimHarness::new(&[ELEMENT]);
        let handle = harness.registry.create_filter(ELEMENT).unwrap();

        // Element present but never registered
        harness.begin_cycle();
        harness.dissect(&[ELEMENT]);
        assert!(!harness.registry.read_filter(handle));

        harness.begin_cycle();
        assert!(harness.registry.register_filter(handle));
        assert!(harness.registry.register_filter(handle));
        harness.dissect(&[ELEMENT]);
        assert!(harness.registry.read_filter(handle));

        // Fresh cycle forgets the previous match
        harness.begin_cycle();
        assert!(!harness.registry.read_filter(handle));
        assert_eq!(harness.cycles(), 3);
    }

    #[test]
    fn absent_element_does_not_match() {
        let mut harness = SimHarness::new(&[ELEMENT, "nr-rrc.other"]);
        let handle = harness.registry.create_filter(ELEMENT).unwrap();

        harness.begin_cycle();
        harness.registry.register_filter(handle);
        harness.dissect(&["nr-rrc.other"]);
        assert!(!harness.registry.read_filter(handle));
    }

    #[test]
    fn tracking_limit_refuses_extra_filters() {
        let mut harness = SimHarness::new(&[ELEMENT, "nr-rrc.other"]).with_tracking_limit(1);
        let first = harness.registry.create_filter(ELEMENT).unwrap();
        let second = harness.registry.create_filter("nr-rrc.other").unwrap();
        assert_ne!(first, second);

        harness.begin_cycle();
        assert!(harness.registry.register_filter(first));
        assert!(!harness.registry.register_filter(second));
        harness.dissect(&[ELEMENT, "nr-rrc.other"]);
        assert!(harness.registry.read_filter(first));
        assert!(!harness.registry.read_filter(second));
    }

    #[test]
    fn stale_handle_never_matches() {
        let mut harness = SimHarness::new(&[ELEMENT]);
        let stale = FilterHandle::new(7);
        assert!(!harness.registry.register_filter(stale));
        assert!(!harness.registry.read_filter(stale));
    }
}
