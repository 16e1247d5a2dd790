//! Table-driven packet malformation modules for protocol fuzzing harnesses.
//! A module watches one decoded protocol element through the harness filter
//! engine and, whenever that element goes out, overwrites a fixed set of
//! bytes in the outbound packet.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

pub mod misc;
pub mod err;
pub mod table;
pub mod filter;
pub mod harness;
pub mod mutators;
pub mod ffi;
pub mod triage;
pub mod clean;
pub mod config;

pub use err::MalformErr;
