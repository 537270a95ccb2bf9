//! Core types and synchronization primitives for the SAS HBA driver stack.
//!
//! This crate holds the host-testable building blocks shared by the driver
//! API and the adapter driver: typed identifiers, physical/virtual address
//! newtypes, interrupt-safe spin locks, and the leveled log facility.
//!
//! Everything here builds on the host so it can be exercised with
//! `cargo test` and, for the lock primitives, with loom (`--cfg loom`).

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod addr;
pub mod id;
pub mod log;
pub mod sync;
