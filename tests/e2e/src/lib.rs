//! End-to-End Test Framework for Tapline
//!
//! Drives a live monitor relay over loopback sockets and validates byte
//! delivery together with the audit trail the relay leaves behind.

pub mod scenarios;

pub use scenarios::*;
