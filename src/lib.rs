//! # Store Serial Library
//!
//! Tells an Arduino which inventory product was selected over a serial link.
//!
//! This library provides the wire encoder, port discovery for native and
//! permission-gated hosts, the single-connection lifecycle manager, and the
//! request surface used by the product UI.

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod selection;
pub mod serial;
