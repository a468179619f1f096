//! # cilo-protocol
//!
//! Wire types shared by the control plane (`cilo-server`), the on-machine
//! agent (`cilo-agent`), and the workstation tunnel daemon (`cilo-daemon`).
//!
//! This crate does no I/O. It exists so the three binaries agree on JSON
//! shapes and on the handful of validation routines (overlay subnet
//! membership, public-key format) that are testable properties in their own
//! right, independent of any HTTP framework.

pub mod agent;
pub mod control;
pub mod validate;

pub use validate::{validate_cidr, validate_peer_subnet, validate_public_key};
