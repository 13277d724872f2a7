//! Application core: the supervisor and its port boundary.
//!
//! Domain logic (endpoints, bridge, registry, power) lives at the crate
//! root; this module holds the loop that drives it and the **port traits**
//! in [`ports`] every adapter implements.

pub mod events;
pub mod ports;
pub mod supervisor;
