//! Mixer GW - protocol bridge between an OSC mixer GUI and a DAW-resident
//! control-surface endpoint
//!
//! Two halves share this crate:
//!
//! - the **gateway** (hub) process, speaking OSC/UDP to the GUI and the line
//!   protocol over TCP to the endpoint, and
//! - the **IPC endpoint**, living next to the DAW, owning the authoritative
//!   track state, feedback suppression, and the VU meter loop.
//!
//! The leaf modules (`fader`, `osc`, `ipc`) are pure codecs with no I/O.

pub mod config;
pub mod endpoint;
pub mod fader;
pub mod gateway;
pub mod host;
pub mod ipc;
pub mod osc;
