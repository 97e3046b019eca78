//! # Data-Fabric Topology
//!
//! Read-only description of the socket / root-bridge layout of the SoC, as
//! consumed by the fabric resource manager. The resource manager never probes
//! hardware itself; everything it needs to know about the system shape comes
//! through the [`Topology`] trait:
//!
//! * how many sockets are populated and how many PCIe root bridges each one
//!   carries,
//! * the destination fabric ID that routes a request to a given root bridge,
//! * the PCI bus range currently decoded by each root bridge,
//! * which root bridge is the *primary* one (the bridge that owns the legacy
//!   IO window and the fixed MMIO region right below the compat area).
//!
//! [`SocRbMap`] is a fixed-shape implementation of the trait backed by plain
//! arrays. Platform integration code fills it in from whatever discovery
//! mechanism the host uses; tests construct it directly.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod participant;
mod topology;

pub use participant::{MAX_HOST_BRIDGES, MAX_RBS_PER_SOCKET, MAX_SOCKETS, ParticipantId};
pub use topology::{SocRbMap, Topology, TopologyError};
