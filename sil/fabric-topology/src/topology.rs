use crate::{MAX_RBS_PER_SOCKET, MAX_SOCKETS, ParticipantId};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TopologyError {
    /// Socket index exceeds [`MAX_SOCKETS`](crate::MAX_SOCKETS).
    #[error("socket index {0} out of range")]
    SocketOutOfRange(u8),
    /// Root bridge index exceeds [`MAX_RBS_PER_SOCKET`](crate::MAX_RBS_PER_SOCKET).
    #[error("root bridge index {0} out of range")]
    RootBridgeOutOfRange(u8),
    /// A system must have at least one socket with at least one root bridge.
    #[error("empty topology")]
    Empty,
}

/// System shape as seen by the resource manager.
///
/// Implementations must be stable for the lifetime of a planning run: the
/// planner queries the counts repeatedly and assumes they do not change
/// between calls.
pub trait Topology {
    /// Number of populated sockets, `1..=MAX_SOCKETS`.
    fn socket_count(&self) -> usize;

    /// Number of root bridges per socket, `1..=MAX_RBS_PER_SOCKET`.
    /// All populated sockets carry the same count.
    fn rbs_per_socket(&self) -> usize;

    /// Destination fabric ID routing requests to the given root bridge.
    fn fabric_id(&self, socket: usize, root_bridge: usize) -> u16;

    /// First PCI bus currently decoded by the given root bridge.
    fn bus_base(&self, socket: usize, root_bridge: usize) -> u32;

    /// Last PCI bus currently decoded by the given root bridge.
    fn bus_limit(&self, socket: usize, root_bridge: usize) -> u32;

    /// The root bridge that owns the legacy IO window and the reserved MMIO
    /// region directly below the compat area.
    fn primary(&self) -> ParticipantId;

    /// Total root bridges in the system.
    #[inline]
    fn host_bridge_count(&self) -> usize {
        self.socket_count() * self.rbs_per_socket()
    }
}

/// Fixed-shape [`Topology`] backed by plain arrays.
#[derive(Debug, Clone)]
pub struct SocRbMap {
    socket_count: usize,
    rbs_per_socket: usize,
    fabric_ids: [[u16; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    bus_base: [[u32; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    bus_limit: [[u32; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
    primary: ParticipantId,
}

impl SocRbMap {
    /// Builds a map from per-bridge fabric IDs and decoded bus ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Empty`] if either count is zero, or an
    /// out-of-range error if a count exceeds the compile-time maxima.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        socket_count: usize,
        rbs_per_socket: usize,
        fabric_ids: [[u16; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
        bus_base: [[u32; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
        bus_limit: [[u32; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
        primary: ParticipantId,
    ) -> Result<Self, TopologyError> {
        if socket_count == 0 || rbs_per_socket == 0 {
            return Err(TopologyError::Empty);
        }
        if socket_count > MAX_SOCKETS {
            return Err(TopologyError::SocketOutOfRange(socket_count as u8));
        }
        if rbs_per_socket > MAX_RBS_PER_SOCKET {
            return Err(TopologyError::RootBridgeOutOfRange(rbs_per_socket as u8));
        }
        Ok(Self {
            socket_count,
            rbs_per_socket,
            fabric_ids,
            bus_base,
            bus_limit,
            primary,
        })
    }

    /// Updates the decoded bus range of one root bridge. Used after the bus
    /// allocator has reprogrammed the config address maps.
    pub fn set_bus_range(&mut self, id: ParticipantId, base: u32, limit: u32) {
        self.bus_base[id.socket()][id.root_bridge()] = base;
        self.bus_limit[id.socket()][id.root_bridge()] = limit;
    }
}

impl Topology for SocRbMap {
    fn socket_count(&self) -> usize {
        self.socket_count
    }

    fn rbs_per_socket(&self) -> usize {
        self.rbs_per_socket
    }

    fn fabric_id(&self, socket: usize, root_bridge: usize) -> u16 {
        self.fabric_ids[socket][root_bridge]
    }

    fn bus_base(&self, socket: usize, root_bridge: usize) -> u32 {
        self.bus_base[socket][root_bridge]
    }

    fn bus_limit(&self, socket: usize, root_bridge: usize) -> u32 {
        self.bus_limit[socket][root_bridge]
    }

    fn primary(&self) -> ParticipantId {
        self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> SocRbMap {
        SocRbMap::new(
            2,
            2,
            [[0x00, 0x10, 0, 0], [0x20, 0x30, 0, 0]],
            [[0, 0x20, 0, 0], [0x40, 0x60, 0, 0]],
            [[0x1F, 0x3F, 0, 0], [0x5F, 0xFF, 0, 0]],
            ParticipantId::new(0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn counts_and_lookup() {
        let map = two_by_two();
        assert_eq!(map.host_bridge_count(), 4);
        assert_eq!(map.fabric_id(1, 1), 0x30);
        assert_eq!(map.bus_base(1, 0), 0x40);
        assert_eq!(map.bus_limit(0, 1), 0x3F);
    }

    #[test]
    fn rejects_empty_topology() {
        let r = SocRbMap::new(
            0,
            1,
            [[0; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
            [[0; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
            [[0; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
            ParticipantId::new(0, 0).unwrap(),
        );
        assert_eq!(r.err(), Some(TopologyError::Empty));
    }

    #[test]
    fn bus_range_update_is_visible() {
        let mut map = two_by_two();
        let id = ParticipantId::new(0, 1).unwrap();
        map.set_bus_range(id, 0x10, 0x2F);
        assert_eq!(map.bus_base(0, 1), 0x10);
        assert_eq!(map.bus_limit(0, 1), 0x2F);
    }
}
