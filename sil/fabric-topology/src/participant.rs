use crate::TopologyError;
use core::fmt;

/// Largest number of populated sockets the resource manager supports.
pub const MAX_SOCKETS: usize = 2;

/// Largest number of PCIe root bridges per socket.
pub const MAX_RBS_PER_SOCKET: usize = 4;

/// Upper bound on root bridges in the whole system.
pub const MAX_HOST_BRIDGES: usize = MAX_SOCKETS * MAX_RBS_PER_SOCKET;

/// Positional identity of one PCIe root bridge.
///
/// A thin pair of indices that carries intent: wherever an allocation, a
/// register pair or a demand entry belongs to a specific root bridge, it is
/// keyed by a `ParticipantId` rather than two loose integers. Construction is
/// bounds-checked against [`MAX_SOCKETS`] and [`MAX_RBS_PER_SOCKET`], so a
/// value of this type is always a valid array index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ParticipantId {
    socket: u8,
    root_bridge: u8,
}

impl ParticipantId {
    /// Creates a new identity, rejecting out-of-range indices.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::SocketOutOfRange`] or
    /// [`TopologyError::RootBridgeOutOfRange`] if either index exceeds the
    /// compile-time maxima.
    pub const fn new(socket: u8, root_bridge: u8) -> Result<Self, TopologyError> {
        if socket as usize >= MAX_SOCKETS {
            return Err(TopologyError::SocketOutOfRange(socket));
        }
        if root_bridge as usize >= MAX_RBS_PER_SOCKET {
            return Err(TopologyError::RootBridgeOutOfRange(root_bridge));
        }
        Ok(Self {
            socket,
            root_bridge,
        })
    }

    #[inline]
    #[must_use]
    pub const fn socket(self) -> usize {
        self.socket as usize
    }

    #[inline]
    #[must_use]
    pub const fn root_bridge(self) -> usize {
        self.root_bridge as usize
    }

    /// Dense index of this bridge for a system with `rbs_per_socket` bridges
    /// per socket. Register pair numbering is derived from this.
    #[inline]
    #[must_use]
    pub const fn dense_index(self, rbs_per_socket: usize) -> usize {
        self.socket as usize * rbs_per_socket + self.root_bridge as usize
    }

    /// True if `socket`/`root_bridge` name this participant.
    #[inline]
    #[must_use]
    pub const fn is(self, socket: usize, root_bridge: usize) -> bool {
        self.socket as usize == socket && self.root_bridge as usize == root_bridge
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket{}/Rb{}", self.socket, self.root_bridge)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket {} root bridge {}", self.socket, self.root_bridge)
    }
}
