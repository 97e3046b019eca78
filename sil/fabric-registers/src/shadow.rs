use crate::access::{FabricRegisterAccess, RegisterInstance};
use fabric_topology::{MAX_RBS_PER_SOCKET, MAX_SOCKETS};

const WINDOW_BASE: u16 = 0xC00;
const WINDOW_WORDS: usize = 0xA0; // 0xC00..=0xE7C

/// In-memory register file implementing [`FabricRegisterAccess`].
///
/// Holds the broadcast-coherent value of every address-map register per
/// socket, plus the per-root-bridge instances of the configuration address
/// control register. Tests use it to observe exactly what the resource
/// manager programs; hosts can use it to stage a map.
#[derive(Clone)]
pub struct ShadowFabric {
    broadcast: [[u32; WINDOW_WORDS]; MAX_SOCKETS],
    per_rb: [[[u32; WINDOW_WORDS]; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
}

impl ShadowFabric {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            broadcast: [[0; WINDOW_WORDS]; MAX_SOCKETS],
            per_rb: [[[0; WINDOW_WORDS]; MAX_RBS_PER_SOCKET]; MAX_SOCKETS],
        }
    }

    /// Value last written to a per-root-bridge register instance.
    #[must_use]
    pub fn read_instance(&self, socket: usize, root_bridge: usize, register: u16) -> u32 {
        self.per_rb[socket][root_bridge][Self::index(register)]
    }

    fn index(register: u16) -> usize {
        assert!(
            register >= WINDOW_BASE && register.is_multiple_of(4),
            "register 0x{register:X} outside the address-map window"
        );
        let index = usize::from(register - WINDOW_BASE) / 4;
        assert!(index < WINDOW_WORDS, "register 0x{register:X} outside the address-map window");
        index
    }
}

impl Default for ShadowFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricRegisterAccess for ShadowFabric {
    fn read(&self, socket: usize, register: u16) -> u32 {
        self.broadcast[socket][Self::index(register)]
    }

    fn write(&mut self, socket: usize, instance: RegisterInstance, register: u16, value: u32) {
        let index = Self::index(register);
        match instance {
            RegisterInstance::Broadcast => self.broadcast[socket][index] = value,
            RegisterInstance::RootBridge(rb) => self.per_rb[socket][rb][index] = value,
        }
    }
}
