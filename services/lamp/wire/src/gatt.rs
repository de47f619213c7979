//! GATT characteristic identifiers used by the lamp firmware.

use std::fmt;
use uuid::Uuid;

/// Handshake init frame is written here
pub const INIT_CHAR_UUID: Uuid = Uuid::from_u128(0x00001001_0000_1000_8000_00805F9B34FB);

/// Notifications arrive on, and commands are written to, this characteristic
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x00001002_0000_1000_8000_00805F9B34FB);

/// Same characteristic as [`NOTIFY_CHAR_UUID`]; named for the write direction
pub const COMMAND_CHAR_UUID: Uuid = NOTIFY_CHAR_UUID;

/// Read once per handshake and on every heartbeat
pub const DIAGNOSTIC_CHAR_UUID: Uuid = Uuid::from_u128(0x00001004_0000_1000_8000_00805F9B34FB);

/// Logical role of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Target of the handshake init frame
    Init,
    /// Inbound notifications
    Notify,
    /// Outbound commands
    Command,
    /// Heartbeat / diagnostic reads
    Diagnostic,
}

impl Characteristic {
    /// UUID of the characteristic on the device
    pub const fn uuid(self) -> Uuid {
        match self {
            Characteristic::Init => INIT_CHAR_UUID,
            Characteristic::Notify => NOTIFY_CHAR_UUID,
            Characteristic::Command => COMMAND_CHAR_UUID,
            Characteristic::Diagnostic => DIAGNOSTIC_CHAR_UUID,
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid())
    }
}
