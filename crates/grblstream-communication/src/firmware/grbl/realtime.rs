//! GRBL realtime commands
//!
//! Single-byte commands the controller acts on as soon as they are read,
//! ahead of anything in its planner. They are never queued, never flow
//! controlled and never acknowledged.

use grblstream_core::ProtocolError;
use serde::{Deserialize, Serialize};

/// The GRBL 1.1 realtime command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RealtimeCommand {
    /// Soft reset (Ctrl-X)
    SoftReset = 0x18,
    /// Status report query
    StatusQuery = b'?',
    /// Cycle start / resume
    CycleStart = b'~',
    /// Feed hold
    FeedHold = b'!',
    /// Safety door
    SafetyDoor = 0x84,
    /// Jog cancel
    JogCancel = 0x85,
    /// Feed override: set 100%
    FeedOverrideReset = 0x90,
    /// Feed override: +10%
    FeedOverrideCoarsePlus = 0x91,
    /// Feed override: -10%
    FeedOverrideCoarseMinus = 0x92,
    /// Feed override: +1%
    FeedOverrideFinePlus = 0x93,
    /// Feed override: -1%
    FeedOverrideFineMinus = 0x94,
    /// Rapid override: 100%
    RapidOverrideFull = 0x95,
    /// Rapid override: 50%
    RapidOverrideMedium = 0x96,
    /// Rapid override: 25%
    RapidOverrideLow = 0x97,
    /// Spindle override: set 100%
    SpindleOverrideReset = 0x99,
    /// Spindle override: +10%
    SpindleOverrideCoarsePlus = 0x9A,
    /// Spindle override: -10%
    SpindleOverrideCoarseMinus = 0x9B,
    /// Spindle override: +1%
    SpindleOverrideFinePlus = 0x9C,
    /// Spindle override: -1%
    SpindleOverrideFineMinus = 0x9D,
    /// Toggle spindle stop (only in hold)
    ToggleSpindleStop = 0x9E,
    /// Toggle flood coolant
    ToggleFloodCoolant = 0xA0,
    /// Toggle mist coolant
    ToggleMistCoolant = 0xA1,
}

impl RealtimeCommand {
    /// Every command in the set
    pub const ALL: [RealtimeCommand; 22] = [
        Self::SoftReset,
        Self::StatusQuery,
        Self::CycleStart,
        Self::FeedHold,
        Self::SafetyDoor,
        Self::JogCancel,
        Self::FeedOverrideReset,
        Self::FeedOverrideCoarsePlus,
        Self::FeedOverrideCoarseMinus,
        Self::FeedOverrideFinePlus,
        Self::FeedOverrideFineMinus,
        Self::RapidOverrideFull,
        Self::RapidOverrideMedium,
        Self::RapidOverrideLow,
        Self::SpindleOverrideReset,
        Self::SpindleOverrideCoarsePlus,
        Self::SpindleOverrideCoarseMinus,
        Self::SpindleOverrideFinePlus,
        Self::SpindleOverrideFineMinus,
        Self::ToggleSpindleStop,
        Self::ToggleFloodCoolant,
        Self::ToggleMistCoolant,
    ];

    /// Wire byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RealtimeCommand {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_byte() == byte)
            .ok_or(ProtocolError::InvalidRealtimeByte(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes() {
        assert_eq!(RealtimeCommand::SoftReset.as_byte(), 0x18);
        assert_eq!(RealtimeCommand::StatusQuery.as_byte(), b'?');
        assert_eq!(RealtimeCommand::JogCancel.as_byte(), 0x85);
        assert_eq!(RealtimeCommand::ToggleMistCoolant.as_byte(), 0xA1);
    }

    #[test]
    fn test_try_from_byte() {
        for cmd in RealtimeCommand::ALL {
            assert_eq!(RealtimeCommand::try_from(cmd.as_byte()), Ok(cmd));
        }
        assert_eq!(
            RealtimeCommand::try_from(b'G'),
            Err(ProtocolError::InvalidRealtimeByte(b'G'))
        );
        assert!(RealtimeCommand::try_from(0x98).is_err());
    }
}
