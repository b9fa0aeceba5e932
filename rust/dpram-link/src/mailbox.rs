//! 16-bit mailbox values exchanged between AP and CP.
//!
//! ```text
//!  15   14   13   12..4      3..0
//! +----+----+----+---------+--------+
//! | V  | C  | X  |  ...    | code   |   command (V=1, C=1)
//! +----+----+----+---------+--------+
//! | V  | 0  | channel REQ_ACK/RES_ACK/SEND bits |  flags
//! +----+----+------------------------------------+
//! ```
//!
//! A value with V, C and X all set is an extended command and belongs to
//! the extension. A value without V is ignored.

use std::fmt;

use crate::channel::ChannelId;

/// Bit 15: the value is meaningful.
pub const VALID: u16 = 0x8000;
/// Bit 14: the value is a command rather than channel flags.
pub const COMMAND: u16 = 0x4000;
/// Bits 15, 14 and 13: extended command.
pub const EXTENDED: u16 = 0xE000;
/// Command code lives in the low nibble.
pub const COMMAND_CODE: u16 = 0x000F;

/// Link-level commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    InitStart = 0x1,
    InitEnd = 0x2,
    ReqActive = 0x3,
    ResActive = 0x4,
    ReqTimeSync = 0x5,
    CrashReset = 0x7,
    PhoneStart = 0x8,
    CrashExit = 0x9,
    CpDeepSleep = 0xA,
    NvRebuilding = 0xB,
    EmerDown = 0xC,
    PifInitDone = 0xD,
    SilentNvRebuilding = 0xE,
    NormalPwrOff = 0xF,
}

impl Command {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x1 => Command::InitStart,
            0x2 => Command::InitEnd,
            0x3 => Command::ReqActive,
            0x4 => Command::ResActive,
            0x5 => Command::ReqTimeSync,
            0x7 => Command::CrashReset,
            0x8 => Command::PhoneStart,
            0x9 => Command::CrashExit,
            0xA => Command::CpDeepSleep,
            0xB => Command::NvRebuilding,
            0xC => Command::EmerDown,
            0xD => Command::PifInitDone,
            0xE => Command::SilentNvRebuilding,
            0xF => Command::NormalPwrOff,
            _ => return None,
        })
    }

    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Full mailbox value for this command.
    #[inline]
    pub fn value(self) -> u16 {
        VALID | COMMAND | self.code()
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::InitStart => "INIT_START",
            Command::InitEnd => "INIT_END",
            Command::ReqActive => "REQ_ACTIVE",
            Command::ResActive => "RES_ACTIVE",
            Command::ReqTimeSync => "REQ_TIME_SYNC",
            Command::CrashReset => "CRASH_RESET",
            Command::PhoneStart => "PHONE_START",
            Command::CrashExit => "CRASH_EXIT",
            Command::CpDeepSleep => "CP_DEEP_SLEEP",
            Command::NvRebuilding => "NV_REBUILDING",
            Command::EmerDown => "EMER_DOWN",
            Command::PifInitDone => "PIF_INIT_DONE",
            Command::SilentNvRebuilding => "SILENT_NV_REBUILDING",
            Command::NormalPwrOff => "NORMAL_PWR_OFF",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-channel flag bits in a non-command mailbox value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMasks {
    pub send: u16,
    pub res_ack: u16,
    pub req_ack: u16,
}

impl ChannelMasks {
    pub const FMT: ChannelMasks = ChannelMasks {
        send: 0x0002,
        res_ack: 0x0008,
        req_ack: 0x0020,
    };
    pub const RAW: ChannelMasks = ChannelMasks {
        send: 0x0001,
        res_ack: 0x0004,
        req_ack: 0x0010,
    };
    pub const RFS: ChannelMasks = ChannelMasks {
        send: 0x0100,
        res_ack: 0x0200,
        req_ack: 0x0400,
    };

    /// Masks of an IPC channel, `None` for BOOT.
    pub fn of(channel: ChannelId) -> Option<ChannelMasks> {
        match channel {
            ChannelId::Fmt => Some(Self::FMT),
            ChannelId::Raw => Some(Self::RAW),
            ChannelId::Rfs => Some(Self::RFS),
            ChannelId::Boot => None,
        }
    }
}

/// Mailbox value carrying the given channel flag bits.
#[inline]
pub fn flags_value(bits: u16) -> u16 {
    VALID | bits
}

/// A decoded mailbox value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mailbox {
    /// Valid bit clear.
    Invalid(u16),
    Command(Command),
    /// Command bit set but the code is not one we know.
    UnknownCommand(u16),
    /// Extended command, passed through untouched.
    Extended(u16),
    /// Channel flag bits with the valid bit stripped.
    Flags(u16),
}

pub fn decode(value: u16) -> Mailbox {
    if value & VALID == 0 {
        Mailbox::Invalid(value)
    } else if value & EXTENDED == EXTENDED {
        Mailbox::Extended(value)
    } else if value & COMMAND != 0 {
        let code = value & COMMAND_CODE;
        match Command::from_code(code) {
            Some(cmd) => Mailbox::Command(cmd),
            None => Mailbox::UnknownCommand(code),
        }
    } else {
        Mailbox::Flags(value & !VALID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_values() {
        assert_eq!(Command::PhoneStart.value(), 0xC008);
        assert_eq!(Command::InitEnd.value(), 0xC002);
        assert_eq!(Command::CrashExit.value(), 0xC009);
        assert_eq!(Command::NormalPwrOff.value(), 0xC00F);
    }

    #[test]
    fn every_command_round_trips_through_decode() {
        for code in 0..=0xF {
            if let Some(cmd) = Command::from_code(code) {
                assert_eq!(decode(cmd.value()), Mailbox::Command(cmd));
            }
        }
    }

    #[test]
    fn unassigned_codes_are_unknown() {
        assert_eq!(decode(0xC000), Mailbox::UnknownCommand(0));
        assert_eq!(decode(0xC006), Mailbox::UnknownCommand(6));
    }

    #[test]
    fn extended_wins_over_command() {
        assert_eq!(decode(0xE003), Mailbox::Extended(0xE003));
    }

    #[test]
    fn flags_strip_valid_bit() {
        let both = ChannelMasks::FMT.send | ChannelMasks::RFS.req_ack;
        assert_eq!(decode(flags_value(both)), Mailbox::Flags(both));
        assert_eq!(decode(0x0002), Mailbox::Invalid(0x0002));
    }

    #[test]
    fn masks_do_not_overlap() {
        let all = [ChannelMasks::FMT, ChannelMasks::RAW, ChannelMasks::RFS];
        let mut seen = 0u16;
        for m in all {
            for bit in [m.send, m.res_ack, m.req_ack] {
                assert_eq!(seen & bit, 0, "bit {bit:#06x} reused");
                assert_eq!(bit & (VALID | COMMAND), 0);
                seen |= bit;
            }
        }
    }
}
