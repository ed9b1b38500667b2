//! POKEY register file and control-register bitfields.
//!
//! The chip exposes 16 byte-wide addresses; reads and writes at the same
//! offset refer to different registers (e.g. $D208 is AUDCTL on write and
//! ALLPOT on read). The write shadows live here; the read-side shadows for
//! externally maintained registers (pots, keyboard, serial input) are plain
//! bytes that collaborators update through setters on the device.

use bincode::{Decode, Encode};
use proc_bitfield::bitfield;

/// Register offsets within the POKEY page ($D200-$D20F on the Atari 8-bit).
pub mod offset {
    pub const AUDF1: u8 = 0x00;
    pub const AUDC1: u8 = 0x01;
    pub const AUDF2: u8 = 0x02;
    pub const AUDC2: u8 = 0x03;
    pub const AUDF3: u8 = 0x04;
    pub const AUDC3: u8 = 0x05;
    pub const AUDF4: u8 = 0x06;
    pub const AUDC4: u8 = 0x07;
    pub const AUDCTL: u8 = 0x08;
    pub const STIMER: u8 = 0x09;
    pub const SKREST: u8 = 0x0A;
    pub const POTGO: u8 = 0x0B;
    pub const SEROUT: u8 = 0x0D;
    pub const IRQEN: u8 = 0x0E;
    pub const SKCTL: u8 = 0x0F;

    pub const ALLPOT: u8 = 0x08;
    pub const KBCODE: u8 = 0x09;
    pub const RANDOM: u8 = 0x0A;
    pub const SERIN: u8 = 0x0D;
    pub const IRQST: u8 = 0x0E;
    pub const SKSTAT: u8 = 0x0F;
}

/// IRQEN/IRQST bits for the three audio timers (IRQST is active-low).
pub const IRQ_TIMER_1: u8 = 0x01;
pub const IRQ_TIMER_2: u8 = 0x02;
pub const IRQ_TIMER_4: u8 = 0x04;

/// SKSTAT bits restored to 1 by a SKREST write (serial error latches).
pub const SKSTAT_RESET_MASK: u8 = 0xE0;

bitfield! {
    /// AUDCTL ($D208 write): chip-wide audio control.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
    pub struct AudioCtl(pub u8): Debug, IntoStorage {
        /// Replace the 17-bit polynomial with the 9-bit one.
        pub poly9: bool @ 7,
        /// Clock channel 1 at the CPU rate instead of the base clock.
        pub ch1_fast: bool @ 6,
        /// Clock channel 3 at the CPU rate instead of the base clock.
        pub ch3_fast: bool @ 5,
        /// Join channels 1+2 into one 16-bit divider.
        pub pair12: bool @ 4,
        /// Join channels 3+4 into one 16-bit divider.
        pub pair34: bool @ 3,
        /// High-pass channel 1 against channel 3's divider pulses.
        pub highpass1: bool @ 2,
        /// High-pass channel 2 against channel 4's divider pulses.
        pub highpass2: bool @ 1,
        /// Base clock 15 kHz (one tick per scanline) instead of 64 kHz.
        pub slow_base: bool @ 0,
    }
}

bitfield! {
    /// SKCTL ($D20F write): serial/keyboard control. Only the bits that
    /// affect the audio core are decoded; the rest belong to the SIO and
    /// keyboard collaborators.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
    pub struct SerialCtl(pub u8): Debug, IntoStorage {
        /// Two-tone mode: channel 1 output is gated by channel 2's.
        pub two_tone: bool @ 3,
        /// Keyboard scan / debounce enables. While both are zero the
        /// polynomial counters and channel prescalers are held in reset.
        pub clock_bits: u8 @ 0..=1,
    }
}

impl SerialCtl {
    /// Audio clocks (and the RNG) run only when SKCTL bits 0-1 are nonzero.
    pub fn clocks_running(self) -> bool {
        self.clock_bits() != 0
    }
}

bitfield! {
    /// AUDCn ($D201/3/5/7 write): per-channel volume and distortion control.
    #[derive(Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
    pub struct ChannelCtl(pub u8): Debug, IntoStorage {
        /// Distortion selector; picks which polynomial taps gate/latch the
        /// output flip-flop.
        pub distortion: u8 @ 5..=7,
        /// Force the output high: pure DC at `volume`, used for digitized
        /// sample playback.
        pub volume_only: bool @ 4,
        pub volume: u8 @ 0..=3,
    }
}

/// Write-side register file plus the read shadows that external
/// collaborators (pot lines, keyboard, SIO) maintain.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Registers {
    pub audf: [u8; 4],
    pub audc: [ChannelCtl; 4],
    pub audctl: AudioCtl,
    pub skctl: SerialCtl,
    pub irqen: u8,
    /// Active-low interrupt status: 0 = pending.
    pub irqst: u8,
    pub skstat: u8,
    pub serout: u8,
    pub pot: [u8; 8],
    pub allpot: u8,
    pub kbcode: u8,
    pub serin: u8,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            audf: [0; 4],
            audc: [ChannelCtl::default(); 4],
            audctl: AudioCtl::default(),
            skctl: SerialCtl::default(),
            irqen: 0,
            irqst: 0xFF,
            skstat: 0xFF,
            serout: 0,
            pot: [0; 8],
            allpot: 0,
            kbcode: 0xFF,
            serin: 0,
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audioctl_decodes_bits() {
        let audctl = AudioCtl(0x51);
        assert!(audctl.ch1_fast());
        assert!(audctl.pair12());
        assert!(audctl.slow_base());
        assert!(!audctl.poly9());
        assert!(!audctl.pair34());
    }

    #[test]
    fn channel_ctl_decodes_fields() {
        // Pure tone, volume 8
        let audc = ChannelCtl(0xA8);
        assert_eq!(audc.distortion(), 5);
        assert!(!audc.volume_only());
        assert_eq!(audc.volume(), 8);

        // Volume-only DAC mode
        let audc = ChannelCtl(0x1F);
        assert!(audc.volume_only());
        assert_eq!(audc.volume(), 15);
    }

    #[test]
    fn skctl_clock_hold() {
        assert!(!SerialCtl(0x00).clocks_running());
        assert!(SerialCtl(0x03).clocks_running());
        assert!(SerialCtl(0x02).clocks_running());
    }
}
