//! The four free-running polynomial counters (LFSRs).
//!
//! All four advance exactly once per CPU cycle while SKCTL keeps the audio
//! clocks running. The tap positions are normative: games rely on these
//! exact bit sequences for noise timbre, and RANDOM reads expose the 17-bit
//! register directly.

use bincode::{Decode, Encode};

const SEED_4: u8 = 0x00;
const SEED_5: u8 = 0x00;
const SEED_9: u16 = 0x1FF;
const SEED_17: u32 = 0x1FFFF;

#[derive(Debug, Clone, Encode, Decode)]
pub struct PolyCounters {
    lfsr4: u8,
    lfsr5: u8,
    lfsr9: u16,
    lfsr17: u32,
}

impl PolyCounters {
    pub fn new() -> Self {
        Self { lfsr4: SEED_4, lfsr5: SEED_5, lfsr9: SEED_9, lfsr17: SEED_17 }
    }

    /// Return all four registers to their reset seeds. The 4- and 5-bit
    /// registers use inverted feedback, so their lock-up state is all-ones
    /// and the seed is zero; the 9- and 17-bit registers shift plain XOR
    /// feedback and lock up at zero, so they seed all-ones.
    pub fn reset(&mut self) {
        self.lfsr4 = SEED_4;
        self.lfsr5 = SEED_5;
        self.lfsr9 = SEED_9;
        self.lfsr17 = SEED_17;
    }

    pub fn step(&mut self) {
        // poly4/poly5: shift left, inverted XOR feedback into bit 0
        let l4 = u32::from(self.lfsr4) & 0x0F;
        let new4 = !((l4 >> 2) ^ (l4 >> 3)) & 1;
        self.lfsr4 = (((l4 << 1) | new4) & 0x0F) as u8;

        let l5 = u32::from(self.lfsr5) & 0x1F;
        let new5 = !((l5 >> 2) ^ (l5 >> 4)) & 1;
        self.lfsr5 = (((l5 << 1) | new5) & 0x1F) as u8;

        // poly9: shift right, bit0 XOR bit5 into bit 8
        let l9 = u32::from(self.lfsr9) & 0x1FF;
        let in9 = (l9 ^ (l9 >> 5)) & 1;
        self.lfsr9 = (((l9 >> 1) | (in9 << 8)) & 0x1FF) as u16;

        // poly17: shift right, but bit 7 is replaced by bit8 XOR bit13 and
        // bit 16 refills from the old bit 0
        let l17 = self.lfsr17 & 0x1FFFF;
        let in8 = ((l17 >> 8) ^ (l17 >> 13)) & 1;
        let in0 = l17 & 1;
        let mut l17 = l17 >> 1;
        l17 = (l17 & 0xFF7F) | (in8 << 7);
        l17 = (l17 & 0xFFFF) | (in0 << 16);
        self.lfsr17 = l17;
    }

    pub fn bit4(&self) -> bool {
        self.lfsr4 & 1 != 0
    }

    pub fn bit5(&self) -> bool {
        self.lfsr5 & 1 != 0
    }

    /// The noise bit used by distortions 0 and 4: the 17-bit register, or
    /// the 9-bit one when AUDCTL selects it.
    pub fn noise_bit(&self, poly9: bool) -> bool {
        if poly9 { self.lfsr9 & 1 != 0 } else { self.lfsr17 & 1 != 0 }
    }

    /// RANDOM ($D20A read): the low byte of the 17-bit register.
    pub fn random_byte(&self) -> u8 {
        (self.lfsr17 & 0xFF) as u8
    }
}

impl Default for PolyCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period_of(read: impl Fn(&PolyCounters) -> u32) -> u32 {
        let mut polys = PolyCounters::new();
        let initial = read(&polys);
        for step in 1.. {
            polys.step();
            if read(&polys) == initial {
                return step;
            }
        }
        unreachable!()
    }

    #[test]
    fn poly_periods() {
        assert_eq!(period_of(|p| u32::from(p.lfsr4)), 15);
        assert_eq!(period_of(|p| u32::from(p.lfsr5)), 31);
        assert_eq!(period_of(|p| u32::from(p.lfsr9)), 511);
        assert_eq!(period_of(|p| p.lfsr17), 131071);
    }

    #[test]
    fn inverted_feedback_avoids_lockup() {
        // All-ones is the fixed point of the inverted-feedback registers;
        // the zero seed must never reach it.
        let mut polys = PolyCounters::new();
        for _ in 0..1000 {
            polys.step();
            assert_ne!(polys.lfsr4, 0x0F);
            assert_ne!(polys.lfsr5, 0x1F);
            assert_ne!(polys.lfsr9, 0);
            assert_ne!(polys.lfsr17, 0);
        }
    }

    #[test]
    fn random_byte_at_seed() {
        let polys = PolyCounters::new();
        assert_eq!(polys.random_byte(), 0xFF);
    }

    #[test]
    fn reset_restores_seeds() {
        let mut polys = PolyCounters::new();
        for _ in 0..123 {
            polys.step();
        }
        polys.reset();
        assert_eq!(polys.lfsr4, 0x00);
        assert_eq!(polys.lfsr5, 0x00);
        assert_eq!(polys.lfsr9, 0x1FF);
        assert_eq!(polys.lfsr17, 0x1FFFF);
    }
}
