//! Audio channel divider and output flip-flop logic.
//!
//! Each channel owns a down-counter clocked by its selected divider clock
//! (CPU rate, 64 kHz, or 15 kHz). When the counter reaches zero it reloads
//! and the clock-out rule fires: depending on the AUDC distortion field the
//! output flip-flop latches a polynomial bit or toggles, optionally gated by
//! the 5-bit polynomial.

use crate::poly::PolyCounters;
use crate::registers::{AudioCtl, ChannelCtl};
use bincode::{Decode, Encode};

/// CPU cycles per video scanline (PAL); POKEY's 15 kHz base clock.
pub const CYCLES_PER_LINE: u32 = 114;

/// CPU cycles per 64 kHz base clock tick.
pub const FAST_BASE_DIV: u32 = 28;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Channel {
    pub audf: u8,
    pub audc: ChannelCtl,
    /// Divider down-counter; always in `1..=reload`.
    pub counter: u32,
    pub output: bool,
    /// CPU cycles per divider clock tick (1, 28, or `CYCLES_PER_LINE`).
    pub clk_div_cycles: u32,
    /// CPU cycles accumulated toward the next divider clock tick.
    pub clk_acc_cycles: u32,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            audf: 0,
            audc: ChannelCtl::default(),
            counter: 1,
            output: false,
            clk_div_cycles: FAST_BASE_DIV,
            clk_acc_cycles: 0,
        }
    }

    /// Divider reload for 8-bit mode: AUDF+1, or AUDF+4 when the channel is
    /// clocked at the CPU rate.
    pub fn reload_value(&self, fast: bool) -> u32 {
        let reload = u32::from(self.audf) + if fast { 4 } else { 1 };
        reload.max(1)
    }

    /// Accumulate one CPU cycle toward the divider clock. Returns true when
    /// the accumulated cycles complete one divider clock tick.
    pub fn advance_prescaler(&mut self) -> bool {
        self.clk_acc_cycles += 1;
        if self.clk_acc_cycles >= self.clk_div_cycles {
            self.clk_acc_cycles -= self.clk_div_cycles;
            true
        } else {
            false
        }
    }

    /// Advance the divider by one of its clock ticks. Returns true when the
    /// counter underflowed (a divider pulse).
    pub fn tick(&mut self, polys: &PolyCounters, audctl: AudioCtl, fast: bool) -> bool {
        if self.counter > 0 {
            self.counter -= 1;
        }
        if self.counter != 0 {
            return false;
        }

        self.counter = self.reload_value(fast);
        self.clock_out(polys, audctl);
        true
    }

    /// Apply the distortion rules to the output flip-flop on a divider pulse.
    ///
    /// Distortions 0-3 are gated by the 5-bit polynomial: the reload above
    /// still happened, but the flip-flop only changes when poly5's output
    /// bit is set.
    pub fn clock_out(&mut self, polys: &PolyCounters, audctl: AudioCtl) {
        if self.audc.volume_only() {
            self.output = true;
            return;
        }

        let dist = self.audc.distortion();
        if dist <= 3 && !polys.bit5() {
            return;
        }

        match dist {
            // 0: 5-bit gated 17-bit noise; 4: ungated 17-bit noise
            0 | 4 => self.output = polys.noise_bit(audctl.poly9()),
            // 2: 5-bit gated 4-bit noise; 6: ungated 4-bit noise
            2 | 6 => self.output = polys.bit4(),
            // 1/3: poly5-gated square buzz; 5/7: pure tone
            _ => self.output = !self.output,
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// 16-bit pair tick: the high channel's counter runs the concatenated
/// period while the low channel acts purely as a prescaler. Only the high
/// channel's flip-flop is clocked. Returns true on underflow.
pub fn tick_pair(
    low_audf: u8,
    high: &mut Channel,
    polys: &PolyCounters,
    audctl: AudioCtl,
    low_fast: bool,
) -> bool {
    if high.counter > 0 {
        high.counter -= 1;
    }
    if high.counter != 0 {
        return false;
    }

    high.counter = pair_reload_value(low_audf, high.audf, low_fast);
    high.clock_out(polys, audctl);
    true
}

/// Divider reload for 16-bit pair mode: period+1, or period+7 when the low
/// channel is clocked at the CPU rate.
pub fn pair_reload_value(low_audf: u8, high_audf: u8, low_fast: bool) -> u32 {
    let period = (u32::from(high_audf) << 8) | u32::from(low_audf);
    let reload = period + if low_fast { 7 } else { 1 };
    reload.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pure_tone(vol: u8) -> ChannelCtl {
        ChannelCtl(0xA0 | vol)
    }

    #[test]
    fn reload_arithmetic() {
        let mut ch = Channel::new();
        ch.audf = 0x7E;
        assert_eq!(ch.reload_value(false), 0x7F);
        assert_eq!(ch.reload_value(true), 0x82);

        // AUDF 0 still yields a positive reload
        ch.audf = 0;
        assert_eq!(ch.reload_value(false), 1);
    }

    #[test]
    fn pair_reload_arithmetic() {
        assert_eq!(pair_reload_value(0x00, 0x10, true), 0x1007);
        assert_eq!(pair_reload_value(0x0A, 0x02, false), 0x020B);
    }

    #[test]
    fn pure_tone_toggles_every_period() {
        let polys = PolyCounters::new();
        let audctl = AudioCtl(0x00);
        let mut ch = Channel::new();
        ch.audf = 4;
        ch.audc = pure_tone(8);
        ch.counter = ch.reload_value(false);

        let mut transitions = 0;
        let mut last = ch.output;
        for _ in 0..50 {
            ch.tick(&polys, audctl, false);
            if ch.output != last {
                transitions += 1;
                last = ch.output;
            }
        }
        assert_eq!(transitions, 50 / 5);
    }

    #[test]
    fn volume_only_forces_output_high() {
        let polys = PolyCounters::new();
        let mut ch = Channel::new();
        ch.audc = ChannelCtl(0x18);
        ch.clock_out(&polys, AudioCtl(0x00));
        assert!(ch.output);
    }

    #[test]
    fn poly5_gate_holds_output() {
        // At the poly5 seed the output bit is 0, so a gated distortion must
        // leave the flip-flop untouched even though the divider reloaded.
        let polys = PolyCounters::new();
        assert!(!polys.bit5());

        let mut ch = Channel::new();
        ch.audf = 0;
        ch.audc = ChannelCtl(0x28); // dist 1: gated square buzz
        ch.counter = 1;
        let pulsed = ch.tick(&polys, AudioCtl(0x00), false);
        assert!(pulsed);
        assert!(!ch.output);
        assert_eq!(ch.counter, 1);
    }
}
