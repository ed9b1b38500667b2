//! Timer period arithmetic for the CPU's interrupt scheduler.
//!
//! Channels 1, 2, and 4 can raise IRQs on divider underflow. The period of
//! the next underflow is a pure function of the register file: AUDF reload
//! arithmetic times the divider clock, with 16-bit pair mode folding the
//! low channel in as a prescaler. A result of 0 means "disabled".

use crate::channel::{CYCLES_PER_LINE, FAST_BASE_DIV};
use crate::registers::Registers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokeyTimer {
    Timer1,
    Timer2,
    Timer4,
}

impl PokeyTimer {
    pub const ALL: [Self; 3] = [Self::Timer1, Self::Timer2, Self::Timer4];
}

/// CPU cycles between underflows of the given timer, or 0 when the timer
/// cannot fire: AUDF zero, audio clocks held in reset, or the timer merged
/// into a 16-bit pair it does not lead.
pub fn timer_period_cpu_cycles(regs: &Registers, timer: PokeyTimer) -> u64 {
    if !regs.skctl.clocks_running() {
        return 0;
    }

    let audctl = regs.audctl;
    let base = u64::from(if audctl.slow_base() { CYCLES_PER_LINE } else { FAST_BASE_DIV });

    match timer {
        PokeyTimer::Timer1 => {
            // In pair mode channel 1 is a prescaler with no visible underflow
            if audctl.pair12() || regs.audf[0] == 0 {
                return 0;
            }

            let div = if audctl.ch1_fast() { 1 } else { base };
            let reload = u64::from(regs.audf[0]) + if audctl.ch1_fast() { 4 } else { 1 };
            reload * div
        }
        PokeyTimer::Timer2 => {
            if regs.audf[1] == 0 {
                return 0;
            }

            if audctl.pair12() {
                let period = (u64::from(regs.audf[1]) << 8) | u64::from(regs.audf[0]);
                let div = if audctl.ch1_fast() { 1 } else { base };
                let reload = period + if audctl.ch1_fast() { 7 } else { 1 };
                reload * div
            } else {
                (u64::from(regs.audf[1]) + 1) * base
            }
        }
        PokeyTimer::Timer4 => {
            if regs.audf[3] == 0 {
                return 0;
            }

            if audctl.pair34() {
                let period = (u64::from(regs.audf[3]) << 8) | u64::from(regs.audf[2]);
                let div = if audctl.ch3_fast() { 1 } else { base };
                let reload = period + if audctl.ch3_fast() { 7 } else { 1 };
                reload * div
            } else {
                (u64::from(regs.audf[3]) + 1) * base
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{AudioCtl, SerialCtl};

    fn regs() -> Registers {
        let mut regs = Registers::new();
        regs.skctl = SerialCtl(0x03);
        regs
    }

    #[test]
    fn timer_1_single_mode() {
        let mut regs = regs();
        regs.audf[0] = 10;
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 11 * 28);

        regs.audctl = AudioCtl(0x01);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 11 * 114);

        regs.audctl = AudioCtl(0x40);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 14);
    }

    #[test]
    fn timer_1_disabled_cases() {
        let mut regs = regs();
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 0);

        regs.audf[0] = 10;
        regs.audctl = AudioCtl(0x10);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 0);

        regs.audctl = AudioCtl(0x00);
        regs.skctl = SerialCtl(0x00);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), 0);
    }

    #[test]
    fn timer_2_paired_uses_16_bit_period() {
        let mut regs = regs();
        regs.audctl = AudioCtl(0x10);
        regs.audf[0] = 10;
        regs.audf[1] = 0;
        // Paired timer with a zero high AUDF stays disabled
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer2), 0);

        regs.audf[1] = 2;
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer2), (0x020A + 1) * 28);

        // Fast low channel switches to CPU-rate clocking with +7 reload
        regs.audctl = AudioCtl(0x50);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer2), 0x020A + 7);
    }

    #[test]
    fn timer_2_single_mode_always_uses_base() {
        let mut regs = regs();
        regs.audf[1] = 0x20;
        // ch1_fast must not affect timer 2 in single mode
        regs.audctl = AudioCtl(0x40);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer2), 0x21 * 28);
    }

    #[test]
    fn random_configs_follow_reload_times_divider() {
        for _ in 0..10_000 {
            let mut regs = regs();
            regs.audf = rand::random();
            regs.audctl = AudioCtl(rand::random());

            let base: u64 = if regs.audctl.slow_base() { 114 } else { 28 };

            let expected_1 = if regs.audctl.pair12() || regs.audf[0] == 0 {
                0
            } else if regs.audctl.ch1_fast() {
                u64::from(regs.audf[0]) + 4
            } else {
                (u64::from(regs.audf[0]) + 1) * base
            };
            assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer1), expected_1);

            let expected_2 = if regs.audf[1] == 0 {
                0
            } else if regs.audctl.pair12() {
                let period = (u64::from(regs.audf[1]) << 8) | u64::from(regs.audf[0]);
                if regs.audctl.ch1_fast() { period + 7 } else { (period + 1) * base }
            } else {
                (u64::from(regs.audf[1]) + 1) * base
            };
            assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer2), expected_2);

            // Holding the audio clocks disables every timer regardless of
            // the rest of the configuration
            regs.skctl = SerialCtl(0x00);
            for timer in PokeyTimer::ALL {
                assert_eq!(timer_period_cpu_cycles(&regs, timer), 0);
            }
        }
    }

    #[test]
    fn timer_4_paired_and_single() {
        let mut regs = regs();
        regs.audf[2] = 0x34;
        regs.audf[3] = 0x12;
        regs.audctl = AudioCtl(0x08);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer4), (0x1234 + 1) * 28);

        regs.audctl = AudioCtl(0x28);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer4), 0x1234 + 7);

        regs.audctl = AudioCtl(0x00);
        assert_eq!(timer_period_cpu_cycles(&regs, PokeyTimer::Timer4), 0x13 * 28);
    }
}
