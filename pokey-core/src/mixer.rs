//! Per-cycle mixing of the four channel outputs into one unsigned level.

use crate::channel::Channel;
use crate::registers::{AudioCtl, SerialCtl};
use bincode::{Decode, Encode};

/// Per-channel non-linear volume (~3 dB/step). vol=15 -> 8000 units.
/// Soft-clip threshold = 8000; four channels at full volume compress to
/// roughly 26000, inside the 28000 headroom.
pub const CHANNEL_VOLUME: [i32; 16] = [
    0, 63, 88, 125, 177, 250, 354, 500, 707, 1000, 1414, 2000, 2828, 4000, 5657, 8000,
];

pub const CLIP_KNEE: i32 = 8000;
pub const LEVEL_MAX: i32 = 28000;

/// High-pass latch state, captured from channel 1/2 outputs on channel 3/4
/// divider pulses.
#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct HighPassLatches {
    pub ch1: bool,
    pub ch2: bool,
}

/// Compress the sum beyond one channel's maximum, approximating the
/// transistor output stage, then clamp to the mixer range.
pub fn soft_clip(sum: i32) -> i32 {
    let mut sum = sum;
    if sum > CLIP_KNEE {
        sum = CLIP_KNEE + (sum - CLIP_KNEE) * 3 / 4;
    }
    sum.clamp(0, LEVEL_MAX)
}

/// Mix one CPU cycle's worth of channel outputs into a single level in
/// `0..=LEVEL_MAX`. Channels acting as 16-bit prescalers are suppressed;
/// two-tone and the high-pass latches are applied per channel.
pub fn cycle_level(
    channels: &[Channel; 4],
    audctl: AudioCtl,
    skctl: SerialCtl,
    hp: HighPassLatches,
) -> i32 {
    let mut sum = 0;

    for (i, ch) in channels.iter().enumerate() {
        // In pair mode the low channel is only a prescaler
        if (i == 0 && audctl.pair12()) || (i == 2 && audctl.pair34()) {
            continue;
        }

        let vol = ch.audc.volume();
        if vol == 0 {
            continue;
        }

        let vol_only = ch.audc.volume_only();
        let mut bit = vol_only || ch.output;

        // Two-tone mode: channel 1's output is gated by channel 2's
        if i == 0 && skctl.two_tone() {
            bit &= channels[1].output;
        }

        // Digital high-pass, bypassed in volume-only (DAC) mode
        if !vol_only {
            if i == 0 && audctl.highpass1() {
                bit ^= hp.ch1;
            }
            if i == 1 && audctl.highpass2() {
                bit ^= hp.ch2;
            }
        }

        if bit {
            sum += CHANNEL_VOLUME[vol as usize];
        }
    }

    soft_clip(sum)
}
