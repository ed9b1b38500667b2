//! Fixed-point box-filter resampler and output conditioning.
//!
//! The mixer produces one integer level per CPU cycle; the resampler
//! integrates those levels in 32.32 fixed point and emits one output sample
//! every `cycles_per_sample_fp` phase units. Each emitted sample is the
//! exact average of the cycle levels it covers (a box filter), then gain,
//! DC blocking, and i16 scaling are applied.

use crate::num::I32Ext;
use bincode::{Decode, Encode};

/// One emulated CPU cycle in 32.32 fixed-point phase units.
const CYCLE_FP: u64 = 1 << 32;

/// Output gain applied to the unipolar mixer range before DC blocking.
const OUTPUT_GAIN: f32 = 0.75 / 28000.0;

/// DC blocker corner frequency in Hz.
const DC_CORNER_HZ: f64 = 20.0;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Resampler {
    cpu_hz: u32,
    sample_rate_hz: u32,
    /// Nominal CPU cycles per output sample, 32.32 fixed point.
    base_cycles_per_sample_fp: u64,
    /// Phase accumulated toward the next output sample.
    sample_phase_fp: u64,
    /// Level integral over the current sample window.
    sample_accum: i64,
    dc_r: f32,
    dc_x1: f32,
    dc_y1: f32,
}

impl Resampler {
    pub fn new(cpu_hz: u32, sample_rate_hz: u32) -> Self {
        let base = (u64::from(cpu_hz) << 32) / u64::from(sample_rate_hz);
        Self {
            cpu_hz,
            sample_rate_hz,
            base_cycles_per_sample_fp: base,
            sample_phase_fp: 0,
            sample_accum: 0,
            dc_r: dc_coefficient(sample_rate_hz),
            dc_x1: 0.0,
            dc_y1: 0.0,
        }
    }

    pub fn base_rate_fp(&self) -> u64 {
        self.base_cycles_per_sample_fp
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn sample_phase_fp(&self) -> u64 {
        self.sample_phase_fp
    }

    /// Reconfigure for the sample rate the host device actually granted.
    pub fn set_sample_rate(&mut self, sample_rate_hz: u32) {
        *self = Self::new(self.cpu_hz, sample_rate_hz);
    }

    /// Clear integration and filter history (used when loading a save state
    /// so stale host-side audio does not bleed into the new timeline).
    pub fn reset_history(&mut self) {
        self.sample_phase_fp = 0;
        self.sample_accum = 0;
        self.dc_x1 = 0.0;
        self.dc_y1 = 0.0;
    }

    /// The effective cycles-per-sample for one Sync batch, nudged by up to
    /// ±2 % toward draining or filling the ring to its target. Positive
    /// fill error slows sample production (more cycles per sample),
    /// negative speeds it up.
    pub fn adjusted_rate_fp(&self, fill: u32, target: u32) -> u64 {
        let target = i64::from(target.max(1));
        let base = self.base_cycles_per_sample_fp as i64;
        let max_adjust = base / 50;

        let fill_delta = (i64::from(fill) - target).clamp(-target, target);
        let adjusted = base + fill_delta * max_adjust / target;

        adjusted.clamp(base - max_adjust, base + max_adjust).max(1) as u64
    }

    /// Integrate one CPU cycle at `level`, emitting any completed samples.
    ///
    /// `adjusted_cps` is constant for the duration of one Sync call but may
    /// shrink between calls; when the carried phase already meets or
    /// exceeds it, the excess is folded into a synthesized sample at the
    /// running average so the phase invariant holds before integration.
    pub fn advance_cycle(&mut self, level: i32, adjusted_cps: u64, out: &mut Vec<i16>) {
        let level = i64::from(level);
        let mut batch_fp = CYCLE_FP;

        if self.sample_phase_fp >= adjusted_cps {
            let avg = if self.sample_phase_fp != 0 {
                self.sample_accum / self.sample_phase_fp as i64
            } else {
                0
            };
            self.sample_accum = avg * adjusted_cps as i64;
            self.sample_phase_fp = adjusted_cps;
        }

        let cycles_needed_fp = adjusted_cps - self.sample_phase_fp;
        if batch_fp < cycles_needed_fp {
            self.sample_accum += level * batch_fp as i64;
            self.sample_phase_fp += batch_fp;
            return;
        }

        // Finish the in-progress sample with the leading slice of this cycle
        self.sample_accum += level * cycles_needed_fp as i64;
        out.push(self.finalize((self.sample_accum / adjusted_cps as i64) as i32));
        batch_fp -= cycles_needed_fp;

        // A very low sample rate could fit whole samples inside one cycle
        while batch_fp >= adjusted_cps {
            out.push(self.finalize(level as i32));
            batch_fp -= adjusted_cps;
        }

        self.sample_accum = level * batch_fp as i64;
        self.sample_phase_fp = batch_fp;
    }

    /// Map the integer level to float, remove DC, scale to signed 16-bit.
    fn finalize(&mut self, raw: i32) -> i16 {
        let x = raw as f32 * OUTPUT_GAIN;
        let y = x - self.dc_x1 + self.dc_r * self.dc_y1;
        self.dc_x1 = x;
        self.dc_y1 = y;
        ((y * 32767.0) as i32).clamp_to_i16()
    }
}

fn dc_coefficient(sample_rate_hz: u32) -> f32 {
    (-2.0 * std::f64::consts::PI * DC_CORNER_HZ / f64::from(sample_rate_hz)).exp() as f32
}
