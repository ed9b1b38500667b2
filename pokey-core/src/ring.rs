//! Bounded sample ring shared between the emulator thread and the host
//! audio callback.
//!
//! Thread roles:
//! - The emulator thread is the only writer; it locks the state mutex only
//!   around the copy into the buffer.
//! - The audio callback is the only reader; it locks the same mutex for the
//!   copy out and owns `last_sample` for underrun fill.
//! - `playing` and `closing` are advisory flags set by the host thread and
//!   read by both sides.
//!
//! Overflow drops the oldest samples rather than stalling the producer; the
//! adaptive rate controller reacts to the high fill level immediately
//! afterwards. Underrun repeats the last emitted sample so resume is a held
//! level instead of a click.

use crate::api::AudioError;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Smallest accepted target fill, in samples.
pub const MIN_TARGET_FILL: u32 = 256;

#[derive(Debug)]
struct RingState {
    buf: Box<[i16]>,
    read: usize,
    write: usize,
    count: usize,
}

#[derive(Debug)]
struct RingShared {
    state: Mutex<RingState>,
    capacity: usize,
    mask: usize,
    target_fill: AtomicU32,
    last_sample: AtomicI16,
    playing: AtomicBool,
    closing: AtomicBool,
}

/// Cloneable handle to the shared ring; one clone lives inside the audio
/// callback, the other inside the POKEY device.
#[derive(Debug, Clone)]
pub struct SampleRing {
    shared: Arc<RingShared>,
}

impl SampleRing {
    /// Allocate a ring of `capacity` samples. The capacity must be a power
    /// of two (indexing is masked, not modulo'd) and large enough to hold a
    /// useful fill target.
    pub fn new(capacity: u32) -> Result<Self, AudioError> {
        if capacity < 2 * MIN_TARGET_FILL || !capacity.is_power_of_two() {
            return Err(AudioError::RingCapacity { capacity });
        }

        let capacity = capacity as usize;
        let shared = RingShared {
            state: Mutex::new(RingState {
                buf: vec![0; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
                count: 0,
            }),
            capacity,
            mask: capacity - 1,
            target_fill: AtomicU32::new(capacity as u32 / 4),
            last_sample: AtomicI16::new(0),
            playing: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        };

        Ok(Self { shared: Arc::new(shared) })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn fill_level(&self) -> usize {
        self.shared.state.lock().unwrap().count
    }

    pub fn target_fill(&self) -> u32 {
        self.shared.target_fill.load(Ordering::Relaxed)
    }

    /// Steady-state fill the adaptive controller converges toward; clamped
    /// to `[MIN_TARGET_FILL, 3/4 capacity]`.
    pub fn set_target_fill(&self, target: u32) {
        let max = (self.shared.capacity as u32 / 4) * 3;
        self.shared.target_fill.store(target.clamp(MIN_TARGET_FILL, max), Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    /// Host-side notification that the device callback is (or is no longer)
    /// being serviced. While false the throttle predicate stays false.
    pub fn set_playing(&self, playing: bool) {
        self.shared.playing.store(playing, Ordering::Relaxed);
    }

    /// Begin teardown: the callback emits silence from now on. Must be
    /// called before the audio device is stopped and dropped.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
    }

    /// Producer side: append samples, discarding the oldest on overflow.
    pub fn write(&self, samples: &[i16]) {
        let capacity = self.shared.capacity;
        let mask = self.shared.mask;

        // If handed more than the whole ring, only the newest samples can
        // survive anyway
        let samples = if samples.len() >= capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let mut state = self.shared.state.lock().unwrap();

        let free = capacity - state.count;
        if samples.len() > free {
            let drop = samples.len() - free;
            state.read = (state.read + drop) & mask;
            state.count -= drop;
            log::trace!("Sample ring overflow, dropped {drop} oldest samples");
        }

        let first = samples.len().min(capacity - state.write);
        let write = state.write;
        state.buf[write..write + first].copy_from_slice(&samples[..first]);
        if first < samples.len() {
            let second = samples.len() - first;
            state.buf[..second].copy_from_slice(&samples[first..]);
        }

        state.write = (state.write + samples.len()) & mask;
        state.count += samples.len();
    }

    /// Consumer side: fill `out` from the ring, repeating the last sample
    /// across any underrun tail. Runs inside the audio callback.
    pub fn read_into(&self, out: &mut [i16]) {
        if self.shared.closing.load(Ordering::SeqCst) {
            out.fill(0);
            return;
        }

        let read_count = {
            let mut state = self.shared.state.lock().unwrap();
            let to_read = out.len().min(state.count);

            let first = to_read.min(self.shared.capacity - state.read);
            out[..first].copy_from_slice(&state.buf[state.read..state.read + first]);
            if first < to_read {
                let second = to_read - first;
                out[first..to_read].copy_from_slice(&state.buf[..second]);
            }

            state.read = (state.read + to_read) & self.shared.mask;
            state.count -= to_read;
            to_read
        };

        let mut hold = self.shared.last_sample.load(Ordering::Relaxed);
        if read_count > 0 {
            hold = out[read_count - 1];
        } else {
            log::trace!("Sample ring underrun, holding last sample");
        }
        out[read_count..].fill(hold);
        self.shared.last_sample.store(hold, Ordering::Relaxed);
    }

    /// Back-pressure predicate for the emulator main loop: true when the
    /// ring is at least 75 % full and the device is actively consuming.
    pub fn should_throttle(&self) -> bool {
        if !self.is_playing() || self.shared.closing.load(Ordering::Relaxed) {
            return false;
        }
        self.fill_level() >= self.shared.capacity / 4 * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: u32) -> SampleRing {
        SampleRing::new(capacity).unwrap()
    }

    #[test]
    fn rejects_bad_capacities() {
        assert!(SampleRing::new(0).is_err());
        assert!(SampleRing::new(100).is_err());
        assert!(SampleRing::new(6000).is_err());
        assert!(SampleRing::new(8192).is_ok());
    }

    #[test]
    fn write_then_read_round_trips_in_order() {
        let ring = ring(1024);
        let samples: Vec<i16> = (0..600).collect();
        ring.write(&samples);
        assert_eq!(ring.fill_level(), 600);

        let mut out = vec![0; 600];
        ring.read_into(&mut out);
        assert_eq!(out, samples);
        assert_eq!(ring.fill_level(), 0);
    }

    #[test]
    fn overflow_keeps_newest_samples_in_order() {
        let ring = ring(1024);
        for chunk in (0..2048i16).collect::<Vec<_>>().chunks(100) {
            ring.write(chunk);
        }
        assert_eq!(ring.fill_level(), 1024);

        let mut out = vec![0; 1024];
        ring.read_into(&mut out);
        let expected: Vec<i16> = (1024..2048).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn oversized_write_keeps_tail() {
        let ring = ring(512);
        let samples: Vec<i16> = (0..2000).collect();
        ring.write(&samples);
        assert_eq!(ring.fill_level(), 512);

        let mut out = vec![0; 512];
        ring.read_into(&mut out);
        assert_eq!(out, (2000 - 512..2000).collect::<Vec<i16>>());
    }

    #[test]
    fn underrun_repeats_last_sample() {
        let ring = ring(1024);
        ring.write(&[5, 6, 7]);

        let mut out = [0i16; 8];
        ring.read_into(&mut out);
        assert_eq!(out, [5, 6, 7, 7, 7, 7, 7, 7]);

        // A fully empty follow-up read holds the same value
        let mut out = [0i16; 4];
        ring.read_into(&mut out);
        assert_eq!(out, [7, 7, 7, 7]);
    }

    #[test]
    fn throttle_thresholds() {
        let ring = ring(8192);
        ring.set_playing(true);
        assert!(!ring.should_throttle());

        ring.write(&vec![0; 7000]);
        assert!(ring.should_throttle());

        let mut out = vec![0; 3000];
        ring.read_into(&mut out);
        // Drained to ~half full
        assert!(!ring.should_throttle());

        // Without a playing device the predicate never engages
        ring.set_playing(false);
        ring.write(&vec![0; 4000]);
        assert!(!ring.should_throttle());
    }

    #[test]
    fn closing_ring_emits_silence() {
        let ring = ring(1024);
        ring.write(&[9; 16]);
        ring.close();

        let mut out = [1i16; 8];
        ring.read_into(&mut out);
        assert_eq!(out, [0; 8]);
        assert!(!ring.should_throttle());
    }
}
