//! POKEY public interface: register access, the cycle Sync loop, and the
//! audio pipeline glue.
//!
//! The device is exclusively owned by the emulator thread. Every register
//! access is cycle-stamped by the caller and synchronizes the audio state
//! machine up to that cycle first, so a control change only affects samples
//! at or after its cycle. The only cross-thread object is the sample ring;
//! the host hands a clone of its handle to the audio callback.

use crate::channel::{self, Channel, CYCLES_PER_LINE, FAST_BASE_DIV};
use crate::mixer::{self, HighPassLatches};
use crate::poly::PolyCounters;
use crate::registers::{
    offset, AudioCtl, ChannelCtl, Registers, SerialCtl, IRQ_TIMER_1, IRQ_TIMER_2, IRQ_TIMER_4,
    SKSTAT_RESET_MASK,
};
use crate::resampler::Resampler;
use crate::ring::SampleRing;
use crate::scheduler::TimerScheduler;
use crate::timers::{timer_period_cpu_cycles, PokeyTimer};
use bincode::{Decode, Encode};
use std::array;
use thiserror::Error;

/// PAL CPU clock; POKEY's master clock is the CPU clock.
pub const PAL_CPU_HZ: u32 = 1_773_447;

/// Sample batch size flushed to the ring while syncing.
const FLUSH_SAMPLES: usize = 512;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Unsupported audio format (need mono signed 16-bit, 22050-96000 Hz): {0}")]
    FormatMismatch(String),
    #[error("Invalid sample ring capacity {capacity}; must be a power of two with room for at least four device buffers")]
    RingCapacity { capacity: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Preferred output sample rate; replace with the device-granted rate
    /// before building when the host has already opened its device.
    pub sample_rate_hz: u32,
    /// Sample ring capacity; a power of two at least 4x the device buffer.
    pub ring_capacity: u32,
    /// Host audio device buffer size, used to derive the ring fill target.
    pub device_buffer_samples: u32,
    pub cpu_hz: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48000,
            ring_capacity: 8192,
            device_buffer_samples: 1024,
            cpu_hz: PAL_CPU_HZ,
        }
    }
}

#[derive(Debug)]
pub struct PokeyBuilder {
    config: AudioConfig,
    audio_enabled: bool,
}

impl PokeyBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: AudioConfig::default(), audio_enabled: true }
    }

    #[must_use]
    pub fn with_config(mut self, config: AudioConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn sample_rate_hz(mut self, sample_rate_hz: u32) -> Self {
        self.config.sample_rate_hz = sample_rate_hz;
        self
    }

    #[must_use]
    pub fn ring_capacity(mut self, ring_capacity: u32) -> Self {
        self.config.ring_capacity = ring_capacity;
        self
    }

    #[must_use]
    pub fn device_buffer_samples(mut self, device_buffer_samples: u32) -> Self {
        self.config.device_buffer_samples = device_buffer_samples;
        self
    }

    #[must_use]
    pub fn cpu_hz(mut self, cpu_hz: u32) -> Self {
        self.config.cpu_hz = cpu_hz;
        self
    }

    /// Disable sample synthesis entirely (no usable audio device). Register
    /// state and timer IRQs still advance; the throttle predicate stays
    /// false so the caller falls back to wall-clock pacing.
    #[must_use]
    pub fn audio_enabled(mut self, audio_enabled: bool) -> Self {
        self.audio_enabled = audio_enabled;
        self
    }

    /// # Errors
    ///
    /// Returns [`AudioError::FormatMismatch`] for an out-of-range sample
    /// rate and [`AudioError::RingCapacity`] when the ring cannot hold four
    /// device buffers or is not a power of two.
    pub fn build(self) -> Result<Pokey, AudioError> {
        let config = self.config;

        if !(22050..=96000).contains(&config.sample_rate_hz) {
            return Err(AudioError::FormatMismatch(format!(
                "{} Hz",
                config.sample_rate_hz
            )));
        }
        if config.ring_capacity < 4 * config.device_buffer_samples {
            return Err(AudioError::RingCapacity { capacity: config.ring_capacity });
        }

        let ring = SampleRing::new(config.ring_capacity)?;
        ring.set_target_fill(2 * config.device_buffer_samples);

        let mut pokey = Pokey {
            regs: Registers::new(),
            polys: PolyCounters::new(),
            channels: array::from_fn(|_| Channel::new()),
            hp: HighPassLatches::default(),
            resampler: Resampler::new(config.cpu_hz, config.sample_rate_hz),
            scheduler: TimerScheduler::new(),
            ring,
            pending: Vec::with_capacity(2 * FLUSH_SAMPLES),
            last_cycle: 0,
            audio_enabled: self.audio_enabled,
        };
        pokey.recompute_divider_clocks();

        log::debug!(
            "POKEY core initialized: {} Hz output, ring capacity {}, audio {}",
            config.sample_rate_hz,
            config.ring_capacity,
            if self.audio_enabled { "enabled" } else { "disabled" }
        );

        Ok(pokey)
    }
}

impl Default for PokeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of the emulation-visible POKEY state. Host-side
/// audio state (ring contents, DC blocker history) is intentionally not
/// captured; it belongs to the timeline being abandoned.
#[derive(Debug, Clone, Encode, Decode)]
pub struct PokeySaveState {
    regs: Registers,
    polys: PolyCounters,
    channels: [Channel; 4],
    hp: HighPassLatches,
    scheduler: TimerScheduler,
    last_cycle: u64,
}

#[derive(Debug)]
pub struct Pokey {
    regs: Registers,
    polys: PolyCounters,
    channels: [Channel; 4],
    hp: HighPassLatches,
    resampler: Resampler,
    scheduler: TimerScheduler,
    ring: SampleRing,
    pending: Vec<i16>,
    last_cycle: u64,
    audio_enabled: bool,
}

impl Pokey {
    #[must_use]
    pub fn builder() -> PokeyBuilder {
        PokeyBuilder::new()
    }

    /// A clone of the sample ring handle, for the host audio callback.
    #[must_use]
    pub fn ring(&self) -> SampleRing {
        self.ring.clone()
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    #[must_use]
    pub fn last_cycle(&self) -> u64 {
        self.last_cycle
    }

    /// Current output flip-flop state of each channel.
    #[must_use]
    pub fn channel_outputs(&self) -> [bool; 4] {
        array::from_fn(|i| self.channels[i].output)
    }

    /// True while any enabled timer interrupt is pending (IRQST active-low).
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        !self.regs.irqst & self.regs.irqen != 0
    }

    /// CPU cycles between underflows of a timer with the current register
    /// configuration; 0 means disabled. Exposed for the CPU emulator's
    /// interrupt scheduling.
    #[must_use]
    pub fn timer_period(&self, timer: PokeyTimer) -> u64 {
        timer_period_cpu_cycles(&self.regs, timer)
    }

    /// Back-pressure for the emulator main loop; see [`SampleRing::should_throttle`].
    #[must_use]
    pub fn should_throttle(&self) -> bool {
        self.audio_enabled && self.ring.should_throttle()
    }

    /// Write a POKEY register at the given CPU cycle.
    pub fn write(&mut self, offset: u8, value: u8, cycle: u64) {
        self.sync(cycle);

        match offset & 0x0F {
            off @ (offset::AUDF1 | offset::AUDF2 | offset::AUDF3 | offset::AUDF4) => {
                let i = usize::from(off >> 1);
                self.regs.audf[i] = value;
                self.channels[i].audf = value;
                log::trace!("[{cycle}] AUDF{}: {value:02X}", i + 1);
            }
            off @ (offset::AUDC1 | offset::AUDC2 | offset::AUDC3 | offset::AUDC4) => {
                let i = usize::from(off >> 1);
                self.regs.audc[i] = ChannelCtl(value);
                self.channels[i].audc = ChannelCtl(value);
                log::trace!("[{cycle}] AUDC{}: {value:02X}", i + 1);
            }
            offset::AUDCTL => {
                self.regs.audctl = AudioCtl(value);
                self.recompute_divider_clocks();
                log::trace!("[{cycle}] AUDCTL: {:?}", self.regs.audctl);
            }
            offset::STIMER => {
                log::trace!("[{cycle}] STIMER: {value:02X}");
                self.write_stimer(cycle);
            }
            offset::SKREST => {
                self.regs.skstat |= SKSTAT_RESET_MASK;
                log::trace!("[{cycle}] SKREST: {value:02X}");
            }
            offset::POTGO => {
                // Pot scan counting is the pot-line collaborator's concern;
                // it refreshes the POT0-7 and ALLPOT shadows via setters
                log::trace!("[{cycle}] POTGO");
            }
            offset::SEROUT => {
                self.regs.serout = value;
                log::trace!("[{cycle}] SEROUT: {value:02X}");
            }
            offset::IRQEN => {
                self.regs.irqen = value;
                // Disabling a source clears its pending status (sets the
                // active-low bit back to 1)
                self.regs.irqst |= !value;
                log::trace!("[{cycle}] IRQEN: {value:02X}");
            }
            offset::SKCTL => {
                log::trace!("[{cycle}] SKCTL: {value:02X}");
                self.write_skctl(value, cycle);
            }
            _ => log::warn!("POKEY write to unmapped offset {offset:02X}: {value:02X}"),
        }
    }

    /// Read a POKEY register at the given CPU cycle.
    pub fn read(&mut self, offset: u8, cycle: u64) -> u8 {
        self.sync(cycle);

        match offset & 0x0F {
            0x00..=0x07 => self.regs.pot[usize::from(offset & 0x07)],
            offset::ALLPOT => self.regs.allpot,
            offset::KBCODE => self.regs.kbcode,
            offset::RANDOM => self.random(),
            offset::SERIN => self.regs.serin,
            offset::IRQST => self.regs.irqst,
            offset::SKSTAT => self.regs.skstat,
            off => {
                log::warn!("POKEY read from unmapped offset {off:02X}");
                0xFF
            }
        }
    }

    /// Advance the audio state machine to `cycle`, emitting samples into
    /// the ring. Idempotent for non-advancing cycles.
    pub fn sync(&mut self, cycle: u64) {
        if cycle <= self.last_cycle {
            return;
        }

        self.process_timer_events(cycle);

        if !self.audio_enabled {
            self.last_cycle = cycle;
            return;
        }

        // Adaptive rate control: pick the effective cycles-per-sample for
        // this batch from the current ring fill. Without a live consumer
        // there is no fill level worth chasing, so stay on the nominal rate.
        let adjusted_cps = if self.ring.is_playing() {
            let fill = self.ring.fill_level() as u32;
            self.resampler.adjusted_rate_fp(fill, self.ring.target_fill())
        } else {
            self.resampler.base_rate_fp()
        };

        let mut cur = self.last_cycle;
        while cur < cycle {
            let level =
                mixer::cycle_level(&self.channels, self.regs.audctl, self.regs.skctl, self.hp);
            self.resampler.advance_cycle(level, adjusted_cps, &mut self.pending);
            if self.pending.len() >= FLUSH_SAMPLES {
                self.ring.write(&self.pending);
                self.pending.clear();
            }

            self.step_cpu_cycle();
            cur += 1;
        }

        debug_assert!(self.resampler.sample_phase_fp() < adjusted_cps);

        if !self.pending.is_empty() {
            self.ring.write(&self.pending);
            self.pending.clear();
        }

        self.last_cycle = cycle;
    }

    /// Adopt the sample rate the host audio device actually granted,
    /// replacing the preferred rate the core was built with.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::FormatMismatch`] for rates outside the host
    /// audio contract (22050-96000 Hz).
    pub fn set_sample_rate(&mut self, sample_rate_hz: u32) -> Result<(), AudioError> {
        if !(22050..=96000).contains(&sample_rate_hz) {
            return Err(AudioError::FormatMismatch(format!("{sample_rate_hz} Hz")));
        }

        if sample_rate_hz != self.resampler.sample_rate_hz() {
            log::debug!("Output sample rate changed to {sample_rate_hz} Hz");
            self.resampler.set_sample_rate(sample_rate_hz);
        }
        Ok(())
    }

    /// Return the chip to its power-on register state. The cycle counter is
    /// not rewound; time only moves forward.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.polys.reset();
        self.channels = array::from_fn(|_| Channel::new());
        self.hp = HighPassLatches::default();
        self.scheduler.disarm_all();
        self.resampler.reset_history();
        self.pending.clear();
        self.recompute_divider_clocks();
    }

    #[must_use]
    pub fn save_state(&self) -> PokeySaveState {
        PokeySaveState {
            regs: self.regs.clone(),
            polys: self.polys.clone(),
            channels: self.channels.clone(),
            hp: self.hp,
            scheduler: self.scheduler.clone(),
            last_cycle: self.last_cycle,
        }
    }

    pub fn load_state(&mut self, state: PokeySaveState) {
        self.regs = state.regs;
        self.polys = state.polys;
        self.channels = state.channels;
        self.hp = state.hp;
        self.scheduler = state.scheduler;
        self.last_cycle = state.last_cycle;
        self.resampler.reset_history();
        self.pending.clear();
        self.recompute_divider_clocks();
    }

    // External collaborator seams: pot lines, keyboard, and SIO maintain
    // the read-side shadows.

    pub fn set_pot(&mut self, line: usize, value: u8) {
        if let Some(pot) = self.regs.pot.get_mut(line) {
            *pot = value;
        }
    }

    pub fn set_allpot(&mut self, mask: u8) {
        self.regs.allpot = mask;
    }

    pub fn set_kbcode(&mut self, code: u8) {
        self.regs.kbcode = code;
    }

    pub fn set_serin(&mut self, value: u8) {
        self.regs.serin = value;
    }

    #[must_use]
    pub fn serout(&self) -> u8 {
        self.regs.serout
    }

    fn random(&mut self) -> u8 {
        if !self.audio_enabled && self.regs.skctl.clocks_running() {
            // Without the audio pipeline stepping the polynomials, advance
            // once per read so RANDOM still varies
            self.polys.step();
        }
        self.polys.random_byte()
    }

    fn recompute_divider_clocks(&mut self) {
        let audctl = self.regs.audctl;
        let base = if audctl.slow_base() { CYCLES_PER_LINE } else { FAST_BASE_DIV };

        self.channels[0].clk_div_cycles = if audctl.ch1_fast() { 1 } else { base };
        self.channels[1].clk_div_cycles = base;
        self.channels[2].clk_div_cycles = if audctl.ch3_fast() { 1 } else { base };
        self.channels[3].clk_div_cycles = base;
    }

    /// STIMER: reset every divider to its reload value and realign the
    /// timer IRQ schedule from the write cycle.
    fn write_stimer(&mut self, cycle: u64) {
        let audctl = self.regs.audctl;

        for ch in &mut self.channels {
            ch.clk_acc_cycles = 0;
        }

        if audctl.pair12() {
            self.channels[1].counter =
                channel::pair_reload_value(self.regs.audf[0], self.regs.audf[1], audctl.ch1_fast());
        } else {
            self.channels[0].counter = self.channels[0].reload_value(audctl.ch1_fast());
            self.channels[1].counter = self.channels[1].reload_value(false);
        }

        if audctl.pair34() {
            self.channels[3].counter =
                channel::pair_reload_value(self.regs.audf[2], self.regs.audf[3], audctl.ch3_fast());
        } else {
            self.channels[2].counter = self.channels[2].reload_value(audctl.ch3_fast());
            self.channels[3].counter = self.channels[3].reload_value(false);
        }

        self.reschedule_timers(cycle);
    }

    fn write_skctl(&mut self, value: u8, cycle: u64) {
        let skctl = SerialCtl(value);
        let was_running = self.regs.skctl.clocks_running();
        self.regs.skctl = skctl;

        if !skctl.clocks_running() {
            // Hold the RNG and audio clocks in reset: reseed polynomials,
            // clear prescalers and high-pass latches, stop the timers
            log::debug!("SKCTL holds audio clocks in reset");
            self.polys.reset();
            for ch in &mut self.channels {
                ch.clk_acc_cycles = 0;
            }
            self.hp = HighPassLatches::default();
            self.scheduler.disarm_all();
        } else if !was_running {
            self.reschedule_timers(cycle);
        }
    }

    fn reschedule_timers(&mut self, cycle: u64) {
        for timer in PokeyTimer::ALL {
            let period = timer_period_cpu_cycles(&self.regs, timer);
            if period == 0 {
                self.scheduler.disarm(timer);
            } else {
                self.scheduler.arm(timer, cycle + period);
            }
        }
    }

    fn process_timer_events(&mut self, cycle: u64) {
        while let Some((timer, fired_at)) = self.scheduler.pop_ready(cycle) {
            let irq_bit = match timer {
                PokeyTimer::Timer1 => IRQ_TIMER_1,
                PokeyTimer::Timer2 => IRQ_TIMER_2,
                PokeyTimer::Timer4 => IRQ_TIMER_4,
            };
            if self.regs.irqen & irq_bit != 0 {
                self.regs.irqst &= !irq_bit;
                log::trace!("{timer:?} underflow IRQ at cycle {fired_at}");
            }

            let period = timer_period_cpu_cycles(&self.regs, timer);
            if period != 0 {
                self.scheduler.arm(timer, fired_at + period);
            }
        }
    }

    /// One CPU cycle of the audio state machine: polynomials first, then
    /// the channel dividers, then the high-pass latches on channel 3/4
    /// divider pulses.
    fn step_cpu_cycle(&mut self) {
        if !self.regs.skctl.clocks_running() {
            return;
        }

        self.polys.step();

        let audctl = self.regs.audctl;
        let mut pulse3 = false;
        let mut pulse4 = false;

        if audctl.pair12() {
            if self.channels[0].advance_prescaler() {
                let low_audf = self.channels[0].audf;
                channel::tick_pair(
                    low_audf,
                    &mut self.channels[1],
                    &self.polys,
                    audctl,
                    audctl.ch1_fast(),
                );
            }
        } else {
            if self.channels[0].advance_prescaler() {
                self.channels[0].tick(&self.polys, audctl, audctl.ch1_fast());
            }
            if self.channels[1].advance_prescaler() {
                self.channels[1].tick(&self.polys, audctl, false);
            }
        }

        if audctl.pair34() {
            // Channel 3 is only a prescaler here, so the channel-3 high-pass
            // pulse never fires in pair mode
            if self.channels[2].advance_prescaler() {
                let low_audf = self.channels[2].audf;
                pulse4 = channel::tick_pair(
                    low_audf,
                    &mut self.channels[3],
                    &self.polys,
                    audctl,
                    audctl.ch3_fast(),
                );
            }
        } else {
            if self.channels[2].advance_prescaler() {
                pulse3 = self.channels[2].tick(&self.polys, audctl, audctl.ch3_fast());
            }
            if self.channels[3].advance_prescaler() {
                pulse4 = self.channels[3].tick(&self.polys, audctl, false);
            }
        }

        if pulse3 && audctl.highpass1() {
            self.hp.ch1 = self.channels[0].output;
        }
        if pulse4 && audctl.highpass2() {
            self.hp.ch2 = self.channels[1].output;
        }
    }
}
