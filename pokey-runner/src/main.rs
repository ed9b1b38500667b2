//! Standalone POKEY demo runner: opens the host audio device, feeds the
//! sample ring from a scripted register sequence, and paces the emulated
//! clock against audio back-pressure.

use clap::Parser;
use env_logger::Env;
use pokey_core::registers::offset;
use pokey_core::ring::SampleRing;
use pokey_core::{AudioError, Pokey, PokeyBuilder, CYCLES_PER_LINE};
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired, AudioStatus};
use std::thread;
use std::time::{Duration, Instant};

/// PAL scanlines per frame; one frame slice is ~20 ms of emulated time.
const LINES_PER_FRAME: u64 = 312;

const DEVICE_BUFFER_SAMPLES: u16 = 1024;

/// AUDF1 values for the demo arpeggio (64 kHz base clock divisors).
const MELODY: [u8; 8] = [0xF3, 0xD8, 0xC1, 0xB5, 0xA1, 0x90, 0x80, 0x79];

#[derive(Debug, Parser)]
struct Args {
    /// Preferred output sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,
    /// How long to run the demo, in seconds
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Run without opening an audio device (wall-clock pacing only)
    #[arg(long, default_value_t)]
    no_audio: bool,
}

struct RingCallback {
    ring: SampleRing,
}

impl AudioCallback for RingCallback {
    type Channel = i16;

    fn callback(&mut self, out: &mut [Self::Channel]) {
        self.ring.read_into(out);
    }
}

struct AudioHost {
    _sdl: sdl2::Sdl,
    device: AudioDevice<RingCallback>,
    ring: SampleRing,
}

impl AudioHost {
    fn open(ring: SampleRing, preferred_rate: u32) -> Result<Self, AudioError> {
        let sdl = sdl2::init().map_err(AudioError::DeviceUnavailable)?;
        let audio = sdl.audio().map_err(AudioError::DeviceUnavailable)?;

        let desired = AudioSpecDesired {
            freq: Some(preferred_rate as i32),
            channels: Some(1),
            samples: Some(DEVICE_BUFFER_SAMPLES),
        };

        let callback_ring = ring.clone();
        let device = audio
            .open_playback(None, &desired, move |spec| {
                log::debug!("Audio device opened: {spec:?}");
                RingCallback { ring: callback_ring }
            })
            .map_err(AudioError::DeviceUnavailable)?;

        let spec = device.spec();
        if spec.channels != 1 || !(22050..=96000).contains(&spec.freq) {
            return Err(AudioError::FormatMismatch(format!(
                "{} channel(s) at {} Hz",
                spec.channels, spec.freq
            )));
        }

        Ok(Self { _sdl: sdl, device, ring })
    }

    fn sample_rate(&self) -> u32 {
        self.device.spec().freq as u32
    }

    fn buffer_samples(&self) -> u32 {
        u32::from(self.device.spec().samples)
    }

    fn resume(&self) {
        self.device.resume();
    }

    fn update_playing(&self) {
        self.ring.set_playing(self.device.status() == AudioStatus::Playing);
    }

    fn close(self) {
        // Flag the callback first so it emits silence while the device winds
        // down, then stop the device before the ring handle drops
        self.ring.close();
        self.device.pause();
    }
}

/// Register script for one frame boundary of the demo: a pure-tone arpeggio
/// on channel 1 over a quiet 4-bit noise drone on channel 4.
fn program_demo_frame(pokey: &mut Pokey, frame: u64, cycle: u64) {
    if frame == 0 {
        pokey.write(offset::SKCTL, 0x03, cycle);
        pokey.write(offset::AUDCTL, 0x00, cycle);
        pokey.write(offset::AUDC1, 0xA8, cycle);
        pokey.write(offset::AUDF4, 0x40, cycle);
        pokey.write(offset::AUDC4, 0xC2, cycle);
        pokey.write(offset::STIMER, 0x00, cycle);
    }

    if frame % 25 == 0 {
        let note = MELODY[(frame / 25) as usize % MELODY.len()];
        pokey.write(offset::AUDF1, note, cycle);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut pokey = PokeyBuilder::new()
        .sample_rate_hz(args.sample_rate)
        .device_buffer_samples(u32::from(DEVICE_BUFFER_SAMPLES))
        .audio_enabled(!args.no_audio)
        .build()?;

    let audio = if args.no_audio {
        None
    } else {
        match AudioHost::open(pokey.ring(), args.sample_rate) {
            Ok(host) => {
                pokey.set_sample_rate(host.sample_rate())?;
                pokey.ring().set_target_fill(2 * host.buffer_samples());
                host.resume();
                log::info!(
                    "Audio running at {} Hz ({} sample device buffer)",
                    host.sample_rate(),
                    host.buffer_samples()
                );
                Some(host)
            }
            Err(err) => {
                // Degrade to a silent core; the emulated machine still runs
                log::error!("Continuing without audio: {err}");
                pokey = PokeyBuilder::new().audio_enabled(false).build()?;
                None
            }
        }
    };

    let frame_cycles = u64::from(CYCLES_PER_LINE) * LINES_PER_FRAME;
    let total_frames = args.seconds * 1000 / 20;
    log::info!("Running demo for {} frames ({} s)", total_frames, args.seconds);

    let mut cycle = 0u64;
    let mut last_frame_time = Instant::now();

    for frame in 0..total_frames {
        program_demo_frame(&mut pokey, frame, cycle);

        cycle += frame_cycles;
        pokey.sync(cycle);

        if let Some(host) = &audio {
            host.update_playing();
        }

        // Audio-driven pacing: wait for the ring to drain below its high
        // water mark, with a safety timeout so a stalled callback can never
        // wedge the main loop
        let throttle_start = Instant::now();
        let mut did_throttle = false;
        while pokey.should_throttle() {
            thread::sleep(Duration::from_millis(1));
            did_throttle = true;
            if throttle_start.elapsed() > Duration::from_millis(250) {
                log::warn!("Throttle timeout; is the audio callback stalled?");
                break;
            }
        }

        // Wall-clock fallback when audio back-pressure is unavailable
        // (audio disabled, device paused, or the ring still filling)
        if !did_throttle {
            let elapsed = last_frame_time.elapsed();
            if elapsed < Duration::from_millis(18) {
                thread::sleep(Duration::from_millis(18) - elapsed);
            }
        }
        last_frame_time = Instant::now();
    }

    if let Some(host) = audio {
        host.close();
    }

    log::info!("Demo finished after {cycle} emulated cycles");

    Ok(())
}
