pub mod api;
mod channel;
mod mixer;
mod num;
mod poly;
pub mod registers;
mod resampler;
pub mod ring;
mod scheduler;
pub mod timers;

pub use api::{AudioConfig, AudioError, Pokey, PokeyBuilder, PokeySaveState, PAL_CPU_HZ};
pub use channel::{CYCLES_PER_LINE, FAST_BASE_DIV};
