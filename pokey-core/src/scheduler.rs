//! Cycle-stamped scheduling of timer underflow IRQs.
//!
//! The three audio timers are the only recurring events the core schedules
//! for itself, so the schedule is a fixed slot per timer rather than a heap:
//! each slot holds the absolute CPU cycle of the next underflow, with
//! `u64::MAX` meaning disarmed.

use crate::timers::PokeyTimer;
use bincode::{Decode, Encode};

const DISARMED: u64 = u64::MAX;

#[derive(Debug, Clone, Encode, Decode)]
pub struct TimerScheduler {
    next_fire: [u64; 3],
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self { next_fire: [DISARMED; 3] }
    }

    pub fn arm(&mut self, timer: PokeyTimer, cycle: u64) {
        self.next_fire[slot(timer)] = cycle;
    }

    pub fn disarm(&mut self, timer: PokeyTimer) {
        self.next_fire[slot(timer)] = DISARMED;
    }

    pub fn disarm_all(&mut self) {
        self.next_fire = [DISARMED; 3];
    }

    pub fn next_fire(&self, timer: PokeyTimer) -> Option<u64> {
        let cycle = self.next_fire[slot(timer)];
        (cycle != DISARMED).then_some(cycle)
    }

    /// Pop the earliest event that is due at or before `cycle`, disarming
    /// its slot. Events are returned in fire order so IRQ status bits are
    /// raised in the order the hardware would raise them.
    pub fn pop_ready(&mut self, cycle: u64) -> Option<(PokeyTimer, u64)> {
        let (idx, &fire) = self
            .next_fire
            .iter()
            .enumerate()
            .min_by_key(|&(_, &fire)| fire)?;
        if fire == DISARMED || fire > cycle {
            return None;
        }

        self.next_fire[idx] = DISARMED;
        Some((PokeyTimer::ALL[idx], fire))
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn slot(timer: PokeyTimer) -> usize {
    match timer {
        PokeyTimer::Timer1 => 0,
        PokeyTimer::Timer2 => 1,
        PokeyTimer::Timer4 => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_fire_order() {
        let mut scheduler = TimerScheduler::new();
        scheduler.arm(PokeyTimer::Timer1, 300);
        scheduler.arm(PokeyTimer::Timer2, 100);
        scheduler.arm(PokeyTimer::Timer4, 200);

        assert_eq!(scheduler.pop_ready(1000), Some((PokeyTimer::Timer2, 100)));
        assert_eq!(scheduler.pop_ready(1000), Some((PokeyTimer::Timer4, 200)));
        assert_eq!(scheduler.pop_ready(1000), Some((PokeyTimer::Timer1, 300)));
        assert_eq!(scheduler.pop_ready(1000), None);
    }

    #[test]
    fn future_events_stay_armed() {
        let mut scheduler = TimerScheduler::new();
        scheduler.arm(PokeyTimer::Timer1, 500);
        assert_eq!(scheduler.pop_ready(499), None);
        assert_eq!(scheduler.next_fire(PokeyTimer::Timer1), Some(500));
        assert_eq!(scheduler.pop_ready(500), Some((PokeyTimer::Timer1, 500)));
    }

    #[test]
    fn random_fire_cycles_pop_sorted() {
        for _ in 0..100 {
            let mut scheduler = TimerScheduler::new();
            let cycles: [u64; 3] = std::array::from_fn(|_| rand::random::<u32>().into());
            for (&timer, &cycle) in PokeyTimer::ALL.iter().zip(&cycles) {
                scheduler.arm(timer, cycle);
            }

            let mut popped = Vec::new();
            while let Some((_, fire)) = scheduler.pop_ready(u64::from(u32::MAX)) {
                popped.push(fire);
            }

            let mut sorted = cycles.to_vec();
            sorted.sort_unstable();
            assert_eq!(popped, sorted);
        }
    }

    #[test]
    fn disarm_clears_slot() {
        let mut scheduler = TimerScheduler::new();
        scheduler.arm(PokeyTimer::Timer2, 10);
        scheduler.disarm(PokeyTimer::Timer2);
        assert_eq!(scheduler.pop_ready(u64::MAX - 1), None);
        assert_eq!(scheduler.next_fire(PokeyTimer::Timer2), None);
    }
}
