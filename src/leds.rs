//! Keyboard lock LED synchronization
//!
//! The lock LEDs cannot be set to a level; the only control is pressing a
//! lock key, and the only feedback is seeing press-down events on the input
//! stream. Belief about the physical state is therefore the parity of
//! observed toggles since start, seeded from one absolute read at init.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use crate::constants::bands;
use crate::error::{AppError, AppResult};

/// The three lock keys, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKey {
    NumLock,
    CapsLock,
    ScrollLock,
}

impl LockKey {
    pub const ALL: [LockKey; 3] = [LockKey::NumLock, LockKey::CapsLock, LockKey::ScrollLock];

    fn index(self) -> usize {
        match self {
            LockKey::NumLock => 0,
            LockKey::CapsLock => 1,
            LockKey::ScrollLock => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Press,
    Release,
}

/// One synthetic key event in a submission batch
pub type KeyEvent = (LockKey, Direction);

/// Believed physical lock states, shared between the listener thread
/// (flips) and the drive loop (reads). Toggles commute, so parity is all
/// that matters and no lock is needed.
pub struct BeliefState {
    bits: [AtomicU8; 3],
}

impl BeliefState {
    pub fn new() -> Self {
        Self {
            bits: [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)],
        }
    }

    /// One-time store of absolute states read from the hardware
    pub fn seed(&self, states: [bool; 3]) {
        for (bit, state) in self.bits.iter().zip(states) {
            bit.store(state as u8, Ordering::Relaxed);
        }
    }

    /// Record one observed press-down of `key`
    pub fn flip(&self, key: LockKey) {
        self.bits[key.index()].fetch_xor(1, Ordering::Relaxed);
    }

    pub fn is_toggled(&self, key: LockKey) -> bool {
        self.bits[key.index()].load(Ordering::Relaxed) != 0
    }

    pub fn snapshot(&self) -> [bool; 3] {
        LockKey::ALL.map(|key| self.is_toggled(key))
    }
}

impl Default for BeliefState {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream of lock-key press-down events.
///
/// Events observed here include our own synthetic presses; that feedback is
/// the only path by which belief advances. A missed event (another consumer
/// grabbing it first) desynchronizes belief until the next observed toggle.
pub trait ToggleSource: Send + 'static {
    /// Block until the next press-down; `None` once the source is exhausted
    fn next_press(&mut self) -> Option<LockKey>;
}

/// Hardware control for the lock keys.
pub trait LedController {
    /// One-shot absolute read of the three lock states, init only
    fn read_state(&mut self) -> AppResult<[bool; 3]>;

    /// Submit an ordered batch of synthetic key events; returns how many
    /// the hardware accepted
    fn submit(&mut self, events: &[KeyEvent]) -> AppResult<usize>;
}

/// Reconciles desired lock states against belief by pressing keys.
pub struct LedSync<C: LedController> {
    belief: Arc<BeliefState>,
    controller: C,
}

impl<C: LedController> LedSync<C> {
    /// Seed belief from the hardware and start the listener thread.
    ///
    /// The listener runs for the rest of the process and is never joined.
    /// Any failure here is fatal to the LED subsystem only; the caller is
    /// expected to carry on without it.
    pub fn start<S: ToggleSource>(mut controller: C, source: S) -> AppResult<Self> {
        let belief = Arc::new(BeliefState::new());
        belief.seed(controller.read_state()?);

        let listener_belief = Arc::clone(&belief);
        thread::spawn(move || listen(source, listener_belief));

        Ok(Self { belief, controller })
    }

    /// Press whichever lock keys are believed to differ from the desired
    /// states, as one batch of press+release pairs in `LockKey::ALL` order.
    ///
    /// Belief is not written here. It advances when the listener observes
    /// the synthetic press coming back, so if observation trails the next
    /// call by a tick, that call repeats the same correction.
    pub fn set_desired(&mut self, num_lock: bool, caps_lock: bool, scroll_lock: bool) -> AppResult<()> {
        let desired = [num_lock, caps_lock, scroll_lock];

        let mut events: Vec<KeyEvent> = Vec::with_capacity(6);
        for key in LockKey::ALL {
            if desired[key.index()] != self.belief.is_toggled(key) {
                events.push((key, Direction::Press));
                events.push((key, Direction::Release));
            }
        }

        if events.is_empty() {
            return Ok(());
        }

        let accepted = self.controller.submit(&events)?;
        if accepted == 0 {
            return Err(AppError::Led("input submission accepted no events".to_string()));
        }
        Ok(())
    }

    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }
}

fn listen<S: ToggleSource>(mut source: S, belief: Arc<BeliefState>) {
    while let Some(key) = source.next_press() {
        belief.flip(key);
    }
}

/// Desired lock states for a windowed loudness percentage: four contiguous
/// bands lighting zero, one, two or all three LEDs.
pub fn band_targets(percentage: u8) -> (bool, bool, bool) {
    if percentage < bands::ONE_LED {
        (false, false, false)
    } else if percentage < bands::TWO_LEDS {
        (true, false, false)
    } else if percentage < bands::THREE_LEDS {
        (true, true, false)
    } else {
        (true, true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Records submissions and immediately reflects presses into belief,
    /// standing in for a listener that observes synthetic events at once.
    struct FakeController {
        initial: [bool; 3],
        belief: Arc<BeliefState>,
        submissions: Arc<Mutex<Vec<Vec<KeyEvent>>>>,
        accept: bool,
    }

    impl LedController for FakeController {
        fn read_state(&mut self) -> AppResult<[bool; 3]> {
            Ok(self.initial)
        }

        fn submit(&mut self, events: &[KeyEvent]) -> AppResult<usize> {
            self.submissions.lock().unwrap().push(events.to_vec());
            if !self.accept {
                return Ok(0);
            }
            for &(key, direction) in events {
                if direction == Direction::Press {
                    self.belief.flip(key);
                }
            }
            Ok(events.len())
        }
    }

    /// Channel-backed toggle source; the listener parks until a press is sent.
    struct ChannelSource(mpsc::Receiver<LockKey>);

    impl ToggleSource for ChannelSource {
        fn next_press(&mut self) -> Option<LockKey> {
            self.0.recv().ok()
        }
    }

    fn sync_with(
        initial: [bool; 3],
        accept: bool,
    ) -> (LedSync<FakeController>, Arc<Mutex<Vec<Vec<KeyEvent>>>>, mpsc::Sender<LockKey>) {
        let submissions = Arc::new(Mutex::new(Vec::new()));
        let belief = Arc::new(BeliefState::new());
        let controller = FakeController {
            initial,
            belief: Arc::clone(&belief),
            submissions: Arc::clone(&submissions),
            accept,
        };
        let (sender, receiver) = mpsc::channel();
        let mut sync = LedSync::start(controller, ChannelSource(receiver)).unwrap();
        // Point the controller's feedback at the synchronizer's own belief
        sync.controller.belief = Arc::clone(&sync.belief);
        (sync, submissions, sender)
    }

    #[test]
    fn band_mapping_is_deterministic() {
        let cases = [
            (0, (false, false, false)),
            (24, (false, false, false)),
            (25, (true, false, false)),
            (49, (true, false, false)),
            (50, (true, true, false)),
            (74, (true, true, false)),
            (75, (true, true, true)),
            (100, (true, true, true)),
        ];
        for (pct, expected) in cases {
            assert_eq!(band_targets(pct), expected, "at {}%", pct);
        }
    }

    #[test]
    fn belief_tracks_toggle_parity() {
        let belief = BeliefState::new();
        belief.seed([true, false, false]);
        belief.flip(LockKey::NumLock);
        belief.flip(LockKey::CapsLock);
        belief.flip(LockKey::CapsLock);
        assert_eq!(belief.snapshot(), [false, false, false]);
    }

    #[test]
    fn matching_desired_state_issues_nothing() {
        let (mut sync, submissions, _sender) = sync_with([true, false, true], true);
        sync.set_desired(true, false, true).unwrap();
        assert!(submissions.lock().unwrap().is_empty());
    }

    #[test]
    fn correction_is_not_repeated_once_observed() {
        let (mut sync, submissions, _sender) = sync_with([false, false, false], true);

        sync.set_desired(true, false, false).unwrap();
        assert_eq!(
            submissions.lock().unwrap().as_slice(),
            [vec![
                (LockKey::NumLock, Direction::Press),
                (LockKey::NumLock, Direction::Release),
            ]]
        );
        assert_eq!(sync.belief().snapshot(), [true, false, false]);

        sync.set_desired(true, false, false).unwrap();
        assert_eq!(submissions.lock().unwrap().len(), 1);
    }

    #[test]
    fn differing_keys_are_batched_in_fixed_order() {
        let (mut sync, submissions, _sender) = sync_with([false, true, false], true);
        sync.set_desired(true, true, true).unwrap();
        assert_eq!(
            submissions.lock().unwrap().as_slice(),
            [vec![
                (LockKey::NumLock, Direction::Press),
                (LockKey::NumLock, Direction::Release),
                (LockKey::ScrollLock, Direction::Press),
                (LockKey::ScrollLock, Direction::Release),
            ]]
        );
    }

    #[test]
    fn rejected_submission_is_an_error_and_belief_is_unchanged() {
        let (mut sync, _submissions, _sender) = sync_with([false, false, false], false);
        assert!(sync.set_desired(true, false, false).is_err());
        assert_eq!(sync.belief().snapshot(), [false, false, false]);
        // Still needed, so the next call re-attempts the same correction
        assert!(sync.set_desired(true, false, false).is_err());
    }

    #[test]
    fn listener_flips_belief_on_observed_presses() {
        let (sync, _submissions, sender) = sync_with([false, false, false], true);
        sender.send(LockKey::CapsLock).unwrap();
        sender.send(LockKey::NumLock).unwrap();
        sender.send(LockKey::NumLock).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while sync.belief().snapshot() != [false, true, false] {
            assert!(Instant::now() < deadline, "listener never caught up");
            thread::sleep(Duration::from_millis(1));
        }
    }
}
