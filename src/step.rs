//! Program steps and their lifecycle.
//!
//! A [`Step`] is one instruction of a sequencer program. The engine drives
//! every step through the same hooks:
//!
//! - [`Step::reset`] restores the pre-play state (timers, counters, latches).
//! - [`Step::enter`] runs once when the cursor lands on the step.
//! - [`Step::progress`] runs once per acting tick while the cursor sits on
//!   the step and decides where the cursor goes next.
//! - [`Step::poll_for_trigger`] runs every acting tick for every step,
//!   wherever the cursor is, and lets "when" blocks preempt linear flow.
//!
//! Block structure is carried by the tag: openers are recognised through
//! [`StepKind::is_block_opener`], and each [`Step::EndBlock`] holds the
//! index of its opener as bound by the block resolver.

use core::fmt;

use palette::Srgb;

use crate::colors::to_rgb8;
use crate::led::{LED_COUNT, LedMask, LedSink};
use crate::time::{TimeDuration, TimeInstant};

/// Primary-axis reading above which the device counts as upright (m/s^2).
pub const UPRIGHT_THRESHOLD: f32 = 6.0;

/// Primary-axis reading below which the device counts as lying down (m/s^2).
///
/// Readings between the two thresholds keep the previous state.
pub const DOWN_THRESHOLD: f32 = 3.0;

/// Where the cursor should go after a step has been progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Step finished; move to the next one.
    Advance,
    /// Stay on this step.
    Hold,
    /// Move to the given index and enter it.
    JumpTo(usize),
}

/// Hysteresis state of [`Step::WhenOrientationUpright`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Orientation {
    #[default]
    Unknown,
    Down,
    Up,
}

impl Orientation {
    /// Feeds one sensor reading through the hysteresis band.
    ///
    /// Returns the new state and whether this reading completed a
    /// down-to-up transition. `Unknown -> Up` is not an edge.
    pub fn update(self, reading: f32) -> (Orientation, bool) {
        let next = if reading > UPRIGHT_THRESHOLD {
            Orientation::Up
        } else if reading < DOWN_THRESHOLD {
            Orientation::Down
        } else {
            self
        };
        (next, self == Orientation::Down && next == Orientation::Up)
    }
}

/// Inputs sampled once per tick and shared by every trigger poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriggerInputs {
    /// Primary-axis accelerometer reading, `None` if no sensor is present.
    pub orientation: Option<f32>,
}

/// Variant tag of a [`Step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepKind {
    LedSet,
    Pause,
    CountLoops,
    WhenButtonPushed,
    WhenPlayStarts,
    WhenOrientationUpright,
    RepeatForever,
    EndBlock,
}

impl StepKind {
    /// True for steps that open a block closed by an [`Step::EndBlock`].
    pub const fn is_block_opener(&self) -> bool {
        matches!(
            self,
            StepKind::WhenButtonPushed
                | StepKind::WhenPlayStarts
                | StepKind::WhenOrientationUpright
                | StepKind::RepeatForever
        )
    }

}

/// One instruction of a sequencer program.
///
/// `I` is the clock's instant type; pauses are measured in its duration.
#[derive(Debug, Clone)]
pub enum Step<I: TimeInstant> {
    /// Sets every LED in `targets` to `color`, then flushes once.
    LedSet { targets: LedMask, color: Srgb },

    /// Holds the cursor until `duration` has been exceeded.
    Pause {
        duration: I::Duration,
        entered_at: Option<I>,
    },

    /// Counts how many times it has been entered since the last reset.
    CountLoops { count: u32 },

    /// Fires once per latched button press.
    WhenButtonPushed { fired: bool },

    /// Fires once after every reset.
    WhenPlayStarts { fired: bool },

    /// Fires on a down-to-up orientation edge.
    WhenOrientationUpright { state: Orientation },

    /// Loops its body forever.
    RepeatForever,

    /// Closes the block opened at `opener`. `None` until resolved.
    EndBlock { opener: Option<usize> },
}

impl<I: TimeInstant> Step<I> {
    /// Sets `targets` to `color`.
    pub fn led_set(targets: LedMask, color: Srgb) -> Self {
        Step::LedSet { targets, color }
    }

    /// Sets the whole ring to `color`.
    pub fn led_set_all(color: Srgb) -> Self {
        Step::led_set(LedMask::all(LED_COUNT), color)
    }

    pub fn pause(duration: I::Duration) -> Self {
        Step::Pause {
            duration,
            entered_at: None,
        }
    }

    pub fn count_loops() -> Self {
        Step::CountLoops { count: 0 }
    }

    pub fn when_button_pushed() -> Self {
        Step::WhenButtonPushed { fired: false }
    }

    pub fn when_play_starts() -> Self {
        Step::WhenPlayStarts { fired: false }
    }

    pub fn when_orientation_upright() -> Self {
        Step::WhenOrientationUpright {
            state: Orientation::Unknown,
        }
    }

    pub fn repeat_forever() -> Self {
        Step::RepeatForever
    }

    /// An unresolved block closer. The program binds it on insertion.
    pub fn end_block() -> Self {
        Step::EndBlock { opener: None }
    }

    /// Returns the variant tag.
    pub fn kind(&self) -> StepKind {
        match self {
            Step::LedSet { .. } => StepKind::LedSet,
            Step::Pause { .. } => StepKind::Pause,
            Step::CountLoops { .. } => StepKind::CountLoops,
            Step::WhenButtonPushed { .. } => StepKind::WhenButtonPushed,
            Step::WhenPlayStarts { .. } => StepKind::WhenPlayStarts,
            Step::WhenOrientationUpright { .. } => StepKind::WhenOrientationUpright,
            Step::RepeatForever => StepKind::RepeatForever,
            Step::EndBlock { .. } => StepKind::EndBlock,
        }
    }

    pub fn is_block_opener(&self) -> bool {
        self.kind().is_block_opener()
    }

    /// Restores the pre-play state.
    ///
    /// `WhenPlayStarts` latches here, so it fires exactly once per reset.
    pub fn reset(&mut self) {
        match self {
            Step::Pause { entered_at, .. } => *entered_at = None,
            Step::CountLoops { count } => *count = 0,
            Step::WhenButtonPushed { fired } => *fired = false,
            Step::WhenPlayStarts { fired } => *fired = true,
            Step::WhenOrientationUpright { state } => *state = Orientation::Unknown,
            Step::LedSet { .. } | Step::RepeatForever | Step::EndBlock { .. } => {}
        }
    }

    /// Runs the step's entry side effect.
    pub fn enter<L: LedSink>(&mut self, now: I, led: &mut L) {
        match self {
            Step::LedSet { targets, color } => {
                for index in targets.iter() {
                    led.set(index, *color);
                }
                led.flush();
            }
            Step::Pause { entered_at, .. } => *entered_at = Some(now),
            Step::CountLoops { count } => *count = count.saturating_add(1),
            Step::WhenButtonPushed { .. }
            | Step::WhenPlayStarts { .. }
            | Step::WhenOrientationUpright { .. }
            | Step::RepeatForever
            | Step::EndBlock { .. } => {}
        }
    }

    /// Decides where the cursor goes after this step.
    ///
    /// `EndBlock` answers `Hold` here; the program routes it through its
    /// opener's [`Step::progress_end`] instead.
    pub fn progress(&mut self, now: I) -> Progress {
        match self {
            Step::Pause {
                duration,
                entered_at,
            } => match *entered_at {
                Some(start) => {
                    if now.duration_since(start).as_millis() > duration.as_millis() {
                        *entered_at = None;
                        Progress::Advance
                    } else {
                        Progress::Hold
                    }
                }
                // Progressed without an entry: start timing now.
                None => {
                    *entered_at = Some(now);
                    Progress::Hold
                }
            },
            Step::RepeatForever => Progress::Advance,
            Step::WhenButtonPushed { .. }
            | Step::WhenPlayStarts { .. }
            | Step::WhenOrientationUpright { .. }
            | Step::EndBlock { .. } => Progress::Hold,
            Step::LedSet { .. } | Step::CountLoops { .. } => Progress::Advance,
        }
    }

    /// What this opener's closer does when the cursor reaches it.
    ///
    /// `opener_index` is this step's own position in the program.
    pub fn progress_end(&self, opener_index: usize) -> Progress {
        match self {
            Step::RepeatForever => Progress::JumpTo(opener_index + 1),
            _ => Progress::Hold,
        }
    }

    /// Checks and consumes this step's trigger latch.
    pub fn poll_for_trigger(&mut self, inputs: &TriggerInputs) -> bool {
        match self {
            Step::WhenButtonPushed { fired } | Step::WhenPlayStarts { fired } => {
                core::mem::replace(fired, false)
            }
            Step::WhenOrientationUpright { state } => match inputs.orientation {
                Some(reading) => {
                    let (next, edge) = state.update(reading);
                    *state = next;
                    edge
                }
                None => false,
            },
            Step::LedSet { .. }
            | Step::Pause { .. }
            | Step::CountLoops { .. }
            | Step::RepeatForever
            | Step::EndBlock { .. } => false,
        }
    }

    /// Latches a button press. No-op for anything but `WhenButtonPushed`.
    pub fn latch_button(&mut self) {
        if let Step::WhenButtonPushed { fired } = self {
            *fired = true;
        }
    }
}

/// Label for presentation layers.
impl<I: TimeInstant> fmt::Display for Step<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::LedSet { targets, color } => {
                let (r, g, b) = to_rgb8(*color);
                if *targets == LedMask::all(LED_COUNT) {
                    write!(f, "LEDs all = ({}, {}, {})", r, g, b)
                } else if let Some(index) = targets.as_single() {
                    write!(f, "LED {} = ({}, {}, {})", index, r, g, b)
                } else {
                    write!(f, "LEDs x{} = ({}, {}, {})", targets.len(), r, g, b)
                }
            }
            Step::Pause { duration, .. } => write!(f, "Pause {}ms", duration.as_millis()),
            Step::CountLoops { count } => write!(f, "Loops: {}", count),
            Step::WhenButtonPushed { .. } => write!(f, "When button pushed"),
            Step::WhenPlayStarts { .. } => write!(f, "When play starts"),
            Step::WhenOrientationUpright { .. } => write!(f, "When upright"),
            Step::RepeatForever => write!(f, "Repeat forever"),
            Step::EndBlock { .. } => write!(f, "End block"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::{GREEN, WHITE};
    use crate::time::{Millis, WrappingMillis};
    extern crate std;
    use std::string::ToString;
    use std::vec::Vec;

    type TestStep = Step<WrappingMillis>;

    struct RecordingLed {
        writes: Vec<(usize, Srgb)>,
        flushes: usize,
    }

    impl LedSink for RecordingLed {
        fn set(&mut self, index: usize, color: Srgb) {
            self.writes.push((index, color));
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[test]
    fn led_set_writes_targets_then_flushes_once() {
        let mut led = RecordingLed {
            writes: Vec::new(),
            flushes: 0,
        };
        let mut step = TestStep::led_set(LedMask::single(2).with(4), GREEN);
        step.enter(WrappingMillis(0), &mut led);
        assert_eq!(led.writes.len(), 2);
        assert_eq!(led.writes[0].0, 2);
        assert_eq!(led.writes[1].0, 4);
        assert_eq!(led.flushes, 1);
        assert_eq!(step.progress(WrappingMillis(0)), Progress::Advance);
    }

    #[test]
    fn pause_holds_until_duration_exceeded() {
        let mut led = RecordingLed {
            writes: Vec::new(),
            flushes: 0,
        };
        let mut step = TestStep::pause(Millis(500));
        step.enter(WrappingMillis(1000), &mut led);
        assert_eq!(step.progress(WrappingMillis(1200)), Progress::Hold);
        assert_eq!(step.progress(WrappingMillis(1500)), Progress::Hold);
        assert_eq!(step.progress(WrappingMillis(1501)), Progress::Advance);
        // Timer cleared: without a fresh entry it starts over.
        assert!(matches!(step, Step::Pause { entered_at: None, .. }));
        assert_eq!(step.progress(WrappingMillis(1600)), Progress::Hold);
    }

    #[test]
    fn count_loops_counts_entries_until_reset() {
        let mut led = RecordingLed {
            writes: Vec::new(),
            flushes: 0,
        };
        let mut step = TestStep::count_loops();
        step.enter(WrappingMillis(0), &mut led);
        step.enter(WrappingMillis(0), &mut led);
        assert!(matches!(step, Step::CountLoops { count: 2 }));
        step.reset();
        assert!(matches!(step, Step::CountLoops { count: 0 }));
    }

    #[test]
    fn button_latch_is_consumed_by_poll() {
        let inputs = TriggerInputs::default();
        let mut step = TestStep::when_button_pushed();
        assert!(!step.poll_for_trigger(&inputs));
        step.latch_button();
        assert!(step.poll_for_trigger(&inputs));
        assert!(!step.poll_for_trigger(&inputs));
    }

    #[test]
    fn play_starts_fires_once_per_reset() {
        let inputs = TriggerInputs::default();
        let mut step = TestStep::when_play_starts();
        assert!(!step.poll_for_trigger(&inputs));
        step.reset();
        assert!(step.poll_for_trigger(&inputs));
        assert!(!step.poll_for_trigger(&inputs));
        step.reset();
        assert!(step.poll_for_trigger(&inputs));
    }

    #[test]
    fn upright_fires_only_on_down_to_up_edge() {
        let mut step = TestStep::when_orientation_upright();
        let reading = |r: f32| TriggerInputs {
            orientation: Some(r),
        };

        // Unknown -> Up is not an edge.
        assert!(!step.poll_for_trigger(&reading(9.8)));
        assert!(!step.poll_for_trigger(&reading(0.0)));
        // Inside the hysteresis band: still down.
        assert!(!step.poll_for_trigger(&reading(4.5)));
        assert!(step.poll_for_trigger(&reading(9.8)));
        assert!(!step.poll_for_trigger(&reading(9.8)));
    }

    #[test]
    fn upright_without_sensor_never_fires() {
        let mut step = TestStep::when_orientation_upright();
        for _ in 0..4 {
            assert!(!step.poll_for_trigger(&TriggerInputs::default()));
        }
    }

    #[test]
    fn block_openers_hold_except_repeat_forever() {
        let now = WrappingMillis(0);
        assert_eq!(TestStep::when_button_pushed().progress(now), Progress::Hold);
        assert_eq!(TestStep::when_play_starts().progress(now), Progress::Hold);
        assert_eq!(TestStep::repeat_forever().progress(now), Progress::Advance);
        assert_eq!(TestStep::repeat_forever().progress_end(3), Progress::JumpTo(4));
        assert_eq!(TestStep::when_button_pushed().progress_end(3), Progress::Hold);
    }

    #[test]
    fn only_when_blocks_trigger_and_markers_have_no_entry_effect() {
        let inputs = TriggerInputs {
            orientation: Some(9.8),
        };
        let mut led = RecordingLed {
            writes: Vec::new(),
            flushes: 0,
        };
        let mut steps = [
            TestStep::led_set_all(WHITE),
            TestStep::pause(Millis(10)),
            TestStep::count_loops(),
            TestStep::repeat_forever(),
            TestStep::end_block(),
        ];
        for step in steps.iter_mut() {
            step.reset();
            step.latch_button();
            assert!(!step.poll_for_trigger(&inputs));
        }

        let mut markers = [
            TestStep::when_button_pushed(),
            TestStep::when_play_starts(),
            TestStep::when_orientation_upright(),
            TestStep::repeat_forever(),
            TestStep::end_block(),
        ];
        for step in markers.iter_mut() {
            step.enter(WrappingMillis(0), &mut led);
        }
        assert!(led.writes.is_empty());
        assert_eq!(led.flushes, 0);
    }

    #[test]
    fn kind_predicates() {
        assert!(StepKind::RepeatForever.is_block_opener());
        assert!(StepKind::WhenOrientationUpright.is_block_opener());
        assert!(!StepKind::EndBlock.is_block_opener());
        assert!(!StepKind::Pause.is_block_opener());
    }

    #[test]
    fn labels() {
        assert_eq!(TestStep::led_set_all(WHITE).to_string(), "LEDs all = (255, 255, 255)");
        assert_eq!(
            TestStep::led_set(LedMask::single(3), GREEN).to_string(),
            "LED 3 = (0, 255, 0)"
        );
        assert_eq!(TestStep::pause(Millis(250)).to_string(), "Pause 250ms");
        assert_eq!(TestStep::count_loops().to_string(), "Loops: 0");
        assert_eq!(TestStep::end_block().to_string(), "End block");
    }
}
