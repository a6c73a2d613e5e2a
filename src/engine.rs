//! Step execution engine.
//!
//! Provides [`Engine`], which owns a [`Program`] and the LED sink, keeps the
//! execution cursor, and advances it once per step period. Also defines the
//! [`OrientationSensor`] trait for the optional upright trigger.

use crate::led::LedSink;
use crate::program::{Program, StepWindow};
use crate::step::{Progress, TriggerInputs};
use crate::time::{TimeDuration, TimeInstant, TimeSource};

/// Default time between acting ticks, in milliseconds.
pub const DEFAULT_STEP_PERIOD_MS: u64 = 100;

/// Trait for abstracting an accelerometer-like orientation sensor.
pub trait OrientationSensor {
    /// Returns the primary-axis reading, or `None` if unavailable.
    fn primary_axis(&self) -> Option<f32>;
}

/// Engine configuration.
///
/// The ring size is fixed at [`crate::LED_COUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig<D: TimeDuration> {
    /// Minimum time between two acting ticks.
    pub step_period: D,
}

impl<D: TimeDuration> EngineConfig<D> {
    /// Sets the step period.
    pub fn step_period(mut self, period: D) -> Self {
        self.step_period = period;
        self
    }
}

impl<D: TimeDuration> Default for EngineConfig<D> {
    fn default() -> Self {
        Self {
            step_period: D::from_millis(DEFAULT_STEP_PERIOD_MS),
        }
    }
}

/// Position of the execution cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cursor {
    /// Playback (re)started; the next acting tick enters the first step.
    Ready,
    /// Sitting on the step at this index.
    At(usize),
    /// Ran off the end of the program after finishing step `last`.
    Idle { last: usize },
}

impl Cursor {
    /// The step index a UI should show for this cursor.
    ///
    /// `Idle` reports the last finished step, `Ready` the first one.
    pub fn snapshot(&self) -> usize {
        match *self {
            Cursor::Ready => 0,
            Cursor::At(index) => index,
            Cursor::Idle { last } => last,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Cursor::Idle { .. })
    }
}

/// Result of a [`Engine::tick`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// The step period has not elapsed since the last acting tick.
    Waiting,
    /// The engine advanced and scanned triggers.
    Stepped,
}

/// Runs a step program against an LED ring.
///
/// The engine is rate-limited by its own clock: [`Engine::tick`] may be
/// called as often as convenient (and from more than one call path), but it
/// only acts once `step_period` has elapsed since its last action.
///
/// Each acting tick runs two phases in a fixed order:
/// 1. **Advance** - the step under the cursor is progressed and the cursor
///    moves according to the [`Progress`] it returns.
/// 2. **Trigger scan** - every step is polled in program order; the first
///    trigger that fires moves the cursor to the step after it. At most one
///    trigger fires per tick.
///
/// # Type Parameters
/// * `'t` - Lifetime of the time source and sensor references
/// * `I` - Time instant type
/// * `L` - LED sink implementation type
/// * `T` - Time source implementation type
/// * `N` - Maximum number of steps in the program
pub struct Engine<'t, I: TimeInstant, L: LedSink, T: TimeSource<I>, const N: usize> {
    program: Program<I, N>,
    led: L,
    time_source: &'t T,
    orientation: Option<&'t dyn OrientationSensor>,
    config: EngineConfig<I::Duration>,
    cursor: Cursor,
    last_step_time: I,
}

impl<'t, I: TimeInstant, L: LedSink, T: TimeSource<I>, const N: usize> Engine<'t, I, L, T, N> {
    /// Creates an engine with the default configuration, ready to play.
    pub fn new(program: Program<I, N>, led: L, time_source: &'t T) -> Self {
        Self::with_config(program, led, time_source, EngineConfig::default())
    }

    /// Creates an engine with an explicit configuration, ready to play.
    pub fn with_config(
        mut program: Program<I, N>,
        led: L,
        time_source: &'t T,
        config: EngineConfig<I::Duration>,
    ) -> Self {
        program.reset();
        Self {
            program,
            led,
            time_source,
            orientation: None,
            config,
            cursor: Cursor::Ready,
            last_step_time: time_source.now(),
        }
    }

    /// Attaches the sensor polled by upright triggers.
    ///
    /// Without one, those triggers never fire.
    pub fn with_orientation_sensor(mut self, sensor: &'t dyn OrientationSensor) -> Self {
        self.orientation = Some(sensor);
        self
    }

    /// Resets every step and rewinds the cursor for a fresh play.
    ///
    /// The first step is entered on the first tick a full period from now.
    pub fn restart(&mut self) {
        self.program.reset();
        self.cursor = Cursor::Ready;
        self.last_step_time = self.time_source.now();
        debug!("playback restarted");
    }

    /// Resets every step, keeping the cursor for display.
    pub fn stop(&mut self) {
        self.program.reset();
        debug!("playback stopped");
    }

    /// Runs one scheduling period if it is due.
    ///
    /// # Panics
    /// Panics if the cursor leaves the program, which means the program
    /// structure was corrupted.
    pub fn tick(&mut self) -> Tick {
        let now = self.time_source.now();
        let elapsed = now.duration_since(self.last_step_time);
        if elapsed.as_millis() < self.config.step_period.as_millis() {
            return Tick::Waiting;
        }
        self.last_step_time = now;

        self.advance(now);
        self.scan_triggers(now);
        Tick::Stepped
    }

    fn advance(&mut self, now: I) {
        match self.cursor {
            Cursor::Idle { .. } => {}
            Cursor::Ready => self.enter(0, now),
            Cursor::At(index) => match self.program.progress(index, now) {
                Progress::Advance => {
                    if index + 1 < self.program.len() {
                        self.enter(index + 1, now);
                    } else {
                        self.cursor = Cursor::Idle { last: index };
                        info!("program finished at step {}", index);
                    }
                }
                Progress::Hold => {}
                Progress::JumpTo(target) => {
                    trace!("jump {} -> {}", index, target);
                    self.enter(target, now);
                }
            },
        }
    }

    fn scan_triggers(&mut self, now: I) {
        let inputs = TriggerInputs {
            orientation: self.orientation.and_then(|sensor| sensor.primary_axis()),
        };
        let Some(index) = self.program.poll_triggers(&inputs) else {
            return;
        };
        if index + 1 < self.program.len() {
            debug!("trigger at step {}", index);
            self.enter(index + 1, now);
        } else {
            debug!("trigger at step {} has no step after it", index);
        }
    }

    fn enter(&mut self, index: usize, now: I) {
        assert!(
            index < self.program.len(),
            "cursor {} out of range for program of {} steps",
            index,
            self.program.len()
        );
        self.cursor = Cursor::At(index);
        self.program.step_mut(index).enter(now, &mut self.led);
    }

    /// Latches every "when button pushed" trigger.
    ///
    /// The jump happens on the next acting tick.
    pub fn notify_button_pushed(&mut self) {
        self.program.latch_button();
    }

    /// Applies a structural edit to the program.
    ///
    /// Indices may shift, so the cursor rewinds to [`Cursor::Ready`].
    pub fn edit_program<R>(&mut self, edit: impl FnOnce(&mut Program<I, N>) -> R) -> R {
        let result = edit(&mut self.program);
        self.cursor = Cursor::Ready;
        result
    }

    /// Returns the current cursor.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Last finished step when the program has run off its end.
    pub fn last_position(&self) -> Option<usize> {
        match self.cursor {
            Cursor::Idle { last } => Some(last),
            _ => None,
        }
    }

    /// Steps within `radius` of the cursor, for rendering.
    pub fn window(&self, radius: usize) -> StepWindow<'_, I> {
        self.program.window(self.cursor.snapshot(), radius)
    }

    pub fn program(&self) -> &Program<I, N> {
        &self.program
    }

    pub fn config(&self) -> &EngineConfig<I::Duration> {
        &self.config
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    pub fn led_mut(&mut self) -> &mut L {
        &mut self.led
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::{BLUE, RED};
    use crate::step::Step;
    use crate::time::{Millis, WrappingMillis};
    use core::cell::Cell;
    use palette::Srgb;

    struct Clock(Cell<u32>);

    impl Clock {
        fn advance(&self, ms: u32) {
            self.0.set(self.0.get().wrapping_add(ms));
        }
    }

    impl TimeSource<WrappingMillis> for Clock {
        fn now(&self) -> WrappingMillis {
            WrappingMillis(self.0.get())
        }
    }

    struct CountingLed {
        flushes: usize,
    }

    impl LedSink for CountingLed {
        fn set(&mut self, _index: usize, _color: Srgb) {}

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    type TestStep = Step<WrappingMillis>;

    #[test]
    fn tick_is_rate_limited() {
        let clock = Clock(Cell::new(0));
        let program = Program::<WrappingMillis, 4>::builder()
            .step(TestStep::led_set_all(RED))
            .unwrap()
            .build()
            .unwrap();
        let mut engine = Engine::new(program, CountingLed { flushes: 0 }, &clock);

        assert_eq!(engine.tick(), Tick::Waiting);
        clock.advance(99);
        assert_eq!(engine.tick(), Tick::Waiting);
        clock.advance(1);
        assert_eq!(engine.tick(), Tick::Stepped);
        // Same instant again from a second call path: no double step.
        assert_eq!(engine.tick(), Tick::Waiting);
        assert_eq!(engine.led().flushes, 1);
    }

    #[test]
    fn clock_rollover_does_not_stall() {
        let clock = Clock(Cell::new(u32::MAX - 20));
        let program = Program::<WrappingMillis, 4>::builder()
            .step(TestStep::led_set_all(RED))
            .unwrap()
            .step(TestStep::led_set_all(BLUE))
            .unwrap()
            .build()
            .unwrap();
        let mut engine = Engine::new(program, CountingLed { flushes: 0 }, &clock);

        clock.advance(100);
        assert_eq!(engine.tick(), Tick::Stepped);
        assert_eq!(engine.cursor(), Cursor::At(0));
    }

    #[test]
    fn play_start_trigger_preempts_on_first_tick() {
        let clock = Clock(Cell::new(0));
        let program = Program::<WrappingMillis, 4>::builder()
            .step(TestStep::pause(Millis(10_000)))
            .unwrap()
            .step(TestStep::when_play_starts())
            .unwrap()
            .step(TestStep::end_block())
            .unwrap()
            .build()
            .unwrap();
        let mut engine = Engine::new(program, CountingLed { flushes: 0 }, &clock);

        clock.advance(100);
        engine.tick();
        // Play-start trigger fired on the first tick and entered the EndBlock.
        assert_eq!(engine.cursor(), Cursor::At(2));
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = EngineConfig::<Millis>::default().step_period(Millis(333));
        assert_eq!(config.step_period, Millis(333));
        assert_eq!(
            EngineConfig::<Millis>::default().step_period,
            Millis(DEFAULT_STEP_PERIOD_MS as u32)
        );
    }
}
