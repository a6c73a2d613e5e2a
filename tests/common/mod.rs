//! Shared test infrastructure for led-step-sequencer integration tests

#![allow(dead_code)] // Items used across multiple test files; Rust analyzes per-file

use core::cell::Cell;

use led_step_sequencer::{Host, LedSink, OrientationSensor, TimeDuration, TimeInstant, TimeSource};
use palette::Srgb;

// ============================================================================
// Mock Time Types
// ============================================================================

/// Mock duration type for testing (wraps milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestDuration(pub u64);

impl TimeDuration for TestDuration {
    fn as_millis(&self) -> u64 {
        self.0
    }

    fn from_millis(millis: u64) -> Self {
        TestDuration(millis)
    }
}

/// Mock instant type for testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestInstant(pub u64);

impl TimeInstant for TestInstant {
    type Duration = TestDuration;

    fn duration_since(&self, earlier: Self) -> Self::Duration {
        TestDuration(self.0 - earlier.0)
    }
}

// ============================================================================
// Mock LED ring
// ============================================================================

/// Mock LED ring that records staged writes and flushes
pub struct MockLed {
    staged: [Srgb; 12],
    shown: [Srgb; 12],
    writes: Vec<(usize, Srgb)>,
    flushes: usize,
}

impl MockLed {
    pub fn new() -> Self {
        Self {
            staged: [BLACK; 12],
            shown: [BLACK; 12],
            writes: Vec::new(),
            flushes: 0,
        }
    }

    /// Color currently visible on the LED at `index`
    pub fn shown(&self, index: usize) -> Srgb {
        self.shown[index]
    }

    pub fn writes(&self) -> &[(usize, Srgb)] {
        &self.writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl LedSink for MockLed {
    fn set(&mut self, index: usize, color: Srgb) {
        if index < self.staged.len() {
            self.staged[index] = color;
        }
        self.writes.push((index, color));
    }

    fn flush(&mut self) {
        self.shown = self.staged;
        self.flushes += 1;
    }
}

// ============================================================================
// Mock Time Source
// ============================================================================

/// Mock time source with controllable time advancement
pub struct MockTimeSource {
    current_time: Cell<TestInstant>,
}

impl MockTimeSource {
    pub fn new() -> Self {
        Self {
            current_time: Cell::new(TestInstant(0)),
        }
    }

    /// Advance time by the given number of milliseconds
    pub fn advance(&self, millis: u64) {
        let current = self.current_time.get();
        self.current_time.set(TestInstant(current.0 + millis));
    }
}

impl TimeSource<TestInstant> for MockTimeSource {
    fn now(&self) -> TestInstant {
        self.current_time.get()
    }
}

// ============================================================================
// Mock Sensor
// ============================================================================

/// Orientation sensor whose reading is set by the test
pub struct MockSensor {
    reading: Cell<Option<f32>>,
}

impl MockSensor {
    pub fn new() -> Self {
        Self {
            reading: Cell::new(None),
        }
    }

    pub fn set(&self, reading: Option<f32>) {
        self.reading.set(reading);
    }
}

impl OrientationSensor for MockSensor {
    fn primary_axis(&self) -> Option<f32> {
        self.reading.get()
    }
}

// ============================================================================
// Mock Host
// ============================================================================

/// Host that records lifecycle calls
#[derive(Debug, Default)]
pub struct MockHost {
    pub subscribed: bool,
    pub subscribe_calls: usize,
    pub unsubscribe_calls: usize,
    pub builtin_pattern: Option<bool>,
    pub minimised: usize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Host for MockHost {
    fn subscribe_inputs(&mut self) {
        self.subscribed = true;
        self.subscribe_calls += 1;
    }

    fn unsubscribe_inputs(&mut self) {
        self.subscribed = false;
        self.unsubscribe_calls += 1;
    }

    fn set_builtin_pattern(&mut self, enabled: bool) {
        self.builtin_pattern = Some(enabled);
    }

    fn minimise(&mut self) {
        self.minimised += 1;
    }
}

// ============================================================================
// Re-export color constants from library for test convenience
// ============================================================================

#[allow(unused_imports)]
pub use led_step_sequencer::{BLACK, BLUE, GREEN, RED, WHITE};

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Step period used by the default engine configuration
pub const PERIOD: u64 = 100;

/// Compare two colors with floating-point tolerance
pub fn colors_equal(a: Srgb, b: Srgb) -> bool {
    const EPSILON: f32 = 0.001;
    (a.red - b.red).abs() < EPSILON
        && (a.green - b.green).abs() < EPSILON
        && (a.blue - b.blue).abs() < EPSILON
}
