#![cfg_attr(not(feature = "std"), no_std)]
#![doc = include_str!("../README.md")]

//! # Core Concepts
//!
//! - **`Step`**: One program instruction (LED set, pause, loop counter, "when" block, repeat, end of block)
//! - **`Program`**: An ordered, always block-balanced list of steps, edited in place
//! - **`blocks::resolve`**: Pairs every block opener with its `EndBlock` by index
//! - **`Engine`**: Owns the program and LED sink, advances the cursor once per step period
//! - **`Progress`**: What a step asks of the cursor (`Advance`, `Hold`, `JumpTo(index)`)
//! - **`SequencerApp`**: The Play / Edit / Menu / Insert-step state machine driven by buttons
//! - **`LedSink`**: Trait to implement for your LED ring
//! - **`TimeSource`**: Trait to implement for your timing system
//! - **`Host`**: Trait to implement for your runtime (input subscription, foreground)
//!
//! The library uses `Srgb<f32>` (0.0-1.0 range) for all colors. When implementing
//! `LedSink` for your hardware, convert these values to your device's native format.

// Re-export Srgb from palette for user convenience
pub use palette::Srgb;

#[macro_use]
mod fmt;

pub mod app;
pub mod blocks;
pub mod colors;
pub mod engine;
pub mod led;
pub mod program;
pub mod step;
pub mod time;

pub use app::{Host, Input, InputSubscription, Mode, ModeKind, SequencerApp};
pub use blocks::BlockError;
pub use colors::{BLACK, BLUE, CYAN, GREEN, MAGENTA, RED, WHITE, YELLOW};
pub use engine::{Cursor, Engine, EngineConfig, OrientationSensor, Tick};
pub use led::{LED_COUNT, LedMask, LedSink};
pub use program::{Program, ProgramBuilder, ProgramError, StepWindow};
pub use step::{Progress, Step, StepKind};
pub use time::{Millis, TimeDuration, TimeInstant, TimeSource, WrappingMillis};
