//! Block resolver.
//!
//! Pairs every block opener with its `EndBlock` using LIFO matching: openers
//! push their index, closers pop and bind. Bindings are indices into the
//! step slice and are recomputed from scratch after every structural edit.

use core::fmt;

use heapless::Vec;

use crate::step::Step;
use crate::time::TimeInstant;

/// Unbalanced block structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockError {
    /// An `EndBlock` with no open block before it.
    UnmatchedEnd { index: usize },

    /// A block opener never closed. `index` is the innermost unclosed one.
    UnclosedBlock { index: usize },
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::UnmatchedEnd { index } => {
                write!(f, "end of block at step {} has no matching opener", index)
            }
            BlockError::UnclosedBlock { index } => {
                write!(f, "block opened at step {} is never closed", index)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BlockError {}

/// Binds every `EndBlock` in `steps` to its opener.
///
/// `N` bounds the nesting depth and must be at least `steps.len()`; a
/// program's capacity satisfies this. On error the bindings are left
/// partially updated, and the caller must not run the steps.
pub fn resolve<I: TimeInstant, const N: usize>(steps: &mut [Step<I>]) -> Result<(), BlockError> {
    let mut open: Vec<usize, N> = Vec::new();

    for (index, step) in steps.iter_mut().enumerate() {
        if step.is_block_opener() {
            // Depth never exceeds the step count, which is at most N.
            if open.push(index).is_err() {
                return Err(BlockError::UnclosedBlock { index });
            }
        } else if let Step::EndBlock { opener } = step {
            match open.pop() {
                Some(start) => *opener = Some(start),
                None => {
                    *opener = None;
                    return Err(BlockError::UnmatchedEnd { index });
                }
            }
        }
    }

    match open.pop() {
        Some(index) => Err(BlockError::UnclosedBlock { index }),
        None => Ok(()),
    }
}

/// Returns the index of the `EndBlock` bound to the opener at `opener`.
///
/// Only meaningful on a resolved slice.
pub fn closer_of<I: TimeInstant>(steps: &[Step<I>], opener: usize) -> Option<usize> {
    steps
        .iter()
        .enumerate()
        .skip(opener + 1)
        .find_map(|(index, step)| match step {
            Step::EndBlock { opener: Some(o) } if *o == opener => Some(index),
            _ => None,
        })
}
