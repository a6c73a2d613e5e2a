use core::fmt;

use heapless::Vec;

use crate::blocks::{self, BlockError};
use crate::step::{Progress, Step, TriggerInputs};
use crate::time::TimeInstant;

/// Program validation and editing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramError {
    /// No steps provided.
    EmptyProgram,

    /// Program capacity exceeded.
    CapacityExceeded,

    /// Edit position is past the end of the program.
    IndexOutOfRange { index: usize, len: usize },

    /// Block structure is not balanced.
    Unbalanced(BlockError),

    /// The edit would remove the last remaining step.
    WouldEmptyProgram,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::EmptyProgram => write!(f, "program must have at least one step"),
            ProgramError::CapacityExceeded => write!(f, "program capacity exceeded"),
            ProgramError::IndexOutOfRange { index, len } => {
                write!(f, "step index {} out of range for program of {} steps", index, len)
            }
            ProgramError::Unbalanced(err) => write!(f, "unbalanced program: {}", err),
            ProgramError::WouldEmptyProgram => {
                write!(f, "cannot delete the last remaining step")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProgramError {}

impl From<BlockError> for ProgramError {
    fn from(err: BlockError) -> Self {
        ProgramError::Unbalanced(err)
    }
}

/// An ordered, block-balanced list of steps.
///
/// Every structural edit re-runs the block resolver over the whole program.
/// An edit that would leave the blocks unbalanced is undone and reported,
/// so a `Program` value is always resolved and never empty.
///
/// # Type Parameters
/// * `I` - The clock's instant type
/// * `N` - Maximum number of steps this program can hold
#[derive(Debug, Clone)]
pub struct Program<I: TimeInstant, const N: usize> {
    steps: Vec<Step<I>, N>,
}

impl<I: TimeInstant, const N: usize> Program<I, N> {
    /// Creates a new program builder.
    pub fn builder() -> ProgramBuilder<I, N> {
        ProgramBuilder::new()
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built program; provided for API completeness.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the maximum number of steps.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Returns a reference to the step at the given index.
    pub fn get(&self, index: usize) -> Option<&Step<I>> {
        self.steps.get(index)
    }

    /// Returns the steps in program order.
    pub fn steps(&self) -> &[Step<I>] {
        &self.steps
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step<I>> {
        self.steps.iter()
    }

    /// Index of the `EndBlock` closing the opener at `index`.
    pub fn closer_of(&self, index: usize) -> Option<usize> {
        if self.steps.get(index)?.is_block_opener() {
            blocks::closer_of(self.steps.as_slice(), index)
        } else {
            None
        }
    }

    /// Index of the opener closed by the `EndBlock` at `index`.
    pub fn opener_of(&self, index: usize) -> Option<usize> {
        match self.steps.get(index)? {
            Step::EndBlock { opener } => *opener,
            _ => None,
        }
    }

    /// Inserts `step` before `index` (`index == len` appends).
    ///
    /// # Errors
    /// * `IndexOutOfRange` - `index > len`
    /// * `CapacityExceeded` - Program is full
    /// * `Unbalanced` - The step is a lone opener or closer; nothing changes
    pub fn insert(&mut self, index: usize, step: Step<I>) -> Result<(), ProgramError> {
        self.check_insert(index, 1)?;
        self.insert_unchecked(index, step)?;
        self.resolve_or(|program| {
            program.steps.remove(index);
        })
    }

    /// Inserts a block opener at `index` immediately followed by its `EndBlock`.
    ///
    /// Non-opener steps are inserted on their own, as with [`Program::insert`].
    pub fn insert_block(&mut self, index: usize, opener: Step<I>) -> Result<(), ProgramError> {
        if !opener.is_block_opener() {
            return self.insert(index, opener);
        }
        self.check_insert(index, 2)?;
        self.insert_unchecked(index, opener)?;
        self.insert_unchecked(index + 1, Step::end_block())?;
        self.resolve_or(|program| {
            program.steps.remove(index + 1);
            program.steps.remove(index);
        })
    }

    /// Removes and returns the step at `index`.
    ///
    /// # Errors
    /// * `IndexOutOfRange` - No step at `index`
    /// * `WouldEmptyProgram` - It is the only step
    /// * `Unbalanced` - The step is a block marker; nothing changes
    pub fn remove(&mut self, index: usize) -> Result<Step<I>, ProgramError> {
        self.check_remove(index, 1)?;
        let removed = self.steps.remove(index);
        match blocks::resolve::<I, N>(self.steps.as_mut_slice()) {
            Ok(()) => Ok(removed),
            Err(err) => {
                self.insert_unchecked(index, removed)?;
                self.rebind();
                Err(err.into())
            }
        }
    }

    /// Removes the step at `index`, taking its block partner with it.
    ///
    /// For a block opener or `EndBlock` both markers go and the body stays
    /// in place. Returns the number of steps removed.
    pub fn remove_with_partner(&mut self, index: usize) -> Result<usize, ProgramError> {
        let partner = self.closer_of(index).or_else(|| self.opener_of(index));
        let Some(partner) = partner else {
            return self.remove(index).map(|_| 1);
        };

        self.check_remove(index, 2)?;
        let (first, second) = if partner < index {
            (partner, index)
        } else {
            (index, partner)
        };
        self.steps.remove(second);
        self.steps.remove(first);
        blocks::resolve::<I, N>(self.steps.as_mut_slice())?;
        Ok(2)
    }

    /// Resets every step to its pre-play state.
    pub fn reset(&mut self) {
        for step in self.steps.iter_mut() {
            step.reset();
        }
    }

    /// Latches every `WhenButtonPushed` step.
    pub fn latch_button(&mut self) {
        for step in self.steps.iter_mut() {
            step.latch_button();
        }
    }

    /// Progresses the step at `index`, routing `EndBlock` through its opener.
    ///
    /// # Panics
    /// Panics if `index` is out of range or an `EndBlock` is unresolved; both
    /// mean the program was corrupted.
    pub(crate) fn progress(&mut self, index: usize, now: I) -> Progress {
        assert!(
            index < self.steps.len(),
            "cursor {} out of range for program of {} steps",
            index,
            self.steps.len()
        );
        let closes = match &self.steps[index] {
            Step::EndBlock { opener } => Some(*opener),
            _ => None,
        };
        match closes {
            Some(Some(opener)) => self.steps[opener].progress_end(opener),
            Some(None) => panic!("end of block at step {} was never resolved", index),
            None => self.steps[index].progress(now),
        }
    }

    /// Polls every step in order and returns the first that triggered.
    ///
    /// Steps after the first hit are not polled this time round.
    pub(crate) fn poll_triggers(&mut self, inputs: &TriggerInputs) -> Option<usize> {
        self.steps
            .iter_mut()
            .position(|step| step.poll_for_trigger(inputs))
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> &mut Step<I> {
        assert!(
            index < self.steps.len(),
            "step {} out of range for program of {} steps",
            index,
            self.steps.len()
        );
        &mut self.steps[index]
    }

    /// Steps within `radius` of `center`, for rendering.
    pub fn window(&self, center: usize, radius: usize) -> StepWindow<'_, I> {
        let start = center.saturating_sub(radius).min(self.steps.len());
        let end = center
            .saturating_add(radius)
            .saturating_add(1)
            .min(self.steps.len())
            .max(start);
        StepWindow {
            steps: &self.steps[start..end],
            first: start,
            center,
        }
    }

    fn check_insert(&self, index: usize, count: usize) -> Result<(), ProgramError> {
        if index > self.steps.len() {
            return Err(ProgramError::IndexOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        if self.steps.len() + count > N {
            return Err(ProgramError::CapacityExceeded);
        }
        Ok(())
    }

    fn check_remove(&self, index: usize, count: usize) -> Result<(), ProgramError> {
        if index >= self.steps.len() {
            return Err(ProgramError::IndexOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        if self.steps.len() <= count {
            return Err(ProgramError::WouldEmptyProgram);
        }
        Ok(())
    }

    fn insert_unchecked(&mut self, index: usize, step: Step<I>) -> Result<(), ProgramError> {
        self.steps
            .insert(index, step)
            .map_err(|_| ProgramError::CapacityExceeded)
    }

    fn resolve_or(&mut self, undo: impl FnOnce(&mut Self)) -> Result<(), ProgramError> {
        match blocks::resolve::<I, N>(self.steps.as_mut_slice()) {
            Ok(()) => Ok(()),
            Err(err) => {
                undo(self);
                self.rebind();
                Err(err.into())
            }
        }
    }

    fn rebind(&mut self) {
        // The pre-edit program was balanced, so this cannot fail.
        let restored = blocks::resolve::<I, N>(self.steps.as_mut_slice());
        debug_assert!(restored.is_ok());
    }
}

/// A contiguous run of steps around a center index.
#[derive(Debug, Clone, Copy)]
pub struct StepWindow<'a, I: TimeInstant> {
    steps: &'a [Step<I>],
    first: usize,
    center: usize,
}

impl<'a, I: TimeInstant> StepWindow<'a, I> {
    /// Index the window was requested around.
    pub fn center(&self) -> usize {
        self.center
    }

    /// Program index of the first step in the window.
    pub fn first(&self) -> usize {
        self.first
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `(program index, step)` pairs in program order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a Step<I>)> + 'a {
        let first = self.first;
        self.steps
            .iter()
            .enumerate()
            .map(move |(offset, step)| (first + offset, step))
    }
}

/// Builder for constructing validated programs.
#[derive(Debug)]
pub struct ProgramBuilder<I: TimeInstant, const N: usize> {
    steps: Vec<Step<I>, N>,
}

impl<I: TimeInstant, const N: usize> ProgramBuilder<I, N> {
    /// Creates a new empty program builder.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step.
    ///
    /// # Errors
    /// Returns `CapacityExceeded` if the program is full.
    pub fn step(mut self, step: Step<I>) -> Result<Self, ProgramError> {
        self.steps
            .push(step)
            .map_err(|_| ProgramError::CapacityExceeded)?;
        Ok(self)
    }

    /// Builds the program and resolves its blocks.
    ///
    /// # Errors
    /// * `EmptyProgram` - No steps were added
    /// * `Unbalanced` - An opener or `EndBlock` has no partner
    pub fn build(mut self) -> Result<Program<I, N>, ProgramError> {
        if self.steps.is_empty() {
            return Err(ProgramError::EmptyProgram);
        }
        blocks::resolve::<I, N>(self.steps.as_mut_slice())?;
        Ok(Program { steps: self.steps })
    }
}

impl<I: TimeInstant, const N: usize> Default for ProgramBuilder<I, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::{BLACK, GREEN, WHITE};
    use crate::time::{Millis, WrappingMillis};

    type TestProgram = Program<WrappingMillis, 8>;
    type TestStep = Step<WrappingMillis>;

    fn flat() -> TestProgram {
        Program::builder()
            .step(TestStep::led_set_all(WHITE))
            .unwrap()
            .step(TestStep::pause(Millis(500)))
            .unwrap()
            .step(TestStep::led_set_all(BLACK))
            .unwrap()
            .build()
            .unwrap()
    }

    fn when_block() -> TestProgram {
        Program::builder()
            .step(TestStep::when_button_pushed())
            .unwrap()
            .step(TestStep::led_set_all(GREEN))
            .unwrap()
            .step(TestStep::end_block())
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_empty_program() {
        let result = TestProgram::builder().build();
        assert!(matches!(result, Err(ProgramError::EmptyProgram)));
    }

    #[test]
    fn builder_rejects_unbalanced_program() {
        let result = TestProgram::builder()
            .step(TestStep::repeat_forever())
            .unwrap()
            .build();
        assert!(matches!(
            result,
            Err(ProgramError::Unbalanced(BlockError::UnclosedBlock { index: 0 }))
        ));
    }

    #[test]
    fn builder_reports_capacity() {
        let result = Program::<WrappingMillis, 1>::builder()
            .step(TestStep::count_loops())
            .unwrap()
            .step(TestStep::count_loops());
        assert!(matches!(result, Err(ProgramError::CapacityExceeded)));
    }

    #[test]
    fn lone_opener_insert_is_rolled_back() {
        let mut program = flat();
        let result = program.insert(1, TestStep::when_button_pushed());
        assert!(matches!(result, Err(ProgramError::Unbalanced(_))));
        assert_eq!(program.len(), 3);
        assert_eq!(program.get(1).unwrap().kind(), crate::step::StepKind::Pause);
    }

    #[test]
    fn insert_block_adds_bound_pair() {
        let mut program = flat();
        program.insert_block(1, TestStep::repeat_forever()).unwrap();
        assert_eq!(program.len(), 5);
        assert_eq!(program.closer_of(1), Some(2));
        assert_eq!(program.opener_of(2), Some(1));
    }

    #[test]
    fn insert_rebinds_shifted_blocks() {
        let mut program = when_block();
        program.insert(0, TestStep::count_loops()).unwrap();
        assert_eq!(program.opener_of(3), Some(1));
    }

    #[test]
    fn removing_block_marker_alone_is_rejected() {
        let mut program = when_block();
        let result = program.remove(2);
        assert!(matches!(result, Err(ProgramError::Unbalanced(_))));
        assert_eq!(program.len(), 3);
        assert_eq!(program.opener_of(2), Some(0));
    }

    #[test]
    fn remove_with_partner_keeps_body() {
        let mut program = when_block();
        program.insert(3, TestStep::count_loops()).unwrap();
        assert_eq!(program.remove_with_partner(2).unwrap(), 2);
        assert_eq!(program.len(), 2);
        assert_eq!(program.get(0).unwrap().kind(), crate::step::StepKind::LedSet);
    }

    #[test]
    fn last_step_cannot_be_removed() {
        let mut program = TestProgram::builder()
            .step(TestStep::count_loops())
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(program.remove(0), Err(ProgramError::WouldEmptyProgram)));
        assert_eq!(program.len(), 1);

        let mut block_only = TestProgram::builder()
            .step(TestStep::repeat_forever())
            .unwrap()
            .step(TestStep::end_block())
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            block_only.remove_with_partner(0),
            Err(ProgramError::WouldEmptyProgram)
        ));
    }

    #[test]
    fn out_of_range_edits_are_reported() {
        let mut program = flat();
        assert!(matches!(
            program.insert(4, TestStep::count_loops()),
            Err(ProgramError::IndexOutOfRange { index: 4, len: 3 })
        ));
        assert!(matches!(
            program.remove(3),
            Err(ProgramError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn window_clips_to_program() {
        let program = flat();
        let window = program.window(0, 7);
        assert_eq!(window.first(), 0);
        assert_eq!(window.len(), 3);

        let window = program.window(2, 1);
        let indices: heapless::Vec<usize, 4> = window.iter().map(|(i, _)| i).collect();
        assert_eq!(&indices[..], &[1, 2]);
    }

    #[test]
    #[should_panic]
    fn progress_past_end_is_fatal() {
        let mut program = flat();
        program.progress(3, WrappingMillis(0));
    }
}
