//! Button-driven mode state machine.
//!
//! [`SequencerApp`] wraps an [`Engine`] and routes discrete button events
//! according to the active [`Mode`]:
//!
//! ```text
//!  Play --cancel--> Edit --cancel--> (suspended, host minimised)
//!                    |  ^
//!            confirm |  | cancel / delete / insert done
//!                    v  |
//!                    Menu --"insert step"--> InsertStep
//!                    |
//!                    +--"play" / "play in background"--> Play
//! ```
//!
//! Mode delegates (the menu and the insert wizard) live inside the [`Mode`]
//! value, so replacing the mode drops them. The host input subscription is an
//! [`InputSubscription`] token that is only released by handing it back to
//! the host, which happens on suspend and on drop.

use palette::Srgb;

use crate::colors::PALETTE;
use crate::engine::{Engine, Tick};
use crate::led::{LED_COUNT, LedMask, LedSink};
use crate::program::StepWindow;
use crate::step::Step;
use crate::time::{TimeDuration, TimeInstant, TimeSource};

/// Pause lengths offered by the insert wizard, in milliseconds.
pub const PAUSE_CHOICES_MS: [u64; 6] = [100, 250, 500, 1000, 2000, 5000];

/// Discrete button events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input {
    Up,
    Down,
    Confirm,
    Cancel,
    /// Any other button; ignored.
    Other,
}

/// Services the app needs from its host runtime.
pub trait Host {
    /// Starts delivering button events to the app.
    fn subscribe_inputs(&mut self);

    /// Stops delivering button events. Must take effect before returning.
    fn unsubscribe_inputs(&mut self);

    /// Enables or disables the host's own LED pattern.
    fn set_builtin_pattern(&mut self, enabled: bool);

    /// Yields the foreground.
    fn minimise(&mut self);
}

impl<H: Host + ?Sized> Host for &mut H {
    fn subscribe_inputs(&mut self) {
        H::subscribe_inputs(self)
    }

    fn unsubscribe_inputs(&mut self) {
        H::unsubscribe_inputs(self)
    }

    fn set_builtin_pattern(&mut self, enabled: bool) {
        H::set_builtin_pattern(self, enabled)
    }

    fn minimise(&mut self) {
        H::minimise(self)
    }
}

/// Proof that the host is delivering inputs to the app.
///
/// Only [`InputSubscription::acquire`] creates one and only
/// [`InputSubscription::release`] disposes of it.
#[must_use = "dropping the token leaves the host subscription dangling"]
#[derive(Debug)]
pub struct InputSubscription {
    _private: (),
}

impl InputSubscription {
    /// Subscribes to host inputs.
    pub fn acquire<H: Host>(host: &mut H) -> Self {
        host.subscribe_inputs();
        Self { _private: () }
    }

    /// Unsubscribes from host inputs.
    pub fn release<H: Host>(self, host: &mut H) {
        host.unsubscribe_inputs();
    }
}

/// A clamped selection over `len` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chooser {
    index: usize,
    len: usize,
}

impl Chooser {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    /// Starts at `index`, clamped into range.
    pub fn at(index: usize, len: usize) -> Self {
        Self {
            index: index.min(len.saturating_sub(1)),
            len,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves towards the first option. No-op at the top.
    pub fn up(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Moves towards the last option. No-op at the bottom.
    pub fn down(&mut self) {
        if self.index + 1 < self.len {
            self.index += 1;
        }
    }

    fn navigate(&mut self, input: Input) {
        match input {
            Input::Up => self.up(),
            Input::Down => self.down(),
            _ => {}
        }
    }
}

/// Entries of the edit menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MenuItem {
    InsertStep,
    DeleteStep,
    Play,
    PlayInBackground,
}

impl MenuItem {
    pub const ALL: [MenuItem; 4] = [
        MenuItem::InsertStep,
        MenuItem::DeleteStep,
        MenuItem::Play,
        MenuItem::PlayInBackground,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::InsertStep => "Insert step",
            MenuItem::DeleteStep => "Delete step",
            MenuItem::Play => "Play",
            MenuItem::PlayInBackground => "Play in background",
        }
    }
}

/// The edit menu delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Menu {
    chooser: Chooser,
}

impl Menu {
    pub fn new() -> Self {
        Self {
            chooser: Chooser::new(MenuItem::ALL.len()),
        }
    }

    /// The highlighted entry.
    pub fn selected(&self) -> MenuItem {
        MenuItem::ALL[self.chooser.index()]
    }

    pub fn chooser(&self) -> &Chooser {
        &self.chooser
    }
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

/// Step kinds offered by the insert wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InsertKind {
    LedSet,
    Pause,
    CountLoops,
    WhenButtonPushed,
    WhenPlayStarts,
    WhenUpright,
    RepeatForever,
}

impl InsertKind {
    pub const ALL: [InsertKind; 7] = [
        InsertKind::LedSet,
        InsertKind::Pause,
        InsertKind::CountLoops,
        InsertKind::WhenButtonPushed,
        InsertKind::WhenPlayStarts,
        InsertKind::WhenUpright,
        InsertKind::RepeatForever,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            InsertKind::LedSet => "Set LEDs",
            InsertKind::Pause => "Pause",
            InsertKind::CountLoops => "Count loops",
            InsertKind::WhenButtonPushed => "When button pushed",
            InsertKind::WhenPlayStarts => "When play starts",
            InsertKind::WhenUpright => "When upright",
            InsertKind::RepeatForever => "Repeat forever",
        }
    }
}

/// Where the insert wizard is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WizardStage {
    /// Choosing a step kind from [`InsertKind::ALL`].
    Kind,
    /// Choosing an LED color from [`PALETTE`].
    Color,
    /// Choosing targets: option 0 is the whole ring, option `k` is LED `k - 1`.
    Target { color: Srgb },
    /// Choosing a pause length from [`PAUSE_CHOICES_MS`].
    Duration,
}

/// What the wizard wants after an input.
#[derive(Debug, Clone)]
pub enum WizardOutcome<I: TimeInstant> {
    /// Still choosing.
    Pending,
    /// Abandoned from the first stage.
    Cancelled,
    /// Finished; insert this step.
    Insert(Step<I>),
}

/// The insert-step delegate: a nested chooser producing one new step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertWizard {
    stage: WizardStage,
    chooser: Chooser,
}

impl InsertWizard {
    pub fn new() -> Self {
        Self {
            stage: WizardStage::Kind,
            chooser: Chooser::new(InsertKind::ALL.len()),
        }
    }

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn chooser(&self) -> &Chooser {
        &self.chooser
    }

    /// Handles one input.
    pub fn handle<I: TimeInstant>(&mut self, input: Input) -> WizardOutcome<I> {
        match input {
            Input::Up | Input::Down => {
                self.chooser.navigate(input);
                WizardOutcome::Pending
            }
            Input::Confirm => self.confirm(),
            Input::Cancel => self.back(),
            Input::Other => WizardOutcome::Pending,
        }
    }

    fn confirm<I: TimeInstant>(&mut self) -> WizardOutcome<I> {
        let choice = self.chooser.index();
        match self.stage {
            WizardStage::Kind => match InsertKind::ALL[choice] {
                InsertKind::LedSet => {
                    self.goto(WizardStage::Color, Chooser::new(PALETTE.len()));
                    WizardOutcome::Pending
                }
                InsertKind::Pause => {
                    self.goto(WizardStage::Duration, Chooser::new(PAUSE_CHOICES_MS.len()));
                    WizardOutcome::Pending
                }
                InsertKind::CountLoops => WizardOutcome::Insert(Step::count_loops()),
                InsertKind::WhenButtonPushed => WizardOutcome::Insert(Step::when_button_pushed()),
                InsertKind::WhenPlayStarts => WizardOutcome::Insert(Step::when_play_starts()),
                InsertKind::WhenUpright => {
                    WizardOutcome::Insert(Step::when_orientation_upright())
                }
                InsertKind::RepeatForever => WizardOutcome::Insert(Step::repeat_forever()),
            },
            WizardStage::Color => {
                let (_, color) = PALETTE[choice];
                self.goto(WizardStage::Target { color }, Chooser::new(LED_COUNT + 1));
                WizardOutcome::Pending
            }
            WizardStage::Target { color } => {
                let targets = match choice {
                    0 => LedMask::all(LED_COUNT),
                    led => LedMask::single(led - 1),
                };
                WizardOutcome::Insert(Step::led_set(targets, color))
            }
            WizardStage::Duration => {
                let millis = PAUSE_CHOICES_MS[choice];
                WizardOutcome::Insert(Step::pause(I::Duration::from_millis(millis)))
            }
        }
    }

    fn back<I: TimeInstant>(&mut self) -> WizardOutcome<I> {
        let kinds = InsertKind::ALL.len();
        match self.stage {
            WizardStage::Kind => return WizardOutcome::Cancelled,
            WizardStage::Color => self.goto(WizardStage::Kind, Chooser::at(0, kinds)),
            WizardStage::Duration => self.goto(WizardStage::Kind, Chooser::at(1, kinds)),
            WizardStage::Target { color } => {
                let index = PALETTE.iter().position(|(_, c)| *c == color).unwrap_or(0);
                self.goto(WizardStage::Color, Chooser::at(index, PALETTE.len()));
            }
        }
        WizardOutcome::Pending
    }

    fn goto(&mut self, stage: WizardStage, chooser: Chooser) {
        self.stage = stage;
        self.chooser = chooser;
    }
}

impl Default for InsertWizard {
    fn default() -> Self {
        Self::new()
    }
}

/// The active mode and its delegate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Play,
    Edit,
    Menu(Menu),
    InsertStep(InsertWizard),
}

/// Variant tag of a [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeKind {
    Play,
    Edit,
    Menu,
    InsertStep,
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Play => ModeKind::Play,
            Mode::Edit => ModeKind::Edit,
            Mode::Menu(_) => ModeKind::Menu,
            Mode::InsertStep(_) => ModeKind::InsertStep,
        }
    }
}

/// A step sequencer with an in-place, button-driven program editor.
///
/// The host calls [`SequencerApp::update`] every frame while the app is in
/// the foreground, [`SequencerApp::background_update`] while it is not, and
/// [`SequencerApp::handle_input`] for every button press it delivers.
///
/// # Type Parameters
/// * `'t` - Lifetime of the engine's time source reference
/// * `I` - Time instant type
/// * `L` - LED sink implementation type
/// * `T` - Time source implementation type
/// * `H` - Host runtime implementation type
/// * `N` - Maximum number of steps in the program
pub struct SequencerApp<'t, I, L, T, H, const N: usize>
where
    I: TimeInstant,
    L: LedSink,
    T: TimeSource<I>,
    H: Host,
{
    engine: Engine<'t, I, L, T, N>,
    host: H,
    inputs: Option<InputSubscription>,
    mode: Mode,
    selection: usize,
    background_play: bool,
}

impl<'t, I, L, T, H, const N: usize> SequencerApp<'t, I, L, T, H, N>
where
    I: TimeInstant,
    L: LedSink,
    T: TimeSource<I>,
    H: Host,
{
    /// Creates the app in `Play` mode with playback rewound.
    ///
    /// Inputs are subscribed on the first [`SequencerApp::update`].
    pub fn new(mut engine: Engine<'t, I, L, T, N>, host: H) -> Self {
        engine.restart();
        Self {
            engine,
            host,
            inputs: None,
            mode: Mode::Play,
            selection: 0,
            background_play: false,
        }
    }

    /// Foreground frame: (re)subscribes inputs if needed, then ticks if playing.
    pub fn update(&mut self) -> Tick {
        if self.inputs.is_none() {
            self.regain_foreground();
        }
        self.tick_if_playing()
    }

    /// Background frame: ticks only when playing in background.
    ///
    /// Safe to call in the same period as [`SequencerApp::update`].
    pub fn background_update(&mut self) -> Tick {
        if self.inputs.is_none() && !self.background_play {
            return Tick::Waiting;
        }
        self.tick_if_playing()
    }

    /// Routes one button press to the active mode.
    ///
    /// Events arriving while suspended are dropped.
    pub fn handle_input(&mut self, input: Input) {
        if self.inputs.is_none() {
            trace!("input {} while suspended", input);
            return;
        }

        match &mut self.mode {
            Mode::Play => self.handle_play(input),
            Mode::Edit => self.handle_edit(input),
            Mode::Menu(menu) => match input {
                Input::Up | Input::Down => menu.chooser.navigate(input),
                Input::Confirm => {
                    let item = menu.selected();
                    self.select_menu_item(item);
                }
                Input::Cancel => self.set_mode(Mode::Edit),
                Input::Other => {}
            },
            Mode::InsertStep(wizard) => {
                match wizard.handle::<I>(input) {
                    WizardOutcome::Pending => {}
                    WizardOutcome::Cancelled => self.set_mode(Mode::Edit),
                    WizardOutcome::Insert(step) => self.insert_step(step),
                }
            }
        }
    }

    fn handle_play(&mut self, input: Input) {
        match input {
            Input::Cancel => {
                let last = self.engine.cursor().snapshot();
                self.selection = last.min(self.engine.program().len().saturating_sub(1));
                self.engine.stop();
                self.set_mode(Mode::Edit);
            }
            Input::Up | Input::Down | Input::Confirm => self.engine.notify_button_pushed(),
            Input::Other => {}
        }
    }

    fn handle_edit(&mut self, input: Input) {
        let mut chooser = Chooser::at(self.selection, self.engine.program().len());
        match input {
            Input::Up | Input::Down => {
                chooser.navigate(input);
                self.selection = chooser.index();
            }
            Input::Confirm => self.set_mode(Mode::Menu(Menu::new())),
            Input::Cancel => self.suspend(false),
            Input::Other => {}
        }
    }

    fn select_menu_item(&mut self, item: MenuItem) {
        debug!("menu: {}", item);
        match item {
            MenuItem::InsertStep => self.set_mode(Mode::InsertStep(InsertWizard::new())),
            MenuItem::DeleteStep => {
                self.delete_selected();
                self.set_mode(Mode::Edit);
            }
            MenuItem::Play => {
                self.engine.restart();
                self.set_mode(Mode::Play);
            }
            MenuItem::PlayInBackground => {
                self.engine.restart();
                self.set_mode(Mode::Play);
                self.suspend(true);
            }
        }
    }

    fn delete_selected(&mut self) {
        let index = self.selection;
        match self.engine.edit_program(|program| program.remove_with_partner(index)) {
            Ok(removed) => {
                info!("deleted {} step(s) at {}", removed, index);
                let len = self.engine.program().len();
                if self.selection >= len {
                    self.selection = len.saturating_sub(1);
                }
            }
            Err(err) => warn!("delete at {} rejected: {}", index, err),
        }
    }

    fn insert_step(&mut self, step: Step<I>) {
        let index = self.selection;
        match self.engine.edit_program(|program| program.insert_block(index, step)) {
            Ok(()) => {
                info!("inserted step at {}", index);
                self.selection = index + 1;
            }
            Err(err) => warn!("insert at {} rejected: {}", index, err),
        }
        self.set_mode(Mode::Edit);
    }

    fn tick_if_playing(&mut self) -> Tick {
        match self.mode {
            Mode::Play => self.engine.tick(),
            _ => Tick::Waiting,
        }
    }

    fn set_mode(&mut self, next: Mode) {
        let previous = core::mem::replace(&mut self.mode, next);
        debug!("mode {} -> {}", previous.kind(), self.mode.kind());
    }

    fn regain_foreground(&mut self) {
        self.inputs = Some(InputSubscription::acquire(&mut self.host));
        self.host.set_builtin_pattern(false);
        self.background_play = false;
        info!("foreground");
    }

    /// Releases inputs and yields the foreground.
    ///
    /// With `background_play` the app keeps driving the LEDs from
    /// [`SequencerApp::background_update`]; otherwise the host pattern
    /// takes over again.
    fn suspend(&mut self, background_play: bool) {
        if let Some(inputs) = self.inputs.take() {
            inputs.release(&mut self.host);
        }
        self.background_play = background_play;
        self.host.set_builtin_pattern(!background_play);
        self.host.minimise();
        info!("suspended (background play: {})", background_play);
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    /// Edit-mode selection index.
    pub fn selection(&self) -> usize {
        self.selection
    }

    /// True while the host is delivering inputs to the app.
    pub fn is_foreground(&self) -> bool {
        self.inputs.is_some()
    }

    pub fn is_playing_in_background(&self) -> bool {
        self.inputs.is_none() && self.background_play
    }

    /// Steps around the cursor while playing, around the selection otherwise.
    pub fn window(&self, radius: usize) -> StepWindow<'_, I> {
        match self.mode {
            Mode::Play => self.engine.window(radius),
            _ => self.engine.program().window(self.selection, radius),
        }
    }

    pub fn engine(&self) -> &Engine<'t, I, L, T, N> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<'t, I, L, T, N> {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<I, L, T, H, const N: usize> Drop for SequencerApp<'_, I, L, T, H, N>
where
    I: TimeInstant,
    L: LedSink,
    T: TimeSource<I>,
    H: Host,
{
    fn drop(&mut self) {
        if let Some(inputs) = self.inputs.take() {
            inputs.release(&mut self.host);
        }
    }
}
