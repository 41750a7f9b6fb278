//! Generic state machine engine.
//!
//! A machine owns every state it can ever be in, keyed by a small id type,
//! together with a transition table. Each entry names where to go on
//! success and on failure, plus an ordered list of guarded side-conditions
//! that can pull the machine elsewhere before the state's own update runs.
//!
//! # Per-tick algorithm
//!
//! 1. A temporary state, if installed, is updated instead of the real one
//!    until it finishes or its frame limit passes.
//! 2. A sleeping state only has its side-conditions checked.
//! 3. Otherwise the first side-condition whose predicate holds redirects
//!    straight to its target's `on_enter`; if none holds, `update` runs.
//! 4. The resulting status is mapped through the table. Entering a state
//!    may itself yield a status, and every entered state has its
//!    side-conditions checked again. The chain is capped per tick; a
//!    machine that hits the cap finishes with failure.
//!
//! States talk to the rest of the machine only through [`MachineCore`],
//! which holds the goal, the lock and the machine-specific data.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::{AiContext, ObjectId};
use crate::error::{AiError, Result};
use crate::math::Vec2Fixed;
use crate::xfer::{Snapshot, Xfer, XferVersion};

/// Snapshot version of the engine block.
///
/// Version 2 added the lock reason.
pub const STATE_MACHINE_VERSION: XferVersion = 2;

/// Lock reason given to a lock loaded from a version 1 snapshot.
const RESTORED_LOCK_REASON: &str = "restored from snapshot";

/// Requirements on a state id type.
pub trait StateKey: Copy + Ord + fmt::Debug + Serialize + DeserializeOwned {}

impl<T> StateKey for T where T: Copy + Ord + fmt::Debug + Serialize + DeserializeOwned {}

/// What a state reports after `on_enter` or `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateStatus {
    /// Keep running this state.
    Continue,
    /// Done; follow the success edge.
    Success,
    /// Done; follow the failure edge.
    Failure,
    /// Keep running, but skip `update` for this many frames.
    Sleep(u32),
}

impl StateStatus {
    /// Whether the state stays current.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Continue | Self::Sleep(_))
    }

    /// Sleep collapsed to continue, for callers that drive a nested machine.
    #[must_use]
    pub const fn sleep_as_continue(self) -> Self {
        match self {
            Self::Sleep(_) => Self::Continue,
            other => other,
        }
    }
}

/// Why a state is being left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitType {
    /// Ordinary transition or machine exit.
    Normal,
    /// Forced change from outside: `set_state`, `clear`, reset.
    Reset,
    /// The machine is being halted or torn down.
    Destroyed,
}

/// How a machine finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Exited through the success sentinel.
    Success,
    /// Exited through the failure sentinel or an engine fault.
    Failure,
}

impl Outcome {
    /// The status an update reports once finished.
    #[must_use]
    pub const fn status(self) -> StateStatus {
        match self {
            Self::Success => StateStatus::Success,
            Self::Failure => StateStatus::Failure,
        }
    }
}

/// Destination of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target<I> {
    /// Another state of the same machine.
    State(I),
    /// Leave the machine reporting success.
    ExitSuccess,
    /// Leave the machine reporting failure.
    ExitFailure,
}

/// Shorthand for the core type a state operates on.
pub type CoreOf<S> = MachineCore<<S as State>::Id, <S as State>::Data>;

/// Predicate of a guarded side-condition.
pub type Predicate<S> = fn(&mut CoreOf<S>, &mut AiContext<'_>) -> bool;

/// A guarded side-condition.
pub struct Condition<S: State> {
    /// Checked every tick, in declaration order.
    pub predicate: Predicate<S>,
    /// Where to go when the predicate holds.
    pub target: Target<S::Id>,
    /// Shown in logs and topology dumps.
    pub description: &'static str,
}

impl<S: State> Condition<S> {
    /// Build a condition.
    #[must_use]
    pub fn new(
        description: &'static str,
        predicate: Predicate<S>,
        target: Target<S::Id>,
    ) -> Self {
        Self {
            predicate,
            target,
            description,
        }
    }
}

impl<S: State> Clone for Condition<S> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate,
            target: self.target,
            description: self.description,
        }
    }
}

/// One behaviour node.
///
/// Concrete machines implement this on a closed enum of their states.
pub trait State: Sized {
    /// Id type of the machine this state belongs to.
    type Id: StateKey;
    /// Machine-specific data shared by all states.
    type Data: Snapshot;

    /// This state's id.
    fn id(&self) -> Self::Id;

    /// Human readable name for logs.
    fn name(&self) -> &'static str;

    /// Called once when the state becomes current.
    fn on_enter(&mut self, core: &mut CoreOf<Self>, ctx: &mut AiContext<'_>) -> StateStatus;

    /// Called once per tick while current and awake.
    fn update(&mut self, core: &mut CoreOf<Self>, ctx: &mut AiContext<'_>) -> StateStatus;

    /// Called once when the state stops being current.
    fn on_exit(&mut self, _core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>, _exit: ExitType) {}

    /// Transfer this state's persistent fields.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()>;

    /// Re-resolve anything that depends on the restored world.
    fn load_post_process(&mut self, _core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>) {}

    /// Machine-level hook run by [`StateMachine::halt`] before the current
    /// state is torn down.
    fn on_halt(_core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>) {}
}

/// Write a bare version tag for a state with no persistent fields.
///
/// # Errors
///
/// Propagates snapshot errors.
pub fn xfer_stateless(xfer: &mut Xfer, context: &'static str) -> Result<()> {
    let mut version = 1;
    xfer.xfer_version(&mut version, 1, context)
}

/// Shared machine data visible to every state.
pub struct MachineCore<I, D> {
    name: &'static str,
    goal_object: Option<ObjectId>,
    goal_position: Vec2Fixed,
    lock_depth: u32,
    lock_reason: String,
    redirect: Option<I>,
    /// Machine-specific data.
    pub data: D,
}

impl<I: StateKey, D> MachineCore<I, D> {
    fn new(name: &'static str, data: D) -> Self {
        Self {
            name,
            goal_object: None,
            goal_position: Vec2Fixed::ZERO,
            lock_depth: 0,
            lock_reason: String::new(),
            redirect: None,
            data,
        }
    }

    /// Machine name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Goal object id, whether or not it still exists.
    #[must_use]
    pub const fn goal_object(&self) -> Option<ObjectId> {
        self.goal_object
    }

    /// Goal object id if the object is still alive.
    #[must_use]
    pub fn resolved_goal_object(&self, ctx: &AiContext<'_>) -> Option<ObjectId> {
        self.goal_object.filter(|&id| ctx.world.is_alive(id))
    }

    /// A goal object was set but no longer exists.
    #[must_use]
    pub fn is_goal_object_destroyed(&self, ctx: &AiContext<'_>) -> bool {
        self.goal_object.is_some_and(|id| !ctx.world.is_alive(id))
    }

    /// Set the goal object. Ignored while locked.
    pub fn set_goal_object(&mut self, id: Option<ObjectId>) {
        if self.is_locked() {
            tracing::warn!(machine = self.name, reason = %self.lock_reason, "goal object change ignored while locked");
            return;
        }
        self.goal_object = id;
    }

    /// Goal position.
    #[must_use]
    pub const fn goal_position(&self) -> Vec2Fixed {
        self.goal_position
    }

    /// Set the goal position. Ignored while locked.
    pub fn set_goal_position(&mut self, pos: Vec2Fixed) {
        if self.is_locked() {
            tracing::warn!(machine = self.name, reason = %self.lock_reason, "goal position change ignored while locked");
            return;
        }
        self.goal_position = pos;
    }

    /// Take the reentrant lock.
    pub fn lock(&mut self, reason: &'static str) {
        self.lock_depth += 1;
        self.lock_reason = reason.to_string();
    }

    /// Release one level of the lock.
    pub fn unlock(&mut self) {
        if self.lock_depth == 0 {
            tracing::warn!(machine = self.name, "unlock without matching lock");
            return;
        }
        self.lock_depth -= 1;
        if self.lock_depth == 0 {
            self.lock_reason.clear();
        }
    }

    /// Whether any lock is held.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    /// Current lock depth.
    #[must_use]
    pub const fn lock_depth(&self) -> u32 {
        self.lock_depth
    }

    /// Ask the engine to move to `id` once the current call returns.
    pub fn request_state(&mut self, id: I) {
        self.redirect = Some(id);
    }
}

struct Slot<S: State> {
    state: S,
    success: Target<S::Id>,
    failure: Target<S::Id>,
    conditions: Vec<Condition<S>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TemporaryState<I> {
    id: I,
    end_frame: u32,
}

enum Step<I> {
    /// Follow an edge.
    Enter(Target<I>),
    /// A state was just entered and reported this.
    Entered(StateStatus),
    /// The current state's update reported this.
    Updated(StateStatus),
}

/// One row of a transition table, for tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRow {
    /// State id.
    pub state: String,
    /// State name.
    pub name: &'static str,
    /// Success edge.
    pub success: String,
    /// Failure edge.
    pub failure: String,
    /// Side-conditions as `(description, target)`.
    pub conditions: Vec<(&'static str, String)>,
    /// Whether this is the default state.
    pub is_default: bool,
}

fn describe_target<I: fmt::Debug>(target: &Target<I>) -> String {
    match target {
        Target::State(id) => format!("{id:?}"),
        Target::ExitSuccess => "EXIT_SUCCESS".to_string(),
        Target::ExitFailure => "EXIT_FAILURE".to_string(),
    }
}

/// The engine.
pub struct StateMachine<S: State> {
    core: MachineCore<S::Id, S::Data>,
    states: BTreeMap<S::Id, Slot<S>>,
    duplicates: Vec<S::Id>,
    current: Option<S::Id>,
    default_state: Option<S::Id>,
    default_inited: bool,
    sleep_till: u32,
    temporary: Option<TemporaryState<S::Id>>,
    deferred: Option<S::Id>,
    halted: bool,
    outcome: Option<Outcome>,
    snapshot_all_states: bool,
}

impl<S: State> StateMachine<S> {
    /// Create an empty machine.
    pub fn new(name: &'static str, data: S::Data) -> Self {
        Self {
            core: MachineCore::new(name, data),
            states: BTreeMap::new(),
            duplicates: Vec::new(),
            current: None,
            default_state: None,
            default_inited: false,
            sleep_till: 0,
            temporary: None,
            deferred: None,
            halted: false,
            outcome: None,
            snapshot_all_states: true,
        }
    }

    /// Register a state. The first state defined becomes the default.
    ///
    /// Defining an id twice keeps the first definition; [`Self::validate`]
    /// reports the duplicate.
    pub fn define_state(
        &mut self,
        state: S,
        success: Target<S::Id>,
        failure: Target<S::Id>,
        conditions: Vec<Condition<S>>,
    ) -> &mut Self {
        let id = state.id();
        if self.states.contains_key(&id) {
            tracing::error!(machine = self.core.name, state = ?id, "state defined twice");
            self.duplicates.push(id);
            return self;
        }
        if self.default_state.is_none() {
            self.default_state = Some(id);
        }
        self.states.insert(
            id,
            Slot {
                state,
                success,
                failure,
                conditions,
            },
        );
        self
    }

    /// Check the topology for duplicate ids and dangling edges.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = self.duplicates.first() {
            return Err(AiError::DuplicateState {
                machine: self.core.name,
                state: format!("{id:?}"),
            });
        }
        for (id, slot) in &self.states {
            let edges = [slot.success, slot.failure]
                .into_iter()
                .chain(slot.conditions.iter().map(|c| c.target));
            for target in edges {
                if let Target::State(to) = target {
                    if !self.states.contains_key(&to) {
                        return Err(AiError::UnknownTransitionTarget {
                            machine: self.core.name,
                            from: format!("{id:?}"),
                            target: format!("{to:?}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Transition table rows, in id order.
    #[must_use]
    pub fn describe(&self) -> Vec<TransitionRow> {
        self.states
            .iter()
            .map(|(id, slot)| TransitionRow {
                state: format!("{id:?}"),
                name: slot.state.name(),
                success: describe_target(&slot.success),
                failure: describe_target(&slot.failure),
                conditions: slot
                    .conditions
                    .iter()
                    .map(|c| (c.description, describe_target(&c.target)))
                    .collect(),
                is_default: self.default_state == Some(*id),
            })
            .collect()
    }

    /// Enter the default state. Allowed once per machine.
    ///
    /// # Errors
    ///
    /// Fails if already initialized, halted or empty.
    pub fn init_default_state(&mut self, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        if self.default_inited {
            return Err(AiError::DefaultStateAlreadyInitialized(self.core.name));
        }
        let default = self.default_state.ok_or(AiError::NoDefaultState(self.core.name))?;
        #[cfg(feature = "debug-validation")]
        self.validate()?;
        self.default_inited = true;
        Ok(self.drive(Step::Enter(Target::State(default)), ctx))
    }

    /// Run one tick.
    pub fn update_state_machine(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        if self.halted {
            return StateStatus::Failure;
        }
        if let Some(outcome) = self.outcome {
            return outcome.status();
        }
        if let Some(status) = self.apply_deferred(ctx) {
            return status;
        }
        if self.update_temporary(ctx) {
            return StateStatus::Continue;
        }

        let Some(current) = self.current else {
            return StateStatus::Failure;
        };

        let now = ctx.now();
        if self.sleep_till != 0 && now < self.sleep_till {
            if let Some(target) = self.first_true_condition(ctx) {
                return self.drive(Step::Enter(target), ctx);
            }
            return StateStatus::Sleep(self.sleep_till - now);
        }
        self.sleep_till = 0;

        if let Some(target) = self.first_true_condition(ctx) {
            return self.drive(Step::Enter(target), ctx);
        }

        let Some(slot) = self.states.get_mut(&current) else {
            return self.fail_terminal(ctx);
        };
        let status = slot.state.update(&mut self.core, ctx);
        self.drive(Step::Updated(status), ctx)
    }

    /// Change state from outside, respecting the lock.
    ///
    /// # Errors
    ///
    /// [`AiError::MachineLocked`] while locked, [`AiError::UnknownState`]
    /// for an undefined id, [`AiError::MachineHalted`] after halt.
    pub fn set_state(&mut self, id: S::Id, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        if self.core.is_locked() {
            tracing::warn!(machine = self.core.name, state = ?id, reason = %self.core.lock_reason, "set_state rejected while locked");
            return Err(AiError::MachineLocked {
                machine: self.core.name,
                reason: self.core.lock_reason.clone(),
            });
        }
        self.force_state(id, ctx)
    }

    /// Change state once the lock is released.
    ///
    /// Applied at the start of the first update that finds the machine
    /// unlocked. A later request replaces an earlier one.
    ///
    /// # Errors
    ///
    /// [`AiError::UnknownState`] for an undefined id, [`AiError::MachineHalted`]
    /// after halt.
    pub fn set_state_deferred(&mut self, id: S::Id) -> Result<()> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        self.check_known(id)?;
        self.deferred = Some(id);
        Ok(())
    }

    /// Change state ignoring the lock. The current state exits with
    /// [`ExitType::Reset`], and so does a temporary state running `id`.
    ///
    /// # Errors
    ///
    /// [`AiError::UnknownState`] for an undefined id, [`AiError::MachineHalted`]
    /// after halt.
    pub fn force_state(&mut self, id: S::Id, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        self.check_known(id)?;
        self.outcome = None;
        self.default_inited = true;
        let status = match self.transition_to(id, ExitType::Reset, ctx) {
            Some(status) => status,
            None => self.fail_terminal(ctx),
        };
        Ok(self.drive(Step::Entered(status), ctx))
    }

    /// Run `id` for at most `frames` frames without leaving the real
    /// current state.
    ///
    /// Any temporary state already installed exits with
    /// [`ExitType::Reset`]. If `id` finishes immediately it is exited again
    /// and its status returned.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids, for the current state's own id and after halt.
    pub fn set_temporary_state(
        &mut self,
        id: S::Id,
        frames: u32,
        ctx: &mut AiContext<'_>,
    ) -> Result<StateStatus> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        self.check_known(id)?;
        if self.current == Some(id) {
            return Err(AiError::InvalidTemporaryState {
                machine: self.core.name,
                state: format!("{id:?}"),
                message: "already the current state".to_string(),
            });
        }

        self.exit_temporary(ExitType::Reset, ctx);

        let frames = frames.min(ctx.tuning.max_temporary_state_frames);
        let Some(slot) = self.states.get_mut(&id) else {
            return Ok(StateStatus::Failure);
        };
        let status = slot.state.on_enter(&mut self.core, ctx);
        self.core.redirect = None;
        if status.is_running() {
            let end_frame = ctx.now().saturating_add(frames);
            tracing::debug!(machine = self.core.name, owner = ctx.owner, state = ?id, end_frame, "temporary state installed");
            self.temporary = Some(TemporaryState { id, end_frame });
            Ok(StateStatus::Continue)
        } else {
            slot.state.on_exit(&mut self.core, ctx, ExitType::Normal);
            Ok(status)
        }
    }

    /// Leave the current state and stay stateless. Rejected while locked.
    ///
    /// # Errors
    ///
    /// [`AiError::MachineLocked`] or [`AiError::MachineHalted`].
    pub fn clear(&mut self, ctx: &mut AiContext<'_>) -> Result<()> {
        self.ensure_unlocked()?;
        self.exit_temporary(ExitType::Reset, ctx);
        self.exit_current(ExitType::Reset, ctx);
        self.outcome = None;
        self.deferred = None;
        Ok(())
    }

    /// Go back to the default state. Rejected while locked.
    ///
    /// # Errors
    ///
    /// [`AiError::MachineLocked`], [`AiError::MachineHalted`] or
    /// [`AiError::NoDefaultState`].
    pub fn reset_to_default_state(&mut self, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        self.ensure_unlocked()?;
        let default = self.default_state.ok_or(AiError::NoDefaultState(self.core.name))?;
        self.force_state(default, ctx)
    }

    /// Tear the machine down for good.
    ///
    /// The machine's halt hook runs first so it can release external
    /// reservations, then the temporary and current states exit with
    /// [`ExitType::Destroyed`].
    pub fn halt(&mut self, ctx: &mut AiContext<'_>) {
        if self.halted {
            return;
        }
        S::on_halt(&mut self.core, ctx);
        self.exit_temporary(ExitType::Destroyed, ctx);
        self.exit_current(ExitType::Destroyed, ctx);
        self.deferred = None;
        self.halted = true;
        tracing::debug!(machine = self.core.name, owner = ctx.owner, "machine halted");
    }

    /// Id of the real current state.
    #[must_use]
    pub const fn current_state_id(&self) -> Option<S::Id> {
        self.current
    }

    /// Whether `id` is the real current state.
    #[must_use]
    pub fn is_in_state(&self, id: S::Id) -> bool {
        self.current == Some(id)
    }

    /// The real current state.
    #[must_use]
    pub fn current_state(&self) -> Option<&S> {
        self.current
            .and_then(|id| self.states.get(&id))
            .map(|slot| &slot.state)
    }

    /// Look up any state.
    #[must_use]
    pub fn state(&self, id: S::Id) -> Option<&S> {
        self.states.get(&id).map(|slot| &slot.state)
    }

    /// Id of the temporary state, if one is running.
    #[must_use]
    pub fn temporary_state_id(&self) -> Option<S::Id> {
        self.temporary.map(|t| t.id)
    }

    /// Default state id.
    #[must_use]
    pub const fn default_state_id(&self) -> Option<S::Id> {
        self.default_state
    }

    /// Whether the current state is asleep at `now`.
    #[must_use]
    pub const fn is_sleeping(&self, now: u32) -> bool {
        self.sleep_till != 0 && now < self.sleep_till
    }

    /// How the machine finished, if it has.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Whether [`Self::halt`] ran.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether the machine is locked or halted.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.halted || self.core.is_locked()
    }

    /// Take the lock from outside the machine.
    pub fn lock(&mut self, reason: &'static str) {
        self.core.lock(reason);
    }

    /// Release an outside lock.
    pub fn unlock(&mut self) {
        self.core.unlock();
    }

    /// Shared core.
    #[must_use]
    pub const fn core(&self) -> &MachineCore<S::Id, S::Data> {
        &self.core
    }

    /// Shared core, mutably.
    pub fn core_mut(&mut self) -> &mut MachineCore<S::Id, S::Data> {
        &mut self.core
    }

    /// Machine-specific data.
    #[must_use]
    pub const fn data(&self) -> &S::Data {
        &self.core.data
    }

    /// Machine-specific data, mutably.
    pub fn data_mut(&mut self) -> &mut S::Data {
        &mut self.core.data
    }

    /// Choose whether snapshots carry every state or only the current one.
    pub fn set_snapshot_all_states(&mut self, all: bool) {
        self.snapshot_all_states = all;
    }

    /// Machine name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.core.name
    }

    /// Re-resolve world references after a load.
    pub fn load_post_process(&mut self, ctx: &mut AiContext<'_>) {
        let live = [self.current, self.temporary.map(|t| t.id)];
        for id in live.into_iter().flatten() {
            if let Some(slot) = self.states.get_mut(&id) {
                slot.state.load_post_process(&mut self.core, ctx);
            }
        }
    }

    /// Checksum of the complete machine.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    pub fn crc(&mut self) -> Result<u64> {
        let mut xfer = Xfer::crc();
        self.xfer(&mut xfer)?;
        Ok(xfer.checksum())
    }

    /// Save the machine to bytes.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    pub fn to_snapshot_bytes(&mut self) -> Result<Vec<u8>> {
        let mut xfer = Xfer::saver();
        self.xfer(&mut xfer)?;
        Ok(xfer.into_bytes())
    }

    /// Restore the machine from bytes written by [`Self::to_snapshot_bytes`].
    ///
    /// The machine must have the same topology. States are restored in place
    /// without calling `on_enter`; call [`Self::load_post_process`] once the
    /// world is rebuilt.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors and rejects trailing bytes.
    pub fn restore_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut xfer = Xfer::loader(bytes);
        self.xfer(&mut xfer)?;
        xfer.finish()
    }

    /// Walk the machine through `xfer`.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors; a stored state id this machine does not
    /// define is reported as [`AiError::UnknownState`].
    pub fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = STATE_MACHINE_VERSION;
        xfer.xfer_version(&mut version, STATE_MACHINE_VERSION, self.core.name)?;
        xfer.xfer(&mut self.sleep_till)?;
        xfer.xfer(&mut self.current)?;
        xfer.xfer(&mut self.default_inited)?;
        xfer.xfer(&mut self.snapshot_all_states)?;
        xfer.xfer(&mut self.temporary)?;

        if self.snapshot_all_states {
            for slot in self.states.values_mut() {
                slot.state.xfer(xfer)?;
            }
        } else {
            let live = [self.current, self.temporary.map(|t| t.id)];
            for id in live.into_iter().flatten() {
                let name = self.core.name;
                let slot = self.states.get_mut(&id).ok_or_else(|| AiError::UnknownState {
                    machine: name,
                    state: format!("{id:?}"),
                })?;
                slot.state.xfer(xfer)?;
            }
        }
        if let Some(id) = self.current {
            self.check_known(id)?;
        }

        xfer.xfer(&mut self.deferred)?;
        xfer.xfer(&mut self.core.goal_object)?;
        xfer.xfer(&mut self.core.goal_position)?;
        xfer.xfer(&mut self.core.lock_depth)?;
        if version >= 2 {
            xfer.xfer(&mut self.core.lock_reason)?;
        } else if xfer.is_loading() {
            self.core.lock_reason = if self.core.lock_depth > 0 {
                RESTORED_LOCK_REASON.to_string()
            } else {
                String::new()
            };
        }
        xfer.xfer(&mut self.halted)?;
        xfer.xfer(&mut self.outcome)?;
        self.core.data.xfer(xfer)
    }

    fn check_known(&self, id: S::Id) -> Result<()> {
        if self.states.contains_key(&id) {
            Ok(())
        } else {
            tracing::warn!(machine = self.core.name, state = ?id, "unknown state requested");
            Err(AiError::UnknownState {
                machine: self.core.name,
                state: format!("{id:?}"),
            })
        }
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.halted {
            return Err(AiError::MachineHalted(self.core.name));
        }
        if self.core.is_locked() {
            return Err(AiError::MachineLocked {
                machine: self.core.name,
                reason: self.core.lock_reason.clone(),
            });
        }
        Ok(())
    }

    fn apply_deferred(&mut self, ctx: &mut AiContext<'_>) -> Option<StateStatus> {
        if self.core.is_locked() {
            return None;
        }
        let id = self.deferred.take()?;
        tracing::debug!(machine = self.core.name, owner = ctx.owner, state = ?id, "applying deferred state change");
        self.force_state(id, ctx).ok()
    }

    /// Returns `true` while the temporary state keeps control this tick.
    fn update_temporary(&mut self, ctx: &mut AiContext<'_>) -> bool {
        let Some(temp) = self.temporary else {
            return false;
        };
        let Some(slot) = self.states.get_mut(&temp.id) else {
            self.temporary = None;
            return false;
        };

        let mut status = slot.state.update(&mut self.core, ctx);
        self.core.redirect = None;
        if ctx.now() >= temp.end_frame && status.is_running() {
            status = StateStatus::Success;
        }
        if status.is_running() {
            return true;
        }

        slot.state.on_exit(&mut self.core, ctx, ExitType::Normal);
        self.temporary = None;
        tracing::debug!(machine = self.core.name, owner = ctx.owner, state = ?temp.id, ?status, "temporary state finished");
        false
    }

    fn first_true_condition(&mut self, ctx: &mut AiContext<'_>) -> Option<Target<S::Id>> {
        let current = self.current?;
        let slot = self.states.get(&current)?;
        for condition in &slot.conditions {
            if (condition.predicate)(&mut self.core, ctx) {
                tracing::debug!(
                    machine = self.core.name,
                    owner = ctx.owner,
                    state = ?current,
                    condition = condition.description,
                    "side-condition fired"
                );
                return Some(condition.target);
            }
        }
        None
    }

    fn table_target(&self, status: StateStatus) -> Target<S::Id> {
        let edge = self.current.and_then(|id| self.states.get(&id)).map(|slot| {
            if status == StateStatus::Success {
                slot.success
            } else {
                slot.failure
            }
        });
        edge.unwrap_or(Target::ExitFailure)
    }

    fn drive(&mut self, first: Step<S::Id>, ctx: &mut AiContext<'_>) -> StateStatus {
        let cap = ctx.tuning.max_transitions_per_tick.max(1);
        let mut transitions = 0;
        let mut step = first;

        loop {
            let (status, entered) = match step {
                Step::Updated(status) => (status, false),
                Step::Entered(status) => (status, true),
                Step::Enter(target) => {
                    transitions += 1;
                    if transitions > cap {
                        tracing::error!(
                            machine = self.core.name,
                            owner = ctx.owner,
                            state = ?self.current,
                            cap,
                            "transition cap exceeded within one tick"
                        );
                        return self.fail_terminal(ctx);
                    }
                    match target {
                        Target::ExitSuccess => return self.finish(Outcome::Success, ctx),
                        Target::ExitFailure => return self.finish(Outcome::Failure, ctx),
                        Target::State(id) => match self.transition_to(id, ExitType::Normal, ctx) {
                            Some(status) => (status, true),
                            None => return self.fail_terminal(ctx),
                        },
                    }
                }
            };

            if let Some(id) = self.core.redirect.take() {
                step = Step::Enter(Target::State(id));
                continue;
            }

            match status {
                StateStatus::Success | StateStatus::Failure => {
                    step = Step::Enter(self.table_target(status));
                }
                StateStatus::Continue | StateStatus::Sleep(_) => {
                    if entered {
                        if let Some(target) = self.first_true_condition(ctx) {
                            step = Step::Enter(target);
                            continue;
                        }
                    }
                    if let StateStatus::Sleep(frames) = status {
                        self.sleep_till = ctx.now().saturating_add(frames);
                    }
                    return status;
                }
            }
        }
    }

    /// Exit the current state and enter `id`. `None` if `id` is unknown.
    fn transition_to(
        &mut self,
        id: S::Id,
        exit: ExitType,
        ctx: &mut AiContext<'_>,
    ) -> Option<StateStatus> {
        if !self.states.contains_key(&id) {
            tracing::error!(machine = self.core.name, owner = ctx.owner, state = ?id, "transition to unknown state");
            return None;
        }
        // One instance per id: a temporary state owning `id` gives it up first.
        if self.temporary.is_some_and(|t| t.id == id) {
            self.exit_temporary(ExitType::Reset, ctx);
        }
        let from = self.current;
        self.exit_current(exit, ctx);
        tracing::debug!(
            machine = self.core.name,
            owner = ctx.owner,
            frame = ctx.now(),
            from = ?from,
            to = ?id,
            "state transition"
        );
        self.current = Some(id);
        let slot = self.states.get_mut(&id)?;
        Some(slot.state.on_enter(&mut self.core, ctx))
    }

    fn exit_temporary(&mut self, exit: ExitType, ctx: &mut AiContext<'_>) {
        if let Some(temp) = self.temporary.take() {
            if let Some(slot) = self.states.get_mut(&temp.id) {
                slot.state.on_exit(&mut self.core, ctx, exit);
            }
            tracing::debug!(machine = self.core.name, owner = ctx.owner, state = ?temp.id, ?exit, "temporary state removed");
        }
    }

    fn exit_current(&mut self, exit: ExitType, ctx: &mut AiContext<'_>) {
        self.sleep_till = 0;
        if let Some(id) = self.current.take() {
            if let Some(slot) = self.states.get_mut(&id) {
                slot.state.on_exit(&mut self.core, ctx, exit);
            }
        }
        self.core.redirect = None;
    }

    fn finish(&mut self, outcome: Outcome, ctx: &mut AiContext<'_>) -> StateStatus {
        self.exit_current(ExitType::Normal, ctx);
        self.outcome = Some(outcome);
        tracing::debug!(machine = self.core.name, owner = ctx.owner, ?outcome, "machine finished");
        outcome.status()
    }

    fn fail_terminal(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.finish(Outcome::Failure, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    enum Toy {
        A,
        B,
        C,
        Missing,
    }

    #[derive(Debug, Default)]
    struct ToyData {
        flag_b: bool,
        flag_c: bool,
    }

    impl Snapshot for ToyData {
        fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
            xfer.xfer(&mut self.flag_b)?;
            xfer.xfer(&mut self.flag_c)
        }
    }

    /// A scripted state: returns `script[i]` on its i-th update.
    struct ToyState {
        id: Toy,
        enter_status: StateStatus,
        script: Vec<StateStatus>,
        enters: u32,
        updates: u32,
        exits: Vec<ExitType>,
        locks: bool,
    }

    impl ToyState {
        fn new(id: Toy) -> Self {
            Self {
                id,
                enter_status: StateStatus::Continue,
                script: Vec::new(),
                enters: 0,
                updates: 0,
                exits: Vec::new(),
                locks: false,
            }
        }

        fn entering(mut self, status: StateStatus) -> Self {
            self.enter_status = status;
            self
        }

        fn scripted(mut self, script: &[StateStatus]) -> Self {
            self.script = script.to_vec();
            self
        }

        fn locking(mut self) -> Self {
            self.locks = true;
            self
        }
    }

    impl State for ToyState {
        type Id = Toy;
        type Data = ToyData;

        fn id(&self) -> Toy {
            self.id
        }

        fn name(&self) -> &'static str {
            "toy"
        }

        fn on_enter(&mut self, core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>) -> StateStatus {
            self.enters += 1;
            if self.locks {
                core.lock("toy");
            }
            self.enter_status
        }

        fn update(&mut self, _core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>) -> StateStatus {
            let status = self
                .script
                .get(self.updates as usize)
                .copied()
                .unwrap_or(StateStatus::Continue);
            self.updates += 1;
            status
        }

        fn on_exit(&mut self, core: &mut CoreOf<Self>, _ctx: &mut AiContext<'_>, exit: ExitType) {
            self.exits.push(exit);
            if self.locks {
                core.unlock();
            }
        }

        fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
            xfer.xfer(&mut self.updates)
        }
    }

    fn flag_b(core: &mut CoreOf<ToyState>, _ctx: &mut AiContext<'_>) -> bool {
        core.data.flag_b
    }

    fn flag_c(core: &mut CoreOf<ToyState>, _ctx: &mut AiContext<'_>) -> bool {
        core.data.flag_c
    }

    fn always(_core: &mut CoreOf<ToyState>, _ctx: &mut AiContext<'_>) -> bool {
        true
    }

    fn machine(a: ToyState, b: ToyState) -> StateMachine<ToyState> {
        let mut m = StateMachine::new("toy", ToyData::default());
        m.define_state(
            a,
            Target::State(Toy::B),
            Target::ExitFailure,
            vec![
                Condition::new("flag b", flag_b, Target::State(Toy::B)),
                Condition::new("flag c", flag_c, Target::State(Toy::C)),
            ],
        )
        .define_state(b, Target::ExitSuccess, Target::State(Toy::A), Vec::new())
        .define_state(ToyState::new(Toy::C), Target::State(Toy::A), Target::State(Toy::A), Vec::new());
        m
    }

    #[test]
    fn test_first_defined_state_is_default() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        assert_eq!(m.default_state_id(), Some(Toy::A));
        assert_eq!(m.init_default_state(&mut h.ctx()).unwrap(), StateStatus::Continue);
        assert!(m.is_in_state(Toy::A));
        assert!(matches!(
            m.init_default_state(&mut h.ctx()),
            Err(AiError::DefaultStateAlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_success_follows_table_and_exits_machine() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Success]);
        let b = ToyState::new(Toy::B).scripted(&[StateStatus::Continue, StateStatus::Success]);
        let mut m = machine(a, b);
        m.init_default_state(&mut h.ctx()).unwrap();

        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Continue);
        assert!(m.is_in_state(Toy::B));
        assert_eq!(m.state(Toy::A).unwrap().exits, vec![ExitType::Normal]);

        h.advance(1);
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Continue);
        h.advance(1);
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Success);
        assert_eq!(m.outcome(), Some(Outcome::Success));
        assert_eq!(m.current_state_id(), None);
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Success);
    }

    #[test]
    fn test_enter_status_chains_within_one_tick() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Success]);
        let b = ToyState::new(Toy::B).entering(StateStatus::Failure);
        let mut m = machine(a, b);
        m.init_default_state(&mut h.ctx()).unwrap();

        // A succeeds, B fails on entry and sends us back to A.
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Continue);
        assert!(m.is_in_state(Toy::A));
        assert_eq!(m.state(Toy::A).unwrap().enters, 2);
        assert_eq!(m.state(Toy::B).unwrap().updates, 0);
    }

    #[test]
    fn test_sleep_skips_update_until_expiry() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Sleep(3), StateStatus::Continue]);
        let mut m = machine(a, ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();

        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Sleep(3));
        for remaining in [2, 1] {
            h.advance(1);
            assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Sleep(remaining));
        }
        assert_eq!(m.state(Toy::A).unwrap().updates, 1);

        h.advance(1);
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Continue);
        assert_eq!(m.state(Toy::A).unwrap().updates, 2);
    }

    #[test]
    fn test_conditions_fire_while_sleeping() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Sleep(100)]);
        let mut m = machine(a, ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.update_state_machine(&mut h.ctx());

        m.data_mut().flag_c = true;
        h.advance(1);
        m.update_state_machine(&mut h.ctx());
        assert!(m.is_in_state(Toy::C));
        assert!(!m.is_sleeping(h.frame));
    }

    #[test]
    fn test_earlier_condition_wins() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.data_mut().flag_b = true;
        m.data_mut().flag_c = true;

        m.update_state_machine(&mut h.ctx());
        assert!(m.is_in_state(Toy::B));
        // The redirect replaced A's update for this tick.
        assert_eq!(m.state(Toy::A).unwrap().updates, 0);
    }

    #[test]
    fn test_transition_cycle_hits_cap_and_fails() {
        let mut h = Harness::default();
        let mut m = StateMachine::new("cycle", ToyData::default());
        m.define_state(
            ToyState::new(Toy::A),
            Target::State(Toy::A),
            Target::State(Toy::A),
            vec![Condition::new("always", always, Target::State(Toy::B))],
        )
        .define_state(
            ToyState::new(Toy::B),
            Target::State(Toy::A),
            Target::State(Toy::A),
            vec![Condition::new("always", always, Target::State(Toy::A))],
        );

        assert_eq!(m.init_default_state(&mut h.ctx()).unwrap(), StateStatus::Failure);
        assert_eq!(m.outcome(), Some(Outcome::Failure));
        let entries = m.state(Toy::A).unwrap().enters + m.state(Toy::B).unwrap().enters;
        assert_eq!(entries, h.tuning.max_transitions_per_tick);
    }

    #[test]
    fn test_unknown_target_fails_machine_and_validate_reports_it() {
        let mut h = Harness::default();
        let mut m = StateMachine::new("dangling", ToyData::default());
        m.define_state(
            ToyState::new(Toy::A).scripted(&[StateStatus::Success]),
            Target::State(Toy::Missing),
            Target::ExitFailure,
            Vec::new(),
        );
        assert!(matches!(m.validate(), Err(AiError::UnknownTransitionTarget { .. })));

        m.init_default_state(&mut h.ctx()).unwrap();
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Failure);
        assert_eq!(m.outcome(), Some(Outcome::Failure));
        assert_eq!(m.state(Toy::A).unwrap().exits, vec![ExitType::Normal]);
    }

    #[test]
    fn test_duplicate_definition_is_reported() {
        let mut m = StateMachine::new("dup", ToyData::default());
        m.define_state(ToyState::new(Toy::A), Target::ExitSuccess, Target::ExitFailure, Vec::new())
            .define_state(ToyState::new(Toy::A), Target::ExitSuccess, Target::ExitFailure, Vec::new());
        assert!(matches!(m.validate(), Err(AiError::DuplicateState { .. })));
    }

    #[test]
    fn test_set_state_rejected_while_locked_and_deferred_applies_later() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).locking().scripted(&[StateStatus::Continue]);
        let mut m = machine(a, ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        assert!(m.is_locked());

        assert!(matches!(
            m.set_state(Toy::B, &mut h.ctx()),
            Err(AiError::MachineLocked { ref reason, .. }) if reason == "toy"
        ));
        assert!(m.is_in_state(Toy::A));
        assert!(m.clear(&mut h.ctx()).is_err());

        m.set_state_deferred(Toy::C).unwrap();
        m.update_state_machine(&mut h.ctx());
        assert!(m.is_in_state(Toy::A));

        // Forcing ignores the lock and the exit releases it.
        m.force_state(Toy::B, &mut h.ctx()).unwrap();
        assert_eq!(m.core().lock_depth(), 0);
        assert_eq!(m.state(Toy::A).unwrap().exits, vec![ExitType::Reset]);

        m.update_state_machine(&mut h.ctx());
        assert!(m.is_in_state(Toy::C));
    }

    #[test]
    fn test_unknown_set_state_is_a_no_op() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        assert!(matches!(
            m.set_state(Toy::Missing, &mut h.ctx()),
            Err(AiError::UnknownState { .. })
        ));
        assert!(m.is_in_state(Toy::A));
        assert!(m.state(Toy::A).unwrap().exits.is_empty());
    }

    #[test]
    fn test_temporary_state_runs_without_exiting_real_state() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();

        assert_eq!(m.set_temporary_state(Toy::C, 5, &mut h.ctx()).unwrap(), StateStatus::Continue);
        for tick in 1..=6 {
            h.advance(1);
            m.update_state_machine(&mut h.ctx());
            let c = m.state(Toy::C).unwrap();
            if tick < 5 {
                assert!(c.exits.is_empty(), "tick {tick}");
            } else {
                assert_eq!(c.exits, vec![ExitType::Normal], "tick {tick}");
            }
        }

        let a = m.state(Toy::A).unwrap();
        assert!(m.is_in_state(Toy::A));
        assert_eq!(a.enters, 1);
        assert!(a.exits.is_empty());
        // A resumed on the expiry tick and the one after.
        assert_eq!(a.updates, 2);
        assert_eq!(m.temporary_state_id(), None);
    }

    #[test]
    fn test_temporary_state_frame_limit_is_capped() {
        let mut h = Harness::default();
        h.tuning.max_temporary_state_frames = 3;
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.set_temporary_state(Toy::C, 1_000, &mut h.ctx()).unwrap();

        h.advance(3);
        m.update_state_machine(&mut h.ctx());
        assert_eq!(m.temporary_state_id(), None);
    }

    #[test]
    fn test_temporary_state_rejects_current_id() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        assert!(matches!(
            m.set_temporary_state(Toy::A, 5, &mut h.ctx()),
            Err(AiError::InvalidTemporaryState { .. })
        ));
    }

    #[test]
    fn test_forcing_the_temporary_id_hands_the_instance_over() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.set_temporary_state(Toy::C, 50, &mut h.ctx()).unwrap();

        m.force_state(Toy::C, &mut h.ctx()).unwrap();
        assert_eq!(m.temporary_state_id(), None);
        assert!(m.is_in_state(Toy::C));
        let c = m.state(Toy::C).unwrap();
        assert_eq!(c.exits, vec![ExitType::Reset]);
        assert_eq!(c.enters, 2);
        assert_eq!(m.state(Toy::A).unwrap().exits, vec![ExitType::Reset]);

        h.advance(1);
        m.update_state_machine(&mut h.ctx());
        let c = m.state(Toy::C).unwrap();
        assert_eq!(c.updates, 1);
        assert_eq!(c.exits, vec![ExitType::Reset]);
    }

    #[test]
    fn test_condition_into_temporary_id_takes_it_over() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.set_temporary_state(Toy::B, 50, &mut h.ctx()).unwrap();

        m.data_mut().flag_b = true;
        m.force_state(Toy::A, &mut h.ctx()).unwrap();
        assert!(m.is_in_state(Toy::B));
        assert_eq!(m.temporary_state_id(), None);
        let b = m.state(Toy::B).unwrap();
        assert_eq!(b.exits, vec![ExitType::Reset]);
        assert_eq!(b.enters, 2);
    }

    #[test]
    fn test_halt_exits_with_destroyed_and_rejects_changes() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A).locking(), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.halt(&mut h.ctx());

        assert!(m.is_halted());
        assert_eq!(m.core().lock_depth(), 0);
        assert_eq!(m.state(Toy::A).unwrap().exits, vec![ExitType::Destroyed]);
        assert_eq!(m.update_state_machine(&mut h.ctx()), StateStatus::Failure);
        assert!(matches!(m.force_state(Toy::B, &mut h.ctx()), Err(AiError::MachineHalted(_))));
    }

    #[test]
    fn test_goal_changes_ignored_while_locked() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.core_mut().set_goal_object(Some(5));
        m.lock("outside");
        m.core_mut().set_goal_object(Some(6));
        assert_eq!(m.core().goal_object(), Some(5));
        m.unlock();
        m.unlock();
        assert_eq!(m.core().lock_depth(), 0);
        assert!(m.core().is_goal_object_destroyed(&h.ctx()));
    }

    #[test]
    fn test_snapshot_restores_current_without_entering() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Success]);
        let b = ToyState::new(Toy::B).scripted(&[StateStatus::Sleep(10)]);
        let mut m = machine(a, b);
        m.init_default_state(&mut h.ctx()).unwrap();
        m.update_state_machine(&mut h.ctx());
        h.advance(1);
        m.update_state_machine(&mut h.ctx());
        let bytes = m.to_snapshot_bytes().unwrap();
        let crc = m.crc().unwrap();

        let mut restored = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        restored.restore_from_bytes(&bytes).unwrap();
        assert!(restored.is_in_state(Toy::B));
        assert_eq!(restored.state(Toy::B).unwrap().enters, 0);
        assert_eq!(restored.state(Toy::B).unwrap().updates, 1);
        assert!(restored.is_sleeping(h.frame));
        assert_eq!(restored.crc().unwrap(), crc);
    }

    #[test]
    fn test_snapshot_keeps_lock_reason() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A).locking(), ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        let bytes = m.to_snapshot_bytes().unwrap();

        let mut restored = machine(ToyState::new(Toy::A).locking(), ToyState::new(Toy::B));
        restored.restore_from_bytes(&bytes).unwrap();
        assert_eq!(restored.core().lock_depth(), 1);
        let err = restored.set_state(Toy::B, &mut h.ctx()).unwrap_err();
        assert!(matches!(err, AiError::MachineLocked { ref reason, .. } if reason == "toy"));
    }

    /// Engine block as version 1 wrote it: no lock reason.
    fn version_one_snapshot(mut lock_depth: u32) -> Vec<u8> {
        let mut xfer = Xfer::saver();
        let mut version: XferVersion = 1;
        xfer.xfer(&mut version).unwrap();
        xfer.xfer(&mut 0u32).unwrap();
        xfer.xfer(&mut Some(Toy::A)).unwrap();
        xfer.xfer(&mut true).unwrap();
        xfer.xfer(&mut true).unwrap();
        xfer.xfer(&mut None::<TemporaryState<Toy>>).unwrap();
        // Update counters of A, B and C.
        for mut updates in [4u32, 0, 0] {
            xfer.xfer(&mut updates).unwrap();
        }
        xfer.xfer(&mut None::<Toy>).unwrap();
        xfer.xfer(&mut None::<ObjectId>).unwrap();
        xfer.xfer(&mut Vec2Fixed::ZERO).unwrap();
        xfer.xfer(&mut lock_depth).unwrap();
        xfer.xfer(&mut false).unwrap();
        xfer.xfer(&mut None::<Outcome>).unwrap();
        xfer.xfer(&mut false).unwrap();
        xfer.xfer(&mut false).unwrap();
        xfer.into_bytes()
    }

    #[test]
    fn test_version_one_snapshot_loads_without_lock_reason() {
        let mut h = Harness::default();
        let mut m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        m.restore_from_bytes(&version_one_snapshot(1)).unwrap();
        assert!(m.is_in_state(Toy::A));
        assert_eq!(m.state(Toy::A).unwrap().updates, 4);
        assert_eq!(m.core().lock_depth(), 1);
        let err = m.set_state(Toy::B, &mut h.ctx()).unwrap_err();
        assert!(matches!(
            err,
            AiError::MachineLocked { ref reason, .. } if reason == RESTORED_LOCK_REASON
        ));

        let mut unlocked = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        unlocked.restore_from_bytes(&version_one_snapshot(0)).unwrap();
        assert!(unlocked.set_state(Toy::B, &mut h.ctx()).is_ok());
    }

    #[test]
    fn test_reset_to_default_exits_with_reset() {
        let mut h = Harness::default();
        let a = ToyState::new(Toy::A).scripted(&[StateStatus::Success]);
        let mut m = machine(a, ToyState::new(Toy::B));
        m.init_default_state(&mut h.ctx()).unwrap();
        m.update_state_machine(&mut h.ctx());
        assert!(m.is_in_state(Toy::B));

        m.reset_to_default_state(&mut h.ctx()).unwrap();
        assert!(m.is_in_state(Toy::A));
        assert_eq!(m.state(Toy::B).unwrap().exits, vec![ExitType::Reset]);
    }

    #[test]
    fn test_describe_lists_edges() {
        let m = machine(ToyState::new(Toy::A), ToyState::new(Toy::B));
        let rows = m.describe();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_default);
        assert_eq!(rows[0].success, "B");
        assert_eq!(rows[0].failure, "EXIT_FAILURE");
        assert_eq!(rows[0].conditions[1], ("flag c", "C".to_string()));
    }
}
