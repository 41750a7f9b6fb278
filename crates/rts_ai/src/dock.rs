//! Docking with supply centers, repair pads and similar structures.
//!
//! The machine's goal object is the dock. A docker queues at an approach
//! slot, waits for clearance, walks in through the entry point, is served
//! at the dock position and leaves through the exit.
//!
//! # Reservations
//!
//! The dock hands out a claim on [`Dock::reserve_approach_position`]. The
//! claim is released exactly once, either by [`Dock::on_exit_reached`]
//! after a completed visit or by [`Dock::cancel_dock`]. The
//! `reservation_held` flag in [`DockData`] is the single source of truth:
//! every release path checks and clears it.

use serde::{Deserialize, Serialize};

use crate::context::{AiContext, Dock, ObjectId};
use crate::error::Result;
use crate::machine::{
    Condition, CoreOf, ExitType, State, StateMachine, StateStatus, Target, TransitionRow,
};
use crate::movement::MoveTo;
use crate::xfer::{Snapshot, Xfer, XferVersion};

const DOCK_DATA_VERSION: XferVersion = 1;
const DOCK_STATE_VERSION: XferVersion = 1;

/// States of the dock machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DockStateId {
    /// Reserve a queue slot and walk to it.
    Approach,
    /// Wait in the queue.
    WaitForClearance,
    /// Move up one slot.
    AdvancePosition,
    /// Walk to the entry point.
    MoveToEntry,
    /// Walk to the dock position.
    MoveToDock,
    /// Be served.
    ProcessDock,
    /// Leave through the exit.
    MoveToExit,
    /// Gather at the rally point.
    MoveToRally,
}

/// Data shared by the dock states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockData {
    /// Current queue slot, `-1` once inside.
    pub approach_slot: i32,
    /// Whether the docker holds a claim on the dock.
    pub reservation_held: bool,
    /// Cached drone produced by the docker.
    pub drone_id: Option<ObjectId>,
}

impl Default for DockData {
    fn default() -> Self {
        Self {
            approach_slot: -1,
            reservation_held: false,
            drone_id: None,
        }
    }
}

impl Snapshot for DockData {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = DOCK_DATA_VERSION;
        xfer.xfer_version(&mut version, DOCK_DATA_VERSION, "dock_data")?;
        xfer.xfer(&mut self.approach_slot)?;
        xfer.xfer(&mut self.reservation_held)?;
        xfer.xfer(&mut self.drone_id)
    }
}

type DockCore = CoreOf<DockState>;

/// Run `f` against the goal dock, if it still exists.
fn with_dock<R>(
    core: &DockCore,
    ctx: &mut AiContext<'_>,
    f: impl FnOnce(&mut dyn Dock, ObjectId) -> R,
) -> Option<R> {
    let id = core.resolved_goal_object(ctx)?;
    let owner = ctx.owner;
    let dock = ctx.world.dock(id)?;
    Some(f(dock, owner))
}

/// `None` when the dock is gone.
fn dock_open(core: &DockCore, ctx: &mut AiContext<'_>) -> Option<bool> {
    with_dock(core, ctx, |dock, _| dock.is_dock_open())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Cancel,
    ExitReached,
}

/// Release the claim if one is held.
fn release(core: &mut DockCore, ctx: &mut AiContext<'_>, how: Release) {
    if !core.data.reservation_held {
        return;
    }
    core.data.reservation_held = false;
    tracing::debug!(owner = ctx.owner, dock = ?core.goal_object(), ?how, "dock reservation released");
    with_dock(core, ctx, |dock, owner| match how {
        Release::Cancel => dock.cancel_dock(owner),
        Release::ExitReached => dock.on_exit_reached(owner),
    });
}

/// Shared exit handling for states that only notify on a clean exit.
///
/// Destroyed exits stay silent; the halt hook has already released. A
/// docker without a claim has nothing to report.
fn exit_notify(
    core: &mut DockCore,
    ctx: &mut AiContext<'_>,
    exit: ExitType,
    notify: fn(&mut dyn Dock, ObjectId),
) {
    match exit {
        ExitType::Destroyed => {}
        ExitType::Reset => release(core, ctx, Release::Cancel),
        ExitType::Normal => match dock_open(core, ctx) {
            Some(true) => {
                if core.data.reservation_held {
                    with_dock(core, ctx, notify);
                }
            }
            Some(false) => release(core, ctx, Release::Cancel),
            None => {}
        },
    }
}

/// Missing dock fails; closed dock cancels and fails.
fn require_open_dock(core: &mut DockCore, ctx: &mut AiContext<'_>) -> Option<StateStatus> {
    match dock_open(core, ctx) {
        None => Some(StateStatus::Failure),
        Some(false) => {
            release(core, ctx, Release::Cancel);
            Some(StateStatus::Failure)
        }
        Some(true) => None,
    }
}

fn ignore_dock_if_passthrough(core: &DockCore, ctx: &mut AiContext<'_>, mover: &mut MoveTo) {
    if with_dock(core, ctx, |dock, _| dock.allows_passthrough()).unwrap_or(false) {
        mover.set_ignored_obstacle(core.goal_object());
    }
}

fn able_to_advance(core: &mut DockCore, ctx: &mut AiContext<'_>) -> bool {
    let slot = core.data.approach_slot;
    with_dock(core, ctx, |dock, owner| dock.is_clear_to_advance(owner, slot)).unwrap_or(false)
}

/// The drone produced by the docker, from the cache or a scan.
fn find_my_drone(core: &mut DockCore, ctx: &AiContext<'_>) -> Option<ObjectId> {
    if let Some(id) = core.data.drone_id.filter(|&id| ctx.world.is_alive(id)) {
        return Some(id);
    }
    let owner = ctx.owner;
    let drone = ctx
        .world
        .controlled_objects(owner)
        .into_iter()
        .find(|&id| ctx.world.is_drone(id) && ctx.world.producer_of(id) == Some(owner));
    core.data.drone_id = drone;
    drone
}

/// Reserve or advance in the queue, then walk to the slot.
fn queue_enter(
    mover: &mut MoveTo,
    core: &mut DockCore,
    ctx: &mut AiContext<'_>,
    advance: bool,
) -> StateStatus {
    if let Some(status) = require_open_dock(core, ctx) {
        return status;
    }
    let current = core.data.approach_slot;
    let slot = with_dock(core, ctx, |dock, owner| {
        if advance {
            dock.advance_approach_position(owner, current)
        } else {
            dock.reserve_approach_position(owner)
        }
    })
    .flatten();
    let Some(slot) = slot else {
        tracing::debug!(owner = ctx.owner, advance, "dock refused a queue slot");
        return StateStatus::Failure;
    };
    if !advance {
        tracing::debug!(owner = ctx.owner, dock = ?core.goal_object(), slot = slot.index, "dock reservation taken");
    }
    core.data.reservation_held = true;
    core.data.approach_slot = slot.index;
    mover.begin(slot.position, ctx)
}

/// Dock check then walk.
fn walk_update(mover: &mut MoveTo, core: &mut DockCore, ctx: &mut AiContext<'_>) -> StateStatus {
    match dock_open(core, ctx) {
        Some(true) => mover.tick(ctx),
        Some(false) | None => StateStatus::Failure,
    }
}

/// The dock machine's states.
#[derive(Debug, Clone)]
pub enum DockState {
    /// Reserve a slot and walk to it.
    Approach(MoveTo),
    /// Wait in the queue.
    WaitForClearance {
        /// Frame the wait began.
        entered_frame: u32,
    },
    /// Move up one slot.
    AdvancePosition(MoveTo),
    /// Walk to the entry point.
    MoveToEntry(MoveTo),
    /// Walk to the dock position, locked.
    MoveToDock {
        /// Walking.
        mover: MoveTo,
        /// Whether this entry took the lock.
        locked: bool,
    },
    /// Be served, locked.
    ProcessDock {
        /// Frame of the next dock action.
        next_action_frame: u32,
        /// Whether this entry took the lock.
        locked: bool,
    },
    /// Leave through the exit.
    MoveToExit(MoveTo),
    /// Walk to the rally point.
    MoveToRally(MoveTo),
}

impl State for DockState {
    type Id = DockStateId;
    type Data = DockData;

    fn id(&self) -> DockStateId {
        match self {
            Self::Approach(_) => DockStateId::Approach,
            Self::WaitForClearance { .. } => DockStateId::WaitForClearance,
            Self::AdvancePosition(_) => DockStateId::AdvancePosition,
            Self::MoveToEntry(_) => DockStateId::MoveToEntry,
            Self::MoveToDock { .. } => DockStateId::MoveToDock,
            Self::ProcessDock { .. } => DockStateId::ProcessDock,
            Self::MoveToExit(_) => DockStateId::MoveToExit,
            Self::MoveToRally(_) => DockStateId::MoveToRally,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Approach(_) => "AIDockApproach",
            Self::WaitForClearance { .. } => "AIDockWaitForClearance",
            Self::AdvancePosition(_) => "AIDockAdvancePosition",
            Self::MoveToEntry(_) => "AIDockMoveToEntry",
            Self::MoveToDock { .. } => "AIDockMoveToDock",
            Self::ProcessDock { .. } => "AIDockProcessDock",
            Self::MoveToExit(_) => "AIDockMoveToExit",
            Self::MoveToRally(_) => "AIDockMoveToRally",
        }
    }

    fn on_enter(&mut self, core: &mut DockCore, ctx: &mut AiContext<'_>) -> StateStatus {
        match self {
            Self::Approach(mover) => queue_enter(mover, core, ctx, false),
            Self::AdvancePosition(mover) => queue_enter(mover, core, ctx, true),
            Self::WaitForClearance { entered_frame } => {
                *entered_frame = ctx.now();
                require_open_dock(core, ctx).unwrap_or(StateStatus::Continue)
            }
            Self::MoveToEntry(mover) => {
                if let Some(status) = require_open_dock(core, ctx) {
                    return status;
                }
                let Some(pos) = with_dock(core, ctx, |dock, owner| dock.enter_position(owner)) else {
                    return StateStatus::Failure;
                };
                core.data.approach_slot = -1;
                ignore_dock_if_passthrough(core, ctx, mover);
                mover.begin(pos, ctx)
            }
            Self::MoveToDock { mover, locked } => {
                if let Some(status) = require_open_dock(core, ctx) {
                    return status;
                }
                let Some(pos) = with_dock(core, ctx, |dock, owner| dock.dock_position(owner)) else {
                    return StateStatus::Failure;
                };
                core.lock("moving into dock");
                *locked = true;
                ignore_dock_if_passthrough(core, ctx, mover);
                mover.begin(pos, ctx)
            }
            Self::ProcessDock {
                next_action_frame,
                locked,
            } => {
                core.lock("processing dock");
                *locked = true;
                let Some(dock_id) = core.resolved_goal_object(ctx) else {
                    return StateStatus::Success;
                };
                *next_action_frame = ctx.now().saturating_add(ctx.world.dock_action_delay(ctx.owner, dock_id));
                StateStatus::Continue
            }
            Self::MoveToExit(mover) => {
                let Some(pos) = with_dock(core, ctx, |dock, owner| dock.exit_position(owner)) else {
                    return StateStatus::Failure;
                };
                ignore_dock_if_passthrough(core, ctx, mover);
                mover.begin(pos, ctx)
            }
            Self::MoveToRally(mover) => {
                let rally = with_dock(core, ctx, |dock, owner| dock.rally_point(owner)).flatten();
                match rally {
                    Some(pos) => mover.begin(pos, ctx),
                    None => StateStatus::Success,
                }
            }
        }
    }

    fn update(&mut self, core: &mut DockCore, ctx: &mut AiContext<'_>) -> StateStatus {
        match self {
            Self::Approach(mover)
            | Self::AdvancePosition(mover)
            | Self::MoveToEntry(mover)
            | Self::MoveToDock { mover, .. } => walk_update(mover, core, ctx),
            Self::WaitForClearance { entered_frame } => {
                if let Some(status) = require_open_dock(core, ctx) {
                    return status;
                }
                let clear = with_dock(core, ctx, |dock, owner| dock.is_clear_to_enter(owner));
                if clear == Some(true) {
                    return StateStatus::Success;
                }
                if ctx.now().saturating_sub(*entered_frame) > ctx.tuning.dock_clearance_timeout_frames {
                    tracing::debug!(owner = ctx.owner, frame = ctx.now(), "gave up waiting for dock clearance");
                    return StateStatus::Failure;
                }
                StateStatus::Continue
            }
            Self::ProcessDock {
                next_action_frame, ..
            } => {
                let Some(dock_id) = core.resolved_goal_object(ctx) else {
                    return StateStatus::Success;
                };
                if dock_open(core, ctx) != Some(true) {
                    return StateStatus::Success;
                }
                let now = ctx.now();
                if now < *next_action_frame {
                    return StateStatus::Continue;
                }
                *next_action_frame = now.saturating_add(ctx.world.dock_action_delay(ctx.owner, dock_id));
                let drone = find_my_drone(core, ctx);
                let busy = with_dock(core, ctx, |dock, owner| dock.action(owner, drone)).unwrap_or(false);
                if busy {
                    StateStatus::Continue
                } else {
                    StateStatus::Success
                }
            }
            Self::MoveToExit(mover) => {
                if core.resolved_goal_object(ctx).is_none() {
                    return StateStatus::Failure;
                }
                mover.tick(ctx)
            }
            Self::MoveToRally(mover) => mover.tick(ctx),
        }
    }

    fn on_exit(&mut self, core: &mut DockCore, ctx: &mut AiContext<'_>, exit: ExitType) {
        match self {
            Self::Approach(mover) | Self::AdvancePosition(mover) => {
                mover.end(ctx);
                exit_notify(core, ctx, exit, |dock, owner| dock.on_approach_reached(owner));
            }
            Self::WaitForClearance { .. } => {
                let closed = dock_open(core, ctx) == Some(false);
                if exit == ExitType::Reset || (exit == ExitType::Normal && closed) {
                    release(core, ctx, Release::Cancel);
                }
            }
            Self::MoveToEntry(mover) => {
                mover.end(ctx);
                exit_notify(core, ctx, exit, |dock, owner| dock.on_enter_reached(owner));
            }
            Self::MoveToDock { mover, locked } => {
                mover.end(ctx);
                exit_notify(core, ctx, exit, |dock, owner| dock.on_dock_reached(owner));
                if std::mem::take(locked) {
                    core.unlock();
                }
            }
            Self::ProcessDock { locked, .. } => {
                if std::mem::take(locked) {
                    core.unlock();
                }
            }
            Self::MoveToExit(mover) => {
                mover.end(ctx);
                let how = if exit == ExitType::Normal {
                    Release::ExitReached
                } else {
                    Release::Cancel
                };
                release(core, ctx, how);
            }
            Self::MoveToRally(mover) => mover.end(ctx),
        }
    }

    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = DOCK_STATE_VERSION;
        xfer.xfer_version(&mut version, DOCK_STATE_VERSION, "dock_state")?;
        match self {
            Self::Approach(mover)
            | Self::AdvancePosition(mover)
            | Self::MoveToEntry(mover)
            | Self::MoveToExit(mover)
            | Self::MoveToRally(mover) => mover.xfer(xfer),
            Self::WaitForClearance { entered_frame } => xfer.xfer(entered_frame),
            Self::MoveToDock { mover, locked } => {
                xfer.xfer(locked)?;
                mover.xfer(xfer)
            }
            Self::ProcessDock {
                next_action_frame,
                locked,
            } => {
                xfer.xfer(locked)?;
                xfer.xfer(next_action_frame)
            }
        }
    }

    fn load_post_process(&mut self, core: &mut DockCore, ctx: &mut AiContext<'_>) {
        if let Self::ProcessDock {
            next_action_frame, ..
        } = self
        {
            // No action on the reload frame.
            let delay = core
                .resolved_goal_object(ctx)
                .map_or(0, |dock| ctx.world.dock_action_delay(ctx.owner, dock));
            *next_action_frame = ctx.now().saturating_add(delay);
        }
    }

    fn on_halt(core: &mut DockCore, ctx: &mut AiContext<'_>) {
        release(core, ctx, Release::Cancel);
    }
}

/// Queue, enter, get served and leave one dock.
pub struct AiDockMachine {
    machine: StateMachine<DockState>,
}

impl AiDockMachine {
    /// Machine docking with `dock`.
    #[must_use]
    pub fn new(dock: ObjectId) -> Self {
        use DockStateId as Id;
        let mut machine = StateMachine::new("AIDockMachine", DockData::default());
        let to = Target::State;
        let walker = || MoveTo::new(false);

        machine
            .define_state(
                DockState::Approach(walker()),
                to(Id::WaitForClearance),
                Target::ExitFailure,
                Vec::new(),
            )
            .define_state(
                DockState::WaitForClearance { entered_frame: 0 },
                to(Id::MoveToEntry),
                Target::ExitFailure,
                vec![Condition::new(
                    "able to advance",
                    able_to_advance,
                    to(Id::AdvancePosition),
                )],
            )
            .define_state(
                DockState::AdvancePosition(walker()),
                to(Id::WaitForClearance),
                Target::ExitFailure,
                Vec::new(),
            )
            .define_state(
                DockState::MoveToEntry(walker()),
                to(Id::MoveToDock),
                to(Id::MoveToExit),
                Vec::new(),
            )
            .define_state(
                DockState::MoveToDock {
                    mover: walker(),
                    locked: false,
                },
                to(Id::ProcessDock),
                to(Id::MoveToExit),
                Vec::new(),
            )
            .define_state(
                DockState::ProcessDock {
                    next_action_frame: 0,
                    locked: false,
                },
                to(Id::MoveToExit),
                to(Id::MoveToExit),
                Vec::new(),
            )
            .define_state(
                DockState::MoveToExit(walker()),
                to(Id::MoveToRally),
                Target::ExitFailure,
                Vec::new(),
            )
            .define_state(
                DockState::MoveToRally(walker()),
                Target::ExitSuccess,
                Target::ExitFailure,
                Vec::new(),
            );
        machine.core_mut().set_goal_object(Some(dock));
        Self { machine }
    }

    /// Enter the approach.
    pub fn init(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        let status = self
            .machine
            .init_default_state(ctx)
            .unwrap_or(StateStatus::Failure);
        self.release_if_finished(status, ctx);
        status
    }

    /// Run one tick.
    pub fn update(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        let status = self.machine.update_state_machine(ctx);
        self.release_if_finished(status, ctx);
        status
    }

    /// A machine that gave up does not keep its place in the queue.
    fn release_if_finished(&mut self, status: StateStatus, ctx: &mut AiContext<'_>) {
        if !status.is_running() {
            release(self.machine.core_mut(), ctx, Release::Cancel);
        }
    }

    /// Tear down, cancelling any held reservation.
    pub fn halt(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.halt(ctx);
    }

    /// The dock.
    #[must_use]
    pub fn dock(&self) -> Option<ObjectId> {
        self.machine.core().goal_object()
    }

    /// Current state.
    #[must_use]
    pub fn current_state_id(&self) -> Option<DockStateId> {
        self.machine.current_state_id()
    }

    /// Shared data.
    #[must_use]
    pub fn data(&self) -> &DockData {
        self.machine.data()
    }

    /// The engine, for inspection.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<DockState> {
        &self.machine
    }

    /// The engine, for external resets.
    pub fn machine_mut(&mut self) -> &mut StateMachine<DockState> {
        &mut self.machine
    }

    /// Transition table.
    #[must_use]
    pub fn describe(&self) -> Vec<TransitionRow> {
        self.machine.describe()
    }

    /// Re-resolve world references after a load.
    pub fn load_post_process(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.load_post_process(ctx);
    }
}

impl Snapshot for AiDockMachine {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        self.machine.xfer(xfer)
    }
}
