//! The top-level unit AI.
//!
//! [`AiStateMachine`] is what the simulation object owns. Orders set a goal
//! and select a state; every state falls back to IDLE when it finishes.
//! Guarding and docking run nested machines that live only while their
//! state is current.

use serde::{Deserialize, Serialize};

use crate::attack::AttackBehavior;
use crate::context::{AiContext, AttackTarget, ObjectId, SquadId, WaypointId};
use crate::dock::AiDockMachine;
use crate::error::Result;
use crate::guard::{AiGuardMachine, GuardMode, GuardTarget};
use crate::machine::{
    xfer_stateless, CoreOf, ExitType, State, StateMachine, StateStatus, Target, TransitionRow,
};
use crate::math::Vec2Fixed;
use crate::movement::MoveTo;
use crate::xfer::{Snapshot, Xfer, XferVersion};

const AI_DATA_VERSION: XferVersion = 1;
const AI_STATE_VERSION: XferVersion = 1;

/// States of the unit AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AiStateId {
    /// No orders; scan for enemies.
    Idle,
    /// Walk to the goal position.
    MoveTo,
    /// Walk the goal path.
    FollowPath,
    /// Walk a waypoint chain.
    FollowWaypoints,
    /// Do nothing for a while.
    Wait,
    /// Attack the goal object.
    AttackObject,
    /// Attack the goal position.
    AttackPosition,
    /// Attack every member of the goal squad.
    AttackSquad,
    /// Run the guard machine.
    Guard,
    /// Run the dock machine.
    Dock,
    /// Controlled from outside.
    Busy,
}

/// Goals beyond the core's object and position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiData {
    /// Points of the goal path, in order.
    pub goal_path: Vec<Vec2Fixed>,
    /// First waypoint of the goal chain.
    pub goal_waypoint: Option<WaypointId>,
    /// Goal squad.
    pub goal_squad: Option<SquadId>,
    /// Guard orders.
    pub guard: Option<(GuardTarget, GuardMode)>,
    /// Frame at which WAIT ends, forever if unset.
    pub wait_until: Option<u32>,
}

impl Snapshot for AiData {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = AI_DATA_VERSION;
        xfer.xfer_version(&mut version, AI_DATA_VERSION, "ai_data")?;
        xfer.xfer(&mut self.goal_path)?;
        xfer.xfer(&mut self.goal_waypoint)?;
        xfer.xfer(&mut self.goal_squad)?;
        xfer.xfer(&mut self.guard)?;
        xfer.xfer(&mut self.wait_until)
    }
}

type AiCore = CoreOf<AiState>;

/// Walk a list of points, one leg at a time.
#[derive(Debug, Clone, Default)]
pub struct PathWalker {
    mover: MoveTo,
    index: usize,
}

/// Walk a waypoint chain resolved through the world.
#[derive(Debug, Clone, Default)]
pub struct WaypointWalker {
    mover: MoveTo,
    current: Option<WaypointId>,
}

/// Attack whichever squad member is still standing.
#[derive(Default)]
pub struct SquadAttack {
    attack: AttackBehavior,
    victim: Option<ObjectId>,
}

impl SquadAttack {
    fn engage_next(&mut self, core: &AiCore, ctx: &mut AiContext<'_>) -> StateStatus {
        let next = core.data.goal_squad.and_then(|squad| {
            ctx.world
                .squad_members(squad)
                .into_iter()
                .find(|&id| ctx.world.is_alive(id))
        });
        self.victim = next;
        match next {
            Some(id) => self.attack.enter(AttackTarget::Object(id), false, ctx),
            None => StateStatus::Success,
        }
    }
}

fn wait_status(core: &AiCore, now: u32) -> StateStatus {
    match core.data.wait_until {
        None => StateStatus::Continue,
        Some(until) if now >= until => StateStatus::Success,
        Some(until) => StateStatus::Sleep(until - now),
    }
}

/// The unit AI's states.
pub enum AiState {
    /// Scan for enemies between sleeps.
    Idle {
        /// Frame of the next scan.
        next_scan_frame: u32,
    },
    /// Walk to the goal position.
    MoveTo(MoveTo),
    /// Walk the goal path.
    FollowPath(PathWalker),
    /// Walk the waypoint chain.
    FollowWaypoints(WaypointWalker),
    /// Wait.
    Wait,
    /// Attack the goal object.
    AttackObject(AttackBehavior),
    /// Attack the goal position.
    AttackPosition(AttackBehavior),
    /// Attack the goal squad.
    AttackSquad(SquadAttack),
    /// Guard; the machine exists only while this state is current.
    Guard(Option<Box<AiGuardMachine>>),
    /// Dock; the machine exists only while this state is current.
    Dock(Option<Box<AiDockMachine>>),
    /// Externally controlled.
    Busy,
}

impl State for AiState {
    type Id = AiStateId;
    type Data = AiData;

    fn id(&self) -> AiStateId {
        match self {
            Self::Idle { .. } => AiStateId::Idle,
            Self::MoveTo(_) => AiStateId::MoveTo,
            Self::FollowPath(_) => AiStateId::FollowPath,
            Self::FollowWaypoints(_) => AiStateId::FollowWaypoints,
            Self::Wait => AiStateId::Wait,
            Self::AttackObject(_) => AiStateId::AttackObject,
            Self::AttackPosition(_) => AiStateId::AttackPosition,
            Self::AttackSquad(_) => AiStateId::AttackSquad,
            Self::Guard(_) => AiStateId::Guard,
            Self::Dock(_) => AiStateId::Dock,
            Self::Busy => AiStateId::Busy,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "AIIdleState",
            Self::MoveTo(_) => "AIMoveToState",
            Self::FollowPath(_) => "AIFollowPathState",
            Self::FollowWaypoints(_) => "AIFollowWaypointPathState",
            Self::Wait => "AIWaitState",
            Self::AttackObject(_) => "AIAttackState",
            Self::AttackPosition(_) => "AIAttackPositionState",
            Self::AttackSquad(_) => "AIAttackSquadState",
            Self::Guard(_) => "AIGuardState",
            Self::Dock(_) => "AIDockState",
            Self::Busy => "AIBusyState",
        }
    }

    fn on_enter(&mut self, core: &mut AiCore, ctx: &mut AiContext<'_>) -> StateStatus {
        let now = ctx.now();
        match self {
            Self::Idle { next_scan_frame } => {
                let rate = ctx.tuning.idle_scan_rate.max(1);
                let stagger = u32::try_from(ctx.owner % u64::from(rate)).unwrap_or(0);
                *next_scan_frame = now.saturating_add(stagger);
                if stagger == 0 {
                    StateStatus::Continue
                } else {
                    StateStatus::Sleep(stagger)
                }
            }
            Self::MoveTo(mover) => mover.begin(core.goal_position(), ctx),
            Self::FollowPath(walker) => {
                walker.index = 0;
                match core.data.goal_path.first() {
                    Some(&first) => walker.mover.begin(first, ctx),
                    None => StateStatus::Success,
                }
            }
            Self::FollowWaypoints(walker) => {
                walker.current = core.data.goal_waypoint;
                let Some(waypoint) = walker.current.and_then(|id| ctx.world.waypoint(id)) else {
                    return StateStatus::Failure;
                };
                walker.mover.begin(waypoint.position, ctx)
            }
            Self::Wait => wait_status(core, now),
            Self::AttackObject(attack) => match core.resolved_goal_object(ctx) {
                Some(id) => attack.enter(AttackTarget::Object(id), false, ctx),
                None => StateStatus::Failure,
            },
            Self::AttackPosition(attack) => {
                attack.enter(AttackTarget::Position(core.goal_position()), true, ctx)
            }
            Self::AttackSquad(squad) => squad.engage_next(core, ctx),
            Self::Guard(slot) => {
                let Some((target, mode)) = core.data.guard else {
                    return StateStatus::Failure;
                };
                let mut guard = Box::new(AiGuardMachine::new(target, mode));
                let status = guard.init(ctx).sleep_as_continue();
                *slot = Some(guard);
                status
            }
            Self::Dock(slot) => {
                let Some(dock_id) = core.resolved_goal_object(ctx) else {
                    return StateStatus::Failure;
                };
                let mut dock = Box::new(AiDockMachine::new(dock_id));
                let status = dock.init(ctx).sleep_as_continue();
                *slot = Some(dock);
                status
            }
            Self::Busy => StateStatus::Continue,
        }
    }

    fn update(&mut self, core: &mut AiCore, ctx: &mut AiContext<'_>) -> StateStatus {
        let now = ctx.now();
        match self {
            Self::Idle { next_scan_frame } => {
                if now < *next_scan_frame {
                    return StateStatus::Sleep(*next_scan_frame - now);
                }
                let rate = ctx.tuning.idle_scan_rate.max(1);
                *next_scan_frame = now.saturating_add(rate);
                let vision = ctx.world.vision_range(ctx.owner);
                let enemy = ctx
                    .world
                    .closest_enemy(ctx.owner, ctx.owner_position(), vision, false);
                if let Some(enemy) = enemy {
                    tracing::debug!(owner = ctx.owner, enemy, frame = now, "idle unit acquired a target");
                    core.set_goal_object(Some(enemy));
                    core.request_state(AiStateId::AttackObject);
                    return StateStatus::Continue;
                }
                StateStatus::Sleep(rate)
            }
            Self::MoveTo(mover) => mover.tick(ctx),
            Self::FollowPath(walker) => match walker.mover.tick(ctx) {
                StateStatus::Success => {
                    walker.index += 1;
                    match core.data.goal_path.get(walker.index) {
                        Some(&next) => walker.mover.begin(next, ctx),
                        None => StateStatus::Success,
                    }
                }
                status => status,
            },
            Self::FollowWaypoints(walker) => match walker.mover.tick(ctx) {
                StateStatus::Success => {
                    let next = walker
                        .current
                        .and_then(|id| ctx.world.waypoint(id))
                        .and_then(|w| w.next);
                    walker.current = next;
                    match next.and_then(|id| ctx.world.waypoint(id)) {
                        Some(waypoint) => walker.mover.begin(waypoint.position, ctx),
                        None => StateStatus::Success,
                    }
                }
                status => status,
            },
            Self::Wait => wait_status(core, now),
            Self::AttackObject(attack) | Self::AttackPosition(attack) => attack.update(None, ctx),
            Self::AttackSquad(squad) => {
                let status = squad.attack.update(None, ctx);
                if status.is_running() {
                    return status;
                }
                squad.engage_next(core, ctx)
            }
            Self::Guard(slot) => match slot.as_mut() {
                Some(guard) => guard.update(ctx).sleep_as_continue(),
                None => StateStatus::Failure,
            },
            Self::Dock(slot) => match slot.as_mut() {
                Some(dock) => dock.update(ctx).sleep_as_continue(),
                None => StateStatus::Failure,
            },
            Self::Busy => StateStatus::Continue,
        }
    }

    fn on_exit(&mut self, _core: &mut AiCore, ctx: &mut AiContext<'_>, _exit: ExitType) {
        match self {
            Self::MoveTo(mover) => mover.end(ctx),
            Self::FollowPath(walker) => walker.mover.end(ctx),
            Self::FollowWaypoints(walker) => walker.mover.end(ctx),
            Self::AttackObject(attack) | Self::AttackPosition(attack) => attack.exit(ctx),
            Self::AttackSquad(squad) => {
                squad.attack.exit(ctx);
                squad.victim = None;
            }
            Self::Guard(slot) => {
                if let Some(mut guard) = slot.take() {
                    guard.halt(ctx);
                }
            }
            Self::Dock(slot) => {
                if let Some(mut dock) = slot.take() {
                    dock.halt(ctx);
                }
            }
            Self::Idle { .. } | Self::Wait | Self::Busy => {}
        }
    }

    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = AI_STATE_VERSION;
        xfer.xfer_version(&mut version, AI_STATE_VERSION, "ai_state")?;
        match self {
            Self::Idle { next_scan_frame } => xfer.xfer(next_scan_frame),
            Self::MoveTo(mover) => mover.xfer(xfer),
            Self::FollowPath(walker) => {
                let mut index = u32::try_from(walker.index).unwrap_or(u32::MAX);
                xfer.xfer(&mut index)?;
                walker.index = index as usize;
                walker.mover.xfer(xfer)
            }
            Self::FollowWaypoints(walker) => {
                xfer.xfer(&mut walker.current)?;
                walker.mover.xfer(xfer)
            }
            Self::Wait | Self::Busy => xfer_stateless(xfer, "ai_state"),
            Self::AttackObject(attack) | Self::AttackPosition(attack) => attack.xfer(xfer),
            Self::AttackSquad(squad) => {
                xfer.xfer(&mut squad.victim)?;
                squad.attack.xfer(xfer)
            }
            Self::Guard(slot) => {
                let mut shape = slot.as_ref().map(|g| (g.data().target, g.data().mode));
                xfer.xfer(&mut shape)?;
                if xfer.is_loading() {
                    *slot = shape.map(|(target, mode)| Box::new(AiGuardMachine::new(target, mode)));
                }
                match slot.as_mut() {
                    Some(guard) => guard.xfer(xfer),
                    None => Ok(()),
                }
            }
            Self::Dock(slot) => {
                let mut shape = slot.as_ref().and_then(|d| d.dock());
                xfer.xfer(&mut shape)?;
                if xfer.is_loading() {
                    *slot = shape.map(|dock| Box::new(AiDockMachine::new(dock)));
                }
                match slot.as_mut() {
                    Some(dock) => dock.xfer(xfer),
                    None => Ok(()),
                }
            }
        }
    }

    fn load_post_process(&mut self, _core: &mut AiCore, ctx: &mut AiContext<'_>) {
        match self {
            Self::AttackObject(attack) | Self::AttackPosition(attack) => attack.load_post_process(ctx),
            Self::AttackSquad(squad) => squad.attack.load_post_process(ctx),
            Self::Guard(Some(guard)) => guard.load_post_process(ctx),
            Self::Dock(Some(dock)) => dock.load_post_process(ctx),
            _ => {}
        }
    }
}

/// A unit's AI.
pub struct AiStateMachine {
    machine: StateMachine<AiState>,
}

impl Default for AiStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AiStateMachine {
    /// Build the unit AI. IDLE is the default state.
    #[must_use]
    pub fn new() -> Self {
        let idle = Target::State(AiStateId::Idle);
        let mut machine = StateMachine::new("AIStateMachine", AiData::default());
        let states = [
            AiState::Idle { next_scan_frame: 0 },
            AiState::MoveTo(MoveTo::new(true)),
            AiState::FollowPath(PathWalker::default()),
            AiState::FollowWaypoints(WaypointWalker::default()),
            AiState::Wait,
            AiState::AttackObject(AttackBehavior::new()),
            AiState::AttackPosition(AttackBehavior::new()),
            AiState::AttackSquad(SquadAttack::default()),
            AiState::Guard(None),
            AiState::Dock(None),
            AiState::Busy,
        ];
        for state in states {
            machine.define_state(state, idle, idle, Vec::new());
        }
        Self { machine }
    }

    /// Enter IDLE.
    ///
    /// # Errors
    ///
    /// Fails if already initialized.
    pub fn init(&mut self, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        self.machine.init_default_state(ctx)
    }

    /// Run one tick.
    pub fn update(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.machine.update_state_machine(ctx)
    }

    /// Switch state, respecting the lock.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::set_state`].
    pub fn set_state(&mut self, id: AiStateId, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        self.machine.set_state(id, ctx)
    }

    /// Switch state once the machine is unlocked.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::set_state_deferred`].
    pub fn set_state_deferred(&mut self, id: AiStateId) -> Result<()> {
        self.machine.set_state_deferred(id)
    }

    /// Run `id` for at most `frames` frames on top of the current state.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::set_temporary_state`].
    pub fn set_temporary_state(
        &mut self,
        id: AiStateId,
        frames: u32,
        ctx: &mut AiContext<'_>,
    ) -> Result<StateStatus> {
        self.machine.set_temporary_state(id, frames, ctx)
    }

    /// Leave the current state.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::clear`].
    pub fn clear(&mut self, ctx: &mut AiContext<'_>) -> Result<()> {
        self.machine.clear(ctx)
    }

    /// Back to IDLE.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::reset_to_default_state`].
    pub fn reset_to_default_state(&mut self, ctx: &mut AiContext<'_>) -> Result<StateStatus> {
        self.machine.reset_to_default_state(ctx)
    }

    /// Tear down, including nested machines.
    pub fn halt(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.halt(ctx);
    }

    fn goals_locked(&self, what: &'static str) -> bool {
        let locked = self.machine.is_locked();
        if locked {
            tracing::warn!(machine = self.machine.name(), what, "goal change ignored while locked");
        }
        locked
    }

    /// Set the goal object.
    pub fn set_goal_object(&mut self, id: Option<ObjectId>) {
        self.machine.core_mut().set_goal_object(id);
    }

    /// Goal object id.
    #[must_use]
    pub fn goal_object(&self) -> Option<ObjectId> {
        self.machine.core().goal_object()
    }

    /// Set the goal position.
    pub fn set_goal_position(&mut self, pos: Vec2Fixed) {
        self.machine.core_mut().set_goal_position(pos);
    }

    /// Goal position.
    #[must_use]
    pub fn goal_position(&self) -> Vec2Fixed {
        self.machine.core().goal_position()
    }

    /// Replace the goal path.
    pub fn set_goal_path(&mut self, path: Vec<Vec2Fixed>) {
        if !self.goals_locked("goal path") {
            self.machine.data_mut().goal_path = path;
        }
    }

    /// Append a point to the goal path, skipping a repeat of the last one.
    pub fn add_to_goal_path(&mut self, pos: Vec2Fixed) {
        if self.goals_locked("goal path") {
            return;
        }
        let path = &mut self.machine.data_mut().goal_path;
        if path.last() != Some(&pos) {
            path.push(pos);
        }
    }

    /// A point of the goal path.
    #[must_use]
    pub fn goal_path_position(&self, index: usize) -> Option<Vec2Fixed> {
        self.machine.data().goal_path.get(index).copied()
    }

    /// Number of goal path points.
    #[must_use]
    pub fn goal_path_len(&self) -> usize {
        self.machine.data().goal_path.len()
    }

    /// Set the first waypoint.
    pub fn set_goal_waypoint(&mut self, id: Option<WaypointId>) {
        if !self.goals_locked("goal waypoint") {
            self.machine.data_mut().goal_waypoint = id;
        }
    }

    /// Set the goal squad.
    pub fn set_goal_squad(&mut self, id: Option<SquadId>) {
        if !self.goals_locked("goal squad") {
            self.machine.data_mut().goal_squad = id;
        }
    }

    /// Set guard orders for the next GUARD.
    pub fn set_guard_order(&mut self, target: GuardTarget, mode: GuardMode) {
        if !self.goals_locked("guard order") {
            self.machine.data_mut().guard = Some((target, mode));
        }
    }

    /// Set when WAIT ends.
    pub fn set_wait_until(&mut self, frame: Option<u32>) {
        if !self.goals_locked("wait") {
            self.machine.data_mut().wait_until = frame;
        }
    }

    /// Current state.
    #[must_use]
    pub fn current_state_id(&self) -> Option<AiStateId> {
        self.machine.current_state_id()
    }

    /// Whether the unit is fighting, directly or through its guard.
    #[must_use]
    pub fn is_attack(&self) -> bool {
        match self.machine.current_state() {
            Some(AiState::AttackObject(attack) | AiState::AttackPosition(attack)) => {
                attack.is_attacking()
            }
            Some(AiState::AttackSquad(squad)) => squad.attack.is_attacking(),
            Some(AiState::Guard(Some(guard))) => guard.is_attack(),
            _ => false,
        }
    }

    /// Whether the unit is guarding and its guard idles.
    #[must_use]
    pub fn is_guard_idle(&self) -> bool {
        self.guard_machine().is_some_and(AiGuardMachine::is_idle)
    }

    /// Whether the unit is externally controlled.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.machine.is_in_state(AiStateId::Busy)
    }

    /// Whether the unit is docking.
    #[must_use]
    pub fn is_docking(&self) -> bool {
        self.machine.is_in_state(AiStateId::Dock)
    }

    /// The running guard machine.
    #[must_use]
    pub fn guard_machine(&self) -> Option<&AiGuardMachine> {
        match self.machine.current_state() {
            Some(AiState::Guard(Some(guard))) => Some(guard),
            _ => None,
        }
    }

    /// The running dock machine.
    #[must_use]
    pub fn dock_machine(&self) -> Option<&AiDockMachine> {
        match self.machine.current_state() {
            Some(AiState::Dock(Some(dock))) => Some(dock),
            _ => None,
        }
    }

    /// The engine.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<AiState> {
        &self.machine
    }

    /// The engine, mutably.
    pub fn machine_mut(&mut self) -> &mut StateMachine<AiState> {
        &mut self.machine
    }

    /// Transition table.
    #[must_use]
    pub fn describe(&self) -> Vec<TransitionRow> {
        self.machine.describe()
    }

    /// Checksum of the whole AI, nested machines included.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    pub fn crc(&mut self) -> Result<u64> {
        self.machine.crc()
    }

    /// Save to bytes.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    pub fn to_snapshot_bytes(&mut self) -> Result<Vec<u8>> {
        self.machine.to_snapshot_bytes()
    }

    /// Restore from bytes.
    ///
    /// # Errors
    ///
    /// Propagates snapshot errors.
    pub fn restore_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.machine.restore_from_bytes(bytes)
    }

    /// Re-resolve world references after a load.
    pub fn load_post_process(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.load_post_process(ctx);
    }
}

impl Snapshot for AiStateMachine {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        self.machine.xfer(xfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use crate::testing::Harness;

    #[test]
    fn test_every_state_falls_back_to_idle() {
        let ai = AiStateMachine::new();
        assert!(ai.machine().validate().is_ok());
        let rows = ai.describe();
        assert_eq!(rows.len(), 11);
        assert!(rows[0].is_default);
        assert!(rows.iter().all(|r| r.success == "Idle" && r.failure == "Idle"));
    }

    #[test]
    fn test_goal_path_skips_repeated_point() {
        let mut ai = AiStateMachine::new();
        ai.add_to_goal_path(Vec2Fixed::from_ints(1, 1));
        ai.add_to_goal_path(Vec2Fixed::from_ints(1, 1));
        ai.add_to_goal_path(Vec2Fixed::from_ints(2, 1));
        assert_eq!(ai.goal_path_len(), 2);
        assert_eq!(ai.goal_path_position(1), Some(Vec2Fixed::from_ints(2, 1)));
        assert_eq!(ai.goal_path_position(2), None);
    }

    #[test]
    fn test_follow_path_walks_each_leg() {
        let mut h = Harness::default();
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        ai.set_goal_path(vec![Vec2Fixed::from_ints(10, 0), Vec2Fixed::from_ints(20, 0)]);
        ai.set_state(AiStateId::FollowPath, &mut h.ctx()).unwrap();

        h.pathfinder.remaining = Some(Fixed::ZERO);
        h.advance(1);
        ai.update(&mut h.ctx());
        assert_eq!(ai.current_state_id(), Some(AiStateId::FollowPath));
        h.advance(1);
        ai.update(&mut h.ctx());
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
        assert_eq!(
            h.pathfinder.requests,
            vec![Vec2Fixed::from_ints(10, 0), Vec2Fixed::from_ints(20, 0)]
        );
    }

    #[test]
    fn test_wait_until_frame() {
        let mut h = Harness::default();
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        ai.set_wait_until(Some(4));
        assert_eq!(ai.set_state(AiStateId::Wait, &mut h.ctx()).unwrap(), StateStatus::Sleep(4));
        h.advance(4);
        ai.update(&mut h.ctx());
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
    }

    #[test]
    fn test_wait_deadline_ignored_while_locked() {
        let mut h = Harness::default();
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        ai.set_wait_until(Some(4));
        ai.machine_mut().lock("scripted");
        ai.set_wait_until(Some(90));
        assert_eq!(ai.machine().data().wait_until, Some(4));

        ai.machine_mut().unlock();
        ai.set_wait_until(Some(90));
        assert_eq!(ai.machine().data().wait_until, Some(90));
    }

    #[test]
    fn test_attack_object_without_target_returns_to_idle() {
        let mut h = Harness::default();
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        ai.set_goal_object(Some(77));
        ai.set_state(AiStateId::AttackObject, &mut h.ctx()).unwrap();
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
        assert!(!ai.is_attack());
    }

    #[test]
    fn test_busy_until_redirected() {
        let mut h = Harness::default();
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        ai.set_state(AiStateId::Busy, &mut h.ctx()).unwrap();
        for _ in 0..5 {
            h.advance(1);
            assert_eq!(ai.update(&mut h.ctx()), StateStatus::Continue);
        }
        assert!(ai.is_busy());
    }

    #[test]
    fn test_idle_scan_at_end_of_frame_range() {
        let mut h = Harness::default();
        h.frame = u32::MAX - 1;
        let mut ai = AiStateMachine::new();
        ai.init(&mut h.ctx()).unwrap();
        h.advance(1);
        ai.update(&mut h.ctx());
        ai.update(&mut h.ctx());
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
    }
}
