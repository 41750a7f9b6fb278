//! Guarding an object, a position or an area.
//!
//! The guard walks back to the guard center, idles there scanning for
//! enemies, engages anything inside the inner range and may pursue it as
//! far as the outer range for a limited time. Whoever shoots at the guard
//! is answered first, from any state that carries the `attack aggressors`
//! condition.

use serde::{Deserialize, Serialize};

use crate::attack::{AttackBehavior, ExitConditions};
use crate::context::{AiContext, AttackTarget, ObjectId};
use crate::error::Result;
use crate::machine::{
    Condition, CoreOf, ExitType, State, StateMachine, StateStatus, Target, TransitionRow,
};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::movement::MoveTo;
use crate::xfer::{Snapshot, Xfer, XferVersion};

const GUARD_DATA_VERSION: XferVersion = 1;
const GUARD_STATE_VERSION: XferVersion = 1;

/// States of the guard machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GuardStateId {
    /// Walk back to the guard center.
    Return,
    /// Wait at the guard center.
    Idle,
    /// Engage an enemy inside the inner range.
    Inner,
    /// Pursue out to the outer range.
    Outer,
    /// Pick up a nearby crate.
    GetCrate,
    /// Answer whoever attacked us.
    AttackAggressor,
}

/// How far a guard will go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardMode {
    /// Engage and pursue.
    #[default]
    Normal,
    /// Engage but never leave the inner range.
    WithoutPursuit,
    /// Only engage aircraft.
    FlyingUnitsOnly,
}

/// What is being guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardTarget {
    /// Follow and protect an object.
    Object(ObjectId),
    /// Hold a spot.
    Position(Vec2Fixed),
    /// Hold an area; its radius replaces vision as the inner range.
    Area {
        /// Area center.
        center: Vec2Fixed,
        /// Area radius.
        #[serde(with = "fixed_serde")]
        radius: Fixed,
    },
}

/// Data shared by the guard states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardData {
    /// What is being guarded.
    pub target: GuardTarget,
    /// Pursuit rules.
    pub mode: GuardMode,
    /// The enemy currently engaged.
    pub nemesis: Option<ObjectId>,
    /// Last known guard center. Used when a guarded object vanishes and
    /// to detect drift while idle.
    pub guard_spot: Vec2Fixed,
}

impl GuardData {
    fn new(target: GuardTarget, mode: GuardMode) -> Self {
        let guard_spot = match target {
            GuardTarget::Object(_) => Vec2Fixed::ZERO,
            GuardTarget::Position(pos) => pos,
            GuardTarget::Area { center, .. } => center,
        };
        Self {
            target,
            mode,
            nemesis: None,
            guard_spot,
        }
    }

    /// Current guard center.
    #[must_use]
    pub fn center(&self, ctx: &AiContext<'_>) -> Vec2Fixed {
        match self.target {
            GuardTarget::Object(id) => ctx
                .world
                .position(id)
                .filter(|_| ctx.world.is_alive(id))
                .unwrap_or(self.guard_spot),
            GuardTarget::Position(pos) => pos,
            GuardTarget::Area { center, .. } => center,
        }
    }

    /// Range at which enemies are engaged.
    #[must_use]
    pub fn inner_range(&self, ctx: &AiContext<'_>) -> Fixed {
        self.base_range(ctx)
            .saturating_mul(ctx.tuning.guard_inner_range_factor)
    }

    /// Range up to which enemies are pursued.
    #[must_use]
    pub fn outer_range(&self, ctx: &AiContext<'_>) -> Fixed {
        self.base_range(ctx)
            .saturating_mul(ctx.tuning.guard_outer_range_factor)
    }

    fn base_range(&self, ctx: &AiContext<'_>) -> Fixed {
        match self.target {
            GuardTarget::Area { radius, .. } => radius,
            GuardTarget::Object(_) | GuardTarget::Position(_) => ctx.world.vision_range(ctx.owner),
        }
    }

    fn nemesis_alive(&self, ctx: &AiContext<'_>) -> Option<ObjectId> {
        self.nemesis.filter(|&id| ctx.world.is_alive(id))
    }
}

impl Snapshot for GuardData {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = GUARD_DATA_VERSION;
        xfer.xfer_version(&mut version, GUARD_DATA_VERSION, "guard_data")?;
        xfer.xfer(&mut self.target)?;
        xfer.xfer(&mut self.mode)?;
        xfer.xfer(&mut self.nemesis)?;
        xfer.xfer(&mut self.guard_spot)
    }
}

type GuardCore = CoreOf<GuardState>;

/// Answer the last attacker. The report is only consumed once it is acted on.
fn attack_aggressors(core: &mut GuardCore, ctx: &mut AiContext<'_>) -> bool {
    let owner = ctx.owner;
    let Some(attacker) = ctx.world.last_attacker(owner) else {
        return false;
    };
    let eligible = ctx.world.is_alive(attacker)
        && ctx.world.is_enemy(owner, attacker)
        && ctx.world.can_attack(owner, AttackTarget::Object(attacker))
        && (core.data.mode != GuardMode::FlyingUnitsOnly || ctx.world.is_flying(attacker));
    if !eligible {
        return false;
    }
    ctx.world.take_last_attacker(owner);
    tracing::debug!(owner, attacker, frame = ctx.now(), "guard answering an aggressor");
    core.data.nemesis = Some(attacker);
    true
}

/// Scan the inner range. A hit becomes the nemesis.
fn look_for_inner_target(core: &mut GuardCore, ctx: &AiContext<'_>) -> bool {
    let center = core.data.center(ctx);
    let range = core.data.inner_range(ctx);
    let flying_only = core.data.mode == GuardMode::FlyingUnitsOnly;
    match ctx.world.closest_enemy(ctx.owner, center, range, flying_only) {
        Some(enemy) => {
            core.data.nemesis = Some(enemy);
            true
        }
        None => false,
    }
}

/// An engagement plus the rules that end it.
#[derive(Default)]
pub struct Engagement {
    attack: AttackBehavior,
    exit: ExitConditions,
}

impl Engagement {
    fn begin(&mut self, victim: ObjectId, exit: ExitConditions, ctx: &mut AiContext<'_>) -> StateStatus {
        self.exit = exit;
        self.attack.enter(AttackTarget::Object(victim), false, ctx)
    }

    fn tick(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.attack.update(Some(&self.exit), ctx)
    }

    /// Whether the embedded attack is running.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.attack.is_attacking()
    }

    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        xfer.xfer(&mut self.exit)?;
        self.attack.xfer(xfer)
    }
}

/// The guard machine's states.
pub enum GuardState {
    /// Walk back to the center, scanning on the way.
    Return {
        /// Walking.
        mover: MoveTo,
        /// Frame of the next scan.
        next_scan_frame: u32,
    },
    /// Wait and scan.
    Idle {
        /// Frame of the next scan.
        next_scan_frame: u32,
    },
    /// Fight inside the inner range.
    Inner(Engagement),
    /// Pursue to the outer range.
    Outer(Engagement),
    /// Fetch a crate.
    GetCrate {
        /// Walking.
        mover: MoveTo,
        /// The crate.
        crate_id: Option<ObjectId>,
    },
    /// Fight back.
    AttackAggressor(Engagement),
}

impl State for GuardState {
    type Id = GuardStateId;
    type Data = GuardData;

    fn id(&self) -> GuardStateId {
        match self {
            Self::Return { .. } => GuardStateId::Return,
            Self::Idle { .. } => GuardStateId::Idle,
            Self::Inner(_) => GuardStateId::Inner,
            Self::Outer(_) => GuardStateId::Outer,
            Self::GetCrate { .. } => GuardStateId::GetCrate,
            Self::AttackAggressor(_) => GuardStateId::AttackAggressor,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Return { .. } => "AIGuardReturn",
            Self::Idle { .. } => "AIGuardIdle",
            Self::Inner(_) => "AIGuardInner",
            Self::Outer(_) => "AIGuardOuter",
            Self::GetCrate { .. } => "AIGuardPickUpCrate",
            Self::AttackAggressor(_) => "AIGuardAttackAggressor",
        }
    }

    fn on_enter(&mut self, core: &mut GuardCore, ctx: &mut AiContext<'_>) -> StateStatus {
        let now = ctx.now();
        match self {
            Self::Return {
                mover,
                next_scan_frame,
            } => {
                let center = core.data.center(ctx);
                if ctx.owner_position().within(center, core.data.inner_range(ctx)) {
                    return StateStatus::Success;
                }
                *next_scan_frame = now.saturating_add(ctx.tuning.guard_return_scan_rate);
                match mover.begin(center, ctx) {
                    StateStatus::Failure => StateStatus::Success,
                    status => status,
                }
            }
            Self::Idle { next_scan_frame } => {
                core.data.guard_spot = core.data.center(ctx);
                let rate = ctx.tuning.guard_enemy_scan_rate.max(1);
                let stagger = u32::try_from(ctx.owner % u64::from(rate)).unwrap_or(0);
                *next_scan_frame = now.saturating_add(stagger);
                if stagger == 0 {
                    StateStatus::Continue
                } else {
                    StateStatus::Sleep(stagger)
                }
            }
            Self::Inner(engagement) => {
                let Some(nemesis) = core.data.nemesis_alive(ctx) else {
                    return StateStatus::Success;
                };
                let exit = ExitConditions {
                    exit_if_no_unit_found: true,
                    exit_if_outside_radius: true,
                    center: core.data.center(ctx),
                    radius: core.data.inner_range(ctx),
                    ..ExitConditions::default()
                };
                engagement.begin(nemesis, exit, ctx)
            }
            Self::Outer(engagement) => {
                if core.data.mode == GuardMode::WithoutPursuit {
                    return StateStatus::Success;
                }
                let Some(nemesis) = core.data.nemesis_alive(ctx) else {
                    return StateStatus::Success;
                };
                let exit = ExitConditions {
                    exit_if_no_unit_found: true,
                    exit_if_outside_radius: true,
                    exit_if_expired_duration: true,
                    center: core.data.center(ctx),
                    radius: core.data.outer_range(ctx),
                    give_up_frame: now.saturating_add(ctx.tuning.guard_chase_unit_frames),
                };
                engagement.begin(nemesis, exit, ctx)
            }
            Self::GetCrate { mover, crate_id } => {
                *crate_id = ctx.world.crate_to_pick_up(ctx.owner);
                let Some(pos) = crate_id.and_then(|id| ctx.world.position(id)) else {
                    return StateStatus::Success;
                };
                mover.begin(pos, ctx)
            }
            Self::AttackAggressor(engagement) => {
                let Some(nemesis) = core.data.nemesis_alive(ctx) else {
                    return StateStatus::Success;
                };
                let exit = ExitConditions {
                    exit_if_no_unit_found: true,
                    exit_if_expired_duration: true,
                    give_up_frame: now.saturating_add(ctx.tuning.guard_chase_unit_frames),
                    ..ExitConditions::default()
                };
                engagement.begin(nemesis, exit, ctx)
            }
        }
    }

    fn update(&mut self, core: &mut GuardCore, ctx: &mut AiContext<'_>) -> StateStatus {
        let now = ctx.now();
        match self {
            Self::Return {
                mover,
                next_scan_frame,
            } => {
                if now >= *next_scan_frame {
                    *next_scan_frame = now.saturating_add(ctx.tuning.guard_return_scan_rate);
                    if look_for_inner_target(core, ctx) {
                        return StateStatus::Failure;
                    }
                }
                mover.retarget(core.data.center(ctx));
                match mover.tick(ctx) {
                    StateStatus::Success | StateStatus::Failure => StateStatus::Success,
                    status => status,
                }
            }
            Self::Idle { next_scan_frame } => {
                if now < *next_scan_frame {
                    return StateStatus::Sleep(*next_scan_frame - now);
                }
                let rate = ctx.tuning.guard_enemy_scan_rate.max(1);
                *next_scan_frame = now.saturating_add(rate);

                if ctx.world.crate_to_pick_up(ctx.owner).is_some() {
                    core.request_state(GuardStateId::GetCrate);
                    return StateStatus::Continue;
                }
                if look_for_inner_target(core, ctx) {
                    return StateStatus::Success;
                }
                if let GuardTarget::Object(_) = core.data.target {
                    let drift = Fixed::from_num(ctx.tuning.guard_drift_distance);
                    if !core.data.center(ctx).within(core.data.guard_spot, drift) {
                        return StateStatus::Failure;
                    }
                }
                StateStatus::Sleep(rate)
            }
            Self::Inner(engagement) => {
                engagement.exit.center = core.data.center(ctx);
                engagement.tick(ctx)
            }
            Self::Outer(engagement) => {
                let center = core.data.center(ctx);
                engagement.exit.center = center;
                let inner = core.data.inner_range(ctx);
                let close = core
                    .data
                    .nemesis_alive(ctx)
                    .and_then(|id| ctx.world.position(id))
                    .is_some_and(|pos| center.within(pos, inner));
                if close {
                    engagement.exit.give_up_frame = now.saturating_add(ctx.tuning.guard_chase_unit_frames);
                }
                engagement.tick(ctx)
            }
            Self::GetCrate { mover, crate_id } => {
                let alive = crate_id.is_some_and(|id| ctx.world.is_alive(id));
                if !alive {
                    return StateStatus::Success;
                }
                mover.tick(ctx)
            }
            Self::AttackAggressor(engagement) => engagement.tick(ctx),
        }
    }

    fn on_exit(&mut self, _core: &mut GuardCore, ctx: &mut AiContext<'_>, _exit: ExitType) {
        match self {
            Self::Return { mover, .. } | Self::GetCrate { mover, .. } => mover.end(ctx),
            Self::Idle { .. } => {}
            Self::Inner(engagement) | Self::Outer(engagement) | Self::AttackAggressor(engagement) => {
                engagement.attack.exit(ctx);
            }
        }
    }

    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = GUARD_STATE_VERSION;
        xfer.xfer_version(&mut version, GUARD_STATE_VERSION, "guard_state")?;
        match self {
            Self::Return {
                mover,
                next_scan_frame,
            } => {
                xfer.xfer(next_scan_frame)?;
                mover.xfer(xfer)
            }
            Self::Idle { next_scan_frame } => xfer.xfer(next_scan_frame),
            Self::Inner(engagement) | Self::Outer(engagement) | Self::AttackAggressor(engagement) => {
                engagement.xfer(xfer)
            }
            Self::GetCrate { mover, crate_id } => {
                xfer.xfer(crate_id)?;
                mover.xfer(xfer)
            }
        }
    }

    fn load_post_process(&mut self, _core: &mut GuardCore, ctx: &mut AiContext<'_>) {
        if let Self::Inner(engagement) | Self::Outer(engagement) | Self::AttackAggressor(engagement) = self {
            engagement.attack.load_post_process(ctx);
        }
    }
}

/// Guard an object, a position or an area.
pub struct AiGuardMachine {
    machine: StateMachine<GuardState>,
}

impl AiGuardMachine {
    /// Build the guard topology.
    #[must_use]
    pub fn new(target: GuardTarget, mode: GuardMode) -> Self {
        use GuardStateId as Id;
        let to = Target::State;
        let aggressors = || {
            vec![Condition::new(
                "attack aggressors",
                attack_aggressors,
                Target::State(Id::AttackAggressor),
            )]
        };

        let mut machine = StateMachine::new("AIGuardMachine", GuardData::new(target, mode));
        machine
            .define_state(
                GuardState::Return {
                    mover: MoveTo::new(true),
                    next_scan_frame: 0,
                },
                to(Id::Idle),
                to(Id::Inner),
                aggressors(),
            )
            .define_state(
                GuardState::Idle { next_scan_frame: 0 },
                to(Id::Inner),
                to(Id::Return),
                aggressors(),
            )
            .define_state(
                GuardState::Inner(Engagement::default()),
                to(Id::Outer),
                to(Id::Outer),
                Vec::new(),
            )
            .define_state(
                GuardState::Outer(Engagement::default()),
                to(Id::GetCrate),
                to(Id::GetCrate),
                Vec::new(),
            )
            .define_state(
                GuardState::GetCrate {
                    mover: MoveTo::new(false),
                    crate_id: None,
                },
                to(Id::Return),
                to(Id::Return),
                Vec::new(),
            )
            .define_state(
                GuardState::AttackAggressor(Engagement::default()),
                to(Id::Return),
                to(Id::Return),
                Vec::new(),
            );
        if let GuardTarget::Object(id) = target {
            machine.core_mut().set_goal_object(Some(id));
        }
        Self { machine }
    }

    /// Enter RETURN.
    pub fn init(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        if let GuardTarget::Object(id) = self.machine.data().target {
            if let Some(pos) = ctx.world.position(id) {
                self.machine.data_mut().guard_spot = pos;
            }
        }
        self.machine
            .init_default_state(ctx)
            .unwrap_or(StateStatus::Failure)
    }

    /// Run one tick.
    pub fn update(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.machine.update_state_machine(ctx)
    }

    /// Tear down, ending any engagement.
    pub fn halt(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.halt(ctx);
    }

    /// Current state.
    #[must_use]
    pub fn current_state_id(&self) -> Option<GuardStateId> {
        self.machine.current_state_id()
    }

    /// Whether the guard is waiting at its post.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.machine.is_in_state(GuardStateId::Idle)
    }

    /// Whether an engagement is running.
    #[must_use]
    pub fn is_attack(&self) -> bool {
        match self.machine.current_state() {
            Some(
                GuardState::Inner(engagement)
                | GuardState::Outer(engagement)
                | GuardState::AttackAggressor(engagement),
            ) => engagement.is_attacking(),
            _ => false,
        }
    }

    /// The enemy being engaged.
    #[must_use]
    pub fn nemesis(&self) -> Option<ObjectId> {
        self.machine.data().nemesis
    }

    /// Shared data.
    #[must_use]
    pub fn data(&self) -> &GuardData {
        self.machine.data()
    }

    /// The engine, for inspection.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<GuardState> {
        &self.machine
    }

    /// The engine, for external resets.
    pub fn machine_mut(&mut self) -> &mut StateMachine<GuardState> {
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

impl Snapshot for AiGuardMachine {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        self.machine.xfer(xfer)
    }
}
