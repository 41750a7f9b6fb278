//! Attacking a target.
//!
//! [`AttackStateMachine`] runs the chase / approach / aim / fire loop
//! against one victim. Higher level behaviours never re-implement it;
//! they embed an [`AttackBehavior`], which owns the machine for the
//! duration of one engagement and adds the give-up rules of
//! [`ExitConditions`].
//!
//! # Topology
//!
//! ```text
//! AIM_AT_TARGET  --success--> FIRE_WEAPON   --failure--> EXIT_FAILURE
//! FIRE_WEAPON    --success--> AIM_AT_TARGET --failure--> AIM_AT_TARGET
//! CHASE_TARGET   --success--> APPROACH      --failure--> APPROACH        (mobile, object victim)
//! APPROACH       --success--> AIM_AT_TARGET --failure--> EXIT_FAILURE
//! CHASE_TARGET   --always---> EXIT_FAILURE                               (immobile)
//! ```
//!
//! AIM and FIRE carry the side-conditions: out of range sends the unit
//! chasing, and a victim it can never hurt ends the machine.

use serde::{Deserialize, Serialize};

use crate::context::{AiContext, AttackTarget, WeaponStatus};
use crate::error::Result;
use crate::machine::{
    Condition, CoreOf, ExitType, State, StateMachine, StateStatus, Target, TransitionRow,
};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::movement::MoveTo;
use crate::xfer::{Snapshot, Xfer, XferVersion};

const ATTACK_DATA_VERSION: XferVersion = 1;
const ATTACK_BEHAVIOR_VERSION: XferVersion = 1;

/// States of the attack machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttackStateId {
    /// Turn to face the victim.
    AimAtTarget,
    /// Pull the trigger.
    FireWeapon,
    /// Close the distance to a victim out of range.
    ChaseTarget,
    /// Final approach into weapon range.
    ApproachTarget,
}

/// Who to attack and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackData {
    /// The victim.
    pub victim: AttackTarget,
    /// Forced attacks ignore "can never hurt it" until out of range is
    /// resolved.
    pub forced: bool,
    /// Whether the attacker can move. Fixes the topology.
    pub mobile: bool,
    /// Shots fired during this engagement.
    pub shots_fired: u32,
}

impl Snapshot for AttackData {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = ATTACK_DATA_VERSION;
        xfer.xfer_version(&mut version, ATTACK_DATA_VERSION, "attack_data")?;
        xfer.xfer(&mut self.victim)?;
        xfer.xfer(&mut self.forced)?;
        xfer.xfer(&mut self.mobile)?;
        xfer.xfer(&mut self.shots_fired)
    }
}

fn out_of_weapon_range(core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> bool {
    let victim = core.data.victim;
    ctx.target_alive(victim) && !ctx.world.in_weapon_range(ctx.owner, victim)
}

fn cannot_possibly_attack(core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> bool {
    let victim = core.data.victim;
    ctx.target_alive(victim) && !ctx.world.can_attack(ctx.owner, victim)
}

/// Moves into weapon range of the victim, following it as it moves.
#[derive(Debug, Clone)]
pub struct ApproachTarget {
    id: AttackStateId,
    mover: MoveTo,
}

impl ApproachTarget {
    fn enter(&mut self, core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> StateStatus {
        let victim = core.data.victim;
        let Some(pos) = ctx.target_position(victim).filter(|_| ctx.target_alive(victim)) else {
            return StateStatus::Failure;
        };
        if ctx.world.in_weapon_range(ctx.owner, victim) {
            return StateStatus::Success;
        }
        self.mover.begin(pos, ctx)
    }

    fn tick(&mut self, core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> StateStatus {
        let victim = core.data.victim;
        let Some(pos) = ctx.target_position(victim).filter(|_| ctx.target_alive(victim)) else {
            return StateStatus::Failure;
        };
        if ctx.world.in_weapon_range(ctx.owner, victim) {
            return StateStatus::Success;
        }
        self.mover.retarget(pos);
        match self.mover.tick(ctx) {
            // Let AIM decide whether we got close enough.
            StateStatus::Success | StateStatus::Failure => StateStatus::Success,
            running => running,
        }
    }
}

/// Pursues a victim that is moving away. Drops into the approach as soon
/// as the victim stops.
#[derive(Debug, Clone, Default)]
pub struct ChaseTarget {
    mover: MoveTo,
}

impl ChaseTarget {
    fn enter(&mut self, core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> StateStatus {
        let AttackTarget::Object(id) = core.data.victim else {
            return StateStatus::Success;
        };
        let Some(pos) = ctx.world.position(id).filter(|_| ctx.world.is_alive(id)) else {
            return StateStatus::Failure;
        };
        if !ctx.world.is_moving(id) || ctx.world.in_weapon_range(ctx.owner, core.data.victim) {
            return StateStatus::Success;
        }
        self.mover.begin(pos, ctx)
    }

    fn tick(&mut self, core: &mut CoreOf<AttackState>, ctx: &mut AiContext<'_>) -> StateStatus {
        let AttackTarget::Object(id) = core.data.victim else {
            return StateStatus::Success;
        };
        let Some(pos) = ctx.world.position(id).filter(|_| ctx.world.is_alive(id)) else {
            return StateStatus::Failure;
        };
        if !ctx.world.is_moving(id) || ctx.world.in_weapon_range(ctx.owner, core.data.victim) {
            return StateStatus::Success;
        }
        self.mover.retarget(pos);
        self.mover.tick(ctx)
    }
}

/// The attack machine's states.
#[derive(Debug, Clone)]
pub enum AttackState {
    /// Turn to face the victim.
    Aim,
    /// Fire once the weapon is ready.
    Fire,
    /// Pursue a moving victim.
    Chase(ChaseTarget),
    /// Walk into weapon range.
    Approach(ApproachTarget),
    /// Chase slot of an attacker that cannot move.
    CannotChase,
}

impl State for AttackState {
    type Id = AttackStateId;
    type Data = AttackData;

    fn id(&self) -> AttackStateId {
        match self {
            Self::Aim => AttackStateId::AimAtTarget,
            Self::Fire => AttackStateId::FireWeapon,
            Self::Chase(_) | Self::CannotChase => AttackStateId::ChaseTarget,
            Self::Approach(state) => state.id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Aim => "AttackAimAtTarget",
            Self::Fire => "AttackFireWeapon",
            Self::Chase(_) => "AttackPursueTarget",
            Self::Approach(_) => "AttackApproachTarget",
            Self::CannotChase => "AttackCannotChase",
        }
    }

    fn on_enter(&mut self, core: &mut CoreOf<Self>, ctx: &mut AiContext<'_>) -> StateStatus {
        match self {
            Self::Aim => {
                if !ctx.target_alive(core.data.victim)
                    || ctx.world.weapon_status(ctx.owner) == WeaponStatus::NoWeapon
                {
                    return StateStatus::Failure;
                }
                StateStatus::Continue
            }
            Self::Fire => StateStatus::Continue,
            Self::Chase(state) => state.enter(core, ctx),
            Self::Approach(state) => state.enter(core, ctx),
            Self::CannotChase => StateStatus::Failure,
        }
    }

    fn update(&mut self, core: &mut CoreOf<Self>, ctx: &mut AiContext<'_>) -> StateStatus {
        let victim = core.data.victim;
        match self {
            Self::Aim => {
                if !ctx.target_alive(victim) {
                    return StateStatus::Failure;
                }
                if ctx.world.aim_at(ctx.owner, victim) {
                    StateStatus::Success
                } else {
                    StateStatus::Continue
                }
            }
            Self::Fire => {
                if !ctx.target_alive(victim) {
                    return StateStatus::Failure;
                }
                match ctx.world.weapon_status(ctx.owner) {
                    WeaponStatus::PreAttack => StateStatus::Continue,
                    WeaponStatus::ReadyToFire => {
                        ctx.world.fire_weapon(ctx.owner, victim);
                        core.data.shots_fired += 1;
                        tracing::debug!(owner = ctx.owner, frame = ctx.now(), shots = core.data.shots_fired, "weapon fired");
                        StateStatus::Success
                    }
                    WeaponStatus::Reloading | WeaponStatus::OutOfAmmo | WeaponStatus::NoWeapon => {
                        StateStatus::Failure
                    }
                }
            }
            Self::Chase(state) => state.tick(core, ctx),
            Self::Approach(state) => state.tick(core, ctx),
            Self::CannotChase => StateStatus::Failure,
        }
    }

    fn on_exit(&mut self, _core: &mut CoreOf<Self>, ctx: &mut AiContext<'_>, _exit: ExitType) {
        match self {
            Self::Chase(state) => state.mover.end(ctx),
            Self::Approach(state) => state.mover.end(ctx),
            Self::Aim | Self::Fire | Self::CannotChase => {}
        }
    }

    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        match self {
            Self::Chase(state) => state.mover.xfer(xfer),
            Self::Approach(state) => state.mover.xfer(xfer),
            Self::Aim | Self::Fire | Self::CannotChase => {
                crate::machine::xfer_stateless(xfer, "attack_state")
            }
        }
    }
}

/// Chase, approach, aim and fire against a single victim.
pub struct AttackStateMachine {
    machine: StateMachine<AttackState>,
}

impl AttackStateMachine {
    /// Build the topology for this victim and attacker.
    #[must_use]
    pub fn new(victim: AttackTarget, forced: bool, mobile: bool) -> Self {
        let data = AttackData {
            victim,
            forced,
            mobile,
            shots_fired: 0,
        };
        let mut machine = StateMachine::new("AttackStateMachine", data);

        let chase = Target::State(AttackStateId::ChaseTarget);
        let conditions: Vec<Condition<AttackState>> = match (victim, forced) {
            (AttackTarget::Object(_), false) => vec![
                Condition::new("out of weapon range", out_of_weapon_range, chase),
                Condition::new("cannot possibly attack", cannot_possibly_attack, Target::ExitFailure),
            ],
            (AttackTarget::Object(_), true) => vec![
                Condition::new("cannot possibly attack", cannot_possibly_attack, Target::ExitFailure),
                Condition::new("out of weapon range", out_of_weapon_range, chase),
            ],
            (AttackTarget::Position(_), _) => vec![Condition::new(
                "out of weapon range (position)",
                out_of_weapon_range,
                chase,
            )],
        };

        let aim = Target::State(AttackStateId::AimAtTarget);
        machine
            .define_state(
                AttackState::Aim,
                Target::State(AttackStateId::FireWeapon),
                Target::ExitFailure,
                conditions.clone(),
            )
            .define_state(AttackState::Fire, aim, aim, conditions);

        let approach = |id| {
            AttackState::Approach(ApproachTarget {
                id,
                mover: MoveTo::new(true),
            })
        };
        if !mobile {
            machine.define_state(
                AttackState::CannotChase,
                Target::ExitFailure,
                Target::ExitFailure,
                Vec::new(),
            );
        } else if matches!(victim, AttackTarget::Object(_)) {
            let to_approach = Target::State(AttackStateId::ApproachTarget);
            machine
                .define_state(
                    AttackState::Chase(ChaseTarget::default()),
                    to_approach,
                    to_approach,
                    Vec::new(),
                )
                .define_state(
                    approach(AttackStateId::ApproachTarget),
                    aim,
                    Target::ExitFailure,
                    Vec::new(),
                );
        } else {
            machine
                .define_state(
                    approach(AttackStateId::ChaseTarget),
                    aim,
                    Target::ExitFailure,
                    Vec::new(),
                )
                .define_state(
                    approach(AttackStateId::ApproachTarget),
                    aim,
                    Target::ExitFailure,
                    Vec::new(),
                );
        }

        Self { machine }
    }

    /// Enter the default state.
    pub fn init(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        if let AttackTarget::Object(id) = self.machine.data().victim {
            self.machine.core_mut().set_goal_object(Some(id));
        }
        self.machine
            .init_default_state(ctx)
            .unwrap_or(StateStatus::Failure)
    }

    /// Run one tick.
    pub fn update(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.machine.update_state_machine(ctx)
    }

    /// Tear the machine down.
    pub fn halt(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.halt(ctx);
    }

    /// The victim.
    #[must_use]
    pub fn victim(&self) -> AttackTarget {
        self.machine.data().victim
    }

    /// Shots fired so far.
    #[must_use]
    pub fn shots_fired(&self) -> u32 {
        self.machine.data().shots_fired
    }

    /// Whether the machine is still engaging.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        !self.machine.is_halted() && self.machine.current_state_id().is_some()
    }

    /// Current state.
    #[must_use]
    pub fn current_state_id(&self) -> Option<AttackStateId> {
        self.machine.current_state_id()
    }

    /// Transition table.
    #[must_use]
    pub fn describe(&self) -> Vec<TransitionRow> {
        self.machine.describe()
    }

    /// Check the topology.
    ///
    /// # Errors
    ///
    /// See [`StateMachine::validate`].
    pub fn validate(&self) -> Result<()> {
        self.machine.validate()
    }

    /// Re-resolve world references after a load.
    pub fn load_post_process(&mut self, ctx: &mut AiContext<'_>) {
        self.machine.load_post_process(ctx);
    }
}

impl Snapshot for AttackStateMachine {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        self.machine.xfer(xfer)
    }
}

/// When an embedding behaviour should stop attacking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitConditions {
    /// Stop when the victim is gone.
    pub exit_if_no_unit_found: bool,
    /// Stop once `give_up_frame` is reached.
    pub exit_if_expired_duration: bool,
    /// Stop when the victim leaves the circle around `center`.
    pub exit_if_outside_radius: bool,
    /// Circle center.
    pub center: Vec2Fixed,
    /// Circle radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Frame at which an expiring engagement ends.
    pub give_up_frame: u32,
}

impl ExitConditions {
    /// Whether the engagement with `victim` is over.
    #[must_use]
    pub fn should_exit(&self, victim: AttackTarget, ctx: &AiContext<'_>) -> bool {
        let victim_pos = ctx
            .target_position(victim)
            .filter(|_| ctx.target_alive(victim));
        let Some(victim_pos) = victim_pos else {
            return self.exit_if_no_unit_found;
        };
        if self.exit_if_expired_duration && ctx.now() >= self.give_up_frame {
            return true;
        }
        self.exit_if_outside_radius && !self.center.within(victim_pos, self.radius)
    }
}

/// One engagement: an owned [`AttackStateMachine`] plus give-up rules.
///
/// The machine is created on [`AttackBehavior::enter`] and torn down on
/// [`AttackBehavior::exit`].
#[derive(Default)]
pub struct AttackBehavior {
    machine: Option<Box<AttackStateMachine>>,
    max_shots: Option<u32>,
}

impl AttackBehavior {
    /// Engagement without a shot limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engagement that ends after `shots` shots.
    #[must_use]
    pub fn with_max_shots(shots: u32) -> Self {
        Self {
            machine: None,
            max_shots: Some(shots),
        }
    }

    /// Start attacking `victim`.
    pub fn enter(
        &mut self,
        victim: AttackTarget,
        forced: bool,
        ctx: &mut AiContext<'_>,
    ) -> StateStatus {
        self.exit(ctx);
        if !ctx.target_alive(victim) {
            return StateStatus::Failure;
        }
        if !forced && !ctx.world.can_attack(ctx.owner, victim) {
            return StateStatus::Failure;
        }

        let mobile = ctx.world.is_mobile(ctx.owner);
        let mut machine = Box::new(AttackStateMachine::new(victim, forced, mobile));
        let status = machine.init(ctx).sleep_as_continue();
        self.machine = Some(machine);
        status
    }

    /// Advance the engagement one tick.
    pub fn update(&mut self, exit: Option<&ExitConditions>, ctx: &mut AiContext<'_>) -> StateStatus {
        let Some(machine) = self.machine.as_mut() else {
            return StateStatus::Failure;
        };
        let victim = machine.victim();
        if exit.is_some_and(|exit| exit.should_exit(victim, ctx)) {
            return StateStatus::Success;
        }
        if !ctx.target_alive(victim) {
            return StateStatus::Success;
        }
        if self.max_shots.is_some_and(|max| machine.shots_fired() >= max) {
            return StateStatus::Success;
        }
        machine.update(ctx).sleep_as_continue()
    }

    /// End the engagement.
    pub fn exit(&mut self, ctx: &mut AiContext<'_>) {
        if let Some(mut machine) = self.machine.take() {
            machine.halt(ctx);
        }
    }

    /// Whether an engagement is running.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.machine.as_ref().is_some_and(|m| m.is_attacking())
    }

    /// The embedded machine, if engaged.
    #[must_use]
    pub fn machine(&self) -> Option<&AttackStateMachine> {
        self.machine.as_deref()
    }

    /// Re-resolve world references after a load.
    pub fn load_post_process(&mut self, ctx: &mut AiContext<'_>) {
        if let Some(machine) = self.machine.as_mut() {
            machine.load_post_process(ctx);
        }
    }
}

impl Snapshot for AttackBehavior {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = ATTACK_BEHAVIOR_VERSION;
        xfer.xfer_version(&mut version, ATTACK_BEHAVIOR_VERSION, "attack_behavior")?;
        xfer.xfer(&mut self.max_shots)?;

        let mut shape = self
            .machine
            .as_ref()
            .map(|m| (m.victim(), m.machine.data().forced, m.machine.data().mobile));
        xfer.xfer(&mut shape)?;
        if xfer.is_loading() {
            self.machine = shape
                .map(|(victim, forced, mobile)| Box::new(AttackStateMachine::new(victim, forced, mobile)));
        }
        match self.machine.as_mut() {
            Some(machine) => machine.xfer(xfer),
            None => Ok(()),
        }
    }
}
