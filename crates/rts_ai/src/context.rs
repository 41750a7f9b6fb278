//! Collaborators consumed by the AI machines.
//!
//! Nothing in this crate reaches for global state. Every call into a
//! machine carries an [`AiContext`] bundling the frame clock, the world
//! query layer and the pathfinder. Tests substitute mocks for all three.
//!
//! Objects are only ever referred to by [`ObjectId`]. An id held across a
//! frame boundary is resolved again through [`World`] on every use, so a
//! target that died this frame simply resolves to "gone".

use serde::{Deserialize, Serialize};

use crate::config::AiTuning;
use crate::math::{Fixed, Vec2Fixed};

/// Simulation object identifier.
pub type ObjectId = u64;

/// Waypoint identifier.
pub type WaypointId = u32;

/// Squad identifier.
pub type SquadId = u32;

/// Source of the current logic frame.
pub trait FrameClock {
    /// The frame currently being simulated.
    fn frame(&self) -> u32;
}

/// A bare frame number is a clock stuck at that frame.
impl FrameClock for u32 {
    fn frame(&self) -> u32 {
        *self
    }
}

/// Something a weapon can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackTarget {
    /// A live object, looked up by id.
    Object(ObjectId),
    /// A spot on the ground.
    Position(Vec2Fixed),
}

/// State of the owner's current weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponStatus {
    /// Loaded and able to fire this frame.
    ReadyToFire,
    /// Winding up; will be ready shortly.
    PreAttack,
    /// Between shots or reloading a clip.
    Reloading,
    /// No ammunition left.
    OutOfAmmo,
    /// The unit has no usable weapon.
    NoWeapon,
}

/// A node of a waypoint chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waypoint {
    /// Where the waypoint sits.
    pub position: Vec2Fixed,
    /// The next waypoint in the chain, if any.
    pub next: Option<WaypointId>,
}

/// A queue slot handed out by a dock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproachSlot {
    /// Where the docker should wait.
    pub position: Vec2Fixed,
    /// Queue index, larger is further from the dock.
    pub index: i32,
}

/// Answer from the pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStatus {
    /// A path exists and the unit is following it.
    Ready,
    /// The request is queued.
    Pending,
    /// No path can be found.
    Failed,
}

/// Dock interface exposed by supply centers, repair pads and similar.
///
/// The dock owns its queue. A docker's claim lasts from
/// [`Dock::reserve_approach_position`] until [`Dock::cancel_dock`] or
/// [`Dock::on_exit_reached`].
pub trait Dock {
    /// Whether the dock accepts dockers at all.
    fn is_dock_open(&self) -> bool;

    /// Claim a place in the approach queue.
    fn reserve_approach_position(&mut self, docker: ObjectId) -> Option<ApproachSlot>;

    /// Move up one place in the approach queue.
    fn advance_approach_position(&mut self, docker: ObjectId, current: i32) -> Option<ApproachSlot>;

    /// Whether the docker at `slot` may move up.
    fn is_clear_to_advance(&self, docker: ObjectId, slot: i32) -> bool;

    /// Whether the docker may leave the queue and enter.
    fn is_clear_to_enter(&self, docker: ObjectId) -> bool;

    /// Entry point of the dock.
    fn enter_position(&self, docker: ObjectId) -> Vec2Fixed;

    /// Where the docker sits while served.
    fn dock_position(&self, docker: ObjectId) -> Vec2Fixed;

    /// Where the docker leaves.
    fn exit_position(&self, docker: ObjectId) -> Vec2Fixed;

    /// Perform one unit of docking work. Returns `false` once done.
    fn action(&mut self, docker: ObjectId, drone: Option<ObjectId>) -> bool;

    /// The docker is abandoning its claim.
    fn cancel_dock(&mut self, docker: ObjectId);

    /// The docker reached its approach slot.
    fn on_approach_reached(&mut self, docker: ObjectId);

    /// The docker reached the entry point.
    fn on_enter_reached(&mut self, docker: ObjectId);

    /// The docker reached the dock position.
    fn on_dock_reached(&mut self, docker: ObjectId);

    /// The docker left the dock. Releases the claim.
    fn on_exit_reached(&mut self, docker: ObjectId);

    /// Whether dockers drive through the dock's footprint.
    fn allows_passthrough(&self) -> bool {
        false
    }

    /// Where dockers gather after leaving, if the dock has a rally point.
    fn rally_point(&self, _docker: ObjectId) -> Option<Vec2Fixed> {
        None
    }
}

/// Object and world queries.
///
/// Every method has a conservative default so a test double only
/// overrides what its scenario exercises.
pub trait World {
    /// Whether an object with this id exists and is not dead.
    fn is_alive(&self, _id: ObjectId) -> bool {
        false
    }

    /// Current position of an object.
    fn position(&self, _id: ObjectId) -> Option<Vec2Fixed> {
        None
    }

    /// Dock interface of an object, if it is a dock.
    fn dock(&mut self, _id: ObjectId) -> Option<&mut dyn Dock> {
        None
    }

    /// Frames between two dock actions for this docker.
    fn dock_action_delay(&self, _docker: ObjectId, _dock: ObjectId) -> u32 {
        0
    }

    /// Objects controlled by the same player as `owner`.
    fn controlled_objects(&self, _owner: ObjectId) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Producer of an object.
    fn producer_of(&self, _id: ObjectId) -> Option<ObjectId> {
        None
    }

    /// Whether an object is a drone.
    fn is_drone(&self, _id: ObjectId) -> bool {
        false
    }

    /// Whether `other` is an enemy of `owner`.
    fn is_enemy(&self, _owner: ObjectId, _other: ObjectId) -> bool {
        false
    }

    /// Whether an object is airborne.
    fn is_flying(&self, _id: ObjectId) -> bool {
        false
    }

    /// Whether an object is currently moving.
    fn is_moving(&self, _id: ObjectId) -> bool {
        false
    }

    /// Whether an object can move at all.
    fn is_mobile(&self, _id: ObjectId) -> bool {
        true
    }

    /// Whether `attacker` could ever hurt `target`.
    fn can_attack(&self, _attacker: ObjectId, _target: AttackTarget) -> bool {
        false
    }

    /// Whether `target` is inside the attacker's weapon range.
    fn in_weapon_range(&self, _attacker: ObjectId, _target: AttackTarget) -> bool {
        false
    }

    /// Turn towards the target. Returns `true` once aimed.
    fn aim_at(&mut self, _attacker: ObjectId, _target: AttackTarget) -> bool {
        true
    }

    /// State of the attacker's weapon.
    fn weapon_status(&self, _attacker: ObjectId) -> WeaponStatus {
        WeaponStatus::NoWeapon
    }

    /// Fire the attacker's weapon at the target.
    fn fire_weapon(&mut self, _attacker: ObjectId, _target: AttackTarget) {}

    /// Most recent attacker of `owner`, left in place.
    fn last_attacker(&self, _owner: ObjectId) -> Option<ObjectId> {
        None
    }

    /// Take and clear the most recent attacker of `owner`.
    fn take_last_attacker(&mut self, _owner: ObjectId) -> Option<ObjectId> {
        None
    }

    /// Closest enemy of `owner` within `range` of `center`.
    fn closest_enemy(
        &self,
        _owner: ObjectId,
        _center: Vec2Fixed,
        _range: Fixed,
        _flying_only: bool,
    ) -> Option<ObjectId> {
        None
    }

    /// A crate `owner` should pick up, if one is nearby.
    fn crate_to_pick_up(&self, _owner: ObjectId) -> Option<ObjectId> {
        None
    }

    /// Vision range of an object.
    fn vision_range(&self, _id: ObjectId) -> Fixed {
        Fixed::ZERO
    }

    /// Look up a waypoint.
    fn waypoint(&self, _id: WaypointId) -> Option<Waypoint> {
        None
    }

    /// Members of a squad, in squad order.
    fn squad_members(&self, _id: SquadId) -> Vec<ObjectId> {
        Vec::new()
    }
}

/// Path computation and locomotion feedback.
///
/// The pathfinder drives the unit along the path it computes; the AI only
/// asks for paths and watches progress.
pub trait Pathfinder {
    /// Request a path for `unit` to `goal`.
    fn compute_path(&mut self, unit: ObjectId, goal: Vec2Fixed, adjust_destination: bool)
        -> PathStatus;

    /// Poll a request previously answered with [`PathStatus::Pending`].
    fn path_status(&self, unit: ObjectId) -> PathStatus;

    /// Distance left along the current path.
    fn remaining_distance(&self, unit: ObjectId) -> Option<Fixed>;

    /// How close counts as arrived.
    fn close_enough_distance(&self, unit: ObjectId) -> Fixed;

    /// Consecutive frames the unit has been blocked.
    fn frames_blocked(&self, unit: ObjectId) -> u32;

    /// Whether the unit is blocked with no way around.
    fn is_blocked_and_stuck(&self, unit: ObjectId) -> bool;

    /// Treat an object as passable for this unit's paths.
    fn ignore_obstacle(&mut self, unit: ObjectId, obstacle: Option<ObjectId>);

    /// Stop the unit and drop its path.
    fn stop(&mut self, unit: ObjectId);
}

/// Everything a state may consult during one call.
pub struct AiContext<'a> {
    /// The unit whose AI is running.
    pub owner: ObjectId,
    /// Frame clock.
    pub clock: &'a dyn FrameClock,
    /// Object and world queries.
    pub world: &'a mut dyn World,
    /// Path requests and locomotion feedback.
    pub pathfinder: &'a mut dyn Pathfinder,
    /// Tuning values.
    pub tuning: &'a AiTuning,
}

impl<'a> AiContext<'a> {
    /// Bundle the collaborators for one call.
    pub fn new(
        owner: ObjectId,
        clock: &'a dyn FrameClock,
        world: &'a mut dyn World,
        pathfinder: &'a mut dyn Pathfinder,
        tuning: &'a AiTuning,
    ) -> Self {
        Self {
            owner,
            clock,
            world,
            pathfinder,
            tuning,
        }
    }

    /// Current frame.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.clock.frame()
    }

    /// Position of the owner, or the origin if the world lost it.
    #[must_use]
    pub fn owner_position(&self) -> Vec2Fixed {
        self.world.position(self.owner).unwrap_or_default()
    }

    /// Position of any target kind.
    #[must_use]
    pub fn target_position(&self, target: AttackTarget) -> Option<Vec2Fixed> {
        match target {
            AttackTarget::Object(id) => self.world.position(id),
            AttackTarget::Position(pos) => Some(pos),
        }
    }

    /// Whether an object target still lives. Positions always do.
    #[must_use]
    pub fn target_alive(&self, target: AttackTarget) -> bool {
        match target {
            AttackTarget::Object(id) => self.world.is_alive(id),
            AttackTarget::Position(_) => true,
        }
    }
}
