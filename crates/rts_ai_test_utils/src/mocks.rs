//! Scripted collaborators.
//!
//! [`MockWorld`] holds plain objects in a `BTreeMap`, so every scan walks
//! them in id order and two identical scripts behave identically.
//! [`MockDock`] records every protocol call and keeps the books on
//! reservations: every claim granted must come back exactly once. A second
//! release of the same claim, a cancel from a docker that never reserved,
//! or a notification from a docker without a claim are all counted.

use std::collections::{BTreeMap, BTreeSet};

use rts_ai::context::{
    ApproachSlot, AttackTarget, Dock, FrameClock, ObjectId, PathStatus, Pathfinder, SquadId,
    Waypoint, WaypointId, WeaponStatus, World,
};
use rts_ai::math::{Fixed, Vec2Fixed};

/// Clock advanced by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualClock {
    /// Current frame.
    pub frame: u32,
}

impl ManualClock {
    /// Move forward `frames` frames.
    pub fn advance(&mut self, frames: u32) {
        self.frame += frames;
    }
}

impl FrameClock for ManualClock {
    fn frame(&self) -> u32 {
        self.frame
    }
}

/// One object of the mock world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockObject {
    /// Where it is.
    pub position: Vec2Fixed,
    /// Whether it lives.
    pub alive: bool,
    /// Owning player.
    pub player: u8,
    /// Hostile to player 1.
    pub enemy: bool,
    /// Airborne.
    pub flying: bool,
    /// Currently moving.
    pub moving: bool,
    /// Able to move.
    pub mobile: bool,
    /// Whether weapons can hurt it.
    pub attackable: bool,
    /// Drone flag.
    pub drone: bool,
    /// Who built it.
    pub producer: Option<ObjectId>,
    /// Vision radius.
    pub vision: Fixed,
    /// Weapon reach.
    pub weapon_range: Fixed,
    /// Weapon state.
    pub weapon: WeaponStatus,
}

impl Default for MockObject {
    fn default() -> Self {
        Self {
            position: Vec2Fixed::ZERO,
            alive: true,
            player: 1,
            enemy: false,
            flying: false,
            moving: false,
            mobile: true,
            attackable: true,
            drone: false,
            producer: None,
            vision: Fixed::from_num(100),
            weapon_range: Fixed::from_num(50),
            weapon: WeaponStatus::ReadyToFire,
        }
    }
}

/// Every protocol call a [`MockDock`] received, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockCall {
    /// `reserve_approach_position`.
    Reserve(ObjectId),
    /// `advance_approach_position`.
    Advance(ObjectId, i32),
    /// `cancel_dock`.
    Cancel(ObjectId),
    /// `on_approach_reached`.
    ApproachReached(ObjectId),
    /// `on_enter_reached`.
    EnterReached(ObjectId),
    /// `on_dock_reached`.
    DockReached(ObjectId),
    /// `on_exit_reached`.
    ExitReached(ObjectId),
    /// `action`.
    Action(ObjectId, Option<ObjectId>),
}

/// A dock that records calls and audits reservations.
#[derive(Debug, Clone)]
pub struct MockDock {
    /// Where the dock stands.
    pub position: Vec2Fixed,
    /// Accepting dockers.
    pub open: bool,
    /// Refuse new reservations.
    pub full: bool,
    /// Answer to `is_clear_to_enter`.
    pub clear_to_enter: bool,
    /// Answer to `is_clear_to_advance`.
    pub clear_to_advance: bool,
    /// `action` calls until the work is done.
    pub actions_remaining: u32,
    /// Dockers drive through the footprint.
    pub passthrough: bool,
    /// Where dockers gather afterwards.
    pub rally: Option<Vec2Fixed>,
    /// Close the dock as soon as a docker reports reaching the entry.
    pub closes_after_entry: bool,
    /// Protocol log.
    pub calls: Vec<DockCall>,
    /// Releases of a claim that was already released.
    pub double_releases: u32,
    /// Cancels from dockers that never held a claim.
    pub stray_cancels: u32,
    /// Progress notifications from dockers without a claim.
    pub orphan_notifications: u32,
    holders: BTreeSet<ObjectId>,
    released: BTreeSet<ObjectId>,
    granted: usize,
    returned: usize,
}

impl MockDock {
    /// An open dock at `position` that serves three actions.
    #[must_use]
    pub fn new(position: Vec2Fixed) -> Self {
        Self {
            position,
            open: true,
            full: false,
            clear_to_enter: true,
            clear_to_advance: false,
            actions_remaining: 3,
            passthrough: false,
            rally: None,
            closes_after_entry: false,
            calls: Vec::new(),
            double_releases: 0,
            stray_cancels: 0,
            orphan_notifications: 0,
            holders: BTreeSet::new(),
            released: BTreeSet::new(),
            granted: 0,
            returned: 0,
        }
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DockCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Reservations handed out.
    #[must_use]
    pub fn reservations(&self) -> usize {
        self.count(|c| matches!(c, DockCall::Reserve(_)))
    }

    /// Claims granted by `reserve_approach_position`.
    #[must_use]
    pub fn claims_granted(&self) -> usize {
        self.granted
    }

    /// Claims released through cancel or exit.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.returned
    }

    /// Whether `docker` currently holds a claim.
    #[must_use]
    pub fn is_holding(&self, docker: ObjectId) -> bool {
        self.holders.contains(&docker)
    }

    /// Every granted claim released once, none outstanding.
    ///
    /// Counts claims rather than dockers, so a docker that reserves again
    /// over a claim it never gave back leaves the books short.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.holders.is_empty() && self.double_releases == 0 && self.granted == self.returned
    }

    fn slot(&self, index: i32) -> ApproachSlot {
        let offset = Fixed::from_num(10 * (index + 1));
        ApproachSlot {
            position: Vec2Fixed::new(self.position.x, self.position.y + offset),
            index,
        }
    }

    fn release(&mut self, docker: ObjectId) {
        if self.holders.remove(&docker) {
            self.released.insert(docker);
            self.returned += 1;
        } else if self.released.contains(&docker) {
            tracing::warn!(docker, "dock claim released twice");
            self.double_releases += 1;
        } else {
            self.stray_cancels += 1;
        }
    }

    fn notify(&mut self, call: DockCall, docker: ObjectId) {
        self.calls.push(call);
        if !self.holders.contains(&docker) {
            tracing::warn!(docker, ?call, "dock notified by a docker without a claim");
            self.orphan_notifications += 1;
        }
    }
}

impl Dock for MockDock {
    fn is_dock_open(&self) -> bool {
        self.open
    }

    fn reserve_approach_position(&mut self, docker: ObjectId) -> Option<ApproachSlot> {
        self.calls.push(DockCall::Reserve(docker));
        if !self.open || self.full {
            return None;
        }
        if !self.holders.insert(docker) {
            tracing::warn!(docker, "dock reserved again over an unreleased claim");
        }
        self.released.remove(&docker);
        self.granted += 1;
        let index = i32::try_from(self.holders.len()).unwrap_or(i32::MAX) - 1;
        Some(self.slot(index))
    }

    fn advance_approach_position(&mut self, docker: ObjectId, current: i32) -> Option<ApproachSlot> {
        self.calls.push(DockCall::Advance(docker, current));
        if !self.holders.contains(&docker) {
            return None;
        }
        Some(self.slot((current - 1).max(0)))
    }

    fn is_clear_to_advance(&self, _docker: ObjectId, slot: i32) -> bool {
        self.clear_to_advance && slot > 0
    }

    fn is_clear_to_enter(&self, _docker: ObjectId) -> bool {
        self.clear_to_enter
    }

    fn enter_position(&self, _docker: ObjectId) -> Vec2Fixed {
        Vec2Fixed::new(self.position.x, self.position.y + Fixed::from_num(5))
    }

    fn dock_position(&self, _docker: ObjectId) -> Vec2Fixed {
        self.position
    }

    fn exit_position(&self, _docker: ObjectId) -> Vec2Fixed {
        Vec2Fixed::new(self.position.x, self.position.y - Fixed::from_num(5))
    }

    fn action(&mut self, docker: ObjectId, drone: Option<ObjectId>) -> bool {
        self.calls.push(DockCall::Action(docker, drone));
        self.actions_remaining = self.actions_remaining.saturating_sub(1);
        self.actions_remaining > 0
    }

    fn cancel_dock(&mut self, docker: ObjectId) {
        self.calls.push(DockCall::Cancel(docker));
        self.release(docker);
    }

    fn on_approach_reached(&mut self, docker: ObjectId) {
        self.notify(DockCall::ApproachReached(docker), docker);
    }

    fn on_enter_reached(&mut self, docker: ObjectId) {
        self.notify(DockCall::EnterReached(docker), docker);
        if self.closes_after_entry {
            self.open = false;
        }
    }

    fn on_dock_reached(&mut self, docker: ObjectId) {
        self.notify(DockCall::DockReached(docker), docker);
    }

    fn on_exit_reached(&mut self, docker: ObjectId) {
        self.notify(DockCall::ExitReached(docker), docker);
        self.release(docker);
    }

    fn allows_passthrough(&self) -> bool {
        self.passthrough
    }

    fn rally_point(&self, _docker: ObjectId) -> Option<Vec2Fixed> {
        self.rally
    }
}

/// A world of plain objects, docks, waypoints and squads.
#[derive(Debug, Clone, Default)]
pub struct MockWorld {
    /// Objects by id.
    pub objects: BTreeMap<ObjectId, MockObject>,
    /// Docks by id. A dock also needs an object entry to be alive.
    pub docks: BTreeMap<ObjectId, MockDock>,
    /// Waypoints by id.
    pub waypoints: BTreeMap<WaypointId, Waypoint>,
    /// Squad members by squad.
    pub squads: BTreeMap<SquadId, Vec<ObjectId>>,
    /// Pending "who shot me" reports.
    pub last_attackers: BTreeMap<ObjectId, ObjectId>,
    /// Crate offered to anyone who asks.
    pub nearby_crate: Option<ObjectId>,
    /// Frames between dock actions.
    pub dock_delay: u32,
    /// Every shot fired, as `(shooter, target)`.
    pub shots: Vec<(ObjectId, AttackTarget)>,
}

impl MockWorld {
    /// Empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a friendly object and return it for tweaking.
    pub fn spawn(&mut self, id: ObjectId, position: Vec2Fixed) -> &mut MockObject {
        self.objects.entry(id).or_default().position = position;
        self.objects.entry(id).or_default()
    }

    /// Add a hostile object of player 2.
    pub fn spawn_enemy(&mut self, id: ObjectId, position: Vec2Fixed) -> &mut MockObject {
        let object = self.spawn(id, position);
        object.enemy = true;
        object.player = 2;
        object
    }

    /// Add a dock with its object.
    pub fn add_dock(&mut self, id: ObjectId, dock: MockDock) -> &mut MockDock {
        self.spawn(id, dock.position).mobile = false;
        self.docks.entry(id).or_insert(dock)
    }

    /// Dock by id.
    pub fn dock_mut(&mut self, id: ObjectId) -> Option<&mut MockDock> {
        self.docks.get_mut(&id)
    }

    /// Object by id.
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut MockObject> {
        self.objects.get_mut(&id)
    }

    /// Mark an object dead.
    pub fn kill(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.alive = false;
        }
    }

    /// Teleport an object.
    pub fn move_object(&mut self, id: ObjectId, position: Vec2Fixed) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.position = position;
        }
    }

    /// Report that `attacker` shot `victim`.
    pub fn report_attack(&mut self, victim: ObjectId, attacker: ObjectId) {
        self.last_attackers.insert(victim, attacker);
    }

    fn live(&self, id: ObjectId) -> Option<&MockObject> {
        self.objects.get(&id).filter(|o| o.alive)
    }
}

impl World for MockWorld {
    fn is_alive(&self, id: ObjectId) -> bool {
        self.live(id).is_some()
    }

    fn position(&self, id: ObjectId) -> Option<Vec2Fixed> {
        self.objects.get(&id).map(|o| o.position)
    }

    fn dock(&mut self, id: ObjectId) -> Option<&mut dyn Dock> {
        self.docks.get_mut(&id).map(|d| d as &mut dyn Dock)
    }

    fn dock_action_delay(&self, _docker: ObjectId, _dock: ObjectId) -> u32 {
        self.dock_delay
    }

    fn controlled_objects(&self, owner: ObjectId) -> Vec<ObjectId> {
        let Some(player) = self.objects.get(&owner).map(|o| o.player) else {
            return Vec::new();
        };
        self.objects
            .iter()
            .filter(|(_, o)| o.player == player)
            .map(|(&id, _)| id)
            .collect()
    }

    fn producer_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id).and_then(|o| o.producer)
    }

    fn is_drone(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.drone)
    }

    fn is_enemy(&self, owner: ObjectId, other: ObjectId) -> bool {
        match (self.objects.get(&owner), self.objects.get(&other)) {
            (Some(a), Some(b)) => a.player != b.player && (a.enemy || b.enemy),
            _ => false,
        }
    }

    fn is_flying(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.flying)
    }

    fn is_moving(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.moving)
    }

    fn is_mobile(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.mobile)
    }

    fn can_attack(&self, attacker: ObjectId, target: AttackTarget) -> bool {
        let armed = self
            .live(attacker)
            .is_some_and(|o| o.weapon != WeaponStatus::NoWeapon);
        match target {
            AttackTarget::Object(id) => armed && self.live(id).is_some_and(|o| o.attackable),
            AttackTarget::Position(_) => armed,
        }
    }

    fn in_weapon_range(&self, attacker: ObjectId, target: AttackTarget) -> bool {
        let Some(shooter) = self.live(attacker) else {
            return false;
        };
        let at = match target {
            AttackTarget::Object(id) => self.position(id),
            AttackTarget::Position(pos) => Some(pos),
        };
        at.is_some_and(|pos| shooter.position.within(pos, shooter.weapon_range))
    }

    fn weapon_status(&self, attacker: ObjectId) -> WeaponStatus {
        self.objects
            .get(&attacker)
            .map_or(WeaponStatus::NoWeapon, |o| o.weapon)
    }

    fn fire_weapon(&mut self, attacker: ObjectId, target: AttackTarget) {
        self.shots.push((attacker, target));
    }

    fn last_attacker(&self, owner: ObjectId) -> Option<ObjectId> {
        self.last_attackers.get(&owner).copied()
    }

    fn take_last_attacker(&mut self, owner: ObjectId) -> Option<ObjectId> {
        self.last_attackers.remove(&owner)
    }

    fn closest_enemy(
        &self,
        owner: ObjectId,
        center: Vec2Fixed,
        range: Fixed,
        flying_only: bool,
    ) -> Option<ObjectId> {
        self.objects
            .iter()
            .filter(|&(&id, o)| {
                o.alive
                    && self.is_enemy(owner, id)
                    && (!flying_only || o.flying)
                    && center.within(o.position, range)
            })
            .min_by_key(|(&id, o)| (center.distance_squared(o.position), id))
            .map(|(&id, _)| id)
    }

    fn crate_to_pick_up(&self, _owner: ObjectId) -> Option<ObjectId> {
        self.nearby_crate.filter(|&id| self.is_alive(id))
    }

    fn vision_range(&self, id: ObjectId) -> Fixed {
        self.objects.get(&id).map_or(Fixed::ZERO, |o| o.vision)
    }

    fn waypoint(&self, id: WaypointId) -> Option<Waypoint> {
        self.waypoints.get(&id).copied()
    }

    fn squad_members(&self, id: SquadId) -> Vec<ObjectId> {
        self.squads.get(&id).cloned().unwrap_or_default()
    }
}

/// Pathfinder answering from public fields and logging requests.
#[derive(Debug, Clone)]
pub struct MockPathfinder {
    /// Answer to `compute_path`.
    pub answer: PathStatus,
    /// Answer to `path_status`.
    pub poll: PathStatus,
    /// Distance left on the current path.
    pub remaining: Option<Fixed>,
    /// Arrival tolerance.
    pub close_enough: Fixed,
    /// Frames blocked.
    pub frames_blocked: u32,
    /// Blocked with no way around.
    pub stuck: bool,
    /// Every path request as `(unit, goal)`.
    pub requests: Vec<(ObjectId, Vec2Fixed)>,
    /// Number of stop calls.
    pub stops: u32,
    /// Obstacle each unit currently ignores.
    pub ignored: BTreeMap<ObjectId, ObjectId>,
}

impl Default for MockPathfinder {
    fn default() -> Self {
        Self {
            answer: PathStatus::Ready,
            poll: PathStatus::Ready,
            remaining: Some(Fixed::from_num(100)),
            close_enough: Fixed::from_num(1),
            frames_blocked: 0,
            stuck: false,
            requests: Vec::new(),
            stops: 0,
            ignored: BTreeMap::new(),
        }
    }
}

impl MockPathfinder {
    /// Every unit is where it wants to be.
    pub fn arrive(&mut self) {
        self.remaining = Some(Fixed::ZERO);
    }

    /// Every unit is far from its goal.
    pub fn depart(&mut self) {
        self.remaining = Some(Fixed::from_num(100));
    }

    /// Goal of the latest request.
    #[must_use]
    pub fn last_goal(&self) -> Option<Vec2Fixed> {
        self.requests.last().map(|&(_, goal)| goal)
    }
}

impl Pathfinder for MockPathfinder {
    fn compute_path(&mut self, unit: ObjectId, goal: Vec2Fixed, _adjust: bool) -> PathStatus {
        self.requests.push((unit, goal));
        self.answer
    }

    fn path_status(&self, _unit: ObjectId) -> PathStatus {
        self.poll
    }

    fn remaining_distance(&self, _unit: ObjectId) -> Option<Fixed> {
        self.remaining
    }

    fn close_enough_distance(&self, _unit: ObjectId) -> Fixed {
        self.close_enough
    }

    fn frames_blocked(&self, _unit: ObjectId) -> u32 {
        self.frames_blocked
    }

    fn is_blocked_and_stuck(&self, _unit: ObjectId) -> bool {
        self.stuck
    }

    fn ignore_obstacle(&mut self, unit: ObjectId, obstacle: Option<ObjectId>) {
        match obstacle {
            Some(id) => {
                self.ignored.insert(unit, id);
            }
            None => {
                self.ignored.remove(&unit);
            }
        }
    }

    fn stop(&mut self, _unit: ObjectId) {
        self.stops += 1;
    }
}
