//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the AI machines produce
//! identical results given identical inputs, and that a save/load round
//! trip is invisible to the checksum.
//!
//! # Testing Strategy
//!
//! Unit AI runs inside the lockstep tick, so it must be 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Positions and ranges use
//!   [`rts_ai::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: State tables and mock worlds use
//!   `BTreeMap`.
//!
//! - **System randomness**: Scan staggers derive from object ids.
//!
//! Orders are expressed as [`AiOrder`] scripts so proptest can generate
//! them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rts_ai::ai::{AiStateId, AiStateMachine};
use rts_ai::guard::{GuardMode, GuardTarget};
use rts_ai::math::Vec2Fixed;

use crate::fixtures::{docking_rig, TestRig, DOCK};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "AI is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the scenario
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&mut S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&mut state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// One scripted order or world event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOrder {
    /// Walk somewhere.
    MoveTo(Vec2Fixed),
    /// Walk a path.
    FollowPath(Vec<Vec2Fixed>),
    /// Wait this many frames.
    Wait(u32),
    /// Attack an object.
    Attack(u64),
    /// Guard a spot.
    Guard(Vec2Fixed),
    /// Dock at the rig's dock.
    Dock,
    /// Go busy.
    Busy,
    /// Back to idle.
    Idle,
    /// Wait on top of the current state.
    Temporary(u32),
    /// Toggle the dock open or closed.
    ToggleDock,
    /// Let every path arrive.
    Arrive,
    /// Put every goal far away again.
    Depart,
    /// Run this many ticks.
    Tick(u32),
}

/// Apply one order, then run one tick.
///
/// Rejected orders are ignored; scripts are random.
pub fn apply_order(ai: &mut AiStateMachine, rig: &mut TestRig, order: &AiOrder) {
    let now = rig.now();
    match order {
        AiOrder::MoveTo(goal) => {
            ai.set_goal_position(*goal);
            let _ = ai.set_state(AiStateId::MoveTo, &mut rig.ctx());
        }
        AiOrder::FollowPath(points) => {
            ai.set_goal_path(points.clone());
            let _ = ai.set_state(AiStateId::FollowPath, &mut rig.ctx());
        }
        AiOrder::Wait(frames) => {
            ai.set_wait_until(Some(now + frames));
            let _ = ai.set_state(AiStateId::Wait, &mut rig.ctx());
        }
        AiOrder::Attack(id) => {
            ai.set_goal_object(Some(*id));
            let _ = ai.set_state(AiStateId::AttackObject, &mut rig.ctx());
        }
        AiOrder::Guard(at) => {
            ai.set_guard_order(GuardTarget::Position(*at), GuardMode::Normal);
            let _ = ai.set_state(AiStateId::Guard, &mut rig.ctx());
        }
        AiOrder::Dock => {
            ai.set_goal_object(Some(DOCK));
            let _ = ai.set_state(AiStateId::Dock, &mut rig.ctx());
        }
        AiOrder::Busy => {
            let _ = ai.set_state(AiStateId::Busy, &mut rig.ctx());
        }
        AiOrder::Idle => {
            let _ = ai.set_state(AiStateId::Idle, &mut rig.ctx());
        }
        AiOrder::Temporary(frames) => {
            ai.set_wait_until(None);
            let _ = ai.set_temporary_state(AiStateId::Wait, *frames, &mut rig.ctx());
        }
        AiOrder::ToggleDock => {
            if let Some(dock) = rig.world.dock_mut(DOCK) {
                dock.open = !dock.open;
            }
        }
        AiOrder::Arrive => rig.pathfinder.arrive(),
        AiOrder::Depart => rig.pathfinder.depart(),
        AiOrder::Tick(n) => {
            for _ in 0..*n {
                rig.advance(1);
                ai.update(&mut rig.ctx());
            }
        }
    }
    rig.advance(1);
    ai.update(&mut rig.ctx());
}

/// Build the standard rig, run `script` against a fresh AI and return
/// both.
///
/// The rig has a dock at [`DOCK`] and an enemy with id 7 at `(30, 0)`.
#[must_use]
pub fn run_script(script: &[AiOrder]) -> (AiStateMachine, TestRig) {
    let mut rig = docking_rig();
    rig.world.spawn_enemy(7, Vec2Fixed::from_ints(30, 0));
    let mut ai = AiStateMachine::new();
    let _ = ai.init(&mut rig.ctx());
    for order in script {
        apply_order(&mut ai, &mut rig, order);
    }
    (ai, rig)
}

/// Save `ai`, restore into a fresh machine and compare checksums.
///
/// Returns `false` on any snapshot error.
pub fn verify_snapshot_round_trip(ai: &mut AiStateMachine) -> bool {
    let (Ok(bytes), Ok(before)) = (ai.to_snapshot_bytes(), ai.crc()) else {
        return false;
    };
    let mut restored = AiStateMachine::new();
    if restored.restore_from_bytes(&bytes).is_err() {
        return false;
    }
    restored.crc().is_ok_and(|after| after == before)
}

/// Proptest strategies for the AI machines.
///
/// These strategies generate random but reproducible order scripts for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use rts_ai::machine::StateStatus;
    use rts_ai::math::{Fixed, Vec2Fixed};

    use super::AiOrder;

    /// Generate a fixed-point coordinate within a small map.
    ///
    /// Range: -500 to 500
    pub fn arb_coordinate() -> impl Strategy<Value = Fixed> {
        (-500i32..500i32).prop_map(Fixed::from_num)
    }

    /// Generate a position.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a status a scripted state might report.
    pub fn arb_status() -> impl Strategy<Value = StateStatus> {
        prop_oneof![
            Just(StateStatus::Continue),
            Just(StateStatus::Success),
            Just(StateStatus::Failure),
            (1u32..5u32).prop_map(StateStatus::Sleep),
        ]
    }

    /// Generate a single order.
    pub fn arb_order() -> impl Strategy<Value = AiOrder> {
        prop_oneof![
            arb_position().prop_map(AiOrder::MoveTo),
            proptest::collection::vec(arb_position(), 0..4).prop_map(AiOrder::FollowPath),
            (0u32..20u32).prop_map(AiOrder::Wait),
            prop_oneof![Just(7u64), Just(99u64)].prop_map(AiOrder::Attack),
            arb_position().prop_map(AiOrder::Guard),
            Just(AiOrder::Dock),
            Just(AiOrder::Busy),
            Just(AiOrder::Idle),
            (1u32..10u32).prop_map(AiOrder::Temporary),
            Just(AiOrder::ToggleDock),
            Just(AiOrder::Arrive),
            Just(AiOrder::Depart),
            (1u32..15u32).prop_map(AiOrder::Tick),
        ]
    }

    /// Generate an order script.
    pub fn arb_order_script(max_len: usize) -> impl Strategy<Value = Vec<AiOrder>> {
        proptest::collection::vec(arb_order(), 0..max_len)
    }
}
