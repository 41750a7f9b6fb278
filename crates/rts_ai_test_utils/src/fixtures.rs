//! Test fixtures and helpers.
//!
//! Pre-built worlds and a rig that owns every collaborator, for
//! consistent testing.

use fixed::types::I32F32;
use rts_ai::config::AiTuning;
use rts_ai::context::{AiContext, ObjectId};
use rts_ai::math::Vec2Fixed;

use crate::mocks::{ManualClock, MockDock, MockPathfinder, MockWorld};

/// Id of the unit under test in every fixture.
pub const UNIT: ObjectId = 1;

/// Id of the dock in [`docking_rig`].
pub const DOCK: ObjectId = 50;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Integer position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Owns a world, a pathfinder and a clock, and hands out contexts for
/// [`UNIT`].
#[derive(Debug, Clone, Default)]
pub struct TestRig {
    /// Frame clock.
    pub clock: ManualClock,
    /// World.
    pub world: MockWorld,
    /// Pathfinder.
    pub pathfinder: MockPathfinder,
    /// Tuning in effect.
    pub tuning: AiTuning,
}

impl TestRig {
    /// A rig whose world holds only [`UNIT`] at the origin.
    #[must_use]
    pub fn new() -> Self {
        let mut rig = Self::default();
        rig.world.spawn(UNIT, Vec2Fixed::ZERO);
        rig
    }

    /// Context for [`UNIT`].
    pub fn ctx(&mut self) -> AiContext<'_> {
        AiContext::new(
            UNIT,
            &self.clock,
            &mut self.world,
            &mut self.pathfinder,
            &self.tuning,
        )
    }

    /// Current frame.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.clock.frame
    }

    /// Move the clock.
    pub fn advance(&mut self, frames: u32) {
        self.clock.advance(frames);
    }

    /// The dock placed by [`docking_rig`].
    ///
    /// # Panics
    ///
    /// Panics if the rig has no dock at [`DOCK`].
    pub fn dock(&mut self) -> &mut MockDock {
        self.world.dock_mut(DOCK).expect("rig has no dock")
    }
}

/// A unit next to an open dock at `(0, 100)`.
#[must_use]
pub fn docking_rig() -> TestRig {
    let mut rig = TestRig::new();
    rig.world.add_dock(DOCK, MockDock::new(pos(0, 100)));
    rig
}

/// A unit at the origin with an enemy at `(30, 0)`, inside vision and
/// weapon range.
#[must_use]
pub fn skirmish_rig(enemy: ObjectId) -> TestRig {
    let mut rig = TestRig::new();
    rig.world.spawn_enemy(enemy, pos(30, 0));
    rig
}
