//! In-crate test doubles.
//!
//! Integration tests use `rts_ai_test_utils`; unit tests inside this crate
//! cannot, because that crate links its own copy of `rts_ai`.

use crate::config::AiTuning;
use crate::context::{AiContext, ObjectId, PathStatus, Pathfinder, World};
use crate::math::{Fixed, Vec2Fixed};

/// World where only the owner exists.
#[derive(Debug, Default)]
pub struct NullWorld {
    pub owner_position: Vec2Fixed,
}

impl World for NullWorld {
    fn is_alive(&self, id: ObjectId) -> bool {
        id == Harness::OWNER
    }

    fn position(&self, id: ObjectId) -> Option<Vec2Fixed> {
        (id == Harness::OWNER).then_some(self.owner_position)
    }
}

/// Pathfinder answering from public fields.
#[derive(Debug)]
pub struct StubPathfinder {
    pub answer: PathStatus,
    pub poll: PathStatus,
    pub remaining: Option<Fixed>,
    pub close_enough: Fixed,
    pub frames_blocked: u32,
    pub stuck: bool,
    pub requests: Vec<Vec2Fixed>,
    pub stops: u32,
    pub ignored: Option<ObjectId>,
}

impl Default for StubPathfinder {
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
            ignored: None,
        }
    }
}

impl Pathfinder for StubPathfinder {
    fn compute_path(&mut self, _unit: ObjectId, goal: Vec2Fixed, _adjust: bool) -> PathStatus {
        self.requests.push(goal);
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

    fn ignore_obstacle(&mut self, _unit: ObjectId, obstacle: Option<ObjectId>) {
        self.ignored = obstacle;
    }

    fn stop(&mut self, _unit: ObjectId) {
        self.stops += 1;
    }
}

/// Owns every collaborator and hands out contexts.
#[derive(Debug, Default)]
pub struct Harness {
    pub frame: u32,
    pub world: NullWorld,
    pub pathfinder: StubPathfinder,
    pub tuning: AiTuning,
}

impl Harness {
    pub const OWNER: ObjectId = 1;

    pub fn ctx(&mut self) -> AiContext<'_> {
        AiContext::new(
            Self::OWNER,
            &self.frame,
            &mut self.world,
            &mut self.pathfinder,
            &self.tuning,
        )
    }

    pub fn advance(&mut self, frames: u32) {
        self.frame += frames;
    }
}
