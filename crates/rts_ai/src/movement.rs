//! Walking to a point.
//!
//! [`MoveTo`] is the capability every walking state embeds. It owns the
//! conversation with the [`Pathfinder`](crate::context::Pathfinder):
//! requesting a path, sleeping while a request is pending, and deciding
//! when a new path is worth asking for.
//!
//! Two separate throttles keep the pathfinder from thrashing:
//!
//! - a goal that drifts only triggers a repath after `min_repath_frames`
//!   and only if it moved by more than the distance-scaled tolerance of
//!   [`is_same_position`];
//! - an obstruction triggers a repath at most once every
//!   `blocked_repath_frames`.

use crate::context::{AiContext, ObjectId, PathStatus};
use crate::error::Result;
use crate::machine::StateStatus;
use crate::math::{is_same_position, Vec2Fixed};
use crate::xfer::{Snapshot, Xfer, XferVersion};

const MOVE_TO_VERSION: XferVersion = 1;

/// Move-to-position behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveTo {
    goal: Vec2Fixed,
    path_goal: Vec2Fixed,
    waiting_for_path: bool,
    path_timestamp: u32,
    blocked_repath_timestamp: Option<u32>,
    adjust_destination: bool,
    ignored_obstacle: Option<ObjectId>,
}

impl MoveTo {
    /// A mover that lets the pathfinder nudge the destination to a free
    /// spot when `adjust_destination` is set.
    #[must_use]
    pub fn new(adjust_destination: bool) -> Self {
        Self {
            adjust_destination,
            ..Self::default()
        }
    }

    /// Current goal.
    #[must_use]
    pub const fn goal(&self) -> Vec2Fixed {
        self.goal
    }

    /// Whether a path request is still pending.
    #[must_use]
    pub const fn is_waiting_for_path(&self) -> bool {
        self.waiting_for_path
    }

    /// Let the unit drive through `obstacle` until [`MoveTo::end`].
    pub fn set_ignored_obstacle(&mut self, obstacle: Option<ObjectId>) {
        self.ignored_obstacle = obstacle;
    }

    /// Point the mover at a new goal without repathing right away.
    ///
    /// The next [`MoveTo::tick`] decides whether the move is large enough
    /// to be worth a new path.
    pub fn retarget(&mut self, goal: Vec2Fixed) {
        self.goal = goal;
    }

    /// Start walking to `goal`.
    pub fn begin(&mut self, goal: Vec2Fixed, ctx: &mut AiContext<'_>) -> StateStatus {
        self.goal = goal;
        self.blocked_repath_timestamp = None;
        if self.ignored_obstacle.is_some() {
            ctx.pathfinder.ignore_obstacle(ctx.owner, self.ignored_obstacle);
        }
        self.request_path(ctx)
    }

    /// Advance one frame. `Success` on arrival, `Failure` when no path
    /// exists.
    pub fn tick(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        let now = ctx.now();
        let owner = ctx.owner;

        if self.waiting_for_path {
            match ctx.pathfinder.path_status(owner) {
                PathStatus::Pending => {
                    self.path_timestamp = now;
                    return StateStatus::Sleep(ctx.tuning.path_wait_frames);
                }
                PathStatus::Failed => {
                    self.waiting_for_path = false;
                    return StateStatus::Failure;
                }
                PathStatus::Ready => self.waiting_for_path = false,
            }
        }

        let blocked = ctx.pathfinder.is_blocked_and_stuck(owner)
            || ctx.pathfinder.frames_blocked(owner) > ctx.tuning.blocked_frames_threshold;
        if blocked {
            let due = self
                .blocked_repath_timestamp
                .map_or(true, |t| now.saturating_sub(t) >= ctx.tuning.blocked_repath_frames);
            if due {
                tracing::debug!(owner, frame = now, "blocked, computing a new path");
                self.blocked_repath_timestamp = Some(now);
                let status = self.request_path(ctx);
                if status != StateStatus::Continue {
                    return status;
                }
            }
        } else if now.saturating_sub(self.path_timestamp) > ctx.tuning.min_repath_frames
            && !is_same_position(ctx.owner_position(), self.goal, self.path_goal)
        {
            let status = self.request_path(ctx);
            if status != StateStatus::Continue {
                return status;
            }
        }

        match ctx.pathfinder.remaining_distance(owner) {
            Some(left) if left <= ctx.pathfinder.close_enough_distance(owner) => StateStatus::Success,
            Some(_) => StateStatus::Continue,
            None => StateStatus::Failure,
        }
    }

    /// Stop walking.
    pub fn end(&mut self, ctx: &mut AiContext<'_>) {
        if self.ignored_obstacle.is_some() {
            ctx.pathfinder.ignore_obstacle(ctx.owner, None);
        }
        ctx.pathfinder.stop(ctx.owner);
        self.waiting_for_path = false;
    }

    fn request_path(&mut self, ctx: &mut AiContext<'_>) -> StateStatus {
        self.path_timestamp = ctx.now();
        self.path_goal = self.goal;
        match ctx
            .pathfinder
            .compute_path(ctx.owner, self.goal, self.adjust_destination)
        {
            PathStatus::Ready => {
                self.waiting_for_path = false;
                StateStatus::Continue
            }
            PathStatus::Pending => {
                self.waiting_for_path = true;
                StateStatus::Sleep(ctx.tuning.path_wait_frames)
            }
            PathStatus::Failed => {
                self.waiting_for_path = false;
                StateStatus::Failure
            }
        }
    }
}

impl Snapshot for MoveTo {
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
        let mut version = MOVE_TO_VERSION;
        xfer.xfer_version(&mut version, MOVE_TO_VERSION, "move_to")?;
        xfer.xfer(&mut self.goal)?;
        xfer.xfer(&mut self.path_goal)?;
        xfer.xfer(&mut self.waiting_for_path)?;
        xfer.xfer(&mut self.path_timestamp)?;
        xfer.xfer(&mut self.blocked_repath_timestamp)?;
        xfer.xfer(&mut self.adjust_destination)?;
        xfer.xfer(&mut self.ignored_obstacle)
    }
}
