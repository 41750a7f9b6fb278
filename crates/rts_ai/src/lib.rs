//! # RTS AI
//!
//! Deterministic unit AI state machines for Post-Scarcity RTS.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No randomness (scan staggers derive from object ids)
//! - No floating-point math (uses fixed-point)
//!
//! The world, the pathfinder and the frame clock are reached through the
//! traits in [`context`], so the simulation plugs in its own and tests
//! plug in mocks.
//!
//! ## Crate Structure
//!
//! - [`machine`] - Generic state machine engine
//! - [`ai`] - Top-level unit AI
//! - [`attack`] - Attack machine and reusable attack behaviour
//! - [`guard`] - Guard machine
//! - [`dock`] - Dock machine
//! - [`movement`] - Move-to-position capability
//! - [`context`] - Collaborator traits and the per-call context
//! - [`xfer`] - Versioned save/load and checksums
//! - [`config`] - Tuning values
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod attack;
pub mod config;
pub mod context;
pub mod dock;
pub mod error;
pub mod guard;
pub mod machine;
pub mod math;
pub mod movement;
pub mod xfer;

#[cfg(test)]
mod testing;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{AiStateId, AiStateMachine};
    pub use crate::attack::{AttackBehavior, AttackStateId, AttackStateMachine, ExitConditions};
    pub use crate::config::AiTuning;
    pub use crate::context::{
        AiContext, ApproachSlot, AttackTarget, Dock, FrameClock, ObjectId, PathStatus,
        Pathfinder, SquadId, Waypoint, WaypointId, WeaponStatus, World,
    };
    pub use crate::dock::{AiDockMachine, DockStateId};
    pub use crate::error::{AiError, Result};
    pub use crate::guard::{AiGuardMachine, GuardMode, GuardStateId, GuardTarget};
    pub use crate::machine::{
        Condition, ExitType, Outcome, State, StateMachine, StateStatus, Target, TransitionRow,
    };
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::movement::MoveTo;
    pub use crate::xfer::{Snapshot, Xfer};
}
