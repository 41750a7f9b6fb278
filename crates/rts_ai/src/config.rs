//! Data-driven tuning for the AI machines.
//!
//! Every value is measured in logic frames unless stated otherwise. All
//! fields carry serde defaults, so a tuning file only lists what it
//! overrides.
//!
//! # Example RON
//!
//! ```ron
//! AiTuning(
//!     guard_enemy_scan_rate: 10,
//!     guard_chase_unit_frames: 450,
//!     guard_outer_range_factor: 12884901888,  // Fixed-point for 3.0
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::math::{fixed_serde, Fixed};

/// Logic frames per simulated second.
pub const LOGIC_FRAMES_PER_SECOND: u32 = 30;

/// Tuning knobs shared by every machine of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiTuning {
    /// Logic frames per second, used to express second-based caps.
    pub logic_frames_per_second: u32,

    /// Most transitions a machine may chain inside one tick before the
    /// tick is declared a cycle and the machine fails.
    pub max_transitions_per_tick: u32,

    /// Upper bound on a temporary state's frame limit.
    pub max_temporary_state_frames: u32,

    /// Minimum frames between two repaths caused by a moving goal.
    pub min_repath_frames: u32,

    /// Minimum frames between two repaths caused by an obstruction.
    pub blocked_repath_frames: u32,

    /// Frames a unit may be blocked before it counts as stuck.
    pub blocked_frames_threshold: u32,

    /// Sleep length while waiting for a pending path.
    pub path_wait_frames: u32,

    /// How long a docker waits for clearance before giving up.
    pub dock_clearance_timeout_frames: u32,

    /// Guard idle scan period.
    pub guard_enemy_scan_rate: u32,

    /// Scan period while returning to the guard point.
    pub guard_return_scan_rate: u32,

    /// How long the outer guard state chases before giving up.
    pub guard_chase_unit_frames: u32,

    /// Inner guard radius as a multiple of vision range.
    #[serde(with = "fixed_serde")]
    pub guard_inner_range_factor: Fixed,

    /// Outer guard radius as a multiple of vision range.
    #[serde(with = "fixed_serde")]
    pub guard_outer_range_factor: Fixed,

    /// How far a guarded object may drift before the guard walks back.
    #[serde(with = "fixed_serde")]
    pub guard_drift_distance: Fixed,

    /// Idle target scan period for the unit AI.
    pub idle_scan_rate: u32,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            logic_frames_per_second: LOGIC_FRAMES_PER_SECOND,
            max_transitions_per_tick: 20,
            max_temporary_state_frames: 60 * LOGIC_FRAMES_PER_SECOND,
            min_repath_frames: 10,
            blocked_repath_frames: LOGIC_FRAMES_PER_SECOND,
            blocked_frames_threshold: 2 * LOGIC_FRAMES_PER_SECOND,
            path_wait_frames: 2,
            dock_clearance_timeout_frames: 30 * LOGIC_FRAMES_PER_SECOND,
            guard_enemy_scan_rate: LOGIC_FRAMES_PER_SECOND / 2,
            guard_return_scan_rate: LOGIC_FRAMES_PER_SECOND,
            guard_chase_unit_frames: 10 * LOGIC_FRAMES_PER_SECOND,
            guard_inner_range_factor: Fixed::from_num(1),
            guard_outer_range_factor: Fixed::from_num(2),
            guard_drift_distance: Fixed::from_num(20),
            idle_scan_rate: LOGIC_FRAMES_PER_SECOND,
        }
    }
}

impl AiTuning {
    /// Parse tuning from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::ConfigParse`] on malformed RON and
    /// [`AiError::Config`] when a value fails [`AiTuning::validate`].
    pub fn from_ron_str(source: &str, origin: &str) -> Result<Self> {
        let tuning: Self = ron::from_str(source).map_err(|e| AiError::ConfigParse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("logic_frames_per_second", self.logic_frames_per_second),
            ("max_transitions_per_tick", self.max_transitions_per_tick),
            ("max_temporary_state_frames", self.max_temporary_state_frames),
            ("path_wait_frames", self.path_wait_frames),
            ("dock_clearance_timeout_frames", self.dock_clearance_timeout_frames),
            ("guard_enemy_scan_rate", self.guard_enemy_scan_rate),
            ("guard_return_scan_rate", self.guard_return_scan_rate),
            ("idle_scan_rate", self.idle_scan_rate),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(AiError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.guard_inner_range_factor <= Fixed::ZERO {
            return Err(AiError::Config(
                "guard_inner_range_factor must be positive".to_string(),
            ));
        }
        if self.guard_outer_range_factor < self.guard_inner_range_factor {
            return Err(AiError::Config(format!(
                "guard_outer_range_factor ({}) is smaller than guard_inner_range_factor ({})",
                self.guard_outer_range_factor, self.guard_inner_range_factor
            )));
        }
        if self.guard_drift_distance < Fixed::ZERO {
            return Err(AiError::Config(
                "guard_drift_distance must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Convert seconds to logic frames.
    #[must_use]
    pub const fn seconds(&self, seconds: u32) -> u32 {
        seconds * self.logic_frames_per_second
    }
}
