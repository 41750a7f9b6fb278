//! Transition table dumps of the built-in machines.

use std::fmt::Write as _;

use clap::ValueEnum;
use rts_ai::ai::AiStateMachine;
use rts_ai::attack::AttackStateMachine;
use rts_ai::context::AttackTarget;
use rts_ai::dock::AiDockMachine;
use rts_ai::error::Result;
use rts_ai::guard::{AiGuardMachine, GuardMode, GuardTarget};
use rts_ai::machine::TransitionRow;
use rts_ai::math::Vec2Fixed;

/// Built-in machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MachineKind {
    /// Top-level unit AI.
    Ai,
    /// Attack machine against a mobile object victim.
    Attack,
    /// Guard machine.
    Guard,
    /// Dock machine.
    Dock,
}

impl MachineKind {
    /// Every machine, in display order.
    pub const ALL: [Self; 4] = [Self::Ai, Self::Attack, Self::Guard, Self::Dock];

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ai => "AIStateMachine",
            Self::Attack => "AttackStateMachine",
            Self::Guard => "AIGuardMachine",
            Self::Dock => "AIDockMachine",
        }
    }
}

/// Transition rows of one machine.
#[must_use]
pub fn rows(kind: MachineKind) -> Vec<TransitionRow> {
    match kind {
        MachineKind::Ai => AiStateMachine::new().describe(),
        MachineKind::Attack => AttackStateMachine::new(AttackTarget::Object(0), false, true).describe(),
        MachineKind::Guard => {
            AiGuardMachine::new(GuardTarget::Position(Vec2Fixed::ZERO), GuardMode::Normal).describe()
        }
        MachineKind::Dock => AiDockMachine::new(0).describe(),
    }
}

/// Check one machine's topology.
///
/// # Errors
///
/// Returns the first dangling edge or duplicate state.
pub fn validate(kind: MachineKind) -> Result<()> {
    match kind {
        MachineKind::Ai => AiStateMachine::new().machine().validate(),
        MachineKind::Attack => {
            for (victim, forced, mobile) in [
                (AttackTarget::Object(0), false, true),
                (AttackTarget::Object(0), true, true),
                (AttackTarget::Object(0), false, false),
                (AttackTarget::Position(Vec2Fixed::ZERO), false, true),
            ] {
                AttackStateMachine::new(victim, forced, mobile).validate()?;
            }
            Ok(())
        }
        MachineKind::Guard => {
            AiGuardMachine::new(GuardTarget::Position(Vec2Fixed::ZERO), GuardMode::Normal)
                .machine()
                .validate()
        }
        MachineKind::Dock => AiDockMachine::new(0).machine().validate(),
    }
}

/// Plain-text table of one machine.
#[must_use]
pub fn render(kind: MachineKind) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", kind.name());
    for row in rows(kind) {
        let marker = if row.is_default { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker} {:<18} {:<26} success -> {:<18} failure -> {}",
            row.state, row.name, row.success, row.failure
        );
        for (description, target) in &row.conditions {
            let _ = writeln!(out, "      if {description} -> {target}");
        }
    }
    out
}

/// JSON document of one machine.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(kind: MachineKind) -> serde_json::Result<String> {
    let doc = serde_json::json!({
        "machine": kind.name(),
        "states": rows(kind),
    });
    serde_json::to_string_pretty(&doc)
}
