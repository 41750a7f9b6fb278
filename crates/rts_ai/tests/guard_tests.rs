//! Guard machine scenarios, alone and nested inside the unit AI.

use rts_ai::ai::{AiStateId, AiStateMachine};
use rts_ai::context::AttackTarget;
use rts_ai::guard::{AiGuardMachine, GuardMode, GuardStateId, GuardTarget};
use rts_ai::machine::StateStatus;
use rts_ai::math::Vec2Fixed;
use rts_ai_test_utils::fixtures::{pos, skirmish_rig, TestRig, UNIT};

const ENEMY: u64 = 7;

fn guard_here(mode: GuardMode, rig: &mut TestRig) -> AiGuardMachine {
    let mut guard = AiGuardMachine::new(GuardTarget::Position(Vec2Fixed::ZERO), mode);
    guard.init(&mut rig.ctx());
    guard
}

fn tick(guard: &mut AiGuardMachine, rig: &mut TestRig) -> StateStatus {
    rig.advance(1);
    guard.update(&mut rig.ctx())
}

// =============================================================================
// Scanning and engaging
// =============================================================================

mod engage {
    use super::*;

    #[test]
    fn test_idle_scan_engages_inner_enemy() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::Normal, &mut rig);
        assert!(guard.is_idle());

        tick(&mut guard, &mut rig);
        assert_eq!(guard.current_state_id(), Some(GuardStateId::Inner));
        assert_eq!(guard.nemesis(), Some(ENEMY));
        assert!(guard.is_attack());

        for _ in 0..4 {
            tick(&mut guard, &mut rig);
        }
        assert!(rig
            .world
            .shots
            .iter()
            .all(|&shot| shot == (UNIT, AttackTarget::Object(ENEMY))));
        assert!(!rig.world.shots.is_empty());
    }

    #[test]
    fn test_flying_only_ignores_ground_enemies() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::FlyingUnitsOnly, &mut rig);
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());

        rig.world.object_mut(ENEMY).unwrap().flying = true;
        rig.advance(rig.tuning.guard_enemy_scan_rate);
        guard.update(&mut rig.ctx());
        assert_eq!(guard.current_state_id(), Some(GuardStateId::Inner));
    }

    #[test]
    fn test_killing_the_nemesis_returns_to_idle() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::Normal, &mut rig);
        tick(&mut guard, &mut rig);
        assert!(guard.is_attack());

        rig.world.kill(ENEMY);
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());
        assert!(!guard.is_attack());
    }
}

// =============================================================================
// Pursuit
// =============================================================================

mod pursuit {
    use super::*;

    #[test]
    fn test_fleeing_enemy_is_pursued_to_outer_range() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::Normal, &mut rig);
        tick(&mut guard, &mut rig);

        rig.world.move_object(ENEMY, pos(150, 0));
        tick(&mut guard, &mut rig);
        assert_eq!(guard.current_state_id(), Some(GuardStateId::Outer));
        assert!(guard.is_attack());
        assert_eq!(rig.pathfinder.last_goal(), Some(pos(150, 0)));
    }

    #[test]
    fn test_without_pursuit_goes_back_to_idle() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::WithoutPursuit, &mut rig);
        tick(&mut guard, &mut rig);
        assert_eq!(guard.current_state_id(), Some(GuardStateId::Inner));

        rig.world.move_object(ENEMY, pos(150, 0));
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());
    }

    #[test]
    fn test_enemy_past_outer_range_ends_pursuit() {
        let mut rig = skirmish_rig(ENEMY);
        let mut guard = guard_here(GuardMode::Normal, &mut rig);
        tick(&mut guard, &mut rig);
        rig.world.move_object(ENEMY, pos(150, 0));
        tick(&mut guard, &mut rig);

        rig.world.move_object(ENEMY, pos(500, 0));
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());
    }
}

// =============================================================================
// Aggressors and crates
// =============================================================================

mod reactions {
    use super::*;

    #[test]
    fn test_aggressor_is_answered_then_given_up() {
        let mut rig = TestRig::new();
        rig.world.spawn_enemy(8, pos(300, 0));
        let mut guard = guard_here(GuardMode::Normal, &mut rig);

        rig.world.report_attack(UNIT, 8);
        tick(&mut guard, &mut rig);
        assert_eq!(
            guard.current_state_id(),
            Some(GuardStateId::AttackAggressor)
        );
        assert_eq!(guard.nemesis(), Some(8));
        assert!(rig.world.last_attackers.is_empty());

        rig.advance(rig.tuning.guard_chase_unit_frames);
        guard.update(&mut rig.ctx());
        assert!(guard.is_idle());
    }

    #[test]
    fn test_friendly_fire_is_not_answered() {
        let mut rig = TestRig::new();
        rig.world.spawn(8, pos(20, 0));
        let mut guard = guard_here(GuardMode::Normal, &mut rig);

        rig.world.report_attack(UNIT, 8);
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());
        assert_eq!(guard.nemesis(), None);
    }

    #[test]
    fn test_ignored_report_is_left_in_place() {
        let mut rig = TestRig::new();
        rig.world.spawn(8, pos(20, 0));
        let mut guard = guard_here(GuardMode::Normal, &mut rig);

        rig.world.report_attack(UNIT, 8);
        for _ in 0..3 {
            tick(&mut guard, &mut rig);
        }
        assert!(guard.is_idle());
        assert_eq!(rig.world.last_attackers.get(&UNIT), Some(&8));
    }

    #[test]
    fn test_crate_is_fetched_then_post_resumed() {
        let mut rig = TestRig::new();
        rig.world.spawn(30, pos(10, 10));
        rig.world.nearby_crate = Some(30);
        let mut guard = guard_here(GuardMode::Normal, &mut rig);

        tick(&mut guard, &mut rig);
        assert_eq!(guard.current_state_id(), Some(GuardStateId::GetCrate));
        assert_eq!(rig.pathfinder.last_goal(), Some(pos(10, 10)));

        rig.world.kill(30);
        tick(&mut guard, &mut rig);
        assert!(guard.is_idle());
    }
}

// =============================================================================
// Guarding an object
// =============================================================================

mod escort {
    use super::*;

    #[test]
    fn test_drifting_charge_is_followed() {
        let mut rig = TestRig::new();
        rig.world.spawn(40, pos(0, 0));
        let mut guard = AiGuardMachine::new(GuardTarget::Object(40), GuardMode::Normal);
        guard.init(&mut rig.ctx());
        assert!(guard.is_idle());

        rig.world.move_object(40, pos(300, 0));
        tick(&mut guard, &mut rig);
        assert_eq!(guard.current_state_id(), Some(GuardStateId::Return));
        assert_eq!(rig.pathfinder.last_goal(), Some(pos(300, 0)));
    }
}

// =============================================================================
// Temporary states over a nested guard
// =============================================================================

mod temporary {
    use super::*;

    #[test]
    fn test_temporary_wait_leaves_inner_untouched() {
        let mut rig = skirmish_rig(ENEMY);
        let mut ai = AiStateMachine::new();
        ai.init(&mut rig.ctx()).unwrap();
        ai.set_guard_order(GuardTarget::Position(Vec2Fixed::ZERO), GuardMode::Normal);
        ai.set_state(AiStateId::Guard, &mut rig.ctx()).unwrap();

        rig.advance(1);
        ai.update(&mut rig.ctx());
        let inner = |ai: &AiStateMachine| {
            ai.guard_machine()
                .and_then(AiGuardMachine::current_state_id)
        };
        assert_eq!(inner(&ai), Some(GuardStateId::Inner));

        ai.set_wait_until(None);
        assert_eq!(
            ai.set_temporary_state(AiStateId::Wait, 5, &mut rig.ctx())
                .unwrap(),
            StateStatus::Continue
        );

        for tick in 1..=6 {
            rig.advance(1);
            ai.update(&mut rig.ctx());
            assert_eq!(ai.current_state_id(), Some(AiStateId::Guard));
            assert_eq!(inner(&ai), Some(GuardStateId::Inner), "tick {tick}");
            if tick < 5 {
                assert_eq!(ai.machine().temporary_state_id(), Some(AiStateId::Wait));
                assert!(rig.world.shots.is_empty(), "tick {tick}");
            } else {
                assert_eq!(ai.machine().temporary_state_id(), None, "tick {tick}");
            }
        }
        assert_eq!(rig.world.shots, vec![(UNIT, AttackTarget::Object(ENEMY))]);
        assert!(ai.is_attack());
    }
}
