//! Attack scenarios driven through the unit AI.

use rts_ai::ai::{AiState, AiStateId, AiStateMachine};
use rts_ai::attack::{AttackBehavior, AttackStateId};
use rts_ai::context::{AttackTarget, WeaponStatus};
use rts_ai::machine::StateStatus;
use rts_ai_test_utils::fixtures::{pos, skirmish_rig, TestRig, UNIT};

const ENEMY: u64 = 7;

fn idle_ai(rig: &mut TestRig) -> AiStateMachine {
    let mut ai = AiStateMachine::new();
    ai.init(&mut rig.ctx()).unwrap();
    ai
}

fn ticks(ai: &mut AiStateMachine, rig: &mut TestRig, n: u32) {
    for _ in 0..n {
        rig.advance(1);
        ai.update(&mut rig.ctx());
    }
}

/// State of the attack machine running under AttackObject or AttackPosition.
fn attack_state(ai: &AiStateMachine) -> Option<AttackStateId> {
    match ai.machine().current_state()? {
        AiState::AttackObject(attack) | AiState::AttackPosition(attack) => {
            attack.machine().and_then(|m| m.current_state_id())
        }
        _ => None,
    }
}

// =============================================================================
// Acquiring and firing
// =============================================================================

mod fire {
    use super::*;

    #[test]
    fn test_idle_unit_acquires_and_fires() {
        let mut rig = skirmish_rig(ENEMY);
        let mut ai = idle_ai(&mut rig);

        ticks(&mut ai, &mut rig, 1);
        assert_eq!(ai.current_state_id(), Some(AiStateId::AttackObject));
        assert_eq!(ai.goal_object(), Some(ENEMY));
        assert!(ai.is_attack());

        ticks(&mut ai, &mut rig, 4);
        assert_eq!(rig.world.shots.len(), 2);
        assert!(rig
            .world
            .shots
            .iter()
            .all(|&shot| shot == (UNIT, AttackTarget::Object(ENEMY))));
    }

    #[test]
    fn test_dead_victim_ends_the_attack() {
        let mut rig = skirmish_rig(ENEMY);
        let mut ai = idle_ai(&mut rig);
        ticks(&mut ai, &mut rig, 2);

        rig.world.kill(ENEMY);
        ticks(&mut ai, &mut rig, 1);
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
        assert!(!ai.is_attack());
    }

    #[test]
    fn test_reloading_weapon_waits_in_aim() {
        let mut rig = skirmish_rig(ENEMY);
        rig.world.object_mut(UNIT).unwrap().weapon = WeaponStatus::PreAttack;
        let mut ai = idle_ai(&mut rig);
        ticks(&mut ai, &mut rig, 3);
        assert_eq!(attack_state(&ai), Some(AttackStateId::FireWeapon));
        assert!(rig.world.shots.is_empty());

        rig.world.object_mut(UNIT).unwrap().weapon = WeaponStatus::ReadyToFire;
        ticks(&mut ai, &mut rig, 1);
        assert_eq!(rig.world.shots.len(), 1);
        assert_eq!(attack_state(&ai), Some(AttackStateId::AimAtTarget));
    }

    #[test]
    fn test_ground_attack_fires_at_position() {
        let mut rig = TestRig::new();
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_position(pos(20, 0));
        ai.set_state(AiStateId::AttackPosition, &mut rig.ctx())
            .unwrap();

        ticks(&mut ai, &mut rig, 2);
        assert_eq!(
            rig.world.shots,
            vec![(UNIT, AttackTarget::Position(pos(20, 0)))]
        );
    }
}

// =============================================================================
// Closing the distance
// =============================================================================

mod approach {
    use super::*;

    #[test]
    fn test_distant_victim_is_approached_then_aimed_at() {
        let mut rig = TestRig::new();
        rig.world.spawn_enemy(9, pos(200, 0));
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_object(Some(9));
        ai.set_state(AiStateId::AttackObject, &mut rig.ctx())
            .unwrap();

        assert_eq!(attack_state(&ai), Some(AttackStateId::ApproachTarget));
        assert_eq!(rig.pathfinder.last_goal(), Some(pos(200, 0)));

        rig.world.move_object(9, pos(40, 0));
        ticks(&mut ai, &mut rig, 1);
        assert_eq!(attack_state(&ai), Some(AttackStateId::AimAtTarget));
    }

    #[test]
    fn test_moving_victim_is_chased() {
        let mut rig = TestRig::new();
        rig.world.spawn_enemy(9, pos(200, 0)).moving = true;
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_object(Some(9));
        ai.set_state(AiStateId::AttackObject, &mut rig.ctx())
            .unwrap();
        assert_eq!(attack_state(&ai), Some(AttackStateId::ChaseTarget));

        rig.world.object_mut(9).unwrap().moving = false;
        ticks(&mut ai, &mut rig, 1);
        assert_eq!(attack_state(&ai), Some(AttackStateId::ApproachTarget));
    }

    #[test]
    fn test_immobile_attacker_gives_up_on_distant_victim() {
        let mut rig = TestRig::new();
        rig.world.object_mut(UNIT).unwrap().mobile = false;
        rig.world.spawn_enemy(9, pos(200, 0));
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_object(Some(9));
        ai.set_state(AiStateId::AttackObject, &mut rig.ctx())
            .unwrap();

        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
        assert!(rig.pathfinder.requests.is_empty());
    }

    #[test]
    fn test_unattackable_victim_is_refused() {
        let mut rig = skirmish_rig(ENEMY);
        rig.world.object_mut(ENEMY).unwrap().attackable = false;
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_object(Some(ENEMY));
        ai.set_state(AiStateId::AttackObject, &mut rig.ctx())
            .unwrap();
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
    }
}

// =============================================================================
// Squads and shot limits
// =============================================================================

mod squads {
    use super::*;

    #[test]
    fn test_squad_members_are_attacked_in_turn() {
        let mut rig = TestRig::new();
        rig.world.spawn_enemy(7, pos(30, 0));
        rig.world.spawn_enemy(8, pos(0, 30));
        rig.world.squads.insert(3, vec![7, 8]);
        let mut ai = idle_ai(&mut rig);
        ai.set_goal_squad(Some(3));
        ai.set_state(AiStateId::AttackSquad, &mut rig.ctx())
            .unwrap();
        ticks(&mut ai, &mut rig, 2);
        assert_eq!(rig.world.shots.last(), Some(&(UNIT, AttackTarget::Object(7))));

        rig.world.kill(7);
        ticks(&mut ai, &mut rig, 3);
        assert_eq!(ai.current_state_id(), Some(AiStateId::AttackSquad));
        assert_eq!(rig.world.shots.last(), Some(&(UNIT, AttackTarget::Object(8))));

        rig.world.kill(8);
        ticks(&mut ai, &mut rig, 1);
        assert_eq!(ai.current_state_id(), Some(AiStateId::Idle));
    }

    #[test]
    fn test_shot_limit_ends_engagement() {
        let mut rig = skirmish_rig(ENEMY);
        let mut attack = AttackBehavior::with_max_shots(2);
        assert_eq!(
            attack.enter(AttackTarget::Object(ENEMY), false, &mut rig.ctx()),
            StateStatus::Continue
        );

        let mut status = StateStatus::Continue;
        for _ in 0..10 {
            rig.advance(1);
            status = attack.update(None, &mut rig.ctx());
            if !status.is_running() {
                break;
            }
        }
        assert_eq!(status, StateStatus::Success);
        assert_eq!(rig.world.shots.len(), 2);

        attack.exit(&mut rig.ctx());
        assert!(!attack.is_attacking());
    }
}
