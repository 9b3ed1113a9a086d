use super::*;
use crate::services::registry::unregister;
use crate::state::test_helpers::{assert_no_frame, connect, principal, recv_frame, seat, test_app_state};

fn editing(project_id: Uuid, task_id: Uuid, active: bool) -> Signal {
    Signal { project_id, task_id, kind: SignalKind::Editing, active }
}

#[tokio::test]
async fn signal_reaches_other_members_but_not_sender() {
    let (state, oracle) = test_app_state();
    let project = Uuid::new_v4();
    let task = Uuid::new_v4();
    let ada = principal("ada");
    oracle.grant(ada.id, project);
    let (a, mut rx_a) = connect(&state, &ada).await;
    let (b, mut rx_b) = connect(&state, &principal("b")).await;
    let (c, mut rx_c) = connect(&state, &principal("c")).await;
    for id in [a, b, c] {
        seat(&state, id, project).await;
    }

    let delivered = relay(&state, a, editing(project, task, true)).await.expect("authorized");
    assert_eq!(delivered, 2);

    for rx in [&mut rx_b, &mut rx_c] {
        let frame = recv_frame(rx).await;
        assert_eq!(frame.syscall, "signal:editing");
        assert_eq!(frame.project_id, Some(project));
        assert_eq!(frame.data["kind"], "editing");
        assert_eq!(frame.data["task_id"], task.to_string());
        assert_eq!(frame.data["active"], true);
        assert_eq!(frame.data["user"]["name"], "ada");
        assert!(frame.data["timestamp"].as_i64().is_some());
    }
    assert_no_frame(&mut rx_a).await;
}

#[tokio::test]
async fn typing_signal_uses_its_own_syscall() {
    let (state, oracle) = test_app_state();
    let project = Uuid::new_v4();
    let ada = principal("ada");
    oracle.grant(ada.id, project);
    let (a, _rx_a) = connect(&state, &ada).await;
    let (b, mut rx_b) = connect(&state, &principal("b")).await;
    seat(&state, a, project).await;
    seat(&state, b, project).await;

    let signal = Signal { project_id: project, task_id: Uuid::new_v4(), kind: SignalKind::Typing, active: false };
    relay(&state, a, signal).await.expect("authorized");

    let frame = recv_frame(&mut rx_b).await;
    assert_eq!(frame.syscall, "signal:typing");
    assert_eq!(frame.data["kind"], "typing");
    assert_eq!(frame.data["active"], false);
}

#[tokio::test]
async fn every_emission_is_reauthorized() {
    let (state, oracle) = test_app_state();
    let project = Uuid::new_v4();
    let task = Uuid::new_v4();
    let ada = principal("ada");
    oracle.grant(ada.id, project);
    let (a, _rx_a) = connect(&state, &ada).await;
    let (b, mut rx_b) = connect(&state, &principal("b")).await;
    seat(&state, a, project).await;
    seat(&state, b, project).await;

    relay(&state, a, editing(project, task, true)).await.expect("first emission authorized");
    recv_frame(&mut rx_b).await;

    // Revoked mid-session while still sitting in the room.
    oracle.revoke(ada.id, project);
    let err = relay(&state, a, editing(project, task, false)).await.unwrap_err();
    assert_eq!(err, RealtimeError::AccessDenied(project));
    assert_no_frame(&mut rx_b).await;
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn oracle_outage_drops_signal() {
    let (state, oracle) = test_app_state();
    let project = Uuid::new_v4();
    let ada = principal("ada");
    oracle.grant(ada.id, project);
    oracle.set_failing(true);
    let (a, _rx_a) = connect(&state, &ada).await;
    let (b, mut rx_b) = connect(&state, &principal("b")).await;
    seat(&state, a, project).await;
    seat(&state, b, project).await;

    assert!(relay(&state, a, editing(project, Uuid::new_v4(), true)).await.is_err());
    assert_no_frame(&mut rx_b).await;
}

#[tokio::test]
async fn unknown_connection_is_not_authenticated() {
    let (state, oracle) = test_app_state();
    let id = Uuid::new_v4();
    let err = relay(&state, id, editing(Uuid::new_v4(), Uuid::new_v4(), true)).await.unwrap_err();
    assert_eq!(err, RealtimeError::NotAuthenticated(id));
    assert_eq!(oracle.calls(), 0);

    let (gone, _rx) = connect(&state, &principal("gone")).await;
    unregister(&state, gone).await;
    assert!(relay(&state, gone, editing(Uuid::new_v4(), Uuid::new_v4(), true)).await.is_err());
}

#[tokio::test]
async fn signals_are_delivered_in_order_and_never_replayed() {
    let (state, oracle) = test_app_state();
    let project = Uuid::new_v4();
    let task = Uuid::new_v4();
    let ada = principal("ada");
    oracle.grant(ada.id, project);
    let (a, _rx_a) = connect(&state, &ada).await;
    let (b, mut rx_b) = connect(&state, &principal("b")).await;
    seat(&state, a, project).await;
    seat(&state, b, project).await;

    relay(&state, a, editing(project, task, true)).await.expect("on");
    relay(&state, a, editing(project, task, false)).await.expect("off");

    assert_eq!(recv_frame(&mut rx_b).await.data["active"], true);
    assert_eq!(recv_frame(&mut rx_b).await.data["active"], false);

    // A late joiner learns nothing about earlier signals.
    let (late, mut rx_late) = connect(&state, &principal("late")).await;
    seat(&state, late, project).await;
    assert_no_frame(&mut rx_late).await;
}
