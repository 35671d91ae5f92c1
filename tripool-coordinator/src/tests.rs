use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use tripool_core::payment::PaymentStatus;
use tripool_store::memory::{
    MemoryConfigurationStore, MemoryParticipantLedger, MemoryTripDirectory,
};

use crate::coordinator::ThresholdCoordinator;
use crate::error::CoordinatorError;
use crate::mock::MockGateway;

struct Rig {
    coordinator: Arc<ThresholdCoordinator>,
    gateway: Arc<MockGateway>,
    trips: Arc<MemoryTripDirectory>,
    trip: Uuid,
    host: Uuid,
}

async fn rig() -> Rig {
    let gateway = Arc::new(MockGateway::new());
    let trips = Arc::new(MemoryTripDirectory::new());
    let trip = Uuid::new_v4();
    let host = Uuid::new_v4();
    trips.insert(trip, host).await;

    let coordinator = Arc::new(ThresholdCoordinator::new(
        Arc::new(MemoryConfigurationStore::new()),
        Arc::new(MemoryParticipantLedger::new()),
        gateway.clone(),
        trips.clone(),
    ));

    Rig {
        coordinator,
        gateway,
        trips,
        trip,
        host,
    }
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let rig = rig().await;

    let first = rig
        .coordinator
        .setup(rig.trip, rig.host, 9000, "usd", 3)
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.config.per_seat_amount, 3000);

    // Second setup with different numbers does not create or mutate
    let second = rig
        .coordinator
        .setup(rig.trip, rig.host, 50000, "usd", 5)
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.config.total_cost, 9000);
    assert_eq!(second.config.min_participants, 3);
}

#[tokio::test]
async fn test_setup_rejects_bad_arguments() {
    let rig = rig().await;

    for (total, min) in [(0, 3), (-50, 3), (9000, 1), (9000, 0)] {
        let err = rig
            .coordinator
            .setup(rig.trip, rig.host, total, "usd", min)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidArgument(_)));
    }
}

#[tokio::test]
async fn test_join_requires_configuration() {
    let rig = rig().await;
    let err = rig
        .coordinator
        .join_with_payment(rig.trip, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::ConfigurationMissing));
}

#[tokio::test]
async fn test_threshold_met_after_minimum_joins() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    for n in 1..=3u32 {
        let joined = rig
            .coordinator
            .join_with_payment(rig.trip, Uuid::new_v4(), None)
            .await
            .unwrap();
        assert_eq!(joined.amount, 3000);
        assert_eq!(joined.threshold.current_participants, n);
        assert_eq!(joined.threshold.threshold_met, n >= 3);
        assert!(joined.client_secret.is_some());
    }

    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.threshold.current_participants, 3);
    assert!(status.threshold.threshold_met);
    assert!(status
        .participants
        .iter()
        .all(|p| p.status == PaymentStatus::Authorized));
}

#[tokio::test]
async fn test_join_twice_is_rejected() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let participant = Uuid::new_v4();
    rig.coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap();

    let err = rig
        .coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AlreadyAuthorized));
}

#[tokio::test]
async fn test_declined_join_can_be_retried() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let participant = Uuid::new_v4();
    let err = rig
        .coordinator
        .join_with_payment(rig.trip, participant, Some("pm_declined"))
        .await
        .unwrap_err();
    match err {
        CoordinatorError::PaymentFailed { reason } => assert_eq!(reason, "card declined"),
        other => panic!("unexpected error: {other:?}"),
    }

    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.participants.len(), 1);
    assert_eq!(status.participants[0].status, PaymentStatus::Failed);
    assert_eq!(status.threshold.current_participants, 0);

    // A fresh attempt creates a new record; the failed one stays for audit
    rig.coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap();
    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.participants.len(), 2);
    assert_eq!(status.threshold.current_participants, 1);
}

#[tokio::test]
async fn test_gateway_timeout_leaves_record_pending() {
    let rig = rig().await;
    let coordinator = Arc::new(
        ThresholdCoordinator::new(
            Arc::new(MemoryConfigurationStore::new()),
            Arc::new(MemoryParticipantLedger::new()),
            rig.gateway.clone(),
            rig.trips.clone(),
        )
        .with_gateway_deadline(Duration::from_millis(50)),
    );
    coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let participant = Uuid::new_v4();
    let err = coordinator
        .join_with_payment(rig.trip, participant, Some("pm_hang"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::GatewayTimeout));

    // The ambiguous outcome is never resolved to failed
    let status = coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.participants[0].status, PaymentStatus::Pending);

    // The slot stays occupied until reconciled
    let err = coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AlreadyPending));

    // Reconciliation replays the hold under the same idempotency key
    let outcome = coordinator
        .reconcile_pending(rig.trip, participant)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Authorized);
    assert_eq!(outcome.threshold.current_participants, 1);
}

#[tokio::test]
async fn test_reconcile_without_pending_record() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let err = rig
        .coordinator
        .reconcile_pending(rig.trip, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NothingToReconcile));

    // Reconciling an already-authorized participant is a no-op success
    let participant = Uuid::new_v4();
    rig.coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap();
    let outcome = rig
        .coordinator
        .reconcile_pending(rig.trip, participant)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Authorized);
    assert_eq!(rig.gateway.holds_placed().await, 1);
}

#[tokio::test]
async fn test_removal_flips_threshold_and_a_new_join_restores_it() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for member in &members {
        rig.coordinator
            .join_with_payment(rig.trip, *member, None)
            .await
            .unwrap();
    }
    assert!(rig.coordinator.get_status(rig.trip).await.unwrap().threshold.threshold_met);

    let removed = rig
        .coordinator
        .remove_participant(rig.trip, members[0], rig.host)
        .await
        .unwrap();
    assert!(!removed.threshold.threshold_met);
    assert_eq!(removed.threshold.current_participants, 2);

    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    let voided = status
        .participants
        .iter()
        .find(|p| p.participant_id == members[0])
        .unwrap();
    assert_eq!(voided.status, PaymentStatus::Voided);
    assert!(rig.gateway.was_voided(voided.hold_ref.as_deref().unwrap()).await);

    // A fourth participant restores the threshold
    let joined = rig
        .coordinator
        .join_with_payment(rig.trip, Uuid::new_v4(), None)
        .await
        .unwrap();
    assert!(joined.threshold.threshold_met);
}

#[tokio::test]
async fn test_only_the_host_may_remove() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let participant = Uuid::new_v4();
    rig.coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap();

    let err = rig
        .coordinator
        .remove_participant(rig.trip, participant, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NotHost));

    let err = rig
        .coordinator
        .remove_participant(Uuid::new_v4(), participant, rig.host)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::TripUnknown));
}

#[tokio::test]
async fn test_remove_without_authorized_record() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    // Never joined
    let err = rig
        .coordinator
        .remove_participant(rig.trip, Uuid::new_v4(), rig.host)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NothingToRemove));

    // Already removed
    let participant = Uuid::new_v4();
    rig.coordinator
        .join_with_payment(rig.trip, participant, None)
        .await
        .unwrap();
    rig.coordinator
        .remove_participant(rig.trip, participant, rig.host)
        .await
        .unwrap();
    let err = rig
        .coordinator
        .remove_participant(rig.trip, participant, rig.host)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::AlreadyFinal));
}

#[tokio::test]
async fn test_card_issuance_is_idempotent() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let err = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::ThresholdNotMet {
            current: 0,
            required: 3
        }
    ));

    for _ in 0..3 {
        rig.coordinator
            .join_with_payment(rig.trip, Uuid::new_v4(), None)
            .await
            .unwrap();
    }

    let first = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap();
    assert!(!first.already_exists);
    assert_eq!(first.funded_amount, 9000);

    let second = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap();
    assert!(second.already_exists);
    assert_eq!(second.card.card_ref, first.card.card_ref);

    let err = rig
        .coordinator
        .issue_virtual_card(rig.trip, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NotHost));
}

#[tokio::test]
async fn test_card_is_funded_at_total_cost_not_sum_of_holds() {
    let rig = rig().await;
    // 10000 / 3 rounds up to 3334, so three holds sum to 10002
    rig.coordinator
        .setup(rig.trip, rig.host, 10000, "usd", 3)
        .await
        .unwrap();

    for _ in 0..3 {
        let joined = rig
            .coordinator
            .join_with_payment(rig.trip, Uuid::new_v4(), None)
            .await
            .unwrap();
        assert_eq!(joined.amount, 3334);
    }

    let issued = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap();
    assert_eq!(issued.funded_amount, 10000);
}

#[tokio::test]
async fn test_card_survives_later_removal_and_joins() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for member in &members {
        rig.coordinator
            .join_with_payment(rig.trip, *member, None)
            .await
            .unwrap();
    }
    let issued = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap();

    // Removal is not blocked by the card; the threshold flag drops but the
    // card reference is retained
    rig.coordinator
        .remove_participant(rig.trip, members[0], rig.host)
        .await
        .unwrap();
    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert!(!status.threshold.threshold_met);
    assert_eq!(
        status.configuration.virtual_card.as_ref().unwrap().card_ref,
        issued.card.card_ref
    );

    // A fourth join is still accepted after issuance and never reissues
    rig.coordinator
        .join_with_payment(rig.trip, Uuid::new_v4(), None)
        .await
        .unwrap();
    let again = rig
        .coordinator
        .issue_virtual_card(rig.trip, rig.host)
        .await
        .unwrap();
    assert!(again.already_exists);
    assert_eq!(again.card.card_ref, issued.card.card_ref);
}

#[tokio::test]
async fn test_joins_beyond_the_minimum_are_accepted() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    for _ in 0..5 {
        rig.coordinator
            .join_with_payment(rig.trip, Uuid::new_v4(), None)
            .await
            .unwrap();
    }
    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.threshold.current_participants, 5);
    assert!(status.threshold.threshold_met);
}

#[tokio::test]
async fn test_capture_moves_authorized_holds_to_captured() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    for _ in 0..3 {
        rig.coordinator
            .join_with_payment(rig.trip, Uuid::new_v4(), None)
            .await
            .unwrap();
    }

    let outcome = rig
        .coordinator
        .capture_payments(rig.trip, rig.host)
        .await
        .unwrap();
    assert_eq!(outcome.captured.len(), 3);
    assert!(outcome.failed.is_empty());

    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert!(status
        .participants
        .iter()
        .all(|p| p.status == PaymentStatus::Captured));
    // Captured rows still count toward the threshold
    assert!(status.threshold.threshold_met);
    for p in &status.participants {
        assert!(rig.gateway.was_captured(p.hold_ref.as_deref().unwrap()).await);
    }

    // A second pass finds nothing left to capture
    let outcome = rig
        .coordinator
        .capture_payments(rig.trip, rig.host)
        .await
        .unwrap();
    assert!(outcome.captured.is_empty());
    assert!(outcome.failed.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_are_serialized_per_trip() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 24000, "usd", 8).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = rig.coordinator.clone();
        let trip = rig.trip;
        handles.push(tokio::spawn(async move {
            coordinator
                .join_with_payment(trip, Uuid::new_v4(), None)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every participant landed in a terminal state consistent with the
    // gateway: eight authorized rows, eight holds, no double counting
    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    assert_eq!(status.participants.len(), 8);
    assert!(status
        .participants
        .iter()
        .all(|p| p.status == PaymentStatus::Authorized));
    assert_eq!(status.threshold.current_participants, 8);
    assert!(status.threshold.threshold_met);
    assert_eq!(rig.gateway.holds_placed().await, 8);

    let refs: std::collections::HashSet<_> = status
        .participants
        .iter()
        .map(|p| p.hold_ref.clone().unwrap())
        .collect();
    assert_eq!(refs.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_and_remove_do_not_corrupt_the_count() {
    let rig = rig().await;
    rig.coordinator.setup(rig.trip, rig.host, 9000, "usd", 3).await.unwrap();

    let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for member in &members {
        rig.coordinator
            .join_with_payment(rig.trip, *member, None)
            .await
            .unwrap();
    }

    let join = {
        let coordinator = rig.coordinator.clone();
        let trip = rig.trip;
        tokio::spawn(async move {
            coordinator
                .join_with_payment(trip, Uuid::new_v4(), None)
                .await
        })
    };
    let remove = {
        let coordinator = rig.coordinator.clone();
        let (trip, target, host) = (rig.trip, members[0], rig.host);
        tokio::spawn(async move { coordinator.remove_participant(trip, target, host).await })
    };

    join.await.unwrap().unwrap();
    remove.await.unwrap().unwrap();

    let status = rig.coordinator.get_status(rig.trip).await.unwrap();
    let authorized = status
        .participants
        .iter()
        .filter(|p| p.status == PaymentStatus::Authorized)
        .count();
    assert_eq!(authorized, 3);
    assert_eq!(status.threshold.current_participants, 3);
    assert!(status.threshold.threshold_met);
}
