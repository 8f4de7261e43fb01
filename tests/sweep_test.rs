mod common;

use common::{Harness, READER};
use std::time::Duration;
use tillpay::config::CoordinatorConfig;
use tillpay::domain::payment::PollResponse;
use tillpay::domain::processor::ProcessorError;

#[tokio::test(start_paused = true)]
async fn test_abandoned_payment_is_swept_without_polling() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    h.coordinator.start().await;
    let start = h.coordinator.begin_terminal_payment(READER, None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(125)).await;
    // Past the timeout but before the next sweep.
    assert!(h.coordinator.store().contains(&start.payment_id).await);

    tokio::time::sleep(Duration::from_secs(26)).await;
    assert!(!h.coordinator.store().contains(&start.payment_id).await);
    assert_eq!(h.processor.calls("cancel_reader_action"), 1);
    assert_eq!(h.processor.calls("cancel_payment_intent"), 1);
    assert!(h.ledger.entries().is_empty());
    assert_eq!(
        h.coordinator.poll_terminal(&start.payment_id).await,
        PollResponse::AlreadyConcluded
    );
    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_link_is_swept_too() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    h.coordinator.start().await;
    let link = h.coordinator.begin_link_payment().await.unwrap();

    tokio::time::sleep(Duration::from_secs(151)).await;
    assert!(h.coordinator.store().is_empty().await);
    assert_eq!(h.processor.calls("deactivate_payment_link"), 1);
    assert!(h.ledger.entries().is_empty());
    assert_eq!(
        h.coordinator.poll_link(&link.payment_id).await,
        PollResponse::AlreadyConcluded
    );
    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_sweeps_and_clears_the_store() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    h.coordinator.start().await;
    h.coordinator.begin_terminal_payment(READER, None).await.unwrap();

    h.coordinator.shutdown().await;
    assert!(h.coordinator.store().is_empty().await);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(h.ledger.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_remote_release_still_evicts() {
    let h = Harness::new(CoordinatorConfig::default()).await;
    h.processor.update(|s| {
        s.cancel_action_error = Some(ProcessorError::Transport("reset".to_string()));
        s.cancel_intent_error = Some(ProcessorError::Transport("reset".to_string()));
    });
    h.coordinator.start().await;
    let start = h.coordinator.begin_terminal_payment(READER, None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(151)).await;
    assert!(!h.coordinator.store().contains(&start.payment_id).await);
    assert_eq!(h.processor.calls("cancel_payment_intent"), 1);
    assert!(h.ledger.entries().is_empty());
    h.coordinator.shutdown().await;
}
