use std::sync::Arc;

use acct_extract::ProviderError;
use acct_reconcile::{IndividualFetchError, ReconcileConfig, ReconcileError, Reconciler};
use acct_schemas::{ResourceStatus, TimeWindow};
use acct_testkit::{instant, usage, FakeListingProvider, FakeUsageProvider, SnapshotBuilder};

fn reconciler(listing: FakeListingProvider, usage: FakeUsageProvider) -> Reconciler {
    Reconciler::new(
        ReconcileConfig::default(),
        Arc::new(listing),
        Arc::new(usage),
    )
}

fn window(from: &str, to: &str) -> TimeWindow {
    TimeWindow::new(instant(from), instant(to)).unwrap()
}

#[tokio::test]
async fn scenario_a_never_launched_resource_has_zero_wall() {
    let t0 = "2024-01-01T12:00:00";
    let snap = SnapshotBuilder::new("vm-a", instant(t0))
        .never_launched()
        .status(ResourceStatus::Error)
        .build();

    let out = reconciler(
        FakeListingProvider::new(vec![snap]),
        FakeUsageProvider::new(Vec::new()),
    )
    .reconcile("proj-1", &window("2024-01-01T11:00:00", "2024-01-01T13:00:00"))
    .await
    .unwrap();

    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    assert_eq!(r.start_time, instant(t0));
    assert_eq!(r.end_time, Some(instant(t0)));
    assert_eq!(r.wall_duration_secs(), 0);
    assert_eq!(r.cpu_duration_secs(), 0);
    assert_eq!(r.status, ResourceStatus::Error);
}

#[tokio::test]
async fn scenario_b_end_beyond_window_is_republished_active() {
    let snap = SnapshotBuilder::new("vm-b", instant("2024-01-01T00:00:00"))
        .status(ResourceStatus::Deleted)
        .terminated(instant("2024-01-01T05:00:00"))
        .build();

    let out = reconciler(
        FakeListingProvider::new(vec![snap]),
        FakeUsageProvider::new(Vec::new()),
    )
    .reconcile("proj-1", &window("2024-01-01T01:00:00", "2024-01-01T03:00:00"))
    .await
    .unwrap();

    let r = &out.records[0];
    assert_eq!(r.start_time, instant("2024-01-01T01:00:00"));
    assert_eq!(r.end_time, None);
    assert_eq!(r.status, ResourceStatus::Active);
    assert_eq!(r.wall_duration_secs(), 2 * 3600);
}

#[tokio::test]
async fn scenario_c_usage_only_resource_is_fetched_and_merged() {
    let listing = FakeListingProvider::new(Vec::new()).with_hidden(
        SnapshotBuilder::new("vm-x", instant("2023-12-01"))
            .owner("alice", "proj-1")
            .flavor(1, 512, 1)
            .build(),
    );
    let w = window("2024-01-01", "2024-01-02");
    let usage_provider =
        FakeUsageProvider::new(vec![usage("vm-x", instant("2023-12-01"), None, 10.0)]);

    let listing = Arc::new(listing);
    let rec = Reconciler::new(
        ReconcileConfig::default(),
        listing.clone(),
        Arc::new(usage_provider),
    );
    let out = rec.reconcile("proj-1", &w).await.unwrap();

    assert_eq!(out.records.len(), 1);
    assert!(out.skipped.is_empty());
    let r = &out.records[0];
    assert_eq!(r.resource_id, "vm-x");
    assert_eq!(r.owner_id, "alice");
    // Sizes come from the usage entry, not the flavor.
    assert_eq!(r.cpu_count, 2);
    assert_eq!(r.memory_mb, 2048);
    assert_eq!(r.disk_gb, 20);
    assert_eq!(r.wall_duration_secs(), 86_400);
    assert_eq!(r.cpu_duration_secs(), 36_000);
    assert_eq!(listing.fetched_ids(), vec!["vm-x".to_string()]);
}

#[tokio::test]
async fn scenario_d_unresolvable_usage_is_skipped_not_fatal() {
    let listing = FakeListingProvider::new(vec![
        SnapshotBuilder::new("vm-ok", instant("2024-01-01T01:00:00")).build(),
    ]);
    let usage_provider = FakeUsageProvider::new(vec![
        usage("vm-ok", instant("2024-01-01T01:00:00"), None, 1.0),
        usage("vm-y", instant("2023-12-01"), None, 5.0),
    ]);

    let out = reconciler(listing, usage_provider)
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap();

    let ids: Vec<&str> = out.records.iter().map(|r| r.resource_id.as_str()).collect();
    assert_eq!(ids, vec!["vm-ok"]);
    assert_eq!(out.skipped.len(), 1);
    assert_eq!(out.skipped[0].resource_id, "vm-y");
    assert!(matches!(
        &out.skipped[0].reason,
        IndividualFetchError::Unresolvable { source } if source.is_not_found()
    ));
}

#[tokio::test]
async fn scenario_usage_resource_starting_after_window_is_skipped() {
    let listing = FakeListingProvider::new(Vec::new())
        .with_hidden(SnapshotBuilder::new("vm-late", instant("2024-01-05")).build());
    let usage_provider =
        FakeUsageProvider::new(vec![usage("vm-late", instant("2024-01-05"), None, 1.0)]);

    let out = reconciler(listing, usage_provider)
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap();

    assert!(out.records.is_empty());
    assert!(matches!(
        out.skipped[0].reason,
        IndividualFetchError::StartsAfterWindow { .. }
    ));
}

#[tokio::test]
async fn scenario_non_overlapping_changed_resource_is_dropped_silently() {
    let listing = FakeListingProvider::new(vec![SnapshotBuilder::new(
        "vm-gone",
        instant("2023-12-01"),
    )
    .status(ResourceStatus::Deleted)
    .terminated(instant("2023-12-02"))
    .build()]);

    let out = reconciler(listing, FakeUsageProvider::new(Vec::new()))
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap();

    assert!(out.records.is_empty());
    assert!(out.skipped.is_empty());
}

#[tokio::test]
async fn scenario_usage_for_non_overlapping_changed_resource_reuses_snapshot() {
    let listing = Arc::new(FakeListingProvider::new(vec![SnapshotBuilder::new(
        "vm-gone",
        instant("2023-12-01"),
    )
    .status(ResourceStatus::Deleted)
    .terminated(instant("2023-12-31T23:00:00"))
    .build()]));
    let usage_provider = FakeUsageProvider::new(vec![usage(
        "vm-gone",
        instant("2023-12-01"),
        Some(instant("2023-12-31T23:00:00")),
        3.0,
    )]);

    let out = Reconciler::new(
        ReconcileConfig::default(),
        listing.clone(),
        Arc::new(usage_provider),
    )
    .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
    .await
    .unwrap();

    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    assert_eq!(r.wall_duration_secs(), 0);
    assert_eq!(r.cpu_duration_secs(), 0);
    assert_eq!(r.start_time, instant("2024-01-01"));
    assert_eq!(r.end_time, Some(r.start_time));
    assert_eq!(listing.get_calls(), 0);
}

#[tokio::test]
async fn scenario_fetched_resource_ended_before_window_never_ends_before_start() {
    let listing = FakeListingProvider::new(Vec::new()).with_hidden(
        SnapshotBuilder::new("vm-old", instant("2023-12-01"))
            .status(ResourceStatus::Deleted)
            .terminated(instant("2023-12-31T23:00:00"))
            .build(),
    );
    let usage_provider = FakeUsageProvider::new(vec![usage(
        "vm-old",
        instant("2023-12-01"),
        None,
        1.0,
    )]);

    let out = reconciler(listing, usage_provider)
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap();

    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    let end = r.end_time.expect("ended resource keeps an end");
    assert!(end >= r.start_time, "end {end} before start {}", r.start_time);
    assert_eq!(r.status, ResourceStatus::Deleted);
    assert_eq!(r.wall_duration_secs(), 0);
    assert_eq!(r.cpu_duration_secs(), 0);
}

#[tokio::test]
async fn scenario_collection_failure_is_fatal() {
    let listing = FakeListingProvider::new(Vec::new())
        .failing_list(ProviderError::Transport("timeout".to_string()));

    let err = reconciler(listing, FakeUsageProvider::new(Vec::new()))
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::CollectionFailed(_)));
}

#[tokio::test]
async fn scenario_aggregation_failure_is_fatal() {
    let listing = FakeListingProvider::new(vec![
        SnapshotBuilder::new("vm-1", instant("2024-01-01T01:00:00")).build(),
    ]);
    let usage_provider = FakeUsageProvider::failing(ProviderError::Decode("bad".to_string()));

    let err = reconciler(listing, usage_provider)
        .reconcile("proj-1", &window("2024-01-01", "2024-01-02"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::AggregationFailed(_)));
}
