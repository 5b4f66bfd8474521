mod common;

use std::sync::Arc;
use std::time::Duration;

use branchlink_core::{AppType, ConnectivityPhase, HeadOfficeRole, NodeIdentity, TransitionType};
use branchlink_sync::{ConnectivityMonitor, MonitorKind, NoOpEmitter};
use common::{branch_node, head_office_node, FakeApi, RecordingEmitter, LOCAL, ONLINE};

/// Four ticks of the 5s presence interval: t = 0, 5, 10, 15.
const FOUR_TICKS: Duration = Duration::from_millis(15_100);

// ── Transition logging ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fail_fail_ok_fail_writes_two_log_entries() {
    let api = FakeApi::new();
    api.script_checks(&[false, false, true, false]);
    let emitter = RecordingEmitter::new();

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), emitter.clone())
        .unwrap()
        .spawn();

    tokio::time::sleep(FOUR_TICKS).await;
    handle.shutdown().await;

    assert_eq!(api.check_count(), 4);

    let logs = api.logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].1.transition_type, TransitionType::OfflineToOnline);
    assert_eq!(logs[1].1.transition_type, TransitionType::OnlineToOffline);
    assert!(logs.iter().all(|(base, entry)| base == LOCAL && entry.branch_id == Some(3)));

    assert_eq!(
        emitter.transitions(),
        vec![
            (MonitorKind::Presence, TransitionType::OfflineToOnline),
            (MonitorKind::Presence, TransitionType::OnlineToOffline),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn ok_ok_fail_writes_one_offline_entry() {
    let api = FakeApi::new();
    api.script_checks(&[true, true, false]);

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), Arc::new(NoOpEmitter))
        .unwrap()
        .spawn();

    tokio::time::sleep(Duration::from_millis(10_100)).await;

    let state = handle.state();
    assert_eq!(state.is_connected, Some(false));
    assert_eq!(state.last_transition_type, Some(TransitionType::OnlineToOffline));
    assert!(state.last_transition_at.is_some());
    handle.shutdown().await;

    let logs = api.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].1.transition_type, TransitionType::OnlineToOffline);
}

#[tokio::test(start_paused = true)]
async fn first_resolved_check_is_not_a_transition() {
    let api = FakeApi::new();
    api.script_checks(&[false]);

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), Arc::new(NoOpEmitter))
        .unwrap()
        .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.is_connected(), Some(false));
    assert_eq!(handle.state().phase(), ConnectivityPhase::Offline);
    assert_eq!(handle.state().last_transition_type, None);
    handle.shutdown().await;

    assert!(api.logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn head_office_ping_never_writes_logs() {
    let api = FakeApi::new();
    api.script_checks(&[true, false, true]);
    let emitter = RecordingEmitter::new();

    let handle = ConnectivityMonitor::for_node(
        MonitorKind::HeadOfficePing,
        &head_office_node(),
        api.clone(),
        emitter.clone(),
    )
    .unwrap()
    .spawn();

    // 10s interval: t = 0, 10, 20.
    tokio::time::sleep(Duration::from_millis(20_100)).await;
    handle.shutdown().await;

    assert_eq!(api.check_count(), 3);
    assert!(api.logs().is_empty());
    assert_eq!(emitter.transitions().len(), 2);
}

// ── Probing ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn checks_hit_online_settings_endpoint_on_interval() {
    let api = FakeApi::new();
    api.script_checks(&[true]);

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), Arc::new(NoOpEmitter))
        .unwrap()
        .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.check_count(), 1);
    assert_eq!(handle.is_connected(), Some(true));

    tokio::time::sleep(Duration::from_millis(4_800)).await;
    assert_eq!(api.check_count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.check_count(), 2);
    handle.shutdown().await;

    let bases: Vec<_> = api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            common::Call::Check { base, .. } => Some(base),
            _ => None,
        })
        .collect();
    assert!(bases.iter().all(|b| b == ONLINE));
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_check() {
    let api = FakeApi::new();
    api.script_checks(&[true]);
    api.set_check_delay(Duration::from_secs(1));

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), Arc::new(NoOpEmitter))
        .unwrap()
        .spawn();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.check_count(), 1);

    handle.stop();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(handle.is_connected(), None);
    assert_eq!(api.check_count(), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_discards_in_flight_check() {
    let api = FakeApi::new();
    api.script_checks(&[true, false]);
    api.set_check_delay(Duration::from_secs(1));
    let emitter = RecordingEmitter::new();

    let handle = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), emitter.clone())
        .unwrap()
        .spawn();

    // First check resolves at t=1s; the second starts at t=5s.
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(handle.is_connected(), Some(true));
    assert_eq!(api.check_count(), 2);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(8)).await;

    assert_eq!(api.check_count(), 2);
    assert!(api.logs().is_empty());
    assert!(emitter.transitions().is_empty());
    assert_eq!(emitter.connectivity.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_interval_is_respected() {
    let api = FakeApi::new();
    api.script_checks(&[true]);

    let monitor = ConnectivityMonitor::for_node(MonitorKind::Presence, &branch_node(), api.clone(), Arc::new(NoOpEmitter))
        .unwrap()
        .with_interval(Duration::from_secs(1));
    assert_eq!(monitor.interval(), Duration::from_secs(1));

    let handle = monitor.spawn();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    handle.shutdown().await;

    assert_eq!(api.check_count(), 3);
}

// ── Enablement ──────────────────────────────────────────────────

#[test]
fn monitor_not_built_where_disabled() {
    let api = FakeApi::new();

    let mut back_office = branch_node();
    back_office.identity.app_type = AppType::BackOffice;
    assert!(ConnectivityMonitor::for_node(MonitorKind::Presence, &back_office, api.clone(), Arc::new(NoOpEmitter)).is_none());

    let mut standalone = branch_node();
    standalone.identity.standalone = true;
    assert!(ConnectivityMonitor::for_node(MonitorKind::Presence, &standalone, api.clone(), Arc::new(NoOpEmitter)).is_none());

    let mut not_main = head_office_node();
    not_main.identity = NodeIdentity::head_office(HeadOfficeRole::NotMain);
    assert!(
        ConnectivityMonitor::for_node(MonitorKind::HeadOfficePing, &not_main, api.clone(), Arc::new(NoOpEmitter)).is_none()
    );

    let mut no_online = branch_node();
    no_online.endpoints.online_url = None;
    assert!(ConnectivityMonitor::for_node(MonitorKind::Presence, &no_online, api, Arc::new(NoOpEmitter)).is_none());
}
