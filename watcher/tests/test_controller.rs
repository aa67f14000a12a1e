use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use daowatch::app::options::AppOptions;
use daowatch::app::run::run_with_source;
use daowatch::errors::{DecodeError, WatchError};
use daowatch::http::explorer::SnapshotSource;
use daowatch::models::deployment::{
    DeploymentSnapshot, DeploymentStatus, PhaseStep, Timestamp, UnitRole,
};
use daowatch::watch::controller::{
    Options, PollOutcome, PollingController, Redirect, WatchEvent,
};
use daowatch::watch::fsm::{ControllerState, StopReason};
use daowatch::watch::registry::WatchRegistry;

type Reply = Result<Option<DeploymentSnapshot>, WatchError>;

/// Replays canned replies per DAO, in order
#[derive(Default)]
struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn new(dao_id: &str, replies: Vec<Reply>) -> Self {
        let source = Self::default();
        source.add(dao_id, replies);
        source
    }

    fn add(&self, dao_id: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(dao_id.to_string(), replies.into());
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch_snapshot(&self, dao_id: &str) -> Reply {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(dao_id)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Ok(Some(snapshot))) if snapshot.dao_id == "hang" => {
                std::future::pending::<Reply>().await
            }
            Some(reply) => reply,
            None => Err(WatchError::Internal(format!("script for {} exhausted", dao_id))),
        }
    }
}

fn queued(dao_id: &str) -> Reply {
    Ok(Some(DeploymentSnapshot::new(
        dao_id,
        DeploymentStatus::Queued {
            queued_at: Timestamp(1),
        },
    )))
}

fn deploying(dao_id: &str, step: PhaseStep) -> Reply {
    Ok(Some(DeploymentSnapshot::new(
        dao_id,
        DeploymentStatus::Deploying {
            started_at: Timestamp(2),
            step,
        },
    )))
}

fn deployed(dao_id: &str) -> Reply {
    Ok(Some(DeploymentSnapshot::new(
        dao_id,
        DeploymentStatus::Deployed {
            deployed_at: Timestamp(3),
            identifiers: json!([[[{"backend": null}, "ryjl3-tyaaa-aaaaa-aaaba-cai"], []]]),
        },
    )))
}

fn failed(dao_id: &str) -> Reply {
    Ok(Some(DeploymentSnapshot::new(
        dao_id,
        DeploymentStatus::Failed {
            failed_at: Timestamp(4),
            error_message: "install rejected".to_string(),
            last_status: Box::new(DeploymentStatus::Deploying {
                started_at: Timestamp(2),
                step: PhaseStep::InstallingCode(UnitRole::Swap),
            }),
        },
    )))
}

/// A reply that never resolves
fn hang() -> Reply {
    Ok(Some(DeploymentSnapshot::new(
        "hang",
        DeploymentStatus::Queued {
            queued_at: Timestamp(0),
        },
    )))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn recording_sleep(
    delays: Arc<Mutex<Vec<Duration>>>,
) -> impl Fn(Duration) -> std::future::Ready<()> {
    move |delay| {
        delays.lock().unwrap().push(delay);
        std::future::ready(())
    }
}

#[tokio::test]
async fn test_runs_until_deployed() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![
            Ok(None),
            queued("dao-1"),
            deploying("dao-1", PhaseStep::CreatingUnit(UnitRole::Backend)),
            deploying("dao-1", PhaseStep::InstallingCode(UnitRole::Backend)),
            deployed("dao-1"),
            queued("dao-1"),
        ],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let delays = Arc::new(Mutex::new(Vec::new()));

    let controller = PollingController::new("dao-1", source.clone(), Options::default(), tx);
    let reason = controller.run(recording_sleep(delays.clone())).await;

    assert_eq!(reason, StopReason::Deployed);
    // Nothing is fetched after the terminal snapshot
    assert_eq!(source.fetches(), 5);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            Duration::from_millis(200),
            Duration::from_millis(2000),
            Duration::from_millis(2000),
            Duration::from_millis(2000),
        ]
    );

    let events = drain(&mut rx);
    let phases: Vec<i32> = events
        .iter()
        .filter_map(|e| e.descriptor().map(|d| d.phase_index))
        .collect();
    assert_eq!(phases, vec![0, 1, 2, 3]);

    match events.last() {
        Some(WatchEvent::Completed {
            identifiers,
            snapshot,
            ..
        }) => {
            assert_eq!(
                identifiers.get(UnitRole::Backend),
                Some("ryjl3-tyaaa-aaaaa-aaaba-cai")
            );
            // Swap was not reported, so the fallback is used and flagged
            assert!(identifiers.get(UnitRole::Swap).is_some());
            assert!(!identifiers.is_complete());
            assert_eq!(snapshot.status.name(), "deployed");
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_is_terminal() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![
            deploying("dao-1", PhaseStep::InstallingCode(UnitRole::Swap)),
            failed("dao-1"),
        ],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let controller = PollingController::new("dao-1", source.clone(), Options::default(), tx);
    let reason = controller.run(|_| async {}).await;

    assert_eq!(reason, StopReason::Failed);
    assert_eq!(source.fetches(), 2);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    match &events[1] {
        WatchEvent::Failed { descriptor, .. } => {
            assert_eq!(descriptor.phase_index, -1);
            assert!(descriptor.current_action_text.contains("installing swap code"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_redirects() {
    let source = Arc::new(ScriptedSource::new(
        "ghost",
        vec![Err(WatchError::NotFound("DAO ghost".to_string()))],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let controller = PollingController::new("ghost", source.clone(), Options::default(), tx);
    let reason = controller.run(|_| async {}).await;

    assert_eq!(reason, StopReason::NotFound);
    assert_eq!(source.fetches(), 1);
    match drain(&mut rx).as_slice() {
        [WatchEvent::Redirect { redirect, dao_id }] => {
            assert_eq!(redirect, &Redirect::NotFound);
            assert_eq!(dao_id, "ghost");
        }
        other => panic!("expected a single redirect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_decode_error_redirects_to_error() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![Err(DecodeError::UnhandledTag("paused".to_string()).into())],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let controller = PollingController::new("dao-1", source, Options::default(), tx);
    let reason = controller.run(|_| async {}).await;

    assert_eq!(reason, StopReason::Error);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [WatchEvent::Redirect {
            redirect: Redirect::Error(_),
            ..
        }]
    ));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![
            Err(WatchError::Unavailable("502 Bad Gateway".to_string())),
            Err(WatchError::Timeout(Duration::from_secs(10))),
            queued("dao-1"),
            Err(WatchError::Unavailable("503 Service Unavailable".to_string())),
            deployed("dao-1"),
        ],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let delays = Arc::new(Mutex::new(Vec::new()));

    let controller = PollingController::new("dao-1", source.clone(), Options::default(), tx);
    let reason = controller.run(recording_sleep(delays.clone())).await;

    assert_eq!(reason, StopReason::Deployed);
    assert_eq!(source.fetches(), 5);
    assert_eq!(
        *delays.lock().unwrap(),
        vec![
            Duration::from_millis(200),
            Duration::from_millis(200),
            Duration::from_millis(2000),
            Duration::from_millis(2000),
        ]
    );

    // Failed fetches emit nothing
    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_error_budget() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![
            queued("dao-1"),
            Err(WatchError::Unavailable("502".to_string())),
            Err(WatchError::Unavailable("502".to_string())),
            queued("dao-1"),
        ],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = Options {
        max_consecutive_errors: Some(2),
        ..Default::default()
    };

    let controller = PollingController::new("dao-1", source.clone(), options, tx);
    let reason = controller.run(|_| async {}).await;

    assert_eq!(reason, StopReason::Error);
    assert_eq!(source.fetches(), 3);
    assert!(matches!(
        drain(&mut rx).last(),
        Some(WatchEvent::Redirect {
            redirect: Redirect::Error(_),
            ..
        })
    ));
}

#[tokio::test]
async fn test_fetch_timeout_is_transient() {
    let source = Arc::new(ScriptedSource::new("dao-1", vec![hang(), deployed("dao-1")]));
    let (tx, _rx) = mpsc::unbounded_channel();
    let options = Options {
        fetch_timeout: Duration::from_millis(20),
        ..Default::default()
    };

    let controller = PollingController::new("dao-1", source.clone(), options, tx);
    let reason = controller.run(|_| async {}).await;

    assert_eq!(reason, StopReason::Deployed);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_cancel_stops_polling() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![queued("dao-1"), queued("dao-1")],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut controller = PollingController::new("dao-1", source.clone(), Options::default(), tx);
    let outcome = controller.start().await.unwrap();
    assert_eq!(outcome, PollOutcome::Continue(Duration::from_millis(2000)));

    controller.cancel();
    assert_eq!(controller.state(), ControllerState::Stopped);
    assert_eq!(controller.stop_reason(), Some(StopReason::Cancelled));

    assert_eq!(
        controller.poll_once().await,
        PollOutcome::Stop(StopReason::Cancelled)
    );
    assert_eq!(source.fetches(), 1);
    assert_eq!(drain(&mut rx).len(), 1);

    // Cancelling twice is harmless
    controller.cancel();
    assert_eq!(controller.stop_reason(), Some(StopReason::Cancelled));
}

/// Blocks every fetch until released, then reports a finished deployment
struct GatedSource {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl SnapshotSource for GatedSource {
    async fn fetch_snapshot(&self, dao_id: &str) -> Reply {
        self.started.notify_one();
        self.release.notified().await;
        deployed(dao_id)
    }
}

#[tokio::test]
async fn test_in_flight_result_discarded_after_cancel() {
    let source = Arc::new(GatedSource {
        started: Notify::new(),
        release: Notify::new(),
    });
    let (tx, mut rx) = mpsc::unbounded_channel();

    let controller = PollingController::new("dao-1", source.clone(), Options::default(), tx);
    let cancel = controller.cancel_handle();
    let task = tokio::spawn(controller.run(tokio::time::sleep));

    source.started.notified().await;
    cancel.cancel();
    assert!(cancel.is_cancelled());
    source.release.notify_one();

    let reason = tokio_test::assert_ok!(task.await);
    assert_eq!(reason, StopReason::Cancelled);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_cancel_interrupts_delay() {
    let source = Arc::new(ScriptedSource::new("dao-1", vec![Ok(None)]));
    let (tx, _rx) = mpsc::unbounded_channel();
    let options = Options {
        waiting_interval: Duration::from_secs(3600),
        ..Default::default()
    };

    let controller = PollingController::new("dao-1", source.clone(), options, tx);
    let cancel = controller.cancel_handle();
    let task = tokio::spawn(controller.run(tokio::time::sleep));

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let reason = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancel should interrupt the delay")
        .unwrap();
    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(source.fetches(), 1);
}

#[tokio::test]
async fn test_registry_sessions_are_independent() {
    let source = Arc::new(ScriptedSource::default());
    source.add(
        "dao-a",
        vec![
            queued("dao-a"),
            deploying("dao-a", PhaseStep::CreatingUnit(UnitRole::Ledger)),
            deployed("dao-a"),
        ],
    );
    source.add("dao-b", vec![Err(WatchError::NotFound("DAO dao-b".to_string()))]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = Options {
        waiting_interval: Duration::from_millis(1),
        tracking_interval: Duration::from_millis(1),
        ..Default::default()
    };
    let mut registry = WatchRegistry::new(source.clone(), options, tx);

    tokio_test::assert_ok!(registry.watch("dao-a"));
    tokio_test::assert_ok!(registry.watch("dao-b"));

    let mut results = registry.join_all().await;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        results,
        vec![
            ("dao-a".to_string(), StopReason::Deployed),
            ("dao-b".to_string(), StopReason::NotFound),
        ]
    );
    assert!(registry.is_empty());

    let events = drain(&mut rx);
    let dao_a: Vec<_> = events.iter().filter(|e| e.dao_id() == "dao-a").collect();
    let dao_b: Vec<_> = events.iter().filter(|e| e.dao_id() == "dao-b").collect();
    assert_eq!(dao_a.len(), 3);
    assert_eq!(dao_b.len(), 1);
    assert!(dao_a.last().unwrap().is_terminal());
}

#[tokio::test]
async fn test_registry_rejects_duplicate_and_cancels() {
    let source = Arc::new(ScriptedSource::new("dao-1", vec![hang()]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let options = Options {
        fetch_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let mut registry = WatchRegistry::new(source, options, tx);

    tokio_test::assert_ok!(registry.watch("dao-1"));
    assert!(registry.is_watching("dao-1"));
    assert_eq!(registry.len(), 1);
    assert!(matches!(
        registry.watch("dao-1"),
        Err(WatchError::AlreadyWatching(_))
    ));

    assert!(registry.cancel("dao-1"));
    assert!(!registry.cancel("dao-2"));

    let results = registry.join_all().await;
    assert_eq!(results, vec![("dao-1".to_string(), StopReason::Cancelled)]);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_run_with_source_until_all_stop() {
    let source = Arc::new(ScriptedSource::default());
    source.add("dao-a", vec![queued("dao-a"), failed("dao-a")]);
    source.add("dao-b", vec![Ok(None), deployed("dao-b")]);

    let options = AppOptions {
        dao_ids: vec!["dao-a".to_string(), "dao-b".to_string(), "dao-a".to_string()],
        controller: Options {
            waiting_interval: Duration::from_millis(1),
            tracking_interval: Duration::from_millis(1),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut seen = Vec::new();
    let results = run_with_source(
        source,
        options,
        |event| seen.push(event.clone()),
        std::future::pending::<()>(),
    )
    .await;
    let mut results = tokio_test::assert_ok!(results);
    results.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        results,
        vec![
            ("dao-a".to_string(), StopReason::Failed),
            ("dao-b".to_string(), StopReason::Deployed),
        ]
    );
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 2);
}

#[tokio::test]
async fn test_controller_keeps_observed_order() {
    let source = Arc::new(ScriptedSource::new(
        "dao-1",
        vec![
            queued("dao-1"),
            deploying("dao-1", PhaseStep::CreatingUnit(UnitRole::Backend)),
            deploying("dao-1", PhaseStep::CreatingUnit(UnitRole::Ledger)),
            deploying("dao-1", PhaseStep::InstallingCode(UnitRole::Backend)),
            deployed("dao-1"),
        ],
    ));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut controller = PollingController::new("dao-1", source, Options::default(), tx);
    let mut outcome = controller.start().await.unwrap();
    while let PollOutcome::Continue(_) = outcome {
        outcome = controller.poll_once().await;
    }

    assert_eq!(outcome, PollOutcome::Stop(StopReason::Deployed));
    assert_eq!(controller.fetch_count(), 5);
    assert_eq!(
        controller.accumulator().creation_order().iter().copied().collect::<Vec<_>>(),
        vec![UnitRole::Backend, UnitRole::Ledger]
    );
    assert_eq!(
        controller.accumulator().install_order().iter().copied().collect::<Vec<_>>(),
        vec![UnitRole::Backend]
    );

    let last = drain(&mut rx).pop().unwrap();
    assert_eq!(last.descriptor().map(|d| d.phase_index), Some(3));
}

/// Panics on every fetch
struct BrokenSource;

#[async_trait]
impl SnapshotSource for BrokenSource {
    async fn fetch_snapshot(&self, dao_id: &str) -> Reply {
        panic!("backend client for {} is broken", dao_id);
    }
}

#[tokio::test]
async fn test_run_with_source_survives_silent_session_end() {
    let options = AppOptions {
        dao_ids: vec!["dao-1".to_string()],
        ..Default::default()
    };

    let mut seen = Vec::new();
    let results = tokio::time::timeout(
        Duration::from_secs(5),
        run_with_source(
            Arc::new(BrokenSource),
            options,
            |event| seen.push(event.clone()),
            std::future::pending::<()>(),
        ),
    )
    .await
    .expect("run should return once every session has ended");

    let results = tokio_test::assert_ok!(results);
    assert_eq!(results, vec![("dao-1".to_string(), StopReason::Error)]);
    assert!(seen.is_empty());
}
