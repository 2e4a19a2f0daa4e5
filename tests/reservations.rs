use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ulid::Ulid;

use airtime::config::Config;
use airtime::engine::{Engine, EngineError};
use airtime::model::{ReservationRequest, Secs};
use airtime::notify::NotifyHub;

const H: Secs = 3600;

// ── Test infrastructure ──────────────────────────────────────

fn test_config(capacity: u32) -> Config {
    let dir = std::env::temp_dir().join(format!("airtime_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("AIRTIME_DATA_DIR", dir.display().to_string()),
        ("AIRTIME_TERM_START", "0".to_string()),
        ("AIRTIME_TERM_END", (7 * 24 * H).to_string()),
        ("AIRTIME_SLOT_WIDTH", H.to_string()),
        ("AIRTIME_SLOT_CAPACITY", capacity.to_string()),
        ("AIRTIME_TAGS", "music,games,talk".to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned())
}

async fn start_engine(config: &Config, notify: Arc<NotifyHub>) -> Arc<Engine> {
    let engine = Engine::open(config.wal_path(), config.grid, notify).unwrap();
    for (i, name) in config.tags.iter().enumerate() {
        engine.register_tag(i as i64 + 1, name.clone()).await.unwrap();
    }
    Arc::new(engine)
}

fn request(
    requester_id: i64,
    start_at: Secs,
    end_at: Secs,
    tag_ids: Vec<i64>,
) -> ReservationRequest {
    ReservationRequest {
        requester_id,
        title: format!("show by {requester_id}"),
        description: String::new(),
        playlist_url: format!("https://media.example/{requester_id}/playlist.m3u8"),
        thumbnail_url: format!("https://media.example/{requester_id}/thumb.jpg"),
        start_at,
        end_at,
        tag_ids,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_window_admits_exactly_capacity() {
    let config = test_config(4);
    let engine = start_engine(&config, Arc::new(NotifyHub::new())).await;

    let results = join_all((0..50).map(|user| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.book(request(user, 20 * H, 23 * H, vec![1])).await
        })
    }))
    .await;

    let mut accepted = 0;
    let mut rejected = 0;
    for r in results {
        match r.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::InsufficientCapacity(span)) => {
                assert!(span.start >= 20 * H && span.end <= 23 * H);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 4);
    assert_eq!(rejected, 46);

    let slots = engine.slots(19 * H, 24 * H).await;
    let remaining: Vec<u32> = slots.iter().map(|s| s.remaining).collect();
    assert_eq!(remaining, vec![4, 0, 0, 0, 4]);
    assert_eq!(engine.search_livestreams_by_tag("music").await.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_windows_all_succeed_concurrently() {
    let config = test_config(1);
    let engine = start_engine(&config, Arc::new(NotifyHub::new())).await;

    let results = join_all((0..48).map(|hour| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .book(request(hour, hour * H, (hour + 1) * H, vec![]))
                .await
        })
    }))
    .await;

    assert!(results.into_iter().all(|r| matches!(r, Ok(Ok(_)))));
    assert!(engine.slots(0, 48 * H).await.iter().all(|s| s.remaining == 0));
    assert!(engine.slots(48 * H, 49 * H).await[0].remaining == 1);
}

#[tokio::test]
async fn owner_notified_of_new_livestream() {
    let config = test_config(2);
    let notify = Arc::new(NotifyHub::new());
    let engine = start_engine(&config, notify.clone()).await;

    let mut rx = notify.subscribe(42);
    let booked = engine.book(request(42, 0, 2 * H, vec![2, 3])).await.unwrap();

    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .unwrap();
    assert_eq!(got, booked);

    let names: Vec<String> = engine.tags_of(&got).into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["games", "talk"]);
}

#[tokio::test]
async fn restart_after_compaction_keeps_bookings() {
    let config = test_config(2);
    let booked = {
        let engine = start_engine(&config, Arc::new(NotifyHub::new())).await;
        let mut booked = Vec::new();
        for user in 0..5 {
            let start = user * 6 * H;
            let ls = engine.book(request(user, start, start + 3 * H, vec![1])).await;
            booked.push(ls.unwrap());
        }
        // Second booking on the first window fills it.
        booked.push(engine.book(request(9, 0, H, vec![])).await.unwrap());
        assert!(airtime::compactor::compact_if_due(&engine, 1).await.unwrap());
        booked
    };
    assert!(config.wal_path().exists());

    // Startup re-registers the same tags; those are no-ops.
    let engine = start_engine(&config, Arc::new(NotifyHub::new())).await;
    assert_eq!(engine.list_livestreams(None).await.len(), booked.len());
    for ls in &booked {
        assert_eq!(engine.get_livestream(ls.id).await.as_ref(), Some(ls));
    }
    assert_eq!(engine.slots(0, H).await[0].remaining, 0);
    assert!(matches!(
        engine.book(request(10, 0, H, vec![])).await,
        Err(EngineError::InsufficientCapacity(_))
    ));
    assert_eq!(engine.list_tags().len(), 3);
}

#[tokio::test]
async fn reopening_with_another_grid_is_refused() {
    let config = test_config(2);
    {
        let _engine = start_engine(&config, Arc::new(NotifyHub::new())).await;
    }

    let mut changed = config.clone();
    changed.grid.slot_width = 30 * 60;
    let result = Engine::open(changed.wal_path(), changed.grid, Arc::new(NotifyHub::new()));
    assert!(matches!(result, Err(EngineError::TermMismatch { .. })));
}
