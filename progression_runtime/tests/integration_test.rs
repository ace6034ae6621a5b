//! Integration tests for progression_runtime.
//!
//! File-backed tests use temporary directories for isolation.

use std::fs;

use proptest::prelude::*;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;

use progression_kernel::{EventMeta, LevelThreshold, RuleScope, XpRule};
use progression_runtime::schema::SCHEMA_VERSION_KEY;
use progression_runtime::{
    verify_snapshot_hash, EngineConfig, EngineError, ProgressionEngine, ReplayStrategy,
    StorageError,
};

fn file_engine(dir: &TempDir) -> ProgressionEngine {
    ProgressionEngine::new(EngineConfig::at_path(dir.path().join("progress.db"))).unwrap()
}

/// Install SQL (typically an aborting trigger) on the engine's database
/// through a second connection.
fn install(dir: &TempDir, sql: &str) {
    let conn = Connection::open(dir.path().join("progress.db")).unwrap();
    conn.execute_batch(sql).unwrap();
}

fn week(n: u32) -> Option<EventMeta> {
    Some(EventMeta::week(n))
}

// ─────────────────────────────────────────────────────────────
// Scenario: capped third win
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_caps_third_competition_win() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = file_engine(&dir);
    engine.initialize().await.unwrap();

    let recorded = vec![
        engine.record_event("COMP_WIN", 100, week(1)).await.unwrap(),
        engine.record_event("COMP_WIN", 100, week(1)).await.unwrap(),
        engine.record_event("NOMINATED", -25, week(1)).await.unwrap(),
        // COMP_WIN allows two per week; this one scores nothing.
        engine.record_event("COMP_WIN", 100, week(1)).await.unwrap(),
    ];

    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.total_xp, 175);
    assert_eq!(state.level, 2);
    assert_eq!(state.current_level_xp, 100);
    assert_eq!(state.next_level_xp, 250);
    assert_eq!(state.progress_percent, 50);
    assert_eq!(state.events_count, 4);

    let snapshots = engine.get_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), recorded.len());
    let first_ts = recorded[0].timestamp;
    assert_eq!(
        engine.snapshots_between(first_ts, i64::MAX).await.unwrap().len(),
        recorded.len()
    );
    for (snap, event) in snapshots.iter().zip(&recorded) {
        assert_eq!(snap.event_id, event.id);
        assert!(verify_snapshot_hash(snap));
    }
    assert_eq!(snapshots.last().unwrap().state, state);

    let breakdown = engine.get_breakdown().await.unwrap();
    assert_eq!(breakdown["COMP_WIN"].count, 2);
    assert_eq!(breakdown["COMP_WIN"].total_xp, 200);
    assert_eq!(breakdown["NOMINATED"].total_xp, -25);
}

// ─────────────────────────────────────────────────────────────
// Failed writes leave no trace
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_snapshot_write_rolls_back_the_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        replay: ReplayStrategy::Incremental,
        ..EngineConfig::at_path(dir.path().join("progress.db"))
    };
    let mut engine = ProgressionEngine::new(config).unwrap();
    engine.record_event("DAILY_LOGIN", 5, None).await.unwrap();
    install(
        &dir,
        "CREATE TRIGGER no_snapshots BEFORE INSERT ON snapshots
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    );

    assert!(matches!(
        engine.record_event("HOH_WIN", 100, None).await,
        Err(EngineError::Storage(StorageError::Sqlite(_)))
    ));
    assert_eq!(engine.get_events().await.unwrap().len(), 1);
    assert_eq!(engine.get_snapshots().await.unwrap().len(), 1);

    // The running fold did not advance past the rejected event.
    install(&dir, "DROP TRIGGER no_snapshots;");
    let event = engine.record_event("JURY", 150, None).await.unwrap();
    let snap = engine.snapshots_for_event(&event.id).await.unwrap().remove(0);
    assert_eq!(snap.state.total_xp, 155);
    assert_eq!(snap.state.events_count, 2);
    assert_eq!(snap.state, engine.get_current_state().await.unwrap());
}

#[tokio::test]
async fn failed_reset_clears_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = file_engine(&dir);
    engine.record_event("JURY", 150, None).await.unwrap();
    install(
        &dir,
        "CREATE TRIGGER keep_meta BEFORE DELETE ON meta
         BEGIN SELECT RAISE(ABORT, 'meta is locked'); END;",
    );

    assert!(engine.reset().await.is_err());
    assert_eq!(engine.get_events().await.unwrap().len(), 1);
    assert_eq!(engine.get_snapshots().await.unwrap().len(), 1);
    assert_eq!(engine.get_rule_sets().await.unwrap().len(), 1);
    assert_eq!(engine.get_current_state().await.unwrap().total_xp, 150);
}

// ─────────────────────────────────────────────────────────────
// Reset idempotence
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_restores_a_single_default_rule_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = file_engine(&dir);
    engine.record_event("JURY", 150, None).await.unwrap();
    engine
        .update_rule_set(vec![XpRule::new("JURY", "Jury", 150, "")])
        .await
        .unwrap();

    for _ in 0..2 {
        engine.reset().await.unwrap();
        let state = engine.get_current_state().await.unwrap();
        assert_eq!(state.total_xp, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.events_count, 0);

        let rule_sets = engine.get_rule_sets().await.unwrap();
        assert_eq!(rule_sets.len(), 1);
        assert_eq!(rule_sets[0].version, 1);
    }
}

// ─────────────────────────────────────────────────────────────
// Unknown rules and floor clamp
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_rule_is_kept_but_skipped() {
    let mut engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
    let orphan = engine.record_event("NOT_A_RULE", 500, None).await.unwrap();

    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.total_xp, 0);
    assert_eq!(state.events_count, 1);
    assert!(engine.get_breakdown().await.unwrap().is_empty());

    let events = engine.get_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, orphan.id);
    assert_eq!(engine.events_by_rule("NOT_A_RULE").await.unwrap().len(), 1);
}

#[tokio::test]
async fn floor_applies_to_the_cumulative_total() {
    let mut engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
    engine.record_event("DAILY_LOGIN", 10, None).await.unwrap();
    engine.record_event("EVICTED", -50, None).await.unwrap();
    assert_eq!(engine.get_current_state().await.unwrap().total_xp, 0);

    let config = EngineConfig {
        clamp_min_xp: -1000,
        ..EngineConfig::default()
    };
    let mut engine = ProgressionEngine::new(config).unwrap();
    engine.record_event("DAILY_LOGIN", 10, None).await.unwrap();
    engine.record_event("EVICTED", -50, None).await.unwrap();
    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.total_xp, -40);
    assert_eq!(state.level, 1);
}

// ─────────────────────────────────────────────────────────────
// Rule-set versioning
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn rule_updates_rescore_history_retroactively() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = file_engine(&dir);
    engine.record_event("JURY", 150, None).await.unwrap();
    engine.record_event("DAILY_LOGIN", 5, None).await.unwrap();
    assert_eq!(engine.get_current_state().await.unwrap().total_xp, 155);

    engine
        .update_rule_set(vec![XpRule::new("DAILY_LOGIN", "Daily Login", 5, "")])
        .await
        .unwrap();
    let current = engine.get_current_rule_set().await.unwrap().unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(engine.get_current_state().await.unwrap().total_xp, 5);
    assert_eq!(engine.rule_set_by_version(1).await.unwrap().unwrap().rules.len(), 15);
}

#[tokio::test]
async fn per_version_scope_keeps_old_scoring() {
    let config = EngineConfig {
        rule_scope: RuleScope::PerVersion,
        ..EngineConfig::default()
    };
    let mut engine = ProgressionEngine::new(config).unwrap();
    let jury = engine.record_event("JURY", 150, None).await.unwrap();
    assert_eq!(jury.rule_set_version, Some(1));

    engine
        .update_rule_set(vec![XpRule::new("DAILY_LOGIN", "Daily Login", 5, "")])
        .await
        .unwrap();
    let login = engine.record_event("DAILY_LOGIN", 5, None).await.unwrap();
    assert_eq!(login.rule_set_version, Some(2));

    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.total_xp, 155);
    assert_eq!(state.level, 2);
}

// ─────────────────────────────────────────────────────────────
// Lifecycle and schema
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_then_reopen_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = file_engine(&dir);
    engine.record_event("HOH_WIN", 100, week(1)).await.unwrap();
    engine.close().await.unwrap();
    engine.close().await.unwrap();

    // Lazy reopen on the next call.
    engine.record_event("POV_WIN", 75, week(1)).await.unwrap();
    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.total_xp, 175);
    assert_eq!(engine.get_rule_sets().await.unwrap().len(), 1);
    engine.close().await.unwrap();

    let mut other = file_engine(&dir);
    assert_eq!(other.get_events().await.unwrap().len(), 2);
    assert_eq!(other.get_snapshots().await.unwrap().len(), 2);
}

#[tokio::test]
async fn schema_upgrade_keeps_events_and_restamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.db");

    let v1 = EngineConfig {
        schema_version: 1,
        ..EngineConfig::at_path(&path)
    };
    let mut engine = ProgressionEngine::new(v1.clone()).unwrap();
    engine.record_event("JURY", 150, None).await.unwrap();
    assert_eq!(
        engine.get_meta(SCHEMA_VERSION_KEY).await.unwrap(),
        Some(Value::from(1))
    );
    engine.close().await.unwrap();

    let mut engine = ProgressionEngine::new(EngineConfig::at_path(&path)).unwrap();
    assert_eq!(engine.get_events().await.unwrap().len(), 1);
    assert_eq!(
        engine.get_meta(SCHEMA_VERSION_KEY).await.unwrap(),
        Some(Value::from(2))
    );
    engine.close().await.unwrap();

    let mut engine = ProgressionEngine::new(v1).unwrap();
    assert!(matches!(
        engine.initialize().await,
        Err(EngineError::Storage(StorageError::SchemaDowngrade {
            persisted: 2,
            requested: 1
        }))
    ));
}

#[tokio::test]
async fn config_file_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("progress.db");
    let config_path = dir.path().join("progression.toml");
    fs::write(
        &config_path,
        format!(
            r#"
            replay = "incremental"

            [storage]
            path = "{}"

            [[level_thresholds]]
            level = 1
            xp_required = 0

            [[level_thresholds]]
            level = 2
            xp_required = 20
            "#,
            db.display()
        ),
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    assert_eq!(config.replay, ReplayStrategy::Incremental);
    let mut engine = ProgressionEngine::new(config).unwrap();
    engine.record_event("DAILY_LOGIN", 25, None).await.unwrap();
    let state = engine.get_current_state().await.unwrap();
    assert_eq!(state.level, 2);
    assert_eq!(state.next_level_xp, 1020);
    assert!(db.exists());
}

// ─────────────────────────────────────────────────────────────
// Archive
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_moves_history_between_stores() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("history.bin");

    let mut source = ProgressionEngine::new(EngineConfig::default()).unwrap();
    source.record_event("HOH_WIN", 100, week(1)).await.unwrap();
    source.record_event("HOH_WIN", 100, week(1)).await.unwrap();
    source
        .record_event("BETRAYED", -40, Some(EventMeta::week(2).with_season(1)))
        .await
        .unwrap();
    source
        .update_rule_set(vec![XpRule::new("HOH_WIN", "HOH", 100, "").per_week(2)])
        .await
        .unwrap();
    assert_eq!(source.export_archive(&archive).await.unwrap(), 3);

    let mut target = file_engine(&dir);
    assert_eq!(target.import_archive(&archive).await.unwrap(), 3);
    assert_eq!(target.get_events().await.unwrap(), source.get_events().await.unwrap());
    assert_eq!(
        target.get_rule_sets().await.unwrap(),
        source.get_rule_sets().await.unwrap()
    );
    assert_eq!(
        target.get_current_state().await.unwrap(),
        source.get_current_state().await.unwrap()
    );

    assert!(matches!(
        target.import_archive(&archive).await,
        Err(EngineError::Storage(StorageError::ArchiveConflict { existing: 3 }))
    ));
}

// ─────────────────────────────────────────────────────────────
// Incremental accumulator vs full replay
// ─────────────────────────────────────────────────────────────

const RULE_IDS: &[&str] = &["HOH_WIN", "COMP_WIN", "NOMINATED", "BETRAYED", "DAILY_LOGIN", "GHOST"];

fn play_strategy() -> impl Strategy<Value = Vec<(usize, i64, Option<u32>, Option<u32>)>> {
    prop::collection::vec(
        (
            0..RULE_IDS.len(),
            -60i64..160,
            prop::option::of(0u32..3),
            prop::option::of(0u32..2),
        ),
        0..24,
    )
}

fn meta_for(week: Option<u32>, season: Option<u32>) -> Option<EventMeta> {
    if week.is_none() && season.is_none() {
        return None;
    }
    Some(EventMeta {
        week,
        season,
        ..EventMeta::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn incremental_snapshots_match_full_replay(plays in play_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ladder = vec![
                LevelThreshold::new(1, 0),
                LevelThreshold::new(2, 50),
                LevelThreshold::new(3, 200),
            ];
            let mut full = ProgressionEngine::new(EngineConfig {
                level_thresholds: ladder.clone(),
                ..EngineConfig::default()
            })
            .unwrap();
            let mut incremental = ProgressionEngine::new(EngineConfig {
                level_thresholds: ladder,
                replay: ReplayStrategy::Incremental,
                ..EngineConfig::default()
            })
            .unwrap();

            for (rule, amount, week, season) in &plays {
                let rule_id = RULE_IDS[*rule];
                full.record_event(rule_id, *amount, meta_for(*week, *season)).await.unwrap();
                incremental
                    .record_event(rule_id, *amount, meta_for(*week, *season))
                    .await
                    .unwrap();
            }

            let full_states: Vec<_> = full
                .get_snapshots()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.state)
                .collect();
            let incremental_states: Vec<_> = incremental
                .get_snapshots()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.state)
                .collect();
            assert_eq!(full_states, incremental_states);
            assert_eq!(
                incremental.get_current_state().await.unwrap(),
                full.get_current_state().await.unwrap()
            );
        });
    }
}
