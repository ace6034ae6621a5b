//! Orchestration API — the only stateful façade.
//!
//! Wires the store and the kernel reducer together. The storage handle
//! lives in an explicit `StorageContext` owned by the engine, opened
//! lazily on first use and dropped by `close`; the next call reopens it.
//!
//! `record_event`:
//!   1. stamp the current rule-set version on the new event
//!   2. derive the state that follows it (full replay, or the running
//!      accumulator)
//!   3. persist the event and its snapshot in one transaction

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use progression_kernel::invariants::{validate_ladder, validate_rules};
use progression_kernel::reducer::accumulate;
use progression_kernel::rules::default_rules;
use progression_kernel::{
    Accumulator, Breakdown, EventMeta, LevelThreshold, PlayerState, RuleIndex, XpEvent,
    XpRule, XpRuleSet,
};

use crate::archive::{read_archive, write_archive};
use crate::config::{EngineConfig, ReplayStrategy};
use crate::drift::{compare_states, DriftReport};
use crate::error::{EngineError, StorageError};
use crate::replay::{self, DeterminismCheck, Replay};
use crate::schema::SCHEMA_VERSION_KEY;
use crate::snapshot::Snapshot;
use crate::store::ProgressStore;

/// Open storage plus the running fold kept in incremental mode.
struct StorageContext {
    store: ProgressStore,
    running: Option<Accumulator>,
}

impl StorageContext {
    async fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = ProgressStore::open(&config.storage, config.schema_version).await?;
        seed_default_rule_set(&store).await?;
        Ok(Self {
            store,
            running: None,
        })
    }
}

pub struct ProgressionEngine {
    config: EngineConfig,
    context: Option<StorageContext>,
}

impl ProgressionEngine {
    /// Build an engine. Storage is not touched until the first call.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            context: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    async fn context(&mut self) -> Result<&mut StorageContext, EngineError> {
        let ctx = match self.context.take() {
            Some(ctx) => ctx,
            None => StorageContext::open(&self.config).await?,
        };
        Ok(self.context.insert(ctx))
    }

    async fn store(&mut self) -> Result<&ProgressStore, EngineError> {
        Ok(&self.context().await?.store)
    }

    /// Open storage and seed the default rule set if none exists.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        self.context().await?;
        Ok(())
    }

    /// Append an event together with a snapshot of the state that
    /// follows it. On error neither is stored.
    pub async fn record_event(
        &mut self,
        rule_id: &str,
        amount: i64,
        meta: Option<EventMeta>,
    ) -> Result<XpEvent, EngineError> {
        let options = self.config.reduce_options();
        let scope = self.config.rule_scope;
        let incremental = self.config.replay == ReplayStrategy::Incremental;
        let ctx = self.context().await?;

        let rule_sets = ctx.store.get_all_rule_sets().await?;
        let current_version = rule_sets.iter().map(|rs| rs.version).max();

        let now = Utc::now().timestamp_millis();
        let mut event = XpEvent::new(Uuid::new_v4().to_string(), now, rule_id, amount, meta);
        if let Some(version) = current_version {
            event = event.stamped_with(version);
        }
        let index = RuleIndex::for_scope(&rule_sets, scope);
        let mut acc = match ctx.running.as_ref() {
            Some(acc) if incremental => acc.clone(),
            _ => accumulate(&ctx.store.get_all_events().await?, &index),
        };
        let outcome = acc.apply(&event, index.resolve(&event));
        let state = acc.state(&options)?;

        let snapshot = Snapshot::capture(Uuid::new_v4().to_string(), now, &event.id, state);
        ctx.store.append_event_with_snapshot(&event, &snapshot).await?;
        // The running fold only advances once the write has committed.
        ctx.running = incremental.then_some(acc);

        debug!(
            event_id = %event.id,
            rule_id = %event.rule_id,
            amount = event.amount,
            ?outcome,
            total_xp = snapshot.state.total_xp,
            level = snapshot.state.level,
            "event recorded"
        );
        Ok(event)
    }

    /// Replay the full log under the configured rule scope.
    async fn replay_log(&mut self) -> Result<Replay, EngineError> {
        let options = self.config.reduce_options();
        let scope = self.config.rule_scope;
        let store = self.store().await?;
        let events = store.get_all_events().await?;
        let rule_sets = store.get_all_rule_sets().await?;

        let replay = replay::rebuild(&events, &RuleIndex::for_scope(&rule_sets, scope), &options)?;
        if replay.stats.unknown_rule > 0 {
            warn!(
                orphaned = replay.stats.unknown_rule,
                "events reference rules missing from the active rule set"
            );
        }
        Ok(replay)
    }

    pub async fn get_current_state(&mut self) -> Result<PlayerState, EngineError> {
        Ok(self.replay_log().await?.state)
    }

    pub async fn get_breakdown(&mut self) -> Result<Breakdown, EngineError> {
        Ok(self.replay_log().await?.breakdown)
    }

    pub async fn get_events(&mut self) -> Result<Vec<XpEvent>, EngineError> {
        Ok(self.store().await?.get_all_events().await?)
    }

    pub async fn get_snapshots(&mut self) -> Result<Vec<Snapshot>, EngineError> {
        Ok(self.store().await?.get_all_snapshots().await?)
    }

    pub async fn events_by_rule(&mut self, rule_id: &str) -> Result<Vec<XpEvent>, EngineError> {
        Ok(self.store().await?.events_by_rule(rule_id).await?)
    }

    pub async fn events_between(&mut self, from: i64, to: i64) -> Result<Vec<XpEvent>, EngineError> {
        Ok(self.store().await?.events_between(from, to).await?)
    }

    pub async fn snapshots_for_event(&mut self, event_id: &str) -> Result<Vec<Snapshot>, EngineError> {
        Ok(self.store().await?.snapshots_for_event(event_id).await?)
    }

    pub async fn snapshots_between(&mut self, from: i64, to: i64) -> Result<Vec<Snapshot>, EngineError> {
        Ok(self.store().await?.snapshots_between(from, to).await?)
    }

    pub async fn get_meta(&mut self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.store().await?.get_meta(key).await?)
    }

    // ── rule sets ─────────────────────────────────────────────────

    /// Append a new rule-set version holding `rules`.
    pub async fn update_rule_set(&mut self, rules: Vec<XpRule>) -> Result<XpRuleSet, EngineError> {
        validate_rules(&rules)?;
        let ctx = self.context().await?;
        let next_version = ctx
            .store
            .latest_rule_set()
            .await?
            .map_or(1, |rs| rs.version + 1);
        let rule_set = new_rule_set(next_version, rules);
        ctx.store.add_rule_set(&rule_set).await?;
        ctx.running = None;
        info!(version = rule_set.version, rules = rule_set.rules.len(), "rule set updated");
        Ok(rule_set)
    }

    pub async fn get_current_rule_set(&mut self) -> Result<Option<XpRuleSet>, EngineError> {
        Ok(self.store().await?.latest_rule_set().await?)
    }

    pub async fn get_rule_sets(&mut self) -> Result<Vec<XpRuleSet>, EngineError> {
        Ok(self.store().await?.get_all_rule_sets().await?)
    }

    pub async fn rule_set_by_version(&mut self, version: u32) -> Result<Option<XpRuleSet>, EngineError> {
        Ok(self.store().await?.rule_set_by_version(version).await?)
    }

    /// Base XP of `rule_id` in the current rule set, 0 when unknown.
    pub async fn xp_reward(&mut self, rule_id: &str) -> Result<i64, EngineError> {
        Ok(self
            .get_current_rule_set()
            .await?
            .map_or(0, |rs| rs.reward_for(rule_id)))
    }

    /// What `update_rule_set(rules)` would change, without persisting it.
    pub async fn preview_rule_set(&mut self, rules: Vec<XpRule>) -> Result<DriftReport, EngineError> {
        validate_rules(&rules)?;
        let options = self.config.reduce_options();
        let scope = self.config.rule_scope;
        let store = self.store().await?;
        let events = store.get_all_events().await?;
        let mut rule_sets = store.get_all_rule_sets().await?;

        let before = replay::rebuild(&events, &RuleIndex::for_scope(&rule_sets, scope), &options)?;
        let next_version = rule_sets.iter().map(|rs| rs.version).max().map_or(1, |v| v + 1);
        rule_sets.push(new_rule_set(next_version, rules));
        let after = replay::rebuild(&events, &RuleIndex::for_scope(&rule_sets, scope), &options)?;

        Ok(compare_states(
            &before.state,
            &before.breakdown,
            &after.state,
            &after.breakdown,
        ))
    }

    /// Replace the threshold ladder wholesale.
    pub fn set_level_thresholds(&mut self, ladder: Vec<LevelThreshold>) -> Result<(), EngineError> {
        validate_ladder(&ladder)?;
        self.config.level_thresholds = ladder;
        Ok(())
    }

    /// Replay the stored log twice and compare canonical hashes.
    pub async fn verify_determinism(&mut self) -> Result<DeterminismCheck, EngineError> {
        let options = self.config.reduce_options();
        let scope = self.config.rule_scope;
        let store = self.store().await?;
        let events = store.get_all_events().await?;
        let rule_sets = store.get_all_rule_sets().await?;
        Ok(replay::verify_determinism(
            &events,
            &RuleIndex::for_scope(&rule_sets, scope),
            &options,
        )?)
    }

    // ── archive ───────────────────────────────────────────────────

    /// Write every rule-set version and the event log to `path`.
    pub async fn export_archive(&mut self, path: &Path) -> Result<usize, EngineError> {
        let store = self.store().await?;
        let rule_sets = store.get_all_rule_sets().await?;
        let events = store.get_all_events().await?;
        let count = events.len();
        let target: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&target, &rule_sets, &events))
            .await
            .map_err(StorageError::from)??;
        info!(path = %path.display(), events = count, "archive exported");
        Ok(count)
    }

    /// Load an archive into a store with an empty event log.
    pub async fn import_archive(&mut self, path: &Path) -> Result<usize, EngineError> {
        let source: PathBuf = path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || read_archive(&source))
            .await
            .map_err(StorageError::from)??;
        validate_imported(&archive.rule_sets)?;

        let ctx = self.context().await?;
        let existing = ctx.store.event_count().await?;
        if existing > 0 {
            return Err(StorageError::ArchiveConflict { existing }.into());
        }
        let count = archive.events.len();
        ctx.store
            .import_records(archive.rule_sets, archive.events)
            .await?;
        ctx.running = None;
        info!(path = %path.display(), events = count, "archive imported");
        Ok(count)
    }

    // ── lifecycle ─────────────────────────────────────────────────

    /// Clear every store and re-seed the default rule set.
    pub async fn reset(&mut self) -> Result<(), EngineError> {
        let ctx = self.context().await?;
        ctx.store.clear_all_data().await?;
        ctx.running = None;
        let version = ctx.store.schema_version();
        ctx.store
            .set_meta(SCHEMA_VERSION_KEY, &Value::from(version))
            .await?;
        seed_default_rule_set(&ctx.store).await?;
        info!("progression reset");
        Ok(())
    }

    /// Release storage. The next call reopens it.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        if let Some(ctx) = self.context.take() {
            ctx.store.close().await?;
        }
        Ok(())
    }
}

fn new_rule_set(version: u32, rules: Vec<XpRule>) -> XpRuleSet {
    XpRuleSet {
        id: Uuid::new_v4().to_string(),
        version,
        rules,
        created_at: Utc::now().timestamp_millis(),
    }
}

async fn seed_default_rule_set(store: &ProgressStore) -> Result<(), EngineError> {
    if store.latest_rule_set().await?.is_none() {
        store.add_rule_set(&new_rule_set(1, default_rules())).await?;
        info!("seeded default rule set");
    }
    Ok(())
}

fn validate_imported(rule_sets: &[XpRuleSet]) -> Result<(), EngineError> {
    for rs in rule_sets {
        validate_rules(&rs.rules)?;
    }
    Ok(())
}

/// Engine behind an async mutex, for hosts that share one instance
/// across tasks. Still a single logical writer.
pub struct SharedEngine {
    inner: Mutex<ProgressionEngine>,
}

impl SharedEngine {
    pub fn new(engine: ProgressionEngine) -> Self {
        Self {
            inner: Mutex::new(engine),
        }
    }

    /// Exclusive access for operations not mirrored here.
    pub async fn lock(&self) -> MutexGuard<'_, ProgressionEngine> {
        self.inner.lock().await
    }

    pub async fn record_event(
        &self,
        rule_id: &str,
        amount: i64,
        meta: Option<EventMeta>,
    ) -> Result<XpEvent, EngineError> {
        self.inner.lock().await.record_event(rule_id, amount, meta).await
    }

    pub async fn get_current_state(&self) -> Result<PlayerState, EngineError> {
        self.inner.lock().await.get_current_state().await
    }

    pub async fn get_breakdown(&self) -> Result<Breakdown, EngineError> {
        self.inner.lock().await.get_breakdown().await
    }

    pub async fn update_rule_set(&self, rules: Vec<XpRule>) -> Result<XpRuleSet, EngineError> {
        self.inner.lock().await.update_rule_set(rules).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.inner.lock().await.reset().await
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        self.inner.lock().await.close().await
    }
}
