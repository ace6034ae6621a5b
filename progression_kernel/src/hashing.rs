/// Progression Kernel — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing of derived
/// state. Produces byte-identical output across platforms.
///
/// Rules:
///   - reducer_version first, then fields in fixed order
///   - breakdown entries sorted by rule id
///   - UTF-8 JSON, no whitespace, no float

use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

use crate::domain::{Breakdown, PlayerState};
use crate::REDUCER_VERSION;

/// Canonical serialization of PlayerState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &PlayerState) -> Vec<u8> {
    Value::Object(build_state_value(state)).to_string().into_bytes()
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &PlayerState) -> String {
    hex_digest(&canonical_serialize(state))
}

/// SHA-256 over the canonical state and breakdown together.
pub fn canonical_hash_with_breakdown(state: &PlayerState, breakdown: &Breakdown) -> String {
    let mut root = build_state_value(state);

    // BTreeMap iteration is already sorted by rule id.
    let rules: Vec<Value> = breakdown
        .iter()
        .map(|(rule_id, b)| {
            let mut m = Map::new();
            m.insert("rule_id".to_string(), Value::String(rule_id.clone()));
            m.insert("count".to_string(), Value::Number(b.count.into()));
            m.insert("total_xp".to_string(), Value::Number(b.total_xp.into()));
            m.insert("rule_name".to_string(), Value::String(b.rule_name.clone()));
            Value::Object(m)
        })
        .collect();
    root.insert("breakdown".to_string(), Value::Array(rules));

    hex_digest(Value::Object(root).to_string().as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Field order: reducer_version, total_xp, level, current_level_xp,
/// next_level_xp, progress_percent, events_count.
fn build_state_value(state: &PlayerState) -> Map<String, Value> {
    let mut root = Map::new();
    root.insert(
        "reducer_version".to_string(),
        Value::Number(REDUCER_VERSION.into()),
    );
    root.insert("total_xp".to_string(), Value::Number(state.total_xp.into()));
    root.insert("level".to_string(), Value::Number(state.level.into()));
    root.insert(
        "current_level_xp".to_string(),
        Value::Number(state.current_level_xp.into()),
    );
    root.insert(
        "next_level_xp".to_string(),
        Value::Number(state.next_level_xp.into()),
    );
    root.insert(
        "progress_percent".to_string(),
        Value::Number(state.progress_percent.into()),
    );
    root.insert(
        "events_count".to_string(),
        Value::Number(state.events_count.into()),
    );
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(total_xp: i64) -> PlayerState {
        PlayerState {
            total_xp,
            level: 1,
            current_level_xp: 0,
            next_level_xp: 100,
            progress_percent: 0,
            events_count: 3,
        }
    }

    #[test]
    fn serialization_is_field_ordered() {
        let json = String::from_utf8(canonical_serialize(&state(42))).unwrap();
        assert_eq!(
            json,
            "{\"reducer_version\":1,\"total_xp\":42,\"level\":1,\"current_level_xp\":0,\
             \"next_level_xp\":100,\"progress_percent\":0,\"events_count\":3}"
        );
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let h1 = canonical_hash(&state(42));
        assert_eq!(h1, canonical_hash(&state(42)));
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, canonical_hash(&state(43)));
    }

    #[test]
    fn breakdown_changes_combined_hash() {
        let mut b = Breakdown::new();
        let empty = canonical_hash_with_breakdown(&state(1), &b);
        b.insert(
            "A".to_string(),
            crate::domain::RuleBreakdown {
                count: 1,
                total_xp: 1,
                rule_name: "A".to_string(),
            },
        );
        assert_ne!(empty, canonical_hash_with_breakdown(&state(1), &b));
    }
}
