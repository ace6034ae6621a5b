//! Proto ↔ Kernel conversion bridge.
//!
//! Converts between the archive wire types (proto_types.rs) and the
//! kernel's records. Free-form event details travel as a JSON string.

use progression_kernel::{XpEvent, XpRule, XpRuleSet};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::proto_types::*;

pub fn event_to_proto(event: &XpEvent) -> Result<ProtoEvent, StorageError> {
    let meta_json = match &event.meta {
        Some(map) => serde_json::to_string(map)?,
        None => String::new(),
    };
    Ok(ProtoEvent {
        id: event.id.clone(),
        timestamp: event.timestamp,
        rule_id: event.rule_id.clone(),
        amount: event.amount,
        week: event.week,
        season: event.season,
        rule_set_version: event.rule_set_version,
        meta_json,
    })
}

pub fn proto_to_event(proto: &ProtoEvent) -> Result<XpEvent, StorageError> {
    let meta = if proto.meta_json.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Map<String, Value>>(&proto.meta_json)?)
    };
    Ok(XpEvent {
        id: proto.id.clone(),
        timestamp: proto.timestamp,
        rule_id: proto.rule_id.clone(),
        amount: proto.amount,
        week: proto.week,
        season: proto.season,
        rule_set_version: proto.rule_set_version,
        meta,
    })
}

pub fn rule_set_to_proto(rule_set: &XpRuleSet) -> ProtoRuleSet {
    ProtoRuleSet {
        id: rule_set.id.clone(),
        version: rule_set.version,
        rules: rule_set
            .rules
            .iter()
            .map(|r| ProtoRule {
                id: r.id.clone(),
                name: r.name.clone(),
                base_xp: r.base_xp,
                description: r.description.clone(),
                per_week: r.per_week,
                per_season: r.per_season,
            })
            .collect(),
        created_at: rule_set.created_at,
    }
}

pub fn proto_to_rule_set(proto: &ProtoRuleSet) -> XpRuleSet {
    XpRuleSet {
        id: proto.id.clone(),
        version: proto.version,
        rules: proto
            .rules
            .iter()
            .map(|r| XpRule {
                id: r.id.clone(),
                name: r.name.clone(),
                base_xp: r.base_xp,
                description: r.description.clone(),
                per_week: r.per_week,
                per_season: r.per_season,
            })
            .collect(),
        created_at: proto.created_at,
    }
}
