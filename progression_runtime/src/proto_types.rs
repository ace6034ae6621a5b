//! Hand-written protobuf types for the history archive.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the archive format and never reused.

use prost::Message;

// ── Archive Record ─────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRecord {
    #[prost(oneof = "RecordKind", tags = "1, 2, 3")]
    pub kind: Option<RecordKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum RecordKind {
    #[prost(message, tag = "1")]
    RuleSet(ProtoRuleSet),
    #[prost(message, tag = "2")]
    Event(ProtoEvent),
    #[prost(message, tag = "3")]
    Trailer(ProtoTrailer),
}

// ── Rules ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRule {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(sint64, tag = "3")]
    pub base_xp: i64,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(uint32, optional, tag = "5")]
    pub per_week: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub per_season: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRuleSet {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub version: u32,
    #[prost(message, repeated, tag = "3")]
    pub rules: Vec<ProtoRule>,
    #[prost(int64, tag = "4")]
    pub created_at: i64,
}

// ── Events ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoEvent {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(string, tag = "3")]
    pub rule_id: String,
    #[prost(sint64, tag = "4")]
    pub amount: i64,
    #[prost(uint32, optional, tag = "5")]
    pub week: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub season: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub rule_set_version: Option<u32>,
    /// JSON object of free-form details; empty when absent.
    #[prost(string, tag = "8")]
    pub meta_json: String,
}

// ── Trailer ────────────────────────────────────────────────────

/// Last frame of every archive.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoTrailer {
    /// Number of record frames before the trailer.
    #[prost(uint64, tag = "1")]
    pub record_count: u64,
    /// SHA-256 (lowercase hex) over the bytes of those frames, in order.
    #[prost(string, tag = "2")]
    pub sha256: String,
}
