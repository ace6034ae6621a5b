//! History archive — length-prefixed protobuf file.
//!
//! Storage format:
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - Rule sets first, then events, each in storage insertion order
//!   - Final frame is a trailer: record count + SHA-256 over record frames
//!   - fsync after the write completes
//!   - Any truncation, bad length, or digest mismatch fails the read

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use prost::Message;
use sha2::{Digest, Sha256};

use progression_kernel::{XpEvent, XpRuleSet};

use crate::error::StorageError;
use crate::proto_bridge::{event_to_proto, proto_to_event, proto_to_rule_set, rule_set_to_proto};
use crate::proto_types::{ProtoRecord, ProtoTrailer, RecordKind};

/// Upper bound on a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Decoded archive contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
    pub rule_sets: Vec<XpRuleSet>,
    pub events: Vec<XpEvent>,
}

/// Write rule sets and events to `path`, replacing any existing file.
pub fn write_archive(
    path: &Path,
    rule_sets: &[XpRuleSet],
    events: &[XpEvent],
) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut frames = Vec::with_capacity(rule_sets.len() + events.len());
    for rs in rule_sets {
        frames.push(encode_frame(RecordKind::RuleSet(rule_set_to_proto(rs)))?);
    }
    for event in events {
        frames.push(encode_frame(RecordKind::Event(event_to_proto(event)?))?);
    }
    let mut hasher = Sha256::new();
    for frame in &frames {
        hasher.update(frame);
    }
    let trailer = encode_frame(RecordKind::Trailer(ProtoTrailer {
        record_count: frames.len() as u64,
        sha256: hex(&hasher.finalize()),
    }))?;

    // Every frame is encoded and bounded before the file is touched.
    let mut file = File::create(path)?;
    {
        let mut writer = BufWriter::new(&mut file);
        for frame in frames.iter().chain(std::iter::once(&trailer)) {
            write_frame(&mut writer, frame)?;
        }
        writer.flush()?;
    }
    file.sync_all()?;
    Ok(())
}

fn encode_frame(kind: RecordKind) -> Result<Vec<u8>, StorageError> {
    let buf = ProtoRecord { kind: Some(kind) }.encode_to_vec();
    if buf.len() > MAX_FRAME_LEN {
        return Err(StorageError::CorruptArchive(format!(
            "record of {} bytes exceeds frame limit of {}",
            buf.len(),
            MAX_FRAME_LEN
        )));
    }
    Ok(buf)
}

/// Read and verify an archive.
pub fn read_archive(path: &Path) -> Result<Archive, StorageError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut archive = Archive::default();
    let mut hasher = Sha256::new();
    let mut record_count: u64 = 0;

    loop {
        let Some(frame) = read_frame(&mut reader)? else {
            return Err(StorageError::CorruptArchive("missing trailer".into()));
        };
        let record = ProtoRecord::decode(frame.as_slice())?;

        match record.kind {
            Some(RecordKind::Trailer(trailer)) => {
                verify_trailer(&trailer, record_count, &hex(&hasher.finalize()))?;
                if read_frame(&mut reader)?.is_some() {
                    return Err(StorageError::CorruptArchive("data after trailer".into()));
                }
                return Ok(archive);
            }
            Some(RecordKind::RuleSet(rs)) => archive.rule_sets.push(proto_to_rule_set(&rs)),
            Some(RecordKind::Event(ev)) => archive.events.push(proto_to_event(&ev)?),
            None => return Err(StorageError::CorruptArchive("record has no kind".into())),
        }
        hasher.update(&frame);
        record_count += 1;
    }
}

fn verify_trailer(
    trailer: &ProtoTrailer,
    record_count: u64,
    digest: &str,
) -> Result<(), StorageError> {
    if trailer.record_count != record_count {
        return Err(StorageError::CorruptArchive(format!(
            "trailer expects {} records, found {}",
            trailer.record_count, record_count
        )));
    }
    if trailer.sha256 != digest {
        return Err(StorageError::CorruptArchive("digest mismatch".into()));
    }
    Ok(())
}

/// `buf` must already be bounded by `MAX_FRAME_LEN`.
fn write_frame<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let len = buf.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(buf)
}

/// Next frame, or `None` at a clean end of file. A partial length
/// header is corruption, not end of file.
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, StorageError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => return Ok(None),
        4 => {}
        n => {
            return Err(StorageError::CorruptArchive(format!(
                "partial frame header: {} of 4 bytes",
                n
            )))
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(StorageError::CorruptArchive(format!(
            "invalid frame length: {}",
            len
        )));
    }

    let mut frame = vec![0u8; len];
    reader
        .read_exact(&mut frame)
        .map_err(|e| StorageError::CorruptArchive(format!("truncated frame: {}", e)))?;
    Ok(Some(frame))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
