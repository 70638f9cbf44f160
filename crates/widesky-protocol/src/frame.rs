//! Decoding the firehose wire frame into a header and a `#commit` body.
//!
//! Each binary WebSocket message is two concatenated DAG-CBOR values (header,
//! then body) followed, for commit events, by a CAR-encoded block section
//! inside the body's `blocks` key. This module is the wire-decoding boundary:
//! everything past [`decode_commit_frame`] deals only in [`crate::value::Node`]
//! lookups, never in raw bytes or CBOR tags.

use std::io::Cursor;

use ciborium::Value;
use ipld_core::cid::Cid;

use crate::value::Node;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to decode frame header: {0}")]
    Header(String),
    #[error("failed to decode frame body: {0}")]
    Body(String),
    #[error("failed to read CAR block section: {0}")]
    Car(String),
    #[error("frame is an error frame: {0}")]
    ErrorFrame(String),
}

/// First CBOR value in every frame.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// 1 = message, -1 = error.
    pub op: i64,
    /// Event type tag, e.g. `"#commit"`, `"#identity"`.
    pub t: Option<String>,
}

/// A single content-addressed block recovered from the CAR section.
///
/// The upstream representation is a mix of opaque strings and structured
/// `{cid, data}` entries; we preserve that split here: a block whose bytes
/// don't parse as CBOR is kept as `Opaque` rather than dropped, exactly as
/// non-dict block entries are skippable downstream.
pub enum Block {
    Opaque(#[allow(dead_code)] String),
    Entry { cid: String, data: Value },
}

/// A decoded `#commit` body: repo/commit identifiers, the create/update/delete
/// op list, and the blocks referenced by those ops.
pub struct CommitBody {
    pub repo: String,
    pub commit: String,
    pub ops: Vec<RepoOp>,
    pub blocks: Vec<Block>,
}

pub struct RepoOp {
    pub action: String,
    pub path: String,
    pub cid: Option<String>,
}

impl CommitBody {
    /// Find the structured block matching `cid`, skipping opaque entries.
    pub fn find_block(&self, cid: &str) -> Option<Node<'_>> {
        self.blocks.iter().find_map(|b| match b {
            Block::Opaque(_) => None,
            Block::Entry { cid: block_cid, data } => {
                (block_cid == cid).then(|| Node::new(data))
            }
        })
    }
}

/// Decode the header-only portion of a frame (cheap; used to decide whether
/// the rest of the frame is worth decoding at all).
pub fn decode_header(bytes: &[u8]) -> Result<(FrameHeader, usize), DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let header: Value =
        ciborium::from_reader(&mut cursor).map_err(|e| DecodeError::Header(e.to_string()))?;
    let node = Node::new(&header);
    let op = node
        .get("op")
        .and_then(|n| n.raw().as_integer())
        .map(i128::from)
        .unwrap_or(1) as i64;
    let t = node.get("t").and_then(|n| n.as_str()).map(str::to_owned);
    Ok((FrameHeader { op, t }, cursor.position() as usize))
}

/// Decode a full `#commit` frame: header, the body's scalar fields and op
/// list, and the CAR-encoded block section.
///
/// Returns `Ok(None)` for any non-`#commit` frame (nothing further to do) and
/// `Err` only for a structurally broken commit frame (bad CBOR, an explicit
/// error frame). A commit body whose individual ops or blocks don't match the
/// expected shape is never a decode error — that tolerance lives in the
/// classification layer, not here.
pub async fn decode_commit_frame(bytes: &[u8]) -> Result<Option<CommitBody>, DecodeError> {
    let (header, offset) = decode_header(bytes)?;
    if header.op == -1 {
        return Err(DecodeError::ErrorFrame(
            header.t.unwrap_or_else(|| "unknown".to_owned()),
        ));
    }
    if header.t.as_deref() != Some("#commit") {
        return Ok(None);
    }

    let payload = &bytes[offset..];
    let body: Value =
        ciborium::from_reader(Cursor::new(payload)).map_err(|e| DecodeError::Body(e.to_string()))?;
    let node = Node::new(&body);

    let repo = node
        .get("repo")
        .and_then(|n| n.as_str())
        .ok_or_else(|| DecodeError::Body("missing `repo`".to_owned()))?
        .to_owned();
    let commit = node
        .get("commit")
        .map(|n| cid_display(n.raw()))
        .unwrap_or_default();

    let ops = node
        .get("ops")
        .and_then(|n| n.as_array())
        .map(|items| {
            items
                .iter()
                .map(|v| {
                    let op_node = Node::new(v);
                    RepoOp {
                        action: op_node.get("action").and_then(|n| n.as_str()).unwrap_or("").to_owned(),
                        path: op_node.get("path").and_then(|n| n.as_str()).unwrap_or("").to_owned(),
                        cid: op_node.get("cid").map(|n| cid_display(n.raw())),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let block_bytes = node.get("blocks").and_then(|n| match n.raw() {
        Value::Bytes(b) => Some(b.as_slice()),
        _ => None,
    });

    let blocks = match block_bytes {
        Some(bytes) => decode_car_blocks(bytes).await?,
        None => Vec::new(),
    };

    Ok(Some(CommitBody { repo, commit, ops, blocks }))
}

async fn decode_car_blocks(bytes: &[u8]) -> Result<Vec<Block>, DecodeError> {
    let mut reader = iroh_car::CarReader::new(Cursor::new(bytes))
        .await
        .map_err(|e| DecodeError::Car(e.to_string()))?;
    let mut out = Vec::new();
    while let Some((cid, data)) = reader
        .next_block()
        .await
        .map_err(|e| DecodeError::Car(e.to_string()))?
    {
        match ciborium::from_reader::<Value, _>(Cursor::new(&data)) {
            Ok(value) => out.push(Block::Entry { cid: cid.to_string(), data: value }),
            Err(_) => out.push(Block::Opaque(cid.to_string())),
        }
    }
    Ok(out)
}

/// A CBOR IPLD link is tag 42 wrapping an identity-multibase-prefixed byte
/// string; resolve it to its canonical string form, falling back to whatever
/// textual representation is available for non-link values.
fn cid_display(value: &Value) -> String {
    if let Value::Tag(42, inner) = value {
        if let Value::Bytes(bytes) = inner.as_ref() {
            let link_bytes = bytes.strip_prefix(&[0u8]).unwrap_or(bytes);
            if let Ok(cid) = Cid::try_from(link_bytes) {
                return cid.to_string();
            }
        }
    }
    if let Value::Text(s) = value {
        return s.clone();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (Value::Text(k.to_owned()), v)).collect())
    }

    #[test]
    fn decode_header_extracts_op_and_type() {
        let header = map(vec![("op", Value::Integer(1.into())), ("t", Value::Text("#commit".into()))]);
        let body = map(vec![]);
        let mut bytes = encode(&header);
        bytes.extend(encode(&body));
        let (parsed, offset) = decode_header(&bytes).unwrap();
        assert_eq!(parsed.op, 1);
        assert_eq!(parsed.t.as_deref(), Some("#commit"));
        assert_eq!(offset, encode(&header).len());
    }

    #[tokio::test]
    async fn non_commit_frame_is_skipped_without_error() {
        let header = map(vec![("op", Value::Integer(1.into())), ("t", Value::Text("#identity".into()))]);
        let body = map(vec![]);
        let mut bytes = encode(&header);
        bytes.extend(encode(&body));
        assert!(decode_commit_frame(&bytes).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_frame_surfaces_as_decode_error() {
        let header = map(vec![("op", Value::Integer((-1).into()))]);
        let bytes = encode(&header);
        assert!(matches!(decode_commit_frame(&bytes).await, Err(DecodeError::ErrorFrame(_))));
    }

    #[tokio::test]
    async fn commit_frame_without_blocks_decodes_repo_and_ops() {
        let header = map(vec![("op", Value::Integer(1.into())), ("t", Value::Text("#commit".into()))]);
        let op = map(vec![
            ("action", Value::Text("create".into())),
            ("path", Value::Text("app.bsky.feed.post/abc".into())),
            ("cid", Value::Text("CID1".into())),
        ]);
        let body = map(vec![
            ("repo", Value::Text("did:plc:a".into())),
            ("commit", Value::Text("bafycommit".into())),
            ("ops", Value::Array(vec![op])),
        ]);
        let mut bytes = encode(&header);
        bytes.extend(encode(&body));
        let commit = decode_commit_frame(&bytes).await.unwrap().unwrap();
        assert_eq!(commit.repo, "did:plc:a");
        assert_eq!(commit.ops.len(), 1);
        assert_eq!(commit.ops[0].action, "create");
        assert_eq!(commit.ops[0].path, "app.bsky.feed.post/abc");
        assert_eq!(commit.ops[0].cid.as_deref(), Some("CID1"));
    }
}
