//! Pure classification and flattening of decoded commit frames into the four
//! activity kinds persisted downstream.
//!
//! Nothing in this module touches I/O: every function here takes a
//! [`crate::value::Node`] (or a [`crate::frame::CommitBody`]) and returns
//! plain data, which is what makes the scenarios in the surrounding test
//! tooling exercisable without a live socket or database.

use tracing::warn;

use crate::frame::CommitBody;
use crate::value::Node;

/// The three activity namespaces this pipeline cares about. Anything else —
/// profile records, follows, other lexicons entirely — is ignored at
/// classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Post,
    Repost,
    Like,
}

impl ActivityKind {
    fn from_path(path: &str) -> Option<Self> {
        if path.contains("app.bsky.feed.post") {
            Some(Self::Post)
        } else if path.contains("app.bsky.feed.repost") {
            Some(Self::Repost)
        } else if path.contains("app.bsky.feed.like") {
            Some(Self::Like)
        } else {
            None
        }
    }
}

/// A single `create` op, classified by kind, still carrying only its CID —
/// the payload is resolved separately against the block list.
pub struct ClassifiedOp {
    pub kind: ActivityKind,
    pub cid: String,
}

/// Scan a commit's op list for `create`s under the three known namespaces.
/// Updates, deletes, and other namespaces are dropped silently.
pub fn classify_ops(commit: &CommitBody) -> Vec<ClassifiedOp> {
    commit
        .ops
        .iter()
        .filter(|op| op.action == "create")
        .filter_map(|op| {
            let kind = ActivityKind::from_path(&op.path)?;
            let cid = op.cid.clone()?;
            Some(ClassifiedOp { kind, cid })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedInfo {
    pub has_embed: bool,
    pub has_record: bool,
    pub embed_type: String,
    pub embed_refs: Vec<String>,
    pub external_uri: Option<String>,
    pub record_cid: Option<String>,
    pub record_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyInfo {
    pub is_reply: bool,
    pub root_cid: Option<String>,
    pub root_uri: Option<String>,
    pub parent_cid: Option<String>,
    pub parent_uri: Option<String>,
}

/// Flatten a post record's `embed` field into the flat storage columns.
/// `embed_type` always carries the full `$type` discriminator string (the
/// `recordWithMedia` case is the sole exception, which overwrites it with
/// the nested media's terminal segment). Unknown `$type` discriminators are
/// logged and otherwise ignored — they never cause the enclosing post to be
/// dropped.
pub fn extract_embed(record: &Node<'_>) -> EmbedInfo {
    let Some(embed) = record.get("embed") else {
        return EmbedInfo::default();
    };
    let mut info = EmbedInfo::default();
    apply_embed_case(embed, &mut info);
    info
}

fn apply_embed_case(embed: Node<'_>, info: &mut EmbedInfo) {
    info.embed_type = embed.get("$type").and_then(|n| n.as_str()).unwrap_or("").to_owned();
    match embed.type_tag_terminal() {
        Some("video") => {
            info.has_embed = true;
            if let Some(r) = embed.get("video").and_then(|v| v.get("ref")).and_then(|n| n.as_str()) {
                info.embed_refs = vec![r.to_owned()];
            }
        }
        Some("images") => {
            info.has_embed = true;
            info.embed_refs = embed
                .get("images")
                .and_then(|n| n.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| {
                            Node::new(v).get("image").and_then(|n| n.get("ref")).and_then(|n| n.as_str())
                        })
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
        }
        Some("external") => {
            info.has_embed = true;
            info.external_uri = coerce_scalar(embed.get("external").and_then(|n| n.get("uri")), "external_uri");
        }
        Some("record") => {
            info.has_record = true;
            let (cid, uri) = record_cid_uri(embed.get("record"));
            info.record_cid = cid;
            info.record_uri = uri;
        }
        Some("recordWithMedia") => {
            info.has_embed = true;
            info.has_record = true;
            let inner_record = embed.get("record").and_then(|n| n.get("record"));
            let (cid, uri) = record_cid_uri(inner_record);
            info.record_cid = cid;
            info.record_uri = uri;
            if let Some(media) = embed.get("media") {
                apply_embed_case(media, info);
            }
            info.embed_type = embed
                .get("media")
                .and_then(|n| n.type_tag_terminal())
                .unwrap_or("recordWithMedia")
                .to_owned();
        }
        Some(other) => {
            warn!(embed_type = other, "unrecognized embed $type, ignoring");
        }
        None => {}
    }
}

fn record_cid_uri(record: Option<Node<'_>>) -> (Option<String>, Option<String>) {
    let Some(record) = record else {
        return (None, None);
    };
    let cid = coerce_scalar(record.get("cid"), "record_cid");
    let uri = record.get("uri").and_then(|n| n.as_str()).map(str::to_owned);
    (cid, uri)
}

/// Flatten a post record's `reply` field, if present.
pub fn extract_reply(record: &Node<'_>) -> ReplyInfo {
    let Some(reply) = record.get("reply") else {
        return ReplyInfo::default();
    };
    let root = reply.get("root");
    let parent = reply.get("parent");
    ReplyInfo {
        is_reply: true,
        root_cid: root.as_ref().and_then(|n| n.get("cid")).and_then(|n| n.as_str()).map(str::to_owned),
        root_uri: root.as_ref().and_then(|n| n.get("uri")).and_then(|n| n.as_str()).map(str::to_owned),
        parent_cid: parent.as_ref().and_then(|n| n.get("cid")).and_then(|n| n.as_str()).map(str::to_owned),
        parent_uri: parent.as_ref().and_then(|n| n.get("uri")).and_then(|n| n.as_str()).map(str::to_owned),
    }
}

/// Coerce an upstream "list used as a single value" field (e.g. a one-element
/// JSON array) down to a scalar. A multi-element occurrence is unexpected but
/// not fatal: the first element is kept and the anomaly is logged at `warn`.
pub fn coerce_scalar(node: Option<Node<'_>>, field: &str) -> Option<String> {
    let node = node?;
    if let Some(s) = node.as_str() {
        return Some(s.to_owned());
    }
    let items = node.as_array()?;
    if items.len() > 1 {
        warn!(field, count = items.len(), "expected scalar field, got multiple elements; keeping first");
    }
    items.first().and_then(|v| Node::new(v).as_str()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (Value::Text(k.to_owned()), v)).collect())
    }

    #[test]
    fn embed_images_collects_all_refs() {
        let img = |r: &str| map(vec![("image", map(vec![("ref", Value::Text(r.into()))]))]);
        let embed = map(vec![
            ("$type", Value::Text("app.bsky.embed.images".into())),
            ("images", Value::Array(vec![img("r1"), img("r2")])),
        ]);
        let record = map(vec![("embed", embed)]);
        let info = extract_embed(&Node::new(&record));
        assert!(info.has_embed);
        assert_eq!(info.embed_type, "app.bsky.embed.images");
        assert_eq!(info.embed_refs, vec!["r1", "r2"]);
    }

    #[test]
    fn embed_external_sets_uri_not_has_record() {
        let embed = map(vec![
            ("$type", Value::Text("app.bsky.embed.external".into())),
            ("external", map(vec![("uri", Value::Text("https://example.com".into()))])),
        ]);
        let record = map(vec![("embed", embed)]);
        let info = extract_embed(&Node::new(&record));
        assert!(info.has_embed);
        assert!(!info.has_record);
        assert_eq!(info.external_uri.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn embed_record_sets_has_record_not_has_embed() {
        let embed = map(vec![
            ("$type", Value::Text("app.bsky.embed.record".into())),
            ("record", map(vec![("cid", Value::Text("bafyrec".into())), ("uri", Value::Text("at://x".into()))])),
        ]);
        let record = map(vec![("embed", embed)]);
        let info = extract_embed(&Node::new(&record));
        assert!(!info.has_embed);
        assert!(info.has_record);
        assert_eq!(info.record_cid.as_deref(), Some("bafyrec"));
        assert_eq!(info.record_uri.as_deref(), Some("at://x"));
    }

    #[test]
    fn embed_record_with_media_merges_both_and_overwrites_embed_type() {
        let inner_record = map(vec![("record", map(vec![("cid", Value::Text("bafyinner".into())), ("uri", Value::Text("at://inner".into()))]))]);
        let media = map(vec![
            ("$type", Value::Text("app.bsky.embed.external".into())),
            ("external", map(vec![("uri", Value::Text("https://ex.com".into()))])),
        ]);
        let embed = map(vec![
            ("$type", Value::Text("app.bsky.embed.recordWithMedia".into())),
            ("record", inner_record),
            ("media", media),
        ]);
        let record = map(vec![("embed", embed)]);
        let info = extract_embed(&Node::new(&record));
        assert!(info.has_embed);
        assert!(info.has_record);
        assert_eq!(info.record_cid.as_deref(), Some("bafyinner"));
        assert_eq!(info.external_uri.as_deref(), Some("https://ex.com"));
        assert_eq!(info.embed_type, "external");
    }

    #[test]
    fn unknown_embed_type_is_noop_not_error() {
        let embed = map(vec![("$type", Value::Text("app.bsky.embed.somethingNew".into()))]);
        let record = map(vec![("embed", embed)]);
        let info = extract_embed(&Node::new(&record));
        assert!(!info.has_embed);
        assert!(!info.has_record);
        assert_eq!(info.embed_type, "app.bsky.embed.somethingNew");
    }

    #[test]
    fn missing_embed_yields_default() {
        let record = map(vec![]);
        assert_eq!(extract_embed(&Node::new(&record)), EmbedInfo::default());
    }

    #[test]
    fn reply_extracts_all_four_fields() {
        let root = map(vec![("cid", Value::Text("rootcid".into())), ("uri", Value::Text("at://root".into()))]);
        let parent = map(vec![("cid", Value::Text("parentcid".into())), ("uri", Value::Text("at://parent".into()))]);
        let record = map(vec![("reply", map(vec![("root", root), ("parent", parent)]))]);
        let info = extract_reply(&Node::new(&record));
        assert!(info.is_reply);
        assert_eq!(info.root_cid.as_deref(), Some("rootcid"));
        assert_eq!(info.parent_uri.as_deref(), Some("at://parent"));
    }

    #[test]
    fn no_reply_field_yields_default() {
        let record = map(vec![]);
        assert_eq!(extract_reply(&Node::new(&record)), ReplyInfo::default());
    }

    #[test]
    fn classify_ops_keeps_only_creates_under_known_namespaces() {
        use crate::frame::RepoOp;
        let commit = CommitBody {
            repo: "did:plc:x".into(),
            commit: "bafycommit".into(),
            ops: vec![
                RepoOp { action: "create".into(), path: "app.bsky.feed.post/abc".into(), cid: Some("c1".into()) },
                RepoOp { action: "create".into(), path: "app.bsky.feed.repost/def".into(), cid: Some("c2".into()) },
                RepoOp { action: "delete".into(), path: "app.bsky.feed.post/ghi".into(), cid: Some("c3".into()) },
                RepoOp { action: "create".into(), path: "app.bsky.graph.follow/jkl".into(), cid: Some("c4".into()) },
            ],
            blocks: Vec::new(),
        };
        let classified = classify_ops(&commit);
        assert_eq!(classified.len(), 2);
        assert_eq!(classified[0].kind, ActivityKind::Post);
        assert_eq!(classified[1].kind, ActivityKind::Repost);
    }

    #[test]
    fn coerce_scalar_takes_first_of_multi_element_list_and_warns() {
        let v = Value::Array(vec![Value::Text("first".into()), Value::Text("second".into())]);
        let result = coerce_scalar(Some(Node::new(&v)), "external_uri");
        assert_eq!(result.as_deref(), Some("first"));
    }

    #[test]
    fn coerce_scalar_passes_through_plain_string() {
        let v = Value::Text("only".into());
        assert_eq!(coerce_scalar(Some(Node::new(&v)), "record_cid").as_deref(), Some("only"));
    }
}
