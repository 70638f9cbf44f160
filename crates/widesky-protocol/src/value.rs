//! Dynamic traversal over a decoded CBOR value.
//!
//! The firehose wire format is self-describing CBOR with no fixed schema for
//! record bodies (facets, embeds, and reply references vary by record type).
//! Rather than modeling every possible shape as a Rust struct, `Node` wraps a
//! `ciborium::Value` and exposes key/index lookups that return `None` on any
//! missing or mis-shaped step instead of failing. A classification or
//! extraction function can chain `.get("embed").get("record").get("cid")`
//! and simply treat a `None` anywhere in the chain as "this post has no
//! quoted record" rather than threading a `Result` through every call.

use ciborium::Value;

#[derive(Clone, Copy)]
pub struct Node<'a>(&'a Value);

impl<'a> Node<'a> {
    pub fn new(value: &'a Value) -> Self {
        Node(value)
    }

    /// Look up a text key in a CBOR map. Absent key, or a value that isn't a
    /// map at all, both yield `None`.
    pub fn get(&self, key: &str) -> Option<Node<'a>> {
        let Value::Map(entries) = self.0 else {
            return None;
        };
        entries
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| Node(v))
    }

    pub fn index(&self, i: usize) -> Option<Node<'a>> {
        let Value::Array(items) = self.0 else {
            return None;
        };
        items.get(i).map(Node)
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.0.as_text()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    pub fn as_array(&self) -> Option<&'a [Value]> {
        self.0.as_array().map(Vec::as_slice)
    }

    pub fn raw(&self) -> &'a Value {
        self.0
    }

    /// Convert to an owned `serde_json::Value`, used for columns that are
    /// stored verbatim (e.g. `facets`).
    pub fn to_json(&self) -> serde_json::Value {
        cbor_to_json(self.0)
    }

    /// The terminal dotted segment of a `$type`-style discriminator, e.g.
    /// `"app.bsky.embed.images"` -> `"images"`.
    pub fn type_tag_terminal(&self) -> Option<&'a str> {
        self.get("$type").and_then(|n| n.as_str()).map(|s| {
            s.rsplit('.').next().unwrap_or(s)
        })
    }
}

fn cbor_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number(i128::from(*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex_encode(b)),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(cbor_to_json).collect()),
        Value::Map(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                let key = k.as_text().map(str::to_owned).unwrap_or_else(|| format!("{k:?}"));
                map.insert(key, cbor_to_json(v));
            }
            serde_json::Value::Object(map)
        }
        Value::Tag(_, inner) => cbor_to_json(inner),
        _ => serde_json::Value::Null,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Text(k.to_owned()), v))
                .collect(),
        )
    }

    #[test]
    fn get_chains_through_nested_maps() {
        let v = map(vec![("a", map(vec![("b", Value::Text("c".into()))]))]);
        let node = Node::new(&v);
        assert_eq!(node.get("a").and_then(|n| n.get("b")).and_then(|n| n.as_str()), Some("c"));
    }

    #[test]
    fn missing_key_returns_none_not_panic() {
        let v = map(vec![("a", Value::Text("x".into()))]);
        let node = Node::new(&v);
        assert!(node.get("missing").is_none());
        assert!(node.get("a").and_then(|n| n.get("deeper")).is_none());
    }

    #[test]
    fn type_tag_terminal_splits_on_last_dot() {
        let v = map(vec![("$type", Value::Text("app.bsky.embed.images".into()))]);
        let node = Node::new(&v);
        assert_eq!(node.type_tag_terminal(), Some("images"));
    }
}
