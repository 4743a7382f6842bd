//! A minimal nested key/value document.
//!
//! [`Document`] is the exchange format of the [`codec`](crate::codec): a tree
//! of numbers, booleans, strings and insertion-ordered tables. Only a small
//! surface is needed: build a table, set and get keyed entries, iterate the
//! entries in order, and ask whether a value is a number or a table.
//!
//! With the `serde` feature the document serializes untagged, so JSON or RON
//! renderings look like plain nested maps.

use indexmap::IndexMap;

/// An ordered nested key/value value. Numbers are `f64`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Document {
    Number(f64),
    Bool(bool),
    String(String),
    Table(IndexMap<String, Document>),
}

impl Default for Document {
    fn default() -> Self {
        Document::table()
    }
}

impl Document {
    /// An empty table.
    pub fn table() -> Self {
        Document::Table(IndexMap::new())
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Document::Table(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Document::Number(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Document::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as a slot position: finite, integral and non-negative.
    pub fn as_index(&self) -> Option<usize> {
        let n = self.as_number()?;
        if n.fract() != 0.0 || n < 0.0 || n > usize::MAX as f64 {
            return None;
        }
        Some(n as usize)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Document::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&IndexMap<String, Document>> {
        match self {
            Document::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Entry `key` of a table. `None` for missing keys and non-tables.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_table()?.get(key)
    }

    /// Sets entry `key`, keeping its position if it already exists.
    ///
    /// A non-table value is replaced by an empty table first.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Document>) -> &mut Self {
        if !self.is_table() {
            *self = Document::table();
        }
        if let Document::Table(t) = self {
            t.insert(key.into(), value.into());
        }
        self
    }

    /// Entries of a table in insertion order; nothing for other values.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.as_table()
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.as_table().map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f64> for Document {
    fn from(n: f64) -> Self {
        Document::Number(n)
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::String(s)
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::String(s.to_owned())
    }
}

impl From<IndexMap<String, Document>> for Document {
    fn from(t: IndexMap<String, Document>) -> Self {
        Document::Table(t)
    }
}

impl<K: Into<String>, V: Into<Document>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Document::Table(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::Document;

    #[test]
    fn set_keeps_insertion_order() {
        let mut d = Document::table();
        d.set("n10", 1.0).set("n2", 2.0).set("a", "x");
        d.set("n10", 3.0);

        let keys: Vec<_> = d.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, ["n10", "n2", "a"]);
        assert_eq!(d.get("n10"), Some(&Document::Number(3.0)));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn set_on_scalar_turns_it_into_a_table() {
        let mut d = Document::from(4.0);
        d.set("k", true);
        assert!(d.is_table());
        assert_eq!(d.get("k").and_then(Document::as_bool), Some(true));
    }

    #[test]
    fn as_index_rejects_non_positions() {
        assert_eq!(Document::from(3.0).as_index(), Some(3));
        assert_eq!(Document::from(-1.0).as_index(), None);
        assert_eq!(Document::from(1.5).as_index(), None);
        assert_eq!(Document::from(f64::NAN).as_index(), None);
        assert_eq!(Document::from(f64::INFINITY).as_index(), None);
        assert_eq!(Document::from("3").as_index(), None);
    }

    #[test]
    fn scalars_have_no_entries() {
        let d = Document::from("text");
        assert_eq!(d.entries().count(), 0);
        assert_eq!(d.get("anything"), None);
        assert!(d.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip_preserves_order() {
        let d: Document = [("n1", 1.0), ("n0", 0.0), ("n10", 10.0)].into_iter().collect();
        let mut outer = Document::table();
        outer.set("list", d).set("flag", false).set("name", "tree");

        let json = serde_json::to_string(&outer).unwrap();
        assert_eq!(
            json,
            r#"{"list":{"n1":1.0,"n0":0.0,"n10":10.0},"flag":false,"name":"tree"}"#
        );
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outer);
    }
}
