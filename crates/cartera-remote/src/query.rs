//! Equality queries with an optional sort, the only query shape the sync
//! layer needs from the document store.

use std::cmp::Ordering;

use cartera_shared::value::{RawDocument, Value};

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single equality predicate on a top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// A query against one collection: zero or more equality filters plus an
/// optional order-by.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    /// Whether a document satisfies every filter. A missing field never
    /// matches an equality predicate.
    pub fn matches(&self, doc: &RawDocument) -> bool {
        self.filters
            .iter()
            .all(|f| doc.get(&f.field) == Some(&f.value))
    }

    /// Sort a snapshot in place according to the order-by clause, if any.
    pub fn sort(&self, docs: &mut [RawDocument]) {
        let Some((field, direction)) = &self.order else {
            return;
        };
        docs.sort_by(|a, b| {
            let ord = compare_values(a.get(field), b.get(field));
            match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }
}

/// Field comparison for ordering. Missing fields sort first; values of
/// different kinds compare equal so the sort stays stable.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Text(x)), Some(Value::Text(y))) => x.cmp(y),
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Timestamp(x)), Some(Value::Timestamp(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Float(x)), Some(Value::Float(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartera_shared::value::Fields;

    fn doc(id: &str, pairs: Vec<(&str, Value)>) -> RawDocument {
        let mut fields = Fields::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v);
        }
        RawDocument::new(id, fields)
    }

    #[test]
    fn equality_filters_all_must_match() {
        let q = Query::new()
            .filter_eq("clientId", "c1")
            .filter_eq("visto", false);

        let hit = doc("m1", vec![("clientId", "c1".into()), ("visto", false.into())]);
        let miss = doc("m2", vec![("clientId", "c1".into()), ("visto", true.into())]);
        let absent = doc("m3", vec![("clientId", "c1".into())]);

        assert!(q.matches(&hit));
        assert!(!q.matches(&miss));
        assert!(!q.matches(&absent));
    }

    #[test]
    fn order_by_sorts_snapshot() {
        let q = Query::new().order_by("name", Direction::Ascending);
        let mut docs = vec![
            doc("b2", vec![("name", "Zeta".into())]),
            doc("b1", vec![("name", "Alfa".into())]),
        ];
        q.sort(&mut docs);
        assert_eq!(docs[0].id, "b1");
        assert_eq!(docs[1].id, "b2");
    }
}
