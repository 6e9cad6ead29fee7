use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ROW_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh opaque row identifier, assigned whenever an inserted row arrives
/// without one.
pub(crate) fn fresh_row_id() -> String {
    let sequence = NEXT_ROW_ID.fetch_add(1, Ordering::Relaxed);
    format!("row-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A fully described query: conjunctive equality filters, at most one order
/// field, and an optional limit-to-one mode. Both backends consume the same
/// struct; nothing is resolved lazily.
#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order: Option<(String, Direction)>,
    single: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn order(&self) -> Option<(&str, Direction)> {
        self.order
            .as_ref()
            .map(|(field, direction)| (field.as_str(), *direction))
    }

    pub fn is_single(&self) -> bool {
        self.single
    }
}

/// Uniform persistence surface over the three logical collections. Selected
/// once at bootstrap and injected; callers never learn which backend they
/// talk to. Failures are returned, never raised past this boundary, and no
/// operation retries on its own.
#[async_trait]
pub trait Store: Send + Sync {
    /// Filtered, optionally ordered read. `single` queries yield at most one
    /// row; zero matches is an empty vec, not an error.
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, InfraError>;

    /// Appends rows, assigning fresh identifiers to rows lacking one, and
    /// returns the rows as stored.
    async fn insert(&self, collection: &str, rows: Vec<Value>) -> Result<Vec<Value>, InfraError>;

    /// Applies a shallow partial patch to every row matching the filters and
    /// returns the patched rows. No filters means the whole collection.
    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, InfraError>;

    /// Removes every matching row and returns how many went away. No filters
    /// means the whole collection.
    async fn delete(&self, collection: &str, query: &Query) -> Result<usize, InfraError>;

    /// Insert-or-update: rows match an existing row by `id` first, then by
    /// `fallback_key` when given; unmatched rows are inserted with fresh ids.
    async fn upsert(
        &self,
        collection: &str,
        rows: Vec<Value>,
        fallback_key: Option<&str>,
    ) -> Result<Vec<Value>, InfraError>;
}

// --- shared emulation engine -------------------------------------------------
//
// The local backends round-trip rows through JSON text, which loses the
// original field types. Comparisons therefore fall back to textual equality
// across scalar representations, mirroring the remote store's behavior when
// a numeric id is filtered against its string form.

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub(crate) fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (scalar_text(left), scalar_text(right)) {
        (Some(left_text), Some(right_text)) => left_text == right_text,
        _ => false,
    }
}

pub(crate) fn row_matches(row: &Value, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(field, expected)| match row.get(field) {
        Some(actual) => loose_eq(actual, expected),
        None => expected.is_null(),
    })
}

fn compare_field(left: &Value, right: &Value) -> CmpOrdering {
    if let (Some(left_num), Some(right_num)) = (left.as_f64(), right.as_f64()) {
        return left_num.partial_cmp(&right_num).unwrap_or(CmpOrdering::Equal);
    }
    match (scalar_text(left), scalar_text(right)) {
        (Some(left_text), Some(right_text)) => left_text.cmp(&right_text),
        _ => CmpOrdering::Equal,
    }
}

pub(crate) fn sort_rows(rows: &mut [Value], field: &str, direction: Direction) {
    // sort_by is stable, so equal keys keep their insertion order.
    rows.sort_by(|left, right| {
        let ordering = compare_field(
            left.get(field).unwrap_or(&Value::Null),
            right.get(field).unwrap_or(&Value::Null),
        );
        match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
}

pub(crate) fn apply_select(rows: &[Value], query: &Query) -> Vec<Value> {
    let mut selected = rows
        .iter()
        .filter(|row| row_matches(row, query.filters()))
        .cloned()
        .collect::<Vec<_>>();
    if let Some((field, direction)) = query.order() {
        sort_rows(&mut selected, field, direction);
    }
    if query.is_single() {
        selected.truncate(1);
    }
    selected
}

fn id_text(row: &Value) -> Option<String> {
    row.get("id")
        .and_then(scalar_text)
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn ensure_row_id(row: &mut Value) {
    if id_text(row).is_some() {
        return;
    }
    if let Some(object) = row.as_object_mut() {
        object.insert("id".to_string(), Value::String(fresh_row_id()));
    }
}

pub(crate) fn merge_row(target: &mut Value, patch: &Value) {
    let Some(patch_object) = patch.as_object() else {
        return;
    };
    if let Some(target_object) = target.as_object_mut() {
        for (key, value) in patch_object {
            target_object.insert(key.clone(), value.clone());
        }
    }
}

/// Upsert matching priority: primary identifier first, then the designated
/// fallback unique field, else no match (insert as new).
pub(crate) fn upsert_match_index(
    rows: &[Value],
    candidate: &Value,
    fallback_key: Option<&str>,
) -> Option<usize> {
    if let Some(candidate_id) = candidate.get("id").filter(|value| !value.is_null()) {
        if let Some(index) = rows.iter().position(|row| {
            row.get("id")
                .map(|existing| loose_eq(existing, candidate_id))
                .unwrap_or(false)
        }) {
            return Some(index);
        }
    }
    let key = fallback_key?;
    let candidate_value = candidate.get(key).filter(|value| !value.is_null())?;
    rows.iter().position(|row| {
        row.get(key)
            .map(|existing| loose_eq(existing, candidate_value))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_eq_tolerates_number_string_skew() {
        assert!(loose_eq(&json!(42), &json!("42")));
        assert!(loose_eq(&json!("42"), &json!(42)));
        assert!(loose_eq(&json!("abc"), &json!("abc")));
        assert!(!loose_eq(&json!(42), &json!("43")));
        assert!(!loose_eq(&json!(null), &json!("null")));
    }

    #[test]
    fn filters_combine_with_and() {
        let row = json!({"profile_id": "prf-1", "date": "2026-03-02"});
        let both = Query::new().eq("profile_id", "prf-1").eq("date", "2026-03-02");
        let one_off = Query::new().eq("profile_id", "prf-1").eq("date", "2026-03-03");

        assert!(row_matches(&row, both.filters()));
        assert!(!row_matches(&row, one_off.filters()));
    }

    #[test]
    fn missing_field_only_matches_null_filter() {
        let row = json!({"id": "row-1"});
        assert!(!row_matches(&row, Query::new().eq("topic", "x").filters()));
        assert!(row_matches(&row, Query::new().eq("topic", Value::Null).filters()));
    }

    #[test]
    fn empty_filters_select_everything() {
        let rows = vec![json!({"id": 1}), json!({"id": 2})];
        assert_eq!(apply_select(&rows, &Query::new()).len(), 2);
    }

    #[test]
    fn order_sorts_both_directions_and_is_stable() {
        let rows = vec![
            json!({"id": "a", "time": "10:00"}),
            json!({"id": "b", "time": "09:00"}),
            json!({"id": "c", "time": "09:00"}),
        ];

        let ascending = apply_select(
            &rows,
            &Query::new().order_by("time", Direction::Ascending),
        );
        assert_eq!(ascending[0]["id"], "b");
        assert_eq!(ascending[1]["id"], "c");
        assert_eq!(ascending[2]["id"], "a");

        let descending = apply_select(
            &rows,
            &Query::new().order_by("time", Direction::Descending),
        );
        assert_eq!(descending[0]["id"], "a");
    }

    #[test]
    fn single_truncates_after_filter_and_order() {
        let rows = vec![
            json!({"id": "a", "time": "10:00"}),
            json!({"id": "b", "time": "09:00"}),
        ];
        let selected = apply_select(
            &rows,
            &Query::new().order_by("time", Direction::Ascending).single(),
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["id"], "b");
    }

    #[test]
    fn single_with_no_match_is_empty_not_error() {
        let rows = vec![json!({"id": "a"})];
        let selected = apply_select(&rows, &Query::new().eq("id", "zz").single());
        assert!(selected.is_empty());
    }

    #[test]
    fn ensure_row_id_fills_missing_or_blank_ids() {
        let mut fresh = json!({"name": "x"});
        ensure_row_id(&mut fresh);
        assert!(!fresh["id"].as_str().unwrap_or_default().is_empty());

        let mut kept = json!({"id": "prf-1"});
        ensure_row_id(&mut kept);
        assert_eq!(kept["id"], "prf-1");
    }

    #[test]
    fn merge_row_is_shallow() {
        let mut row = json!({"id": "a", "topic": "old", "title": "kept"});
        merge_row(&mut row, &json!({"topic": "new"}));
        assert_eq!(row["topic"], "new");
        assert_eq!(row["title"], "kept");
    }

    #[test]
    fn upsert_prefers_id_over_fallback_key() {
        let rows = vec![
            json!({"id": "a", "user_id": "u1"}),
            json!({"id": "b", "user_id": "u2"}),
        ];
        let by_id = json!({"id": "b", "user_id": "u1"});
        assert_eq!(upsert_match_index(&rows, &by_id, Some("user_id")), Some(1));

        let by_key = json!({"user_id": "u1", "theme": "dark"});
        assert_eq!(upsert_match_index(&rows, &by_key, Some("user_id")), Some(0));

        let unmatched = json!({"user_id": "u3"});
        assert_eq!(upsert_match_index(&rows, &unmatched, Some("user_id")), None);
    }
}
