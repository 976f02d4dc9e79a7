//! Query evaluation over in-memory rows.

use crate::error::{SyncError, SyncResult};
use cirrus_codec::{
    GeoPoint, TypeTag, Value, CREATED_AT_KEY, OBJECT_ID_KEY, UPDATED_AT_KEY,
};
use cirrus_protocol::{
    CompareOp, Constraint, ObjectRecord, Predicate, QueryDescriptor, SortKey, TextOp,
};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Column types of one class. The first non-null value written to a
/// column fixes its type.
pub(crate) type Schema = BTreeMap<String, TypeTag>;

/// Reads a column of a row, system columns included.
pub(crate) fn column<'a>(record: &'a ObjectRecord, key: &str) -> Option<Cow<'a, Value>> {
    match key {
        OBJECT_ID_KEY => Some(Cow::Owned(Value::Uuid(record.object_id))),
        CREATED_AT_KEY => Some(Cow::Owned(Value::Date(record.created_at))),
        UPDATED_AT_KEY => Some(Cow::Owned(Value::Date(record.updated_at))),
        _ => record.fields.get(key).map(Cow::Borrowed),
    }
}

/// Type of a column, if the class has one by that name.
pub(crate) fn column_type(schema: &Schema, key: &str) -> Option<TypeTag> {
    match key {
        OBJECT_ID_KEY => Some(TypeTag::Uuid),
        CREATED_AT_KEY | UPDATED_AT_KEY => Some(TypeTag::Date),
        _ => schema.get(key).copied(),
    }
}

/// Numeric operands are accepted against any numeric column.
fn operand_fits(column: TypeTag, operand: TypeTag) -> bool {
    column == operand || (column.is_numeric() && operand.is_numeric())
}

enum Test {
    Compare { op: CompareOp, value: Value },
    Plain { op: TextOp, pattern: String },
    Regex(Regex),
    Near { base: GeoPoint, max_distance_meters: f64 },
}

struct Compiled {
    key: String,
    test: Test,
}

impl Compiled {
    fn new(constraint: &Constraint, schema: &Schema) -> SyncResult<Self> {
        let key = &constraint.key;
        let expected = column_type(schema, key);
        let test = match &constraint.predicate {
            Predicate::Compare { op, value } => {
                if let Some(column) = expected {
                    if !value.is_null() && !operand_fits(column, value.type_tag()) {
                        return Err(SyncError::type_mismatch(format!(
                            "{key} is {column}, cannot compare against {}",
                            value.type_tag()
                        )));
                    }
                }
                Test::Compare {
                    op: *op,
                    value: value.clone(),
                }
            }
            Predicate::Text { op, pattern } => {
                if let Some(column) = expected.filter(|t| *t != TypeTag::String) {
                    return Err(SyncError::type_mismatch(format!(
                        "{key} is {column}, text matching needs string"
                    )));
                }
                match op {
                    TextOp::MatchesRegex => Test::Regex(Regex::new(pattern).map_err(|e| {
                        SyncError::InvalidRequest(format!("invalid pattern for {key}: {e}"))
                    })?),
                    _ => Test::Plain {
                        op: *op,
                        pattern: pattern.clone(),
                    },
                }
            }
            Predicate::Near {
                base,
                max_distance_meters,
            } => {
                if let Some(column) = expected.filter(|t| *t != TypeTag::GeoPoint) {
                    return Err(SyncError::type_mismatch(format!(
                        "{key} is {column}, distance needs geo_point"
                    )));
                }
                Test::Near {
                    base: *base,
                    max_distance_meters: *max_distance_meters,
                }
            }
        };
        Ok(Self {
            key: key.clone(),
            test,
        })
    }

    // Missing and null columns only satisfy `Equal(Null)`.
    fn matches(&self, record: &ObjectRecord) -> bool {
        let column = column(record, &self.key);
        let present = column.as_deref().filter(|v| !v.is_null());
        match (&self.test, present) {
            (Test::Compare { op, value }, None) => *op == CompareOp::Equal && value.is_null(),
            (Test::Compare { op, value }, Some(_)) if value.is_null() => *op == CompareOp::NotEqual,
            (Test::Compare { op, value }, Some(column)) => match op {
                CompareOp::Equal => column.loosely_equals(value),
                CompareOp::NotEqual => !column.loosely_equals(value),
                _ => column.compare(value).is_some_and(|o| op.accepts(o)),
            },
            (_, None) => false,
            (Test::Plain { op, pattern }, Some(column)) => column
                .as_str()
                .and_then(|s| op.matches_plain(s, pattern))
                .unwrap_or(false),
            (Test::Regex(regex), Some(column)) => column.as_str().is_some_and(|s| regex.is_match(s)),
            (
                Test::Near {
                    base,
                    max_distance_meters,
                },
                Some(column),
            ) => column
                .as_geo_point()
                .is_some_and(|p| p.distance_meters(base) <= *max_distance_meters),
        }
    }
}

/// A query's constraints, checked against the schema and ready to run.
pub(crate) struct Filter {
    all: Vec<Compiled>,
    any: Vec<Vec<Compiled>>,
}

impl Filter {
    /// Checks operand types, sort keys and projection, and compiles patterns.
    pub(crate) fn compile(query: &QueryDescriptor, schema: &Schema) -> SyncResult<Self> {
        for key in &query.selected_keys {
            if column_type(schema, key).is_none() {
                return Err(SyncError::InvalidRequest(format!(
                    "unknown key {key} in {}",
                    query.class_name
                )));
            }
        }
        for sort in &query.sort_keys {
            if let SortKey::Distance { key, .. } = sort {
                if let Some(column) = column_type(schema, key).filter(|t| *t != TypeTag::GeoPoint) {
                    return Err(SyncError::type_mismatch(format!(
                        "{key} is {column}, distance sort needs geo_point"
                    )));
                }
            }
        }
        let compile_all = |constraints: &[Constraint]| {
            constraints
                .iter()
                .map(|c| Compiled::new(c, schema))
                .collect::<SyncResult<Vec<_>>>()
        };
        Ok(Self {
            all: compile_all(query.constraints.as_slice())?,
            any: query
                .subqueries
                .iter()
                .map(|group| compile_all(group.as_slice()))
                .collect::<SyncResult<Vec<_>>>()?,
        })
    }

    /// True if every top-level constraint and, when alternatives exist,
    /// every constraint of at least one alternative holds.
    pub(crate) fn matches(&self, record: &ObjectRecord) -> bool {
        self.all.iter().all(|c| c.matches(record))
            && (self.any.is_empty()
                || self
                    .any
                    .iter()
                    .any(|group| group.iter().all(|c| c.matches(record))))
    }
}

/// Missing and null values order after every present value.
fn compare_present(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
    }
}

fn distance(record: &ObjectRecord, key: &str, base: &GeoPoint) -> f64 {
    column(record, key)
        .and_then(|v| v.as_geo_point().map(|p| p.distance_meters(base)))
        .unwrap_or(f64::INFINITY)
}

fn compare_by(sort: &SortKey, a: &ObjectRecord, b: &ObjectRecord) -> Ordering {
    match sort {
        SortKey::Ascending { key } => {
            compare_present(column(a, key).as_deref(), column(b, key).as_deref())
        }
        SortKey::Descending { key } => {
            compare_present(column(a, key).as_deref(), column(b, key).as_deref()).reverse()
        }
        SortKey::Distance { key, base } => {
            distance(a, key, base).total_cmp(&distance(b, key, base))
        }
    }
}

/// Stable sort by the chain, most significant key first.
pub(crate) fn sort(records: &mut [ObjectRecord], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        keys.iter()
            .map(|key| compare_by(key, a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Applies skip, limit and projection.
pub(crate) fn page(records: Vec<ObjectRecord>, query: &QueryDescriptor) -> Vec<ObjectRecord> {
    records
        .into_iter()
        .skip(usize::try_from(query.skip).unwrap_or(usize::MAX))
        .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
        .map(|record| record.project(&query.selected_keys))
        .collect()
}
