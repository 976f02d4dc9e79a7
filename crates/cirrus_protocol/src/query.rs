//! Compiled query descriptors.

use cirrus_codec::{GeoPoint, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterOrEqual,
}

impl CompareOp {
    /// Returns true if `ordering` of (column, operand) satisfies the operator.
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessOrEqual => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterOrEqual => ordering != Ordering::Less,
        }
    }

    /// Returns true for the four ordering operators.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Equal | CompareOp::NotEqual)
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "<>",
            CompareOp::LessThan => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterOrEqual => ">=",
        }
    }
}

/// String matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOp {
    /// Column starts with the pattern.
    HasPrefix,
    /// Column ends with the pattern.
    HasSuffix,
    /// Column contains the pattern.
    HasSubstring,
    /// Column matches the pattern as a regular expression.
    MatchesRegex,
}

impl TextOp {
    /// Applies the operator to a column value. Regex matching is left to
    /// the caller, since it needs a compiled expression.
    pub fn matches_plain(self, column: &str, pattern: &str) -> Option<bool> {
        match self {
            TextOp::HasPrefix => Some(column.starts_with(pattern)),
            TextOp::HasSuffix => Some(column.ends_with(pattern)),
            TextOp::HasSubstring => Some(column.contains(pattern)),
            TextOp::MatchesRegex => None,
        }
    }
}

/// The condition a constraint places on its column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Compare the column against a value.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: Value,
    },
    /// Match a string column against a pattern.
    Text {
        /// Operator.
        op: TextOp,
        /// Pattern (literal text or regular expression).
        pattern: String,
    },
    /// Geo column within a great-circle radius of a base point.
    Near {
        /// Center of the search.
        base: GeoPoint,
        /// Maximum distance, inclusive.
        max_distance_meters: f64,
    },
}

/// A single condition on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Normalized field key.
    pub key: String,
    /// Condition on the field.
    pub predicate: Predicate,
}

impl Constraint {
    /// Creates a comparison constraint.
    pub fn compare(key: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            key: key.into(),
            predicate: Predicate::Compare { op, value },
        }
    }

    /// Creates a string matching constraint.
    pub fn text(key: impl Into<String>, op: TextOp, pattern: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            predicate: Predicate::Text {
                op,
                pattern: pattern.into(),
            },
        }
    }

    /// Creates a distance constraint.
    pub fn near(key: impl Into<String>, base: GeoPoint, max_distance_meters: f64) -> Self {
        Self {
            key: key.into(),
            predicate: Predicate::Near {
                base,
                max_distance_meters,
            },
        }
    }
}

/// One entry of the sort chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "order", rename_all = "snake_case")]
pub enum SortKey {
    /// Smallest first.
    Ascending {
        /// Normalized field key.
        key: String,
    },
    /// Largest first.
    Descending {
        /// Normalized field key.
        key: String,
    },
    /// Nearest to `base` first.
    Distance {
        /// Normalized geo field key.
        key: String,
        /// Reference point.
        base: GeoPoint,
    },
}

impl SortKey {
    /// The field this sort key orders by.
    pub fn key(&self) -> &str {
        match self {
            SortKey::Ascending { key } | SortKey::Descending { key } | SortKey::Distance { key, .. } => key,
        }
    }
}

/// A backend-agnostic query.
///
/// A row matches when every entry of `constraints` holds and, if
/// `subqueries` is non-empty, every constraint of at least one subquery
/// holds as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Normalized class name.
    pub class_name: String,
    /// Projection allow-list; empty selects every field.
    pub selected_keys: Vec<String>,
    /// AND-combined constraints.
    pub constraints: Vec<Constraint>,
    /// OR-alternatives, each an AND-combined group.
    pub subqueries: Vec<Vec<Constraint>>,
    /// Sort chain, most significant first.
    pub sort_keys: Vec<SortKey>,
    /// Maximum number of rows returned.
    pub limit: u32,
    /// Number of leading rows skipped.
    pub skip: u32,
}

impl QueryDescriptor {
    /// Creates a descriptor matching every row of a class.
    pub fn new(class_name: impl Into<String>, limit: u32) -> Self {
        Self {
            class_name: class_name.into(),
            selected_keys: Vec::new(),
            constraints: Vec::new(),
            subqueries: Vec::new(),
            sort_keys: Vec::new(),
            limit,
            skip: 0,
        }
    }

    /// Number of AND-combined constraints.
    pub fn condition_count(&self) -> usize {
        self.constraints.len()
    }

    /// Number of OR-alternatives.
    pub fn subquery_count(&self) -> usize {
        self.subqueries.len()
    }

    /// Iterates over every constraint, top-level and inside subqueries.
    pub fn all_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .chain(self.subqueries.iter().flatten())
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.selected_keys.is_empty() {
            f.write_str("*")?;
        } else {
            f.write_str(&self.selected_keys.join(", "))?;
        }
        write!(f, " FROM {}", self.class_name)?;

        if !self.constraints.is_empty() || !self.subqueries.is_empty() {
            f.write_str(" WHERE ")?;
            write_group(f, &self.constraints)?;
            if !self.subqueries.is_empty() {
                if !self.constraints.is_empty() {
                    f.write_str(" AND ")?;
                }
                f.write_str("(")?;
                for (i, group) in self.subqueries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    f.write_str("(")?;
                    write_group(f, group)?;
                    f.write_str(")")?;
                }
                f.write_str(")")?;
            }
        }

        if !self.sort_keys.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, sort) in self.sort_keys.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match sort {
                    SortKey::Ascending { key } => write!(f, "{key} ASC")?,
                    SortKey::Descending { key } => write!(f, "{key} DESC")?,
                    SortKey::Distance { key, base } => write!(f, "DISTANCE({key}, POINT({base})) ASC")?,
                }
            }
        }

        write!(f, " LIMIT {} OFFSET {}", self.limit, self.skip)
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, group: &[Constraint]) -> fmt::Result {
    for (i, constraint) in group.iter().enumerate() {
        if i > 0 {
            f.write_str(" AND ")?;
        }
        write_constraint(f, constraint)?;
    }
    Ok(())
}

fn write_constraint(f: &mut fmt::Formatter<'_>, constraint: &Constraint) -> fmt::Result {
    let key = &constraint.key;
    match &constraint.predicate {
        Predicate::Compare { op, value } => match (op, value) {
            (CompareOp::Equal, Value::Null) => write!(f, "{key} IS NULL"),
            (CompareOp::NotEqual, Value::Null) => write!(f, "{key} IS NOT NULL"),
            _ => {
                write!(f, "{key} {} ", op.symbol())?;
                write_literal(f, value)
            }
        },
        Predicate::Text { op, pattern } => match op {
            TextOp::HasPrefix => write!(f, "{key} LIKE '{}%'", escape(pattern)),
            TextOp::HasSuffix => write!(f, "{key} LIKE '%{}'", escape(pattern)),
            TextOp::HasSubstring => write!(f, "{key} LIKE '%{}%'", escape(pattern)),
            TextOp::MatchesRegex => write!(f, "{key} ~ '{}'", escape(pattern)),
        },
        Predicate::Near {
            base,
            max_distance_meters,
        } => write!(f, "DISTANCE({key}, POINT({base})) <= {max_distance_meters}"),
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("NULL"),
        Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        Value::Int32(n) => write!(f, "{n}"),
        Value::Int64(n) => write!(f, "{n}"),
        Value::Float(n) => write!(f, "{n}"),
        Value::Double(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "'{}'", escape(s)),
        Value::Uuid(u) => write!(f, "'{}'", u.hyphenated()),
        Value::Date(d) => write!(f, "'{d}'"),
        Value::GeoPoint(p) => write!(f, "POINT({p})"),
        Value::Array(_) | Value::Set(_) | Value::Map(_) => match value.to_wire() {
            Ok(json) => write!(f, "'{}'", escape(&json.to_string())),
            Err(_) => f.write_str("?"),
        },
        Value::Unsupported => f.write_str("?"),
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryDescriptor {
        let mut query = QueryDescriptor::new("game", 2);
        query.selected_keys = vec!["score".into(), "player".into()];
        query
            .constraints
            .push(Constraint::compare("score", CompareOp::GreaterThan, Value::Int32(10)));
        query.sort_keys.push(SortKey::Descending { key: "score".into() });
        query
    }

    #[test]
    fn operators_accept_orderings() {
        assert!(CompareOp::LessOrEqual.accepts(Ordering::Equal));
        assert!(CompareOp::LessOrEqual.accepts(Ordering::Less));
        assert!(!CompareOp::LessOrEqual.accepts(Ordering::Greater));
        assert!(CompareOp::NotEqual.accepts(Ordering::Less));
        assert!(!CompareOp::Equal.is_ordering());
        assert!(CompareOp::GreaterOrEqual.is_ordering());
    }

    #[test]
    fn plain_text_operators() {
        assert_eq!(TextOp::HasPrefix.matches_plain("cirrus", "cir"), Some(true));
        assert_eq!(TextOp::HasSuffix.matches_plain("cirrus", "cir"), Some(false));
        assert_eq!(TextOp::HasSubstring.matches_plain("cirrus", "rru"), Some(true));
        assert_eq!(TextOp::MatchesRegex.matches_plain("cirrus", "c.*"), None);
    }

    #[test]
    fn counts() {
        let mut query = sample();
        assert_eq!(query.condition_count(), 1);
        assert_eq!(query.subquery_count(), 0);

        query.subqueries.push(vec![Constraint::text("player", TextOp::HasPrefix, "a")]);
        query.subqueries.push(vec![Constraint::text("player", TextOp::HasPrefix, "b")]);
        assert_eq!(query.subquery_count(), 2);
        assert_eq!(query.all_constraints().count(), 3);
    }

    #[test]
    fn display_is_sql_like() {
        let query = sample();
        assert_eq!(
            query.to_string(),
            "SELECT score, player FROM game WHERE score > 10 ORDER BY score DESC LIMIT 2 OFFSET 0"
        );

        let mut query = QueryDescriptor::new("player", 500);
        query.constraints.push(Constraint::compare("nick", CompareOp::Equal, Value::Null));
        query.subqueries.push(vec![Constraint::text("name", TextOp::HasPrefix, "o'b")]);
        query.subqueries.push(vec![Constraint::compare("level", CompareOp::LessOrEqual, Value::Int64(3))]);
        assert_eq!(
            query.to_string(),
            "SELECT * FROM player WHERE nick IS NULL AND ((name LIKE 'o''b%') OR (level <= 3)) LIMIT 500 OFFSET 0"
        );
    }

    #[test]
    fn display_geo() {
        let base = GeoPoint::new(1.5, 2.5).unwrap();
        let mut query = QueryDescriptor::new("shop", 10);
        query.constraints.push(Constraint::near("loc", base, 1000.0));
        query.sort_keys.push(SortKey::Distance { key: "loc".into(), base });
        assert_eq!(
            query.to_string(),
            "SELECT * FROM shop WHERE DISTANCE(loc, POINT(1.5,2.5)) <= 1000 ORDER BY DISTANCE(loc, POINT(1.5,2.5)) ASC LIMIT 10 OFFSET 0"
        );
    }

    #[test]
    fn serde_shape() {
        let query = sample();
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["constraints"][0]["predicate"]["kind"], "compare");
        assert_eq!(json["constraints"][0]["predicate"]["op"], "greater_than");
        assert_eq!(json["sort_keys"][0]["order"], "descending");

        let back: QueryDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, query);
    }
}
