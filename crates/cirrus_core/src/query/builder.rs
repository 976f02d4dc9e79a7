//! Fluent constraint accumulation.

use crate::error::{CoreError, CoreResult};
use crate::types::{normalize_key, ClassName};
use cirrus_codec::{GeoPoint, Value};
use cirrus_protocol::{CompareOp, Constraint, QueryDescriptor, SortKey, TextOp};
use std::fmt;

/// Maximum length of the sort chain.
pub const MAX_SORT_KEYS: usize = 5;

/// Row limit of a new query.
pub const DEFAULT_LIMIT: u32 = 500;

/// Accumulates constraints, projection, sort keys and paging for one class.
///
/// Keys are checked against the identifier grammar as they are added.
/// Operand types are not checked against column types here; the backend
/// does that when the query runs.
///
/// ```
/// use cirrus_core::{QueryBuilder, CompareOp};
///
/// let mut query = QueryBuilder::for_class("game").unwrap();
/// query
///     .where_key("score", CompareOp::GreaterThan, 10).unwrap()
///     .order_by_descending("score").unwrap()
///     .set_limit(2);
/// assert_eq!(query.condition_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    class_name: ClassName,
    default_limit: u32,
    descriptor: QueryDescriptor,
}

impl QueryBuilder {
    /// Starts a query over every row of `class_name`.
    pub fn for_class(class_name: &str) -> CoreResult<Self> {
        Ok(Self::new(ClassName::new(class_name)?))
    }

    /// Starts a query over an already validated class.
    pub fn new(class_name: ClassName) -> Self {
        Self::with_limit(class_name, DEFAULT_LIMIT)
    }

    /// Starts a query with a custom default limit.
    pub fn with_limit(class_name: ClassName, limit: u32) -> Self {
        let descriptor = QueryDescriptor::new(class_name.as_str(), limit);
        Self {
            class_name,
            default_limit: limit,
            descriptor,
        }
    }

    /// Target class.
    pub fn class_name(&self) -> &ClassName {
        &self.class_name
    }

    /// Adds keys to the projection. Repeated calls accumulate.
    pub fn select<I, S>(&mut self, keys: I) -> CoreResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|key| normalize_key(key.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        for key in keys {
            if !self.descriptor.selected_keys.contains(&key) {
                self.descriptor.selected_keys.push(key);
            }
        }
        Ok(self)
    }

    /// Adds a comparison constraint.
    ///
    /// Comparing against `Null` with `Equal` matches rows where the column
    /// is missing or null; `NotEqual` matches the rest.
    pub fn where_key(&mut self, key: &str, op: CompareOp, value: impl Into<Value>) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        let value = value.into();
        value.validate()?;
        if op.is_ordering() && value.is_null() {
            return Err(CoreError::invalid_operation(format!(
                "cannot order {key} against null"
            )));
        }
        self.descriptor.constraints.push(Constraint::compare(key, op, value));
        Ok(self)
    }

    /// Adds a string matching constraint.
    pub fn where_text(&mut self, key: &str, op: TextOp, pattern: impl Into<String>) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        self.descriptor.constraints.push(Constraint::text(key, op, pattern));
        Ok(self)
    }

    /// Restricts a geo column to a radius around `base`, inclusive.
    pub fn where_near(&mut self, key: &str, base: GeoPoint, max_distance_meters: f64) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        if !max_distance_meters.is_finite() || max_distance_meters < 0.0 {
            return Err(CoreError::invalid_operation(format!(
                "invalid distance {max_distance_meters}"
            )));
        }
        self.descriptor
            .constraints
            .push(Constraint::near(key, base, max_distance_meters));
        Ok(self)
    }

    /// Adds `alternative`'s constraints as one OR-alternative.
    ///
    /// Rows must satisfy this query's own constraints and every constraint
    /// of at least one alternative. The alternative may carry constraints
    /// only: nested alternatives, a selection or sort keys are rejected.
    pub fn or_where(&mut self, alternative: &QueryBuilder) -> CoreResult<&mut Self> {
        if alternative.class_name != self.class_name {
            return Err(CoreError::invalid_operation(format!(
                "cannot combine queries over {} and {}",
                self.class_name, alternative.class_name
            )));
        }
        let nested = &alternative.descriptor;
        if !nested.subqueries.is_empty() || !nested.selected_keys.is_empty() || !nested.sort_keys.is_empty() {
            return Err(CoreError::invalid_operation(
                "an OR-alternative may only hold constraints",
            ));
        }
        self.descriptor
            .subqueries
            .push(alternative.descriptor.constraints.clone());
        Ok(self)
    }

    /// Sorts by `key`, smallest first.
    pub fn order_by_ascending(&mut self, key: &str) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        self.push_sort(SortKey::Ascending { key })
    }

    /// Sorts by `key`, largest first.
    pub fn order_by_descending(&mut self, key: &str) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        self.push_sort(SortKey::Descending { key })
    }

    /// Sorts by distance between the geo column `key` and `base`, nearest first.
    pub fn order_by_distance(&mut self, base: GeoPoint, key: &str) -> CoreResult<&mut Self> {
        let key = normalize_key(key)?;
        self.push_sort(SortKey::Distance { key, base })
    }

    /// Sets the maximum number of rows returned.
    pub fn set_limit(&mut self, limit: u32) -> &mut Self {
        self.descriptor.limit = limit;
        self
    }

    /// Sets the number of leading rows skipped.
    pub fn set_skip(&mut self, skip: u32) -> &mut Self {
        self.descriptor.skip = skip;
        self
    }

    /// Current limit.
    pub fn limit(&self) -> u32 {
        self.descriptor.limit
    }

    /// Current skip.
    pub fn skip(&self) -> u32 {
        self.descriptor.skip
    }

    /// Number of AND-combined constraints.
    pub fn condition_count(&self) -> usize {
        self.descriptor.condition_count()
    }

    /// Number of OR-alternatives.
    pub fn subquery_count(&self) -> usize {
        self.descriptor.subquery_count()
    }

    /// Clears everything except the class name. Paging returns to defaults.
    pub fn reset(&mut self) -> &mut Self {
        self.descriptor = QueryDescriptor::new(self.class_name.as_str(), self.default_limit);
        self
    }

    /// The compiled descriptor.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Consumes the builder and returns the compiled descriptor.
    pub fn build(self) -> QueryDescriptor {
        self.descriptor
    }

    fn push_sort(&mut self, sort: SortKey) -> CoreResult<&mut Self> {
        if self.descriptor.sort_keys.len() >= MAX_SORT_KEYS {
            return Err(CoreError::SortLimitExceeded { max: MAX_SORT_KEYS });
        }
        self.descriptor.sort_keys.push(sort);
        Ok(self)
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.descriptor, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_protocol::Predicate;

    #[test]
    fn defaults() {
        let query = QueryBuilder::for_class("Game").unwrap();
        assert_eq!(query.class_name().as_str(), "game");
        assert_eq!(query.limit(), DEFAULT_LIMIT);
        assert_eq!(query.skip(), 0);
        assert_eq!(query.condition_count(), 0);
        assert!(QueryBuilder::for_class("bad__").is_err());
    }

    #[test]
    fn select_is_cumulative_union() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        query.select(["Score", "name"]).unwrap();
        query.select(["name", "objectId"]).unwrap();
        assert_eq!(
            query.descriptor().selected_keys,
            vec!["score", "name", "objectid"]
        );
        assert!(query.select(["ok", "not ok"]).is_err());
        assert_eq!(query.descriptor().selected_keys.len(), 3);
    }

    #[test]
    fn constraints_keep_order() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        query
            .where_key("Score", CompareOp::GreaterThan, 10)
            .unwrap()
            .where_text("name", TextOp::HasPrefix, "al")
            .unwrap();

        let constraints = &query.descriptor().constraints;
        assert_eq!(constraints.len(), 2);
        assert_eq!(constraints[0].key, "score");
        assert_eq!(
            constraints[0].predicate,
            Predicate::Compare {
                op: CompareOp::GreaterThan,
                value: Value::Int32(10)
            }
        );
        assert_eq!(constraints[1].key, "name");
    }

    #[test]
    fn invalid_operands() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        assert!(query.where_key("x", CompareOp::Equal, f64::NAN).is_err());
        assert!(query.where_key("x", CompareOp::LessThan, Value::Null).is_err());
        assert!(query.where_key("x", CompareOp::Equal, Value::Null).is_ok());
        let base = GeoPoint::new(0.0, 0.0).unwrap();
        assert!(query.where_near("loc", base, -1.0).is_err());
        assert!(query.where_near("loc", base, f64::INFINITY).is_err());
        assert_eq!(query.condition_count(), 1);
    }

    #[test]
    fn sort_chain_is_capped() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        for key in ["a", "b", "c", "d"] {
            query.order_by_ascending(key).unwrap();
        }
        query
            .order_by_distance(GeoPoint::new(1.0, 1.0).unwrap(), "loc")
            .unwrap();

        let err = query.order_by_descending("f").unwrap_err();
        assert_eq!(err, CoreError::SortLimitExceeded { max: MAX_SORT_KEYS });
        assert_eq!(query.descriptor().sort_keys.len(), MAX_SORT_KEYS);
        assert_eq!(query.descriptor().sort_keys[4].key(), "loc");
    }

    #[test]
    fn or_alternatives() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        let mut low = QueryBuilder::for_class("game").unwrap();
        low.where_key("score", CompareOp::LessThan, 5).unwrap();
        let mut high = QueryBuilder::for_class("game").unwrap();
        high.where_key("score", CompareOp::GreaterThan, 20).unwrap();

        query.or_where(&low).unwrap().or_where(&high).unwrap();
        assert_eq!(query.subquery_count(), 2);
        assert_eq!(query.condition_count(), 0);

        let other = QueryBuilder::for_class("player").unwrap();
        assert!(query.or_where(&other).is_err());
        assert_eq!(query.subquery_count(), 2);
    }

    #[test]
    fn or_alternative_holds_constraints_only() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        let mut low = QueryBuilder::for_class("game").unwrap();
        low.where_key("score", CompareOp::LessThan, 5).unwrap();

        let mut nested = low.clone();
        nested.or_where(&low).unwrap();
        let mut sorted = low.clone();
        sorted.order_by_ascending("score").unwrap();
        let mut projected = low.clone();
        projected.select(["score"]).unwrap();

        for alternative in [&nested, &sorted, &projected] {
            let err = query.or_where(alternative).unwrap_err();
            assert!(matches!(err, CoreError::InvalidOperation { .. }));
        }
        assert_eq!(query.subquery_count(), 0);
    }

    #[test]
    fn reset_keeps_class() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        query.where_key("a", CompareOp::Equal, 1).unwrap();
        query.order_by_ascending("a").unwrap();
        query.set_limit(3).set_skip(2);

        query.reset();
        assert_eq!(query, QueryBuilder::for_class("game").unwrap());
    }

    #[test]
    fn display_delegates_to_descriptor() {
        let mut query = QueryBuilder::for_class("game").unwrap();
        query.where_key("score", CompareOp::GreaterThan, 10).unwrap();
        query.order_by_descending("score").unwrap();
        query.set_limit(2);
        assert_eq!(
            query.to_string(),
            "SELECT * FROM game WHERE score > 10 ORDER BY score DESC LIMIT 2 OFFSET 0"
        );
    }
}
