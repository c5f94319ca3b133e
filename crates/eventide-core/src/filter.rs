//! Data filters, read options, and stream definitions.
//!
//! A [`DataFilter`] constrains top-level fields of an event's (or a
//! projection's) `data` payload. Every field is compared as text against the
//! stringified scalar, so `42` and `"42"` match the same rows. A field given a
//! list of candidates matches if any candidate matches; distinct fields are
//! combined with AND.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::Value;

use crate::event::{EventId, StoredEvent};

/// Constraint on a single `data` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// The field's text must equal this value.
    Equals(String),
    /// The field's text must equal one of these values.
    AnyOf(Vec<String>),
}

impl FilterValue {
    /// Returns `true` if `text` satisfies the constraint.
    #[must_use]
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            Self::Equals(expected) => expected == text,
            Self::AnyOf(candidates) => candidates.iter().any(|c| c == text),
        }
    }
}

/// Equality/membership constraints over top-level `data` fields.
///
/// Fields whose value is absent are simply not constrained; an empty
/// candidate list is treated the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFilter {
    fields: BTreeMap<String, FilterValue>,
}

impl DataFilter {
    /// Creates an empty filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value`.
    #[must_use]
    pub fn equals(mut self, field: impl Into<String>, value: impl Display) -> Self {
        self.fields
            .insert(field.into(), FilterValue::Equals(value.to_string()));
        self
    }

    /// Requires `field` to equal `value` when one is given.
    #[must_use]
    pub fn equals_opt<V: Display>(self, field: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.equals(field, value),
            None => self,
        }
    }

    /// Requires `field` to equal any of `values`. An empty list leaves the
    /// field unconstrained.
    #[must_use]
    pub fn any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if !values.is_empty() {
            self.fields.insert(field.into(), FilterValue::AnyOf(values));
        }
        self
    }

    /// Returns `true` if no field is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates constrained fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Evaluates the filter against a payload the way the relational store
    /// does.
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        self.fields.iter().all(|(field, constraint)| {
            field_text(data, field).is_some_and(|text| constraint.accepts(&text))
        })
    }
}

/// Text form of a top-level payload field, mirroring the `->>` operator:
/// strings unquoted, other scalars in their JSON spelling, `null` and missing
/// fields absent.
#[must_use]
pub fn field_text(data: &Value, field: &str) -> Option<String> {
    match data.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    }
}

/// Cursor and payload filter for a stream read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Only events with an id strictly greater than this are returned.
    pub after: Option<EventId>,
    /// Payload constraints.
    pub data: DataFilter,
}

impl ReadOptions {
    /// Options with a payload filter and no cursor.
    #[must_use]
    pub fn with_data(data: DataFilter) -> Self {
        Self { after: None, data }
    }

    /// Sets the exclusive lower id bound.
    #[must_use]
    pub fn after(mut self, after: Option<EventId>) -> Self {
        self.after = after;
        self
    }

    /// Returns `true` if `event` lies after the cursor and satisfies the filter.
    #[must_use]
    pub fn admits(&self, event: &StoredEvent) -> bool {
        self.after.as_ref().is_none_or(|after| event.id > *after) && self.data.matches(&event.data)
    }
}

/// A logical stream: a set of event types plus an identifier filter.
///
/// Used for multi-stream reads and for conflict checks; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDefinition {
    /// Event types belonging to the stream.
    pub types: Vec<String>,
    /// Payload constraints selecting the stream's entity.
    pub identifier: DataFilter,
    /// Stream-local read cursor, combined with any shared cursor of a
    /// multi-stream read. Conflict checks ignore it.
    pub after: Option<EventId>,
}

impl StreamDefinition {
    /// Creates a stream definition.
    #[must_use]
    pub fn new<I, T>(types: I, identifier: DataFilter) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            identifier,
            after: None,
        }
    }

    /// Sets the stream-local exclusive lower id bound.
    #[must_use]
    pub fn after(mut self, after: Option<EventId>) -> Self {
        self.after = after;
        self
    }

    /// Read options for this stream under an optional shared cursor. The
    /// stricter of the two bounds wins.
    #[must_use]
    pub fn read_options(&self, shared: Option<&EventId>) -> ReadOptions {
        let after = match (self.after.as_ref(), shared) {
            (Some(own), Some(shared)) => Some(own.max(shared).clone()),
            (own, shared) => own.or(shared).cloned(),
        };
        ReadOptions {
            after,
            data: self.identifier.clone(),
        }
    }

    /// Borrowed view of the type set, as expected by
    /// [`EventRepository::read_stream`](crate::repository::EventRepository::read_stream).
    #[must_use]
    pub fn type_refs(&self) -> Vec<&str> {
        self.types.iter().map(String::as_str).collect()
    }

    /// Returns `true` if `event` belongs to this stream, ignoring any cursor.
    #[must_use]
    pub fn contains(&self, event: &StoredEvent) -> bool {
        self.types.iter().any(|t| *t == event.event_type) && self.identifier.matches(&event.data)
    }
}
