//! # Records
//!
//! A row as it crosses the store boundary: a JSON object of column → scalar.
//! Typed records from kasa-core go in with [`Record::encode`] and come out
//! with [`Record::decode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// One row of column → value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(StoreError::Decode(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    /// Serializes a typed record.
    pub fn encode<T: Serialize>(value: &T) -> StoreResult<Self> {
        Record::from_value(serde_json::to_value(value)?)
    }

    /// Deserializes into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn into_decoded<T: DeserializeOwned>(self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }

    /// Builder-style insert of one column.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.0.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Overwrites columns with the values from `patch`.
    pub fn merge(&mut self, patch: &Record) {
        for (column, value) in patch.iter() {
            self.0.insert(column.to_string(), value.clone());
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
