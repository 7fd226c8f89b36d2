//! # Properties
//!
//! String-keyed property bag carried by frames and filter instances.
//! Values are loosely typed: integer reads of a string value parse it, and
//! missing keys read as zero, the way host media frameworks behave.

use std::collections::HashMap;

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
    /// Opaque payload (image buffers and similar)
    Data(Bytes),
}

#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Integer value of `key`; 0 when missing or not numeric.
    pub fn get_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(Value::Int(v)) => *v,
            Some(Value::Double(v)) => *v as i64,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Integer value of `key`, or `default` when the key is absent.
    pub fn get_int_or(&self, key: &str, default: i64) -> i64 {
        if self.contains(key) {
            self.get_int(key)
        } else {
            default
        }
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), Value::Int(value));
    }

    pub fn get_double(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(Value::Int(v)) => *v as f64,
            Some(Value::Double(v)) => *v,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), Value::Double(value));
    }

    /// String value of `key`. Numeric values are not stringified.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), Value::String(value.into()));
    }

    pub fn get_data(&self, key: &str) -> Option<&Bytes> {
        match self.values.get(key) {
            Some(Value::Data(data)) => Some(data),
            _ => None,
        }
    }

    pub fn set_data(&mut self, key: impl Into<String>, data: Bytes) {
        self.values.insert(key.into(), Value::Data(data));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Move the value under `from` to `to`, replacing whatever `to` held.
    /// Returns false when `from` does not exist.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.values.remove(from) {
            Some(value) => {
                self.values.insert(to.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_textual_ints() {
        let mut props = Properties::new();
        assert_eq!(props.get_int("width"), 0);
        props.set("width", " 720 ");
        assert_eq!(props.get_int("width"), 720);
        props.set("height", "tall");
        assert_eq!(props.get_int("height"), 0);
        assert_eq!(props.get_int_or("missing", 7), 7);
        props.set_int("present", 0);
        assert_eq!(props.get_int_or("present", 7), 0);
    }

    #[test]
    fn rename_moves_value() {
        let mut props = Properties::new();
        props.set_data("image", Bytes::from_static(b"abc"));
        assert!(props.rename("image", "original.image"));
        assert!(!props.contains("image"));
        assert_eq!(props.get_data("original.image").unwrap().as_ref(), b"abc");
        assert!(!props.rename("image", "elsewhere"));
    }
}
