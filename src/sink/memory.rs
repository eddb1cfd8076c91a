use super::{validate_key, AggregateSink, SinkError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Keeps aggregates in memory as JSON values.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: BTreeMap<String, serde_json::Value>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AggregateSink for MemorySink {
    fn accept<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), SinkError> {
        validate_key(key)?;
        self.entries
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.accept("b", &vec![1, 2]).unwrap();
        sink.accept("a", "text").unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(sink.get("b").unwrap(), &serde_json::json!([1, 2]));
        assert!(sink.accept("", &0).is_err());
    }
}
