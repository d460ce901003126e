//! The closed set of runtime values (§3 "Runtime value").
//!
//! `null`, `bool`, `i64`, `f64`, `String`, ordered list, ordered map keyed by values, and an
//! opaque task handle. Integer and float never implicitly convert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A task handle, as observed from the value side. The scheduling machinery that fulfills it
/// lives in `yasny-runtime`; this crate only needs the id so `Value` can carry it around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

/// The hashable subset of `Value` usable as a dict key. Lists, dicts and tasks are not
/// hashable; floats are excluded because NaN has no stable hash and `==` is not reflexive for
/// it (mirrors the teacher runtime's `MapKey`, which makes the same exclusion).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
    Int(i64),
    Bool(bool),
    String(String),
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Bool(b) => write!(f, "{}", if *b { "истина" } else { "ложь" }),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

/// An insertion-ordered map. Lookup is a plain `HashMap` over the index into `entries`, so
/// iteration order (for `print`/`to_string`) matches insertion order regardless of hashing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(MapKey, Value)>", into = "Vec<(MapKey, Value)>")]
pub struct OrderedDict {
    entries: Vec<(MapKey, Value)>,
    index: HashMap<MapKey, usize>,
}

impl From<Vec<(MapKey, Value)>> for OrderedDict {
    fn from(entries: Vec<(MapKey, Value)>) -> Self {
        let mut dict = OrderedDict::new();
        for (k, v) in entries {
            dict.insert(k, v);
        }
        dict
    }
}

impl From<OrderedDict> for Vec<(MapKey, Value)> {
    fn from(dict: OrderedDict) -> Self {
        dict.entries
    }
}

impl OrderedDict {
    pub fn new() -> Self {
        OrderedDict::default()
    }

    pub fn insert(&mut self, key: MapKey, value: Value) {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MapKey, Value)> {
        self.entries.iter()
    }
}

/// The closed set of runtime values the VM operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(OrderedDict),
    Task(TaskId),
}

impl Value {
    /// Language-specific rendering used by both `print` and `to_string` (§6).
    pub fn format(&self) -> String {
        match self {
            Value::Null => "пусто".to_string(),
            Value::Bool(true) => "истина".to_string(),
            Value::Bool(false) => "ложь".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::format_nested).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Dict(dict) => {
                let rendered: Vec<String> = dict
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.format_nested()))
                    .collect();
                format!("{{ {} }}", rendered.join(", "))
            }
            Value::Task(t) => t.to_string(),
        }
    }

    /// Nested values render the same as top-level ones; strings are not quoted.
    fn format_nested(&self) -> String {
        self.format()
    }

    pub fn as_map_key(&self) -> Option<MapKey> {
        match self {
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Пусто",
            Value::Bool(_) => "Лог",
            Value::Int(_) => "Цел",
            Value::Float(_) => "Дроб",
            Value::String(_) => "Строка",
            Value::List(_) => "Список",
            Value::Dict(_) => "Словарь",
            Value::Task(_) => "Задача",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f.is_nan() {
        return "nan".to_string();
    }
    if f == f.trunc() && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_booleans_and_null_in_russian() {
        assert_eq!(Value::Bool(true).format(), "истина");
        assert_eq!(Value::Bool(false).format(), "ложь");
        assert_eq!(Value::Null.format(), "пусто");
    }

    #[test]
    fn formats_list_with_unquoted_nested_strings() {
        let v = Value::List(vec![Value::Int(1), Value::String("a".into())]);
        assert_eq!(v.format(), "[1, a]");
    }

    #[test]
    fn ordered_dict_preserves_insertion_order() {
        let mut d = OrderedDict::new();
        d.insert(MapKey::String("b".into()), Value::Int(2));
        d.insert(MapKey::String("a".into()), Value::Int(1));
        d.insert(MapKey::String("b".into()), Value::Int(20));
        let rendered: Vec<_> = d.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(rendered, vec!["b", "a"]);
        assert_eq!(d.get(&MapKey::String("b".into())), Some(&Value::Int(20)));
    }

    #[test]
    fn float_formatting_matches_whole_number_convention() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(2.5), "2.5");
    }
}
