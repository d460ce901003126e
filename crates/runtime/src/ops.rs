//! Per-opcode value arithmetic and indexing, grounded on the reference `vm.py` dispatch but
//! typed per [`Value`] variant rather than relying on Python's dynamic `+`/`==`/`[]`. The checker
//! has already ruled out type mismatches for well-typed programs; these functions still return a
//! [`Diagnostic`] rather than panicking, since a bug earlier in the pipeline must degrade to an
//! error here, not abort the process (§10).

use yasny_core::value::{OrderedDict, Value};
use yasny_core::Diagnostic;

fn type_error(op: &str, a: &Value, b: &Value) -> Diagnostic {
    Diagnostic::new(format!(
        "недопустимые операнды для {op}: {} и {}",
        a.type_name(),
        b.type_name()
    ))
}

pub fn add(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (a, b) => Err(type_error("ADD", &a, &b)),
    }
}

pub fn sub(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (a, b) => Err(type_error("SUB", &a, &b)),
    }
}

pub fn mul(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (a, b) => Err(type_error("MUL", &a, &b)),
    }
}

/// Integer division truncates toward zero (matches the optimizer's folding and Rust's native
/// `/`). Division by zero is fatal at runtime rather than folded (§4.5).
pub fn div(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(Diagnostic::new("деление на ноль")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (a, b) => Err(type_error("DIV", &a, &b)),
    }
}

/// Floor modulo (result takes the sign of the divisor), matching the reference's Python `%`.
pub fn rem(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(Diagnostic::new("остаток от деления на ноль")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(floor_mod_i64(a, b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(floor_mod_f64(a, b))),
        (a, b) => Err(type_error("MOD", &a, &b)),
    }
}

fn floor_mod_i64(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn floor_mod_f64(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

pub fn neg(v: Value) -> Result<Value, Diagnostic> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(Diagnostic::new(format!("унарный минус не поддерживается для {}", other.type_name()))),
    }
}

pub fn not(v: Value) -> Result<Value, Diagnostic> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(Diagnostic::new(format!("логическое отрицание ожидает Лог, получено {}", other.type_name()))),
    }
}

pub fn and(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
        (a, b) => Err(type_error("AND", &a, &b)),
    }
}

pub fn or(a: Value, b: Value) -> Result<Value, Diagnostic> {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
        (a, b) => Err(type_error("OR", &a, &b)),
    }
}

pub fn eq(a: &Value, b: &Value) -> Value {
    Value::Bool(a == b)
}

pub fn ne(a: &Value, b: &Value) -> Value {
    Value::Bool(a != b)
}

pub fn lt(a: Value, b: Value) -> Result<Value, Diagnostic> {
    ordered_compare("LT", a, b, |o| o.is_lt())
}

pub fn le(a: Value, b: Value) -> Result<Value, Diagnostic> {
    ordered_compare("LE", a, b, |o| o.is_le())
}

pub fn gt(a: Value, b: Value) -> Result<Value, Diagnostic> {
    ordered_compare("GT", a, b, |o| o.is_gt())
}

pub fn ge(a: Value, b: Value) -> Result<Value, Diagnostic> {
    ordered_compare("GE", a, b, |o| o.is_ge())
}

fn ordered_compare(op: &str, a: Value, b: Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, Diagnostic> {
    let ordering = match (&a, &b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).ok_or_else(|| Diagnostic::new("сравнение с NaN"))?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => return Err(type_error(op, &a, &b)),
    };
    Ok(Value::Bool(accept(ordering)))
}

/// `LEN`: character count for strings (the language's strings carry Cyrillic text, so this
/// counts Unicode scalar values, not bytes), element count for lists/dicts.
pub fn len(v: &Value) -> Result<Value, Diagnostic> {
    match v {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Dict(d) => Ok(Value::Int(d.len() as i64)),
        other => Err(Diagnostic::new(format!("длина не поддерживается для {}", other.type_name()))),
    }
}

/// Normalizes a possibly-negative index against a collection length (Python-style wraparound).
fn normalize_index(idx: i64, length: usize) -> Option<usize> {
    let resolved = if idx < 0 { idx + length as i64 } else { idx };
    if resolved < 0 || resolved as usize >= length {
        None
    } else {
        Some(resolved as usize)
    }
}

pub fn index_get(target: Value, index: Value) -> Result<Value, Diagnostic> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(i, items.len()).ok_or_else(|| Diagnostic::new(format!("индекс {i} вне диапазона списка длиной {}", items.len())))?;
            Ok(items[idx].clone())
        }
        (Value::String(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(i, chars.len()).ok_or_else(|| Diagnostic::new(format!("индекс {i} вне диапазона строки длиной {}", chars.len())))?;
            Ok(Value::String(chars[idx].to_string()))
        }
        (Value::Dict(dict), key) => {
            let map_key = key.as_map_key().ok_or_else(|| Diagnostic::new(format!("недопустимый ключ словаря: {}", key.type_name())))?;
            dict.get(&map_key).cloned().ok_or_else(|| Diagnostic::new(format!("ключ не найден: {map_key}")))
        }
        (target, _) => Err(Diagnostic::new(format!("INDEX_GET не поддерживается для типа {}", target.type_name()))),
    }
}

/// `INDEX_SET` leaves the stored value on the stack (§4.7); the caller is responsible for that.
pub fn index_set(target: &mut Value, index: Value, value: Value) -> Result<(), Diagnostic> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(i, items.len()).ok_or_else(|| Diagnostic::new(format!("индекс {i} вне диапазона списка длиной {}", items.len())))?;
            items[idx] = value;
            Ok(())
        }
        (Value::Dict(dict), key) => {
            let map_key = key.as_map_key().ok_or_else(|| Diagnostic::new(format!("недопустимый ключ словаря: {}", key.type_name())))?;
            dict.insert(map_key, value);
            Ok(())
        }
        (target, _) => Err(Diagnostic::new(format!("INDEX_SET не поддерживается для типа {}", target.type_name()))),
    }
}

pub fn make_dict(pairs: Vec<(Value, Value)>) -> Result<Value, Diagnostic> {
    let mut dict = OrderedDict::new();
    for (key, value) in pairs {
        let map_key = key.as_map_key().ok_or_else(|| Diagnostic::new(format!("недопустимый ключ словаря: {}", key.type_name())))?;
        dict.insert(map_key, value);
    }
    Ok(Value::Dict(dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_division_truncates_toward_zero() {
        assert_eq!(div(Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn division_by_zero_is_an_error_not_a_panic() {
        assert!(div(Value::Int(1), Value::Int(0)).is_err());
    }

    #[test]
    fn mod_takes_the_sign_of_the_divisor() {
        assert_eq!(rem(Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(rem(Value::Int(7), Value::Int(-3)).unwrap(), Value::Int(-2));
    }

    #[test]
    fn string_concatenation_via_add() {
        assert_eq!(add(Value::String("a".into()), Value::String("b".into())).unwrap(), Value::String("ab".into()));
    }

    #[test]
    fn mismatched_operand_types_are_a_diagnostic() {
        assert!(add(Value::Int(1), Value::String("x".into())).is_err());
    }

    #[test]
    fn len_counts_unicode_scalars_not_bytes() {
        assert_eq!(len(&Value::String("привет".into())).unwrap(), Value::Int(6));
    }

    #[test]
    fn negative_index_wraps_python_style() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(index_get(list, Value::Int(-1)).unwrap(), Value::Int(3));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let list = Value::List(vec![Value::Int(1)]);
        assert!(index_get(list, Value::Int(5)).is_err());
    }
}
