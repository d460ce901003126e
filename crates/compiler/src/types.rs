//! The closed set of type constructors, union normalization, and assignability (§3, §4.4).

use std::fmt;

/// A recursive type value. `List` has arity 1, `Dict` arity 2, `Union` arity ≥ 2 after
/// normalization (a one-element union collapses to its element, so a bare `Union` never
/// survives with fewer than two arguments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Any,
    Task,
    List(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    Union(Vec<Type>),
}

impl Type {
    /// Build a normalized union from a set of candidate variants (§3 invariants):
    /// flattened (no nested `Union`), deduplicated preserving first-seen order, `Any` absorbs
    /// everything else, and a single remaining variant collapses to that variant. An empty
    /// input collapses to `Void`.
    pub fn union(variants: impl IntoIterator<Item = Type>) -> Type {
        let mut flat = Vec::new();
        for v in variants {
            match v {
                Type::Union(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.iter().any(|t| matches!(t, Type::Any)) {
            return Type::Any;
        }
        let mut deduped: Vec<Type> = Vec::new();
        for t in flat {
            if !deduped.contains(&t) {
                deduped.push(t);
            }
        }
        match deduped.len() {
            0 => Type::Void,
            1 => deduped.into_iter().next().unwrap(),
            _ => Type::Union(deduped),
        }
    }

    /// The variants a type decomposes into: a `Union`'s elements, or the singleton `[self]`.
    pub fn variants(&self) -> Vec<&Type> {
        match self {
            Type::Union(ts) => ts.iter().collect(),
            other => vec![other],
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

/// `expected` accepts `actual` iff for each variant `a` in `actual`, some variant `e` in
/// `expected` satisfies: either is `Any`, or their heads match (recursing pairwise into
/// `List`/`Dict` arguments).
pub fn is_assignable(expected: &Type, actual: &Type) -> bool {
    actual
        .variants()
        .into_iter()
        .all(|a| expected.variants().into_iter().any(|e| head_assignable(e, a)))
}

fn head_assignable(expected: &Type, actual: &Type) -> bool {
    match (expected, actual) {
        (Type::Any, _) | (_, Type::Any) => true,
        (Type::List(e), Type::List(a)) => is_assignable(e, a),
        (Type::Dict(ek, ev), Type::Dict(ak, av)) => is_assignable(ek, ak) && is_assignable(ev, av),
        (e, a) => e == a,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Цел"),
            Type::Float => write!(f, "Дроб"),
            Type::Bool => write!(f, "Лог"),
            Type::String => write!(f, "Строка"),
            Type::Void => write!(f, "Пусто"),
            Type::Any => write!(f, "Любой"),
            Type::Task => write!(f, "Задача"),
            Type::List(t) => write!(f, "Список[{t}]"),
            Type::Dict(k, v) => write!(f, "Словарь[{k}, {v}]"),
            Type::Union(ts) => {
                let rendered: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", rendered.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_nested_unions() {
        let t = Type::union([Type::Union(vec![Type::Int, Type::Bool]), Type::String]);
        assert_eq!(t, Type::Union(vec![Type::Int, Type::Bool, Type::String]));
    }

    #[test]
    fn union_dedupes_preserving_first_seen_order() {
        let t = Type::union([Type::Int, Type::String, Type::Int]);
        assert_eq!(t, Type::Union(vec![Type::Int, Type::String]));
    }

    #[test]
    fn union_with_any_collapses_to_any() {
        let t = Type::union([Type::Int, Type::Any, Type::String]);
        assert_eq!(t, Type::Any);
    }

    #[test]
    fn union_of_one_collapses_to_element() {
        let t = Type::union([Type::Int]);
        assert_eq!(t, Type::Int);
    }

    #[test]
    fn empty_union_collapses_to_void() {
        let t = Type::union(Vec::new());
        assert_eq!(t, Type::Void);
    }

    #[test]
    fn assignability_reflexive_and_any_absorbs() {
        assert!(is_assignable(&Type::Int, &Type::Int));
        assert!(is_assignable(&Type::Any, &Type::Int));
        assert!(is_assignable(&Type::Int, &Type::Any));
    }

    #[test]
    fn assignability_checks_list_args_structurally() {
        assert!(is_assignable(&Type::List(Box::new(Type::Any)), &Type::List(Box::new(Type::Int))));
        assert!(!is_assignable(&Type::List(Box::new(Type::Int)), &Type::List(Box::new(Type::String))));
    }

    #[test]
    fn assignability_over_union_requires_every_actual_variant_covered() {
        let actual = Type::union([Type::Int, Type::String]);
        let expected = Type::union([Type::Int, Type::String, Type::Bool]);
        assert!(is_assignable(&expected, &actual));
        assert!(!is_assignable(&Type::Int, &actual));
    }
}
