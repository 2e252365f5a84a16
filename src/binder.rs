//! Argument binder (component C).
//!
//! Given an external method name's candidate entries and a decoded
//! `params` value, selects the first candidate whose declared parameters
//! all accept the supplied values. Ordering of candidates is whatever
//! [`crate::registry::MethodRegistry`] stored them in (registration
//! order), which is deterministic within one peer instance.

use serde_json::{Map, Value};

use crate::registry::MethodEntry;
use crate::protocol::Params;
use crate::serializer::Serializer;

/// Try every candidate in order; return the first that binds, along with
/// the fully positional argument list the handler should be invoked with.
/// Each value is passed through `serializer.from_wire` before a
/// candidate's parameter type is asked whether it accepts it, so a
/// registered converter is load-bearing for overload disambiguation, not
/// just for the chosen candidate's args afterward.
pub fn bind<'a>(
    candidates: &'a [MethodEntry],
    params: &Params,
    serializer: &Serializer,
) -> Option<(&'a MethodEntry, Vec<Value>)> {
    candidates
        .iter()
        .find_map(|entry| try_bind(entry, params, serializer).map(|args| (entry, args)))
}

fn try_bind(entry: &MethodEntry, params: &Params, serializer: &Serializer) -> Option<Vec<Value>> {
    match params {
        Params::Array(items) => bind_positional(entry, items, serializer),
        Params::Object(map) => bind_named(entry, map, serializer),
        // Absent/null params are reachable as a single `null` positional
        // argument; a zero-arity candidate naturally rejects a
        // one-element positional list.
        Params::None => bind_positional(entry, std::slice::from_ref(&Value::Null), serializer),
    }
}

fn bind_positional(entry: &MethodEntry, items: &[Value], serializer: &Serializer) -> Option<Vec<Value>> {
    if items.len() < entry.min_arity() || items.len() > entry.max_arity() {
        return None;
    }

    let mut args = Vec::with_capacity(entry.params.len());
    for (index, param) in entry.params.iter().enumerate() {
        let value = items.get(index).cloned().unwrap_or(Value::Null);
        let value = serializer.from_wire(value);
        if !param_accepts(param, &value) {
            return None;
        }
        args.push(value);
    }
    Some(args)
}

fn bind_named(entry: &MethodEntry, map: &Map<String, Value>, serializer: &Serializer) -> Option<Vec<Value>> {
    let mut args = Vec::with_capacity(entry.params.len());
    for param in &entry.params {
        match map.get(param.name) {
            Some(value) => {
                let value = serializer.from_wire(value.clone());
                if !param_accepts(param, &value) {
                    return None;
                }
                args.push(value);
            }
            None => {
                if !param.has_default {
                    return None;
                }
                args.push(Value::Null);
            }
        }
    }
    Some(args)
}

fn param_accepts(param: &crate::registry::ParamSpec, value: &Value) -> bool {
    param.accepts(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParamSpec, RegistryBuilder};

    fn echo_registry() -> crate::registry::MethodRegistry {
        RegistryBuilder::new()
            .method(
                "MethodThatAcceptsAndReturnsNull",
                vec![ParamSpec::required::<Value>("value")],
                false,
                |args, _token| {
                    let value = args.into_iter().next().unwrap_or(Value::Null);
                    async move { Ok(value) }
                },
            )
            .method(
                "MethodThatAcceptsNothingAndReturnsNull",
                vec![],
                false,
                |_args, _token| async { Ok(Value::Null) },
            )
            .build()
    }

    #[test]
    fn null_params_binds_as_single_null_argument() {
        let registry = echo_registry();
        let serializer = Serializer::new();
        let candidates = registry
            .candidates("MethodThatAcceptsAndReturnsNull")
            .unwrap();
        let (_, args) = bind(candidates, &Params::None, &serializer).unwrap();
        assert_eq!(args, vec![Value::Null]);
    }

    #[test]
    fn null_params_rejects_zero_arity_candidate() {
        let registry = echo_registry();
        let serializer = Serializer::new();
        let candidates = registry
            .candidates("MethodThatAcceptsNothingAndReturnsNull")
            .unwrap();
        assert!(bind(candidates, &Params::None, &serializer).is_none());
    }

    #[test]
    fn named_params_require_defaults_for_missing_keys() {
        let registry = RegistryBuilder::new()
            .method(
                "Greet",
                vec![
                    ParamSpec::required::<String>("name"),
                    ParamSpec::optional::<Option<String>>("greeting"),
                ],
                false,
                |_args, _token| async { Ok(Value::from("ok")) },
            )
            .build();
        let serializer = Serializer::new();
        let candidates = registry.candidates("Greet").unwrap();

        let mut map = Map::new();
        map.insert("name".into(), Value::from("Ada"));
        let (_, args) = bind(candidates, &Params::Object(map), &serializer).unwrap();
        assert_eq!(args, vec![Value::from("Ada"), Value::Null]);

        let empty = Map::new();
        assert!(bind(candidates, &Params::Object(empty), &serializer).is_none());
    }
}
