//! JSON diagnostic form of a module.
//!
//! The JSON form parallels the binary layout: a top-level object with
//! `version`, `max_id`, the five entry arrays, aliases, and debug info.
//! Every array field carries a `<name>_len` sibling matching its element
//! count; enums appear as their symbolic names; refs are plain integer ids.
//! The form reads back losslessly, which lets transform passes be tested
//! from JSON fixtures.

use ebmc_core::arena::Entry;
use ebmc_core::id::RefId;
use ebmc_core::module::Module;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{FormatError, Result};

/// Renders a module as the JSON diagnostic form.
pub fn to_json(module: &Module) -> Result<Value> {
    let mut root = Map::new();
    root.insert("version".into(), json!(ebmc_core::FORMAT_VERSION));
    root.insert("max_id".into(), json!(module.max_id()));
    root.insert("identifiers".into(), entries_to_value(module.identifiers.entries())?);
    root.insert("strings".into(), entries_to_value(module.strings.entries())?);
    root.insert("types".into(), entries_to_value(module.types.entries())?);
    root.insert("statements".into(), entries_to_value(module.statements.entries())?);
    root.insert("expressions".into(), entries_to_value(module.expressions.entries())?);
    root.insert("aliases".into(), serde_json::to_value(module.aliases())?);
    root.insert("debug_files".into(), serde_json::to_value(&module.debug_files)?);
    root.insert("debug_locs".into(), serde_json::to_value(&module.debug_locs)?);
    let mut value = Value::Object(root);
    add_len_siblings(&mut value);
    Ok(value)
}

/// Renders a module as pretty-printed JSON text.
pub fn to_json_string(module: &Module) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json(module)?)?)
}

/// Parses the JSON diagnostic form back into a module.
pub fn from_json(value: &Value) -> Result<Module> {
    let root = value
        .as_object()
        .ok_or_else(|| malformed("top level is not an object"))?;
    let mut stripped = Value::Object(root.clone());
    strip_len_siblings(&mut stripped)?;
    let root = stripped.as_object().expect("object preserved");

    let version = root
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing version"))?;
    if version != u64::from(ebmc_core::FORMAT_VERSION) {
        return Err(FormatError::UnsupportedVersion { version: version as u8 });
    }
    let max_id = root
        .get("max_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing max_id"))?;

    let mut module = Module::new();
    module.identifiers = entries_from_value(root.get("identifiers"))?;
    module.strings = entries_from_value(root.get("strings"))?;
    module.types = entries_from_value(root.get("types"))?;
    module.statements = entries_from_value(root.get("statements"))?;
    module.expressions = entries_from_value(root.get("expressions"))?;
    module.set_aliases(field(root, "aliases")?);
    module.debug_files = field(root, "debug_files")?;
    module.debug_locs = field(root, "debug_locs")?;
    module.set_max_id(max_id);
    Ok(module)
}

/// Parses JSON text into a module.
pub fn from_json_str(text: &str) -> Result<Module> {
    from_json(&serde_json::from_str(text)?)
}

fn malformed(reason: &str) -> FormatError {
    FormatError::MalformedJson { reason: reason.into() }
}

fn field<T: DeserializeOwned>(root: &Map<String, Value>, name: &str) -> Result<T> {
    let value = root.get(name).cloned().unwrap_or(Value::Array(vec![]));
    Ok(serde_json::from_value(value)?)
}

fn entries_to_value<R: RefId + Serialize, B: Serialize>(entries: &[Entry<R, B>]) -> Result<Value> {
    Ok(serde_json::to_value(entries)?)
}

fn entries_from_value<R, B>(value: Option<&Value>) -> Result<ebmc_core::Arena<R, B>>
where
    R: RefId + DeserializeOwned,
    B: DeserializeOwned,
{
    let value = value.cloned().unwrap_or(Value::Array(vec![]));
    let entries: Vec<Entry<R, B>> = serde_json::from_value(value)?;
    Ok(ebmc_core::Arena::from_entries(entries))
}

/// Inserts a `<name>_len` sibling next to every array-valued field,
/// recursively.
fn add_len_siblings(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let lens: Vec<(String, usize)> = map
                .iter()
                .filter_map(|(k, v)| v.as_array().map(|a| (format!("{k}_len"), a.len())))
                .collect();
            for (k, len) in lens {
                map.insert(k, json!(len));
            }
            for v in map.values_mut() {
                add_len_siblings(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                add_len_siblings(v);
            }
        }
        _ => {}
    }
}

/// Removes `<name>_len` siblings, validating each against its array.
fn strip_len_siblings(value: &mut Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let len_keys: Vec<String> = map
                .keys()
                .filter(|k| k.ends_with("_len"))
                .cloned()
                .collect();
            for key in len_keys {
                let base = key.trim_end_matches("_len").to_string();
                let declared = map.get(&key).and_then(Value::as_u64);
                let found = map.get(&base).and_then(Value::as_array).map(|a| a.len() as u64);
                if let (Some(declared), Some(found)) = (declared, found) {
                    if declared != found {
                        return Err(FormatError::LengthMismatch {
                            what: base,
                            declared,
                            found,
                        });
                    }
                }
                map.remove(&key);
            }
            for v in map.values_mut() {
                strip_len_siblings(v)?;
            }
        }
        Value::Array(items) => {
            for v in items {
                strip_len_siblings(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebmc_core::expr::{ExprOp, ExpressionBody};
    use ebmc_core::stmt::StatementBody;
    use ebmc_core::types::TypeBody;
    use ebmc_core::StatementRef;

    fn sample_module() -> Module {
        let mut m = Module::new();
        let b = m.add_type(TypeBody::Bool).unwrap();
        let t = m
            .add_expression(ExpressionBody::new(b, ExprOp::LiteralBool { value: true }))
            .unwrap();
        let s = m.add_statement(StatementBody::Expression { expression: t }).unwrap();
        m.statements
            .add_with_id(StatementRef::ENTRY, StatementBody::Block { container: vec![s] })
            .unwrap();
        m
    }

    #[test]
    fn arrays_carry_len_siblings() {
        let json = to_json(&sample_module()).unwrap();
        assert_eq!(json["statements_len"], 2);
        assert_eq!(json["types_len"], 1);
        // nested containers get them too
        let block = json["statements"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["body"]["kind"] == "BLOCK")
            .unwrap();
        assert_eq!(block["body"]["container_len"], 1);
    }

    #[test]
    fn enums_are_symbolic_and_refs_are_integers() {
        let json = to_json(&sample_module()).unwrap();
        let expr = &json["expressions"].as_array().unwrap()[0];
        assert_eq!(expr["body"]["kind"], "LITERAL_BOOL");
        assert!(expr["body"]["type"].is_u64());
    }

    #[test]
    fn json_roundtrip() {
        let module = sample_module();
        let text = to_json_string(&module).unwrap();
        let back = from_json_str(&text).unwrap();
        assert_eq!(module.max_id(), back.max_id());
        assert_eq!(module.statements.entries(), back.statements.entries());
        assert_eq!(module.expressions.entries(), back.expressions.entries());
    }

    #[test]
    fn len_mismatch_is_rejected() {
        let mut json = to_json(&sample_module()).unwrap();
        json["statements_len"] = serde_json::json!(99);
        assert!(matches!(
            from_json(&json),
            Err(FormatError::LengthMismatch { .. })
        ));
    }
}
