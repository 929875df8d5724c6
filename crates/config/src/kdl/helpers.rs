//! Helpers for reading values out of KDL nodes.

use anyhow::{anyhow, Result};
use kdl::{KdlNode, KdlValue};

/// Child nodes of `node` named `name`.
pub fn children_named<'a>(node: &'a KdlNode, name: &'a str) -> impl Iterator<Item = &'a KdlNode> {
    node.children()
        .into_iter()
        .flat_map(|doc| doc.nodes())
        .filter(move |child| child.name().value() == name)
}

/// The single child named `name`, erroring if it appears more than once.
pub fn single_child<'a>(node: &'a KdlNode, name: &str, context: &str) -> Result<Option<&'a KdlNode>> {
    let mut found = None;
    for child in node.children().into_iter().flat_map(|doc| doc.nodes()) {
        if child.name().value() != name {
            continue;
        }
        if found.is_some() {
            return Err(anyhow!(
                "More than one '{}' block found in {}, only one is allowed",
                name,
                context
            ));
        }
        found = Some(child);
    }
    Ok(found)
}

/// Error on any child whose name is not in `allowed`.
pub fn ensure_known_children(node: &KdlNode, allowed: &[&str], context: &str) -> Result<()> {
    for child in node.children().into_iter().flat_map(|doc| doc.nodes()) {
        let name = child.name().value();
        if !allowed.contains(&name) {
            return Err(anyhow!(
                "Unknown key '{}' in {}. Valid keys: {}",
                name,
                context,
                allowed.join(", ")
            ));
        }
    }
    Ok(())
}

/// First positional argument of a node.
pub fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// First positional argument of a node, as a string.
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    first_arg(node)
        .and_then(|value| value.as_string())
        .map(|s| s.to_string())
}

fn entry_value<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
        .and_then(first_arg)
}

/// String value of the child node `name { name "value" }`.
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    entry_value(node, name)
        .and_then(|value| value.as_string())
        .map(|s| s.to_string())
}

/// Integer value of a child node.
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i128> {
    entry_value(node, name).and_then(|value| value.as_integer())
}

/// Boolean value of a child node.
pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    entry_value(node, name).and_then(|value| value.as_bool())
}

/// Non-negative integer value of a child node that must fit in `T`.
pub fn get_uint_entry<T>(node: &KdlNode, name: &str) -> Result<Option<T>>
where
    T: TryFrom<i128>,
{
    match entry_value(node, name) {
        None => Ok(None),
        Some(value) => {
            let int = value
                .as_integer()
                .ok_or_else(|| anyhow!("'{}' must be an integer, got {}", name, value))?;
            T::try_from(int)
                .map(Some)
                .map_err(|_| anyhow!("'{}' is out of range: {}", name, int))
        }
    }
}

/// Convert a KDL value into JSON.
pub fn kdl_value_to_json(value: &KdlValue) -> serde_json::Value {
    match value {
        KdlValue::String(s) => serde_json::Value::String(s.clone()),
        KdlValue::Integer(i) => match i64::try_from(*i) {
            Ok(i) => serde_json::Value::from(i),
            Err(_) => serde_json::Value::String(i.to_string()),
        },
        KdlValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        KdlValue::Bool(b) => serde_json::Value::Bool(*b),
        KdlValue::Null => serde_json::Value::Null,
    }
}

/// Convert the children of a KDL node into a JSON object.
///
/// A child with a single argument becomes a scalar, several arguments become
/// an array, properties and nested children become an object.
pub fn node_children_to_json(node: &KdlNode) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for child in node.children().into_iter().flat_map(|doc| doc.nodes()) {
        map.insert(child.name().value().to_string(), node_to_json(child));
    }
    map
}

fn node_to_json(node: &KdlNode) -> serde_json::Value {
    let mut args = Vec::new();
    let mut props = serde_json::Map::new();
    for entry in node.entries() {
        match entry.name() {
            Some(name) => {
                props.insert(name.value().to_string(), kdl_value_to_json(entry.value()));
            }
            None => args.push(kdl_value_to_json(entry.value())),
        }
    }

    if node.children().is_some() {
        props.extend(node_children_to_json(node));
    }

    if props.is_empty() {
        match args.len() {
            0 => serde_json::Value::Bool(true),
            1 => args.remove(0),
            _ => serde_json::Value::Array(args),
        }
    } else {
        if !args.is_empty() {
            props.insert("args".to_string(), serde_json::Value::Array(args));
        }
        serde_json::Value::Object(props)
    }
}
