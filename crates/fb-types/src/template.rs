//! Typed façade over the engine-config template.
//!
//! The template is an opaque JSON document owned by the admin (`log`, `api`,
//! `dns`, `policy`, ... sections). The master only ever edits three positions:
//! the `inbounds` and `outbounds` arrays and `routing.rules`. Everything else
//! is carried through byte-for-byte-equivalent and re-serialized.

use serde::de::Error as _;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDoc {
    root: Map<String, Value>,
}

impl TemplateDoc {
    /// Parse a stored template. Fails on anything that is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(root) => Ok(Self { root }),
            other => Err(serde_json::Error::custom(format!(
                "engine template must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn inbounds(&mut self) -> &mut Vec<Value> {
        array_at(&mut self.root, "inbounds")
    }

    pub fn outbounds(&mut self) -> &mut Vec<Value> {
        array_at(&mut self.root, "outbounds")
    }

    pub fn routing_rules(&mut self) -> &mut Vec<Value> {
        let routing = self
            .root
            .entry("routing")
            .or_insert_with(|| json!({}));
        if !routing.is_object() {
            *routing = json!({});
        }
        let rules = routing
            .as_object_mut()
            .expect("routing coerced to object above")
            .entry("rules")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !rules.is_array() {
            *rules = Value::Array(Vec::new());
        }
        rules.as_array_mut().expect("rules coerced to array above")
    }

    /// Compact serialization, the form pushed to agents.
    pub fn serialize(&self) -> String {
        Value::Object(self.root.clone()).to_string()
    }

    /// Indented serialization, the form stored back after admin edits.
    pub fn serialize_pretty(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.root.clone()))
            .unwrap_or_else(|_| self.serialize())
    }
}

fn array_at<'a>(root: &'a mut Map<String, Value>, key: &str) -> &'a mut Vec<Value> {
    let slot = root.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut().expect("slot coerced to array above")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{
        "log": {"loglevel": "warning"},
        "api": {"tag": "api", "services": ["StatsService"]},
        "inbounds": [{"tag": "api", "port": 62789}],
        "outbounds": [{"tag": "direct", "protocol": "freedom"}],
        "routing": {"rules": [{"type": "field", "outboundTag": "direct"}]}
    }"#;

    #[test]
    fn edits_preserve_unrelated_sections() {
        let mut doc = TemplateDoc::parse(TEMPLATE).unwrap();
        doc.inbounds().push(json!({"tag": "new", "port": 443}));

        let reparsed: Value = serde_json::from_str(&doc.serialize()).unwrap();
        assert_eq!(reparsed["log"]["loglevel"], "warning");
        assert_eq!(reparsed["api"]["services"][0], "StatsService");
        assert_eq!(reparsed["inbounds"].as_array().unwrap().len(), 2);
        assert_eq!(reparsed["inbounds"][0]["tag"], "api");
        assert_eq!(reparsed["inbounds"][1]["tag"], "new");
    }

    #[test]
    fn missing_arrays_are_materialized() {
        let mut doc = TemplateDoc::parse(r#"{"log": {}}"#).unwrap();
        assert!(doc.inbounds().is_empty());
        doc.routing_rules().push(json!({"type": "field"}));
        let reparsed: Value = serde_json::from_str(&doc.serialize()).unwrap();
        assert_eq!(reparsed["routing"]["rules"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn non_object_template_is_rejected() {
        assert!(TemplateDoc::parse("[1,2]").is_err());
        assert!(TemplateDoc::parse("42").is_err());
    }
}
