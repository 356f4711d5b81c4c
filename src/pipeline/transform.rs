//! Request body transformation.
//!
//! Matching requests whose body is a JSON object get the rule's fields merged
//! in. Anything else (no rule, empty body, non-object or unparsable JSON) is
//! forwarded byte for byte.

use axum::body::Bytes;
use axum::http::Method;
use serde_json::{Map, Value};

use crate::config::TransformConfig;
use crate::routing::RequestPattern;

#[derive(Debug, Clone)]
struct Rule {
    pattern: RequestPattern,
    set: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestTransformer {
    rules: Vec<Rule>,
}

impl RequestTransformer {
    pub fn from_config(config: &TransformConfig) -> Self {
        Self {
            rules: config
                .rules
                .iter()
                .filter_map(|rule| {
                    RequestPattern::new(&rule.method, &rule.path_prefix).map(|pattern| Rule {
                        pattern,
                        set: rule.set.clone(),
                    })
                })
                .collect(),
        }
    }

    pub fn apply(&self, method: &Method, path: &str, body: Bytes) -> Bytes {
        let mut rules = self
            .rules
            .iter()
            .filter(|rule| rule.pattern.matches(method, path))
            .peekable();
        if rules.peek().is_none() {
            return body;
        }

        let mut object = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(object)) => object,
            _ => return body,
        };
        for rule in rules {
            for (key, value) in &rule.set {
                object.insert(key.clone(), value.clone());
            }
        }

        match serde_json::to_vec(&Value::Object(object)) {
            Ok(encoded) => Bytes::from(encoded),
            Err(_) => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transformer() -> RequestTransformer {
        RequestTransformer::from_config(&TransformConfig::default())
    }

    #[test]
    fn test_marks_service_b_posts() {
        let out = transformer().apply(&Method::POST, "/service-b/orders", Bytes::from(r#"{"qty":2}"#));
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value, json!({"qty": 2, "transformed": true}));
    }

    #[test]
    fn test_other_requests_untouched() {
        let t = transformer();
        let body = Bytes::from(r#"{"qty":2}"#);
        assert_eq!(t.apply(&Method::PUT, "/service-b/orders", body.clone()), body);
        assert_eq!(t.apply(&Method::POST, "/service-a/orders", body.clone()), body);
    }

    #[test]
    fn test_non_object_bodies_untouched() {
        let t = transformer();
        for raw in ["", "not json", "[1,2]", "\"text\""] {
            let body = Bytes::from(raw);
            assert_eq!(t.apply(&Method::POST, "/service-b", body.clone()), body);
        }
    }
}
