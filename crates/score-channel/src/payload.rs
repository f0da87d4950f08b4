use serde_json::Value;
use tracing::debug;

use crate::metrics;

/// Inbound payload after the decode step.
///
/// Text that parses as JSON is handed to the consumer as a structured value;
/// anything else passes through verbatim. A payload is never dropped and a
/// failed parse is not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Payload::Json(value),
            Err(_) => {
                debug!(target: "score-channel", "payload is not JSON, forwarding raw text");
                metrics::record_decode_fallback();
                Payload::Text(text.to_string())
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_objects() {
        let payload = Payload::decode(r#"{"credibility": 73}"#);
        assert_eq!(payload, Payload::Json(json!({ "credibility": 73 })));
    }

    #[test]
    fn decodes_bare_json_scalars() {
        assert_eq!(Payload::decode("73"), Payload::Json(json!(73)));
        assert_eq!(Payload::decode(r#""hi""#), Payload::Json(json!("hi")));
    }

    #[test]
    fn falls_back_to_raw_text() {
        let payload = Payload::decode("not json at all");
        assert_eq!(payload, Payload::Text("not json at all".to_string()));
    }

    #[test]
    fn never_drops_empty_input() {
        assert_eq!(Payload::decode(""), Payload::Text(String::new()));
    }
}
