use serde::de::IgnoredAny;

pub const AMQP_JSON_CONTENT_TYPE: &str = "application/json";

/// A consumed message body tagged with the logical kind of the binding it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedMessage {
    pub kind: String,
    pub body: Vec<u8>,
}

impl TaggedMessage {
    pub fn new(kind: &str, body: Vec<u8>) -> TaggedMessage {
        TaggedMessage {
            kind: kind.to_owned(),
            body,
        }
    }
}

/// Compacts JSON bodies by dropping insignificant whitespace; the tokens themselves
/// are copied byte for byte. Anything that does not parse as JSON is returned unchanged.
pub fn normalize(body: Vec<u8>) -> Vec<u8> {
    if serde_json::from_slice::<IgnoredAny>(&body).is_err() {
        return body;
    }

    compact(&body)
}

/// Expects a well-formed JSON document.
fn compact(json: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for &byte in json {
        if in_string {
            out.push(byte);
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b' ' | b'\t' | b'\n' | b'\r' => {}
            b'"' => {
                in_string = true;
                out.push(byte);
            }
            _ => out.push(byte),
        }
    }

    out
}
