use serde_json::{Map, Value};
use tracing::debug;

use rusty_wallet_core::{
    Frame, MessageEvent, NotificationFrame, RequestFrame, ResponseFrame, RpcErrorObject,
    WireMessage,
};

use crate::config::{RuntimeKind, WalletBridgeConfig};

pub fn encode(frame: &Frame) -> WireMessage {
    match frame {
        Frame::Request(f) => WireMessage {
            kind: f.channel.clone(),
            href: f.href.clone(),
            iframe_identifiers: f.iframe_identifiers.clone(),
            detail: serde_json::json!({
                "id": f.id,
                "method": f.method,
                "params": f.params,
            }),
        },
        Frame::Response(f) => {
            let mut detail = Map::new();
            detail.insert("id".to_owned(), Value::from(f.id));
            match &f.outcome {
                Ok(result) => {
                    detail.insert("result".to_owned(), result.clone());
                }
                Err(err) => {
                    let err = serde_json::to_value(err).unwrap_or_else(|_| {
                        serde_json::json!({"code": err.code, "message": err.message})
                    });
                    detail.insert("error".to_owned(), err);
                }
            }
            WireMessage {
                kind: f.channel.clone(),
                href: None,
                iframe_identifiers: Vec::new(),
                detail: Value::Object(detail),
            }
        }
        Frame::Notification(f) => WireMessage {
            kind: f.channel.clone(),
            href: None,
            iframe_identifiers: Vec::new(),
            detail: serde_json::json!({
                "name": f.name,
                "data": f.data,
            }),
        },
    }
}

/// Interprets a wire message. Returns `None` for anything malformed.
pub fn decode(message: &WireMessage) -> Option<Frame> {
    let detail = message.detail.as_object()?;
    let channel = message.kind.clone();

    if let Some(method) = detail.get("method") {
        let method = method.as_str()?.to_owned();
        let id = detail.get("id")?.as_u64()?;
        return Some(Frame::Request(RequestFrame {
            channel,
            id,
            method,
            params: detail.get("params").cloned().unwrap_or(Value::Null),
            href: message.href.clone(),
            iframe_identifiers: message.iframe_identifiers.clone(),
        }));
    }

    if let Some(name) = detail.get("name") {
        return Some(Frame::Notification(NotificationFrame {
            channel,
            name: name.as_str()?.to_owned(),
            data: detail.get("data").cloned().unwrap_or(Value::Null),
        }));
    }

    let id = detail.get("id")?.as_u64()?;
    let outcome = match (detail.get("result"), detail.get("error")) {
        (Some(result), None) => Ok(result.clone()),
        (None, Some(error)) => Err(serde_json::from_value::<RpcErrorObject>(error.clone()).ok()?),
        _ => return None,
    };
    Some(Frame::Response(ResponseFrame {
        channel,
        id,
        outcome,
    }))
}

/// Decodes the raw `data` of a message event. Unrelated page traffic is
/// common, so failures are only logged at debug level.
pub fn decode_value(data: &Value) -> Option<Frame> {
    let message = match serde_json::from_value::<WireMessage>(data.clone()) {
        Ok(m) => m,
        Err(e) => {
            debug!("ignoring non-envelope message: {e}");
            return None;
        }
    };
    decode(&message)
}

pub fn encode_value(frame: &Frame) -> Value {
    serde_json::to_value(encode(frame)).unwrap_or(Value::Null)
}

/// Accepts only messages posted by the current page (same-window relay) or
/// delivered by a mobile WebView bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginGuard {
    page_origin: String,
    runtime: RuntimeKind,
}

impl OriginGuard {
    pub fn new(page_origin: impl Into<String>, runtime: RuntimeKind) -> Self {
        Self {
            page_origin: page_origin.into(),
            runtime,
        }
    }

    pub fn from_config(config: &WalletBridgeConfig) -> Self {
        Self::new(config.page_origin.clone(), config.runtime)
    }

    pub fn page_origin(&self) -> &str {
        &self.page_origin
    }

    pub fn is_valid_origin(&self, event: &MessageEvent) -> bool {
        match self.runtime {
            RuntimeKind::MobileWebView => event.origin.is_empty() || event.origin == self.page_origin,
            RuntimeKind::Browser => event.origin == self.page_origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_both_result_and_error_is_rejected() {
        let msg = WireMessage {
            kind: "c".to_owned(),
            href: None,
            iframe_identifiers: vec![],
            detail: serde_json::json!({"id": 1, "result": 1, "error": {"code": 1, "message": "x"}}),
        };
        assert!(decode(&msg).is_none());
    }

    #[test]
    fn null_result_is_a_result() {
        let msg = WireMessage {
            kind: "c".to_owned(),
            href: None,
            iframe_identifiers: vec![],
            detail: serde_json::json!({"id": 4, "result": null}),
        };
        match decode(&msg) {
            Some(Frame::Response(f)) => assert_eq!(f.outcome, Ok(Value::Null)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
