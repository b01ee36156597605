use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Blockchain {
    Evm,
    Svm,
    Tvm,
}

impl Blockchain {
    pub const ALL: [Blockchain; 3] = [Blockchain::Evm, Blockchain::Svm, Blockchain::Tvm];

    pub fn as_str(self) -> &'static str {
        match self {
            Blockchain::Evm => "evm",
            Blockchain::Svm => "svm",
            Blockchain::Tvm => "tvm",
        }
    }

    pub fn channels(self) -> ChannelSet {
        match self {
            Blockchain::Evm => ChannelSet {
                request: "rusty-wallet:evm:request",
                response: "rusty-wallet:evm:response",
                notification: "rusty-wallet:evm:notification",
            },
            Blockchain::Svm => ChannelSet {
                request: "rusty-wallet:svm:request",
                response: "rusty-wallet:svm:response",
                notification: "rusty-wallet:svm:notification",
            },
            Blockchain::Tvm => ChannelSet {
                request: "rusty-wallet:tvm:request",
                response: "rusty-wallet:tvm:response",
                notification: "rusty-wallet:tvm:notification",
            },
        }
    }

    /// Resolves the family owning a channel name, if any.
    pub fn for_channel(channel: &str) -> Option<Blockchain> {
        Blockchain::ALL.into_iter().find(|chain| {
            let set = chain.channels();
            set.request == channel || set.response == channel || set.notification == channel
        })
    }
}

/// Request/response/notification channel names of one blockchain family.
/// Families never share a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSet {
    pub request: &'static str,
    pub response: &'static str,
    pub notification: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub channel: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
    pub href: Option<String>,
    pub iframe_identifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub channel: String,
    pub id: u64,
    pub outcome: Result<Value, RpcErrorObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFrame {
    pub channel: String,
    pub name: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
    Notification(NotificationFrame),
}

impl Frame {
    pub fn channel(&self) -> &str {
        match self {
            Frame::Request(f) => &f.channel,
            Frame::Response(f) => &f.channel,
            Frame::Notification(f) => &f.channel,
        }
    }
}

/// Outer shape of everything crossing a context boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iframe_identifiers: Vec<String>,
    pub detail: Value,
}

/// A received cross-context message together with the origin reported by the
/// transport. Mobile WebView bridges report an empty origin.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub origin: String,
    pub data: Value,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}
