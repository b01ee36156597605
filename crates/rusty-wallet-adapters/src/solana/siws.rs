use serde::{Deserialize, Serialize};

/// Sign-In-With-Solana input. Every field is optional on the way in; the
/// façade fills `domain`, `address` and `issued_at` before formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

/// Renders the message text in the fixed SIWS field order.
pub fn format_sign_in_message(domain: &str, address: &str, input: &SignInInput) -> String {
    let mut message = format!("{domain} wants you to sign in with your Solana account:\n{address}");
    if let Some(statement) = &input.statement {
        message.push_str("\n\n");
        message.push_str(statement);
    }

    let mut fields = Vec::new();
    let labelled = [
        ("URI", &input.uri),
        ("Version", &input.version),
        ("Chain ID", &input.chain_id),
        ("Nonce", &input.nonce),
        ("Issued At", &input.issued_at),
        ("Expiration Time", &input.expiration_time),
        ("Not Before", &input.not_before),
        ("Request ID", &input.request_id),
    ];
    for (label, value) in labelled {
        if let Some(value) = value {
            fields.push(format!("{label}: {value}"));
        }
    }
    if !input.resources.is_empty() {
        let mut block = String::from("Resources:");
        for resource in &input.resources {
            block.push_str("\n- ");
            block.push_str(resource);
        }
        fields.push(block);
    }

    if !fields.is_empty() {
        message.push_str("\n\n");
        message.push_str(&fields.join("\n"));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_message_has_only_preamble() {
        let text = format_sign_in_message("example.com", "Addr1", &SignInInput::default());
        assert_eq!(
            text,
            "example.com wants you to sign in with your Solana account:\nAddr1"
        );
    }

    #[test]
    fn fields_follow_fixed_order() {
        let input = SignInInput {
            statement: Some("Welcome".to_owned()),
            nonce: Some("abc123".to_owned()),
            uri: Some("https://example.com".to_owned()),
            resources: vec!["ipfs://a".to_owned(), "https://b".to_owned()],
            ..SignInInput::default()
        };
        let text = format_sign_in_message("example.com", "Addr1", &input);
        assert_eq!(
            text,
            "example.com wants you to sign in with your Solana account:\nAddr1\n\nWelcome\n\n\
             URI: https://example.com\nNonce: abc123\nResources:\n- ipfs://a\n- https://b"
        );
    }
}
