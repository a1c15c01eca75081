use serde::{Deserialize, Serialize};

/// Request to send a direct message. `message` is plaintext or base64 RSA-OAEP
/// ciphertext depending on the encryption policy in use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub receiver: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query for `GET /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHistoryQuery {
    pub username: String,
    pub partner: String,
}

/// One message as stored by the server. The payload is opaque to the client
/// unless it can decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub sender: String,
    pub receiver: String,
    #[serde(alias = "message")]
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHistoryResponse {
    #[serde(default)]
    pub messages: Vec<ServerMessage>,
}

/// Query for `GET /api/messages/partners`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnersQuery {
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnersResponse {
    #[serde(default)]
    pub partners: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_request_uses_message_field() {
        let req = SendMessageRequest {
            sender: "alice".into(),
            receiver: "bob".into(),
            message: "hello".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["receiver"], "bob");
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn server_message_id_is_optional() {
        let json = r#"{"sender":"a","receiver":"b","content":"x","timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(msg.id.is_none());
        assert_eq!(msg.content, "x");
    }

    #[test]
    fn server_message_accepts_message_alias() {
        let json = r#"{"sender":"a","receiver":"b","message":"y","timestamp":"t","id":"7"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.content, "y");
        assert_eq!(msg.id.as_deref(), Some("7"));
    }

    #[test]
    fn history_response_defaults_to_empty() {
        let resp: MessageHistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.messages.is_empty());
    }

    #[test]
    fn partners_response_deserializes() {
        let resp: PartnersResponse =
            serde_json::from_str(r#"{"partners":["bob","carol"]}"#).unwrap();
        assert_eq!(resp.partners, vec!["bob", "carol"]);
    }
}
