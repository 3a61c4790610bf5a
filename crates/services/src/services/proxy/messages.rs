use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How the extension should read the upstream body before echoing it back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ProxyResponseType {
    Json,
    Text,
}

/// Every frame on the proxy socket is one of these JSON envelopes. Control
/// frames (ping/pong) and request/response frames share the channel; the
/// `type` tag disambiguates.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Ping {
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    ProxyHttpRequest {
        request_id: String,
        url: String,
        method: String,
        headers: HashMap<String, String>,
        body: Option<String>,
        response_type: ProxyResponseType,
        include_credentials: bool,
        timeout_ms: u64,
    },
    ProxyHttpResponse {
        request_id: String,
        status_code: u16,
        headers: HashMap<String, String>,
        body: String,
    },
    ProxyHttpError {
        request_id: String,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_snake_case_type_tags() {
        let ping = serde_json::to_value(WireMessage::Ping { timestamp: 1722470400000 }).unwrap();
        assert_eq!(ping["type"], "ping");

        let request = serde_json::to_value(WireMessage::ProxyHttpRequest {
            request_id: "req-1".into(),
            url: "https://www.linkedin.com/voyager/api/graphql".into(),
            method: "GET".into(),
            headers: HashMap::new(),
            body: None,
            response_type: ProxyResponseType::Json,
            include_credentials: true,
            timeout_ms: 60_000,
        })
        .unwrap();
        assert_eq!(request["type"], "proxy_http_request");
        assert_eq!(request["response_type"], "json");
        assert_eq!(request["body"], serde_json::Value::Null);
    }

    #[test]
    fn inbound_response_frames_parse() {
        let frame = r#"{
            "type": "proxy_http_response",
            "request_id": "req-1",
            "status_code": 200,
            "headers": { "content-type": "application/json" },
            "body": "{\"data\":{}}"
        }"#;
        let parsed: WireMessage = serde_json::from_str(frame).unwrap();
        match parsed {
            WireMessage::ProxyHttpResponse { request_id, status_code, .. } => {
                assert_eq!(request_id, "req-1");
                assert_eq!(status_code, 200);
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        let error_frame = r#"{ "type": "proxy_http_error", "request_id": "req-2", "error": "network down" }"#;
        let parsed: WireMessage = serde_json::from_str(error_frame).unwrap();
        assert!(matches!(parsed, WireMessage::ProxyHttpError { .. }));
    }
}
