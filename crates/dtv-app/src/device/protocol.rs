//! Message shapes of the Frame TV art channel.
//!
//! Requests go out as `ms.channel.emit` envelopes carrying an
//! `art_app_request` whose `data` is itself a JSON string. Answers come back
//! as `d2d_service_message` events with the same string-encoded payload.

use base64::{engine::general_purpose, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use dtv_core::{DeviceError, DisplayStyle};

pub const ART_CHANNEL: &str = "com.samsung.art-app";

pub fn channel_url(host: &str, port: u16, client_name: &str, token: Option<&str>) -> String {
    let name = general_purpose::STANDARD.encode(client_name);
    let mut url = format!("wss://{host}:{port}/api/v2/channels/{ART_CHANNEL}?name={name}");
    if let Some(token) = token {
        url.push_str("&token=");
        url.push_str(token);
    }
    url
}

/// Wraps an art request in the channel envelope.
pub fn art_request(payload: &Value) -> String {
    json!({
        "method": "ms.channel.emit",
        "params": {
            "event": "art_app_request",
            "to": "host",
            "data": payload.to_string(),
        }
    })
    .to_string()
}

pub fn send_image_request(
    id: &str,
    connection_id: u32,
    file_type: &str,
    style: &DisplayStyle,
    file_size: usize,
    image_date: &str,
) -> Value {
    json!({
        "request": "send_image",
        "file_type": file_type,
        "request_id": id,
        "id": id,
        "conn_info": {
            "d2d_mode": "socket",
            "connection_id": connection_id,
            "id": id,
        },
        "image_date": image_date,
        "matte_id": style.matte,
        "portrait_matte_id": style.portrait_matte.as_deref().unwrap_or(&style.matte),
        "file_size": file_size,
    })
}

pub fn select_image_request(id: &str, content_id: &str) -> Value {
    json!({
        "request": "select_image",
        "category_id": null,
        "content_id": content_id,
        "show": true,
        "id": id,
    })
}

pub fn api_version_request(id: &str) -> Value {
    json!({ "request": "get_api_version", "id": id })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

pub fn parse_event(text: &str) -> Result<ChannelEvent, DeviceError> {
    serde_json::from_str(text).map_err(|e| DeviceError::Failure(format!("malformed channel message: {e}")))
}

/// Decoded art payload of a `d2d_service_message`, if this is one.
pub fn art_payload(event: &ChannelEvent) -> Option<Value> {
    if event.event != "d2d_service_message" {
        return None;
    }
    match &event.data {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Object(_) => Some(event.data.clone()),
        _ => None,
    }
}

pub fn payload_event(payload: &Value) -> Option<&str> {
    payload.get("event").and_then(Value::as_str)
}

pub fn error_from_payload(payload: &Value) -> DeviceError {
    let request = payload
        .get("request_data")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|req| req.get("request").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "request".to_string());
    let code = payload
        .get("error_code")
        .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    DeviceError::Failure(format!("{request} failed with error code {code}"))
}

/// Where the TV wants the image bytes sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnInfo {
    pub ip: String,
    pub port: u16,
    pub key: String,
    pub secured: bool,
}

impl ConnInfo {
    pub fn from_payload(payload: &Value) -> Result<Self, DeviceError> {
        let invalid = |what: &str| DeviceError::Failure(format!("ready_to_use answer has no usable {what}"));

        let info: Value = match payload.get("conn_info") {
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|_| invalid("conn_info"))?,
            Some(obj @ Value::Object(_)) => obj.clone(),
            _ => return Err(invalid("conn_info")),
        };

        let port = match info.get("port") {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid("port"))?;

        Ok(Self {
            ip: info.get("ip").and_then(Value::as_str).ok_or_else(|| invalid("ip"))?.to_string(),
            port,
            key: info.get("key").and_then(Value::as_str).ok_or_else(|| invalid("key"))?.to_string(),
            secured: info.get("secured").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

pub fn upload_header(file_size: usize, file_type: &str, sec_key: &str) -> String {
    json!({
        "num": 0,
        "total": 1,
        "fileLength": file_size,
        "fileName": "dummy",
        "fileType": file_type,
        "secKey": sec_key,
        "version": "0.0.1",
    })
    .to_string()
}

/// Header preceded by its length as a big-endian u32.
pub fn frame_header(header: &str) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + header.len());
    framed.extend_from_slice(&(header.len() as u32).to_be_bytes());
    framed.extend_from_slice(header.as_bytes());
    framed
}
