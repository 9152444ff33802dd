//! OneBot v11 transport: HTTP POST event ingestion and HTTP API actions.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::base::{
    config::Config,
    types::{AccountId, GroupId, GroupMessage, MessageId, Res, Void},
};

use super::{GenericTransportClient, TransportClient};

/// Timeout applied to every outbound API call.
const API_TIMEOUT: Duration = Duration::from_secs(10);

// Extra methods on `TransportClient` applied by the OneBot implementation.

impl TransportClient {
    /// Creates a new OneBot v11 transport client.
    pub fn onebot(config: &Config) -> Res<Self> {
        let client = OneBotTransportClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// OneBot v11 client implementation.
#[derive(Clone)]
struct OneBotTransportClient {
    api_url: String,
    access_token: Option<String>,
    listen_addr: String,
    http: reqwest::Client,
}

/// Shared state of the event listener.
#[derive(Clone)]
struct ListenerState {
    client: OneBotTransportClient,
    sink: mpsc::Sender<GroupMessage>,
}

/// Envelope of every OneBot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wording: Option<String>,
}

impl ApiResponse {
    /// Returns the `data` payload, or an error unless `status` is `ok` and `retcode` is 0.
    fn into_data(self, action: &str) -> Res<Value> {
        if self.status != "ok" || self.retcode != 0 {
            let reason = self.wording.or(self.message).unwrap_or_default();
            return Err(anyhow!("`{}` failed with retcode {}: {}", action, self.retcode, reason));
        }

        Ok(self.data)
    }
}

/// One message segment, in OneBot array format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Segment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Header fields of a group message event.
#[derive(Debug, Deserialize)]
struct GroupMessageEvent {
    group_id: GroupId,
    user_id: AccountId,
    message_id: MessageId,
    message: Value,
}

/// The parts of a message body the guard cares about.
#[derive(Debug, Default, PartialEq, Eq)]
struct MessageContent {
    text: String,
    mentions: Vec<AccountId>,
    reply_id: Option<MessageId>,
}

/// A group message event, before its reply target is resolved.
#[derive(Debug, PartialEq, Eq)]
struct ParsedGroupMessage {
    group_id: GroupId,
    sender: AccountId,
    message_id: MessageId,
    content: MessageContent,
}

impl OneBotTransportClient {
    /// Create a new OneBot client.
    #[instrument(name = "OneBotTransportClient::new", skip_all)]
    fn new(config: &Config) -> Res<Self> {
        let http = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;

        info!("OneBot API endpoint: {}", config.onebot_api_url);

        Ok(Self {
            api_url: config.onebot_api_url.trim_end_matches('/').to_string(),
            access_token: config.onebot_access_token.clone(),
            listen_addr: config.listen_addr.clone(),
            http,
        })
    }

    /// Invokes an API action and returns its `data` payload.
    async fn call(&self, action: &str, params: Value) -> Res<Value> {
        let mut request = self.http.post(format!("{}/{}", self.api_url, action)).json(&params);

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response: ApiResponse = request
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call `{}`: {}", action, e))?
            .error_for_status()
            .map_err(|e| anyhow!("Failed to call `{}`: {}", action, e))?
            .json()
            .await?;

        response.into_data(action)
    }

    /// Looks up the author of a message, for reply targets.
    async fn resolve_author(&self, message_id: MessageId) -> Option<AccountId> {
        match self.call("get_msg", json!({ "message_id": message_id })).await {
            Ok(data) => id_field(&data["sender"], "user_id"),
            Err(err) => {
                warn!("Could not resolve the author of replied message {}: {}", message_id, err);
                None
            }
        }
    }
}

#[async_trait]
impl GenericTransportClient for OneBotTransportClient {
    async fn start(&self, sink: mpsc::Sender<GroupMessage>) -> Void {
        let state = ListenerState { client: self.clone(), sink };
        let app = Router::new().route("/", post(handle_push_event)).with_state(state);

        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        info!("Listening for OneBot events on {} ...", self.listen_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mute(&self, group_id: GroupId, account_id: AccountId, duration_secs: u64) -> Void {
        self.call("set_group_ban", json!({ "group_id": group_id, "user_id": account_id, "duration": duration_secs })).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn retract_message(&self, message_id: MessageId) -> Void {
        self.call("delete_msg", json!({ "message_id": message_id })).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn notify(&self, group_id: GroupId, text: &str) -> Void {
        self.call("send_group_msg", json!({ "group_id": group_id, "message": text, "auto_escape": true })).await?;
        Ok(())
    }
}

// Event listener.

/// Handles one event posted by the OneBot implementation.
#[instrument(skip_all)]
async fn handle_push_event(State(state): State<ListenerState>, Json(payload): Json<Value>) -> StatusCode {
    let received_at = Utc::now();

    let Some(parsed) = parse_group_message(&payload) else {
        debug!("Ignoring non group message event.");
        return StatusCode::NO_CONTENT;
    };

    let reply_to = match parsed.content.reply_id {
        Some(id) => state.client.resolve_author(id).await,
        None => None,
    };

    let message = GroupMessage {
        group_id: parsed.group_id,
        sender: parsed.sender,
        message_id: parsed.message_id,
        text: parsed.content.text,
        mentions: parsed.content.mentions,
        reply_to,
        received_at,
    };

    if state.sink.send(message).await.is_err() {
        warn!("Event sink closed, dropping message.");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::NO_CONTENT
}

/// Extracts a group message from a raw event, or `None` for any other event.
fn parse_group_message(payload: &Value) -> Option<ParsedGroupMessage> {
    if payload["post_type"] != "message" || payload["message_type"] != "group" {
        return None;
    }

    let event = match GroupMessageEvent::deserialize(payload) {
        Ok(event) => event,
        Err(err) => {
            warn!("Malformed group message event: {}", err);
            return None;
        }
    };

    let segments = match &event.message {
        Value::String(raw) => parse_cq_string(raw),
        other => match Vec::<Segment>::deserialize(other) {
            Ok(segments) => segments,
            Err(err) => {
                warn!("Malformed message segments: {}", err);
                return None;
            }
        },
    };

    Some(ParsedGroupMessage {
        group_id: event.group_id,
        sender: event.user_id,
        message_id: event.message_id,
        content: parse_segments(&segments),
    })
}

fn parse_segments(segments: &[Segment]) -> MessageContent {
    let mut content = MessageContent::default();

    for segment in segments {
        match segment.kind.as_str() {
            "text" => content.text.push_str(segment.data["text"].as_str().unwrap_or_default()),
            // `@all` carries `qq = "all"` and is skipped by the numeric parse.
            "at" => content.mentions.extend(id_field(&segment.data, "qq")),
            "reply" => content.reply_id = content.reply_id.or(message_id_field(&segment.data, "id")),
            _ => {}
        }
    }

    content
}

/// Reads an id that implementations send either as a number or as a string.
fn id_field(data: &Value, key: &str) -> Option<u64> {
    match data.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a message id, which may be negative on some implementations.
fn message_id_field(data: &Value, key: &str) -> Option<MessageId> {
    match data.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a message in CQ-code string format (`hi [CQ:at,qq=123]`) into segments.
fn parse_cq_string(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = raw;

    while let Some(start) = rest.find("[CQ:") {
        if start > 0 {
            segments.push(text_segment(&rest[..start]));
        }

        let Some(len) = rest[start..].find(']') else {
            rest = &rest[start..];
            break;
        };

        let code = &rest[start + 4..start + len];
        let mut parts = code.split(',');
        let kind = parts.next().unwrap_or_default().to_string();
        let data = parts
            .filter_map(|part| part.split_once('='))
            .map(|(key, value)| (key.to_string(), Value::String(unescape_cq(value))))
            .collect::<serde_json::Map<_, _>>();

        segments.push(Segment { kind, data: Value::Object(data) });
        rest = &rest[start + len + 1..];
    }

    if !rest.is_empty() {
        segments.push(text_segment(rest));
    }

    segments
}

fn text_segment(text: &str) -> Segment {
    Segment {
        kind: "text".to_string(),
        data: json!({ "text": unescape_cq(text) }),
    }
}

fn unescape_cq(value: &str) -> String {
    value.replace("&#44;", ",").replace("&#91;", "[").replace("&#93;", "]").replace("&amp;", "&")
}

// Tests.
