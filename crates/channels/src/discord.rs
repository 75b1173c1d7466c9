//! Discord channel adapter.
//!
//! Receives events over the Gateway WebSocket and replies via the REST
//! API. The gateway runs in a background task that reconnects with
//! exponential backoff; close codes 4004 (bad token) and 4014 (disallowed
//! intents) are fatal and end the event stream.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use moverelay_config::DiscordConfig;
use moverelay_core::channel::{Channel, ChannelEvent, ChannelId, ChannelMessage};
use moverelay_core::error::ChannelError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

const DISCORD_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const DISCORD_API: &str = "https://discord.com/api/v10";

/// Discord rejects messages over 2000 chars; leave headroom.
pub const MAX_MESSAGE_LEN: usize = 1950;

/// DIRECT_MESSAGES (1 << 12) | MESSAGE_CONTENT (1 << 15).
///
/// MESSAGE_CONTENT is privileged and must be enabled in the developer
/// portal, otherwise Discord closes the session with 4014.
pub const GATEWAY_INTENTS: u64 = (1 << 12) | (1 << 15);

const DEFAULT_HEARTBEAT_MS: u64 = 41_250;
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
const MAX_RECONNECT_DELAY_MS: u64 = 300_000;

// ── Gateway payloads ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    d: Option<serde_json::Value>,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyEvent {
    user: DiscordUser,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    #[serde(default)]
    bot: Option<bool>,
    #[serde(default)]
    global_name: Option<String>,
}

impl DiscordUser {
    /// `name#1234` for legacy accounts, plain username otherwise.
    fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    author: DiscordUser,
    #[serde(default)]
    content: String,
    #[serde(default)]
    guild_id: Option<String>,
}

/// How a gateway session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayExit {
    /// Stop flag set or the event receiver was dropped.
    Stopped,
    /// Discord asked us to reconnect, or closed normally.
    Reconnect,
}

// ── Channel ────────────────────────────────────────────────────────────

pub struct DiscordChannel {
    bot_token: String,
    channel_id: ChannelId,
    http: reqwest::Client,
    gateway_url: String,
    api_base: String,
    max_reconnect_attempts: u32,
    stop: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("bot_token", &"[REDACTED]")
            .field("gateway_url", &self.gateway_url)
            .field("api_base", &self.api_base)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

impl DiscordChannel {
    pub fn new(bot_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            bot_token: bot_token.into(),
            channel_id: ChannelId("discord".into()),
            http,
            gateway_url: DISCORD_GATEWAY_URL.into(),
            api_base: DISCORD_API.into(),
            max_reconnect_attempts: 8,
            stop: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self, ChannelError> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChannelError::NotConfigured("Discord bot token is not set".into()))?;
        Ok(Self::new(token).with_max_reconnect_attempts(config.max_reconnect_attempts))
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Point REST calls somewhere other than discord.com.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    async fn post_message(&self, chat_id: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let url = format!("{}/channels/{}/messages", self.api_base, chat_id);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(chat_id, status = %status, body = %text, "Discord send failed");
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelEvent, ChannelError>>, ChannelError> {
        if self.bot_token.is_empty() {
            return Err(ChannelError::NotConfigured(
                "Discord bot token is not set".into(),
            ));
        }

        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(ChannelError::NotConfigured(
                "Discord channel is already running".into(),
            ));
        }

        self.stop.store(false, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(64);
        let session = GatewaySession {
            token: self.bot_token.clone(),
            gateway_url: self.gateway_url.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            stop: self.stop.clone(),
            tx,
        };

        info!("Discord channel starting");
        *task = Some(tokio::spawn(session.supervise()));
        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        if content.trim().is_empty() {
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: "Cannot send an empty message".into(),
            });
        }

        let chunks = split_message(content, MAX_MESSAGE_LEN);
        debug!(chat_id, chunks = chunks.len(), len = content.len(), "Discord send");
        for (i, chunk) in chunks.iter().enumerate() {
            // Only the first piece threads onto the original message.
            let reference = if i == 0 { reply_to } else { None };
            self.post_message(chat_id, message_body(chunk, reference))
                .await?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let url = format!("{}/channels/{}/typing", self.api_base, chat_id);
        self.http
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Discord channel stopping");
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        if self.bot_token.is_empty() {
            return Ok(false);
        }
        let url = format!("{}/users/@me", self.api_base);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}

// ── Gateway session ────────────────────────────────────────────────────

struct GatewaySession {
    token: String,
    gateway_url: String,
    max_reconnect_attempts: u32,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<ChannelEvent, ChannelError>>,
}

impl GatewaySession {
    /// Keep a session alive until stopped, a fatal close, or too many
    /// consecutive failed attempts.
    async fn supervise(self) {
        let mut attempt: u32 = 0;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let mut ready = false;
            let outcome = self.connect_once(&mut ready).await;
            if ready {
                attempt = 0;
            }

            match outcome {
                Ok(GatewayExit::Stopped) => break,
                Ok(GatewayExit::Reconnect) => {
                    info!("Reconnecting to Discord gateway");
                }
                Err(ChannelError::Fatal(reason)) => {
                    error!(reason = %reason, "Discord gateway rejected the session");
                    let _ = self.tx.send(Err(ChannelError::Fatal(reason))).await;
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_reconnect_attempts {
                        error!(
                            attempts = self.max_reconnect_attempts,
                            error = %e,
                            "Max reconnect attempts reached, giving up"
                        );
                        let _ = self
                            .tx
                            .send(Err(ChannelError::Fatal(format!(
                                "Gave up after {} reconnect attempts: {e}",
                                self.max_reconnect_attempts
                            ))))
                            .await;
                        break;
                    }
                    let delay = reconnect_delay(attempt - 1);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Discord gateway error, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        info!("Discord gateway stopped");
    }

    /// One gateway connection from Hello to disconnect.
    async fn connect_once(&self, ready: &mut bool) -> Result<GatewayExit, ChannelError> {
        let (ws_stream, _) = connect_async(self.gateway_url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        let (write, mut read) = ws_stream.split();

        let hello = read
            .next()
            .await
            .ok_or_else(|| ChannelError::ConnectionLost("Gateway closed before Hello".into()))?
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        let hello_text = hello
            .to_text()
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
        let heartbeat_ms = parse_hello(hello_text)?;
        info!(heartbeat_ms, "Connected to Discord gateway");

        let writer = Arc::new(Mutex::new(write));
        writer
            .lock()
            .await
            .send(WsMessage::Text(identify_payload(&self.token).to_string()))
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        // -1 until the first dispatch carries a sequence number.
        let sequence = Arc::new(AtomicI64::new(-1));
        let heartbeat = {
            let writer = writer.clone();
            let sequence = sequence.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_ms));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let payload = heartbeat_payload(load_sequence(&sequence));
                    if let Err(e) = writer
                        .lock()
                        .await
                        .send(WsMessage::Text(payload.to_string()))
                        .await
                    {
                        warn!(error = %e, "Heartbeat send failed");
                        break;
                    }
                }
            })
        };

        let result: Result<GatewayExit, ChannelError> = async {
            while let Some(frame) = read.next().await {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(GatewayExit::Stopped);
                }

                let text = match frame.map_err(|e| ChannelError::ConnectionLost(e.to_string()))? {
                    WsMessage::Text(t) => t,
                    WsMessage::Close(close) => {
                        let (code, reason) = close
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((0, String::new()));
                        return close_action(code, &reason);
                    }
                    _ => continue,
                };

                let payload: GatewayPayload = match serde_json::from_str(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "Skipping unparseable gateway payload");
                        continue;
                    }
                };

                if let Some(s) = payload.s {
                    sequence.store(s as i64, Ordering::Relaxed);
                }

                match payload.op {
                    0 => {
                        let event = payload
                            .t
                            .as_deref()
                            .zip(payload.d)
                            .and_then(|(name, d)| parse_dispatch(name, d));
                        if let Some(event) = event {
                            if let ChannelEvent::Ready { bot_name } = &event {
                                info!(bot = %bot_name, "Discord session ready");
                                *ready = true;
                            }
                            if self.tx.send(Ok(event)).await.is_err() {
                                return Ok(GatewayExit::Stopped);
                            }
                        }
                    }
                    1 => {
                        let payload = heartbeat_payload(load_sequence(&sequence));
                        writer
                            .lock()
                            .await
                            .send(WsMessage::Text(payload.to_string()))
                            .await
                            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
                    }
                    7 => {
                        info!("Gateway requested reconnect");
                        return Ok(GatewayExit::Reconnect);
                    }
                    9 => {
                        warn!("Gateway invalidated the session");
                        return Err(ChannelError::ConnectionLost(
                            "Invalid session, Discord rejected the connection".into(),
                        ));
                    }
                    // 11 = heartbeat ACK
                    _ => {}
                }
            }
            Err(ChannelError::ConnectionLost("Gateway stream ended".into()))
        }
        .await;

        heartbeat.abort();
        result
    }
}

fn load_sequence(sequence: &AtomicI64) -> Option<u64> {
    let s = sequence.load(Ordering::Relaxed);
    (s >= 0).then_some(s as u64)
}

// ── Pure helpers ───────────────────────────────────────────────────────

/// Heartbeat interval from a Hello (op 10) frame.
fn parse_hello(text: &str) -> Result<u64, ChannelError> {
    let payload: GatewayPayload =
        serde_json::from_str(text).map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
    if payload.op != 10 {
        return Err(ChannelError::InvalidPayload(format!(
            "Expected Hello (op 10), got op {}",
            payload.op
        )));
    }
    Ok(payload
        .d
        .as_ref()
        .and_then(|d| d["heartbeat_interval"].as_u64())
        .unwrap_or(DEFAULT_HEARTBEAT_MS))
}

fn identify_payload(token: &str) -> serde_json::Value {
    json!({
        "op": 2,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "moverelay",
                "device": "moverelay"
            }
        }
    })
}

fn heartbeat_payload(sequence: Option<u64>) -> serde_json::Value {
    json!({ "op": 1, "d": sequence })
}

/// Translate a dispatch (op 0) event into a channel event.
fn parse_dispatch(event: &str, d: serde_json::Value) -> Option<ChannelEvent> {
    match event {
        "READY" => {
            let ready: ReadyEvent = serde_json::from_value(d).ok()?;
            Some(ChannelEvent::Ready {
                bot_name: ready.user.tag(),
            })
        }
        "MESSAGE_CREATE" => {
            let msg: DiscordMessage = serde_json::from_value(d).ok()?;
            let sender_name = msg
                .author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.username.clone());
            Some(ChannelEvent::Message(ChannelMessage {
                channel_id: ChannelId("discord".into()),
                message_id: msg.id,
                sender_id: msg.author.id,
                sender_name: Some(sender_name),
                sender_is_bot: msg.author.bot.unwrap_or(false),
                content: msg.content,
                chat_id: msg.channel_id,
                is_direct: msg.guild_id.is_none(),
            }))
        }
        _ => None,
    }
}

/// Decide what a Close frame means for the session.
fn close_action(code: u16, reason: &str) -> Result<GatewayExit, ChannelError> {
    match code {
        4004 => Err(ChannelError::Fatal(
            "Authentication failed (4004): invalid bot token".into(),
        )),
        4014 => Err(ChannelError::Fatal(
            "Disallowed intents (4014): enable the Message Content intent for this bot".into(),
        )),
        0 | 1000 => {
            info!(code, "Gateway closed normally");
            Ok(GatewayExit::Reconnect)
        }
        _ => Err(ChannelError::ConnectionLost(format!(
            "Gateway closed: code={code} {reason}"
        ))),
    }
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 5 minutes.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt.min(12)));
    Duration::from_millis(base_ms.min(MAX_RECONNECT_DELAY_MS))
}

fn message_body(content: &str, reply_to: Option<&str>) -> serde_json::Value {
    match reply_to {
        Some(id) => json!({
            "content": content,
            "message_reference": { "message_id": id, "fail_if_not_exists": false }
        }),
        None => json!({ "content": content }),
    }
}

/// Split `text` into pieces of at most `max_len` bytes, preferring line
/// then word boundaries. Never splits inside a UTF-8 character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
    chunks
}
