//! The relay loop: channel events in, agent replies out.

use crate::reply::ReplyAccumulator;
use crate::session::{EvictionPolicy, SessionStore};
use moverelay_config::AppConfig;
use moverelay_core::agent::{AgentFactory, AgentInput, ThreadConfig};
use moverelay_core::channel::{Channel, ChannelEvent, ChannelMessage};
use moverelay_core::error::{AgentError, ChannelError};
use moverelay_core::message::{Message, Role};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_THREAD_ID: &str = "Discord Bot";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Why an inbound message was not handed to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NotDirect,
    FromBot,
    Empty,
}

/// Relays direct messages from a [`Channel`] to agents built by an
/// [`AgentFactory`], keeping one conversation history per sender.
pub struct Relay {
    channel: Arc<dyn Channel>,
    factory: Arc<dyn AgentFactory>,
    sessions: Arc<SessionStore>,
    thread_id: String,
    reply_role: Role,
}

impl Relay {
    pub fn new(channel: Arc<dyn Channel>, factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            channel,
            factory,
            sessions: Arc::new(SessionStore::default()),
            thread_id: DEFAULT_THREAD_ID.into(),
            reply_role: Role::User,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        channel: Arc<dyn Channel>,
        factory: Arc<dyn AgentFactory>,
    ) -> Self {
        Self::new(channel, factory)
            .with_thread_id(config.agent.thread_id.clone())
            .with_reply_role(config.relay.reply_role)
            .with_sessions(Arc::new(SessionStore::new(EvictionPolicy::from_config(
                &config.relay.history,
            ))))
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    /// Role recorded in history for the bot's own replies.
    pub fn with_reply_role(mut self, role: Role) -> Self {
        self.reply_role = role;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start the channel and serve events until it closes.
    ///
    /// Each accepted message is handled on its own task; failures there are
    /// logged and never end the loop. A fatal channel error does, after the
    /// in-flight handlers finish.
    pub async fn run(self: Arc<Self>) -> Result<(), RelayError> {
        let mut events = self.channel.start().await?;
        let mut handlers = JoinSet::new();
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    None => break,
                    Some(Ok(ChannelEvent::Ready { bot_name })) => {
                        info!("{bot_name} is running. Send it a message in Discord DM to get started.");
                    }
                    Some(Ok(ChannelEvent::Message(msg))) => {
                        if let Err(skip) = Self::screen(&msg) {
                            if skip == Skip::Empty {
                                error!("Received an empty message. Ignoring.");
                            } else {
                                debug!(sender = %msg.sender_id, reason = ?skip, "Ignoring message");
                            }
                            continue;
                        }
                        let relay = self.clone();
                        handlers.spawn(async move {
                            if let Err(e) = relay.handle_message(&msg).await {
                                error!(user_id = %msg.sender_id, error = %e, "Failed to relay message");
                            }
                        });
                    }
                    Some(Err(ChannelError::Fatal(reason))) => {
                        error!(%reason, channel = self.channel.name(), "Channel stopped");
                        outcome = Err(ChannelError::Fatal(reason).into());
                        break;
                    }
                    Some(Err(e)) => error!(error = %e, "Channel error"),
                },
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Message handler panicked");
                    }
                }
            }
        }

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Message handler panicked");
            }
        }
        outcome
    }

    /// Accept only non-empty direct messages from people.
    pub fn screen(msg: &ChannelMessage) -> Result<(), Skip> {
        if !msg.is_direct {
            return Err(Skip::NotDirect);
        }
        if msg.sender_is_bot {
            return Err(Skip::FromBot);
        }
        if msg.content.trim().is_empty() {
            return Err(Skip::Empty);
        }
        Ok(())
    }

    /// Run one message through a fresh agent and send back its reply.
    pub async fn handle_message(&self, msg: &ChannelMessage) -> Result<(), RelayError> {
        info!(
            user_id = %msg.sender_id,
            sender = msg.sender_name.as_deref().unwrap_or(""),
            "Received message"
        );

        if let Err(e) = self.channel.send_typing(&msg.chat_id).await {
            warn!(error = %e, "Failed to send typing indicator");
        }

        let history = self
            .sessions
            .append(&msg.sender_id, Message::user(msg.content.clone()))
            .await;

        let agent = self.factory.create().await?;
        let mut stream = agent
            .stream(
                AgentInput { messages: history },
                ThreadConfig::new(self.thread_id.clone()),
            )
            .await?;

        let mut acc = ReplyAccumulator::new();
        while let Some(chunk) = stream.recv().await {
            let chunk = chunk?;
            debug!(chunk = ?chunk, "Agent step");
            acc.push(&chunk);
        }

        let Some(reply) = acc.reply() else {
            error!(output = acc.text(), "The expected format was not found in the agent output");
            return Ok(());
        };

        self.channel
            .send(&msg.chat_id, &reply, Some(&msg.message_id))
            .await?;
        self.sessions
            .append(&msg.sender_id, Message::new(self.reply_role, reply))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use moverelay_core::agent::{AgentChunk, AgentStream, ConversationalAgent};
    use moverelay_core::channel::ChannelId;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        chat_id: String,
        content: String,
        reply_to: Option<String>,
    }

    struct MockChannel {
        id: ChannelId,
        events: Mutex<Vec<Result<ChannelEvent, ChannelError>>>,
        sent: Mutex<Vec<Sent>>,
        typing: Mutex<Vec<String>>,
        fail_send: bool,
    }

    impl MockChannel {
        fn new(events: Vec<Result<ChannelEvent, ChannelError>>) -> Self {
            Self {
                id: ChannelId("mock".into()),
                events: Mutex::new(events),
                sent: Mutex::new(Vec::new()),
                typing: Mutex::new(Vec::new()),
                fail_send: false,
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        fn id(&self) -> &ChannelId {
            &self.id
        }

        async fn start(
            &self,
        ) -> Result<mpsc::Receiver<Result<ChannelEvent, ChannelError>>, ChannelError> {
            let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                tx.send(event).await.unwrap();
            }
            Ok(rx)
        }

        async fn send(
            &self,
            chat_id: &str,
            content: &str,
            reply_to: Option<&str>,
        ) -> Result<(), ChannelError> {
            if self.fail_send {
                return Err(ChannelError::DeliveryFailed {
                    channel: "mock".into(),
                    reason: "offline".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent {
                chat_id: chat_id.into(),
                content: content.into(),
                reply_to: reply_to.map(str::to_string),
            });
            Ok(())
        }

        async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
            self.typing.lock().unwrap().push(chat_id.into());
            Ok(())
        }
    }

    /// Replies `echo(<n>): <last message>` after an empty first step, where
    /// `n` is the history length it was given. A last message of `boom`
    /// fails the stream after the first step.
    struct EchoAgent {
        seen: Arc<Mutex<Vec<(AgentInput, ThreadConfig)>>>,
        steps: usize,
    }

    #[async_trait]
    impl ConversationalAgent for EchoAgent {
        async fn stream(
            &self,
            input: AgentInput,
            config: ThreadConfig,
        ) -> Result<AgentStream, AgentError> {
            let last = input
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let reply = format!("echo({}): {last}", input.messages.len());
            self.seen.lock().unwrap().push((input, config));

            let (tx, rx) = mpsc::channel(4);
            if last == "boom" {
                tx.send(Ok(AgentChunk::Agent {
                    messages: vec![Message::assistant("")],
                }))
                .await
                .unwrap();
                tx.send(Err(AgentError::RecursionLimit(25))).await.unwrap();
                return Ok(rx);
            }

            let mut chunks = vec![AgentChunk::Agent {
                messages: vec![Message::assistant("")],
            }];
            if self.steps > 1 {
                chunks.push(AgentChunk::Tools {
                    messages: vec![Message::tool_result("call_1", "{}")],
                });
                chunks.push(AgentChunk::Agent {
                    messages: vec![Message::assistant(reply)],
                });
            }
            for chunk in chunks {
                tx.send(Ok(chunk)).await.unwrap();
            }
            Ok(rx)
        }
    }

    struct EchoFactory {
        seen: Arc<Mutex<Vec<(AgentInput, ThreadConfig)>>>,
        created: Mutex<usize>,
        steps: usize,
        fail: bool,
    }

    impl EchoFactory {
        fn new() -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                created: Mutex::new(0),
                steps: 2,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl AgentFactory for EchoFactory {
        async fn create(&self) -> Result<Arc<dyn ConversationalAgent>, AgentError> {
            if self.fail {
                return Err(AgentError::Construction("no model".into()));
            }
            *self.created.lock().unwrap() += 1;
            Ok(Arc::new(EchoAgent {
                seen: self.seen.clone(),
                steps: self.steps,
            }))
        }
    }

    fn dm(user: &str, message_id: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId("mock".into()),
            message_id: message_id.into(),
            sender_id: user.into(),
            sender_name: Some(user.into()),
            sender_is_bot: false,
            content: content.into(),
            chat_id: format!("dm-{user}"),
            is_direct: true,
        }
    }

    #[tokio::test]
    async fn handled_message_gets_threaded_reply() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let factory = Arc::new(EchoFactory::new());
        let relay = Relay::new(channel.clone(), factory.clone());

        relay.handle_message(&dm("alice", "m1", "hello")).await.unwrap();

        assert_eq!(
            channel.sent(),
            vec![Sent {
                chat_id: "dm-alice".into(),
                content: "echo(1): hello".into(),
                reply_to: Some("m1".into()),
            }]
        );
        assert_eq!(channel.typing.lock().unwrap().as_slice(), ["dm-alice"]);

        let seen = factory.seen.lock().unwrap();
        assert_eq!(seen[0].1.thread_id, "Discord Bot");
    }

    #[tokio::test]
    async fn history_accumulates_with_reply_role() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let factory = Arc::new(EchoFactory::new());
        let relay = Relay::new(channel.clone(), factory.clone());

        relay.handle_message(&dm("alice", "m1", "one")).await.unwrap();
        relay.handle_message(&dm("alice", "m2", "two")).await.unwrap();

        // user, reply, user
        assert_eq!(channel.sent()[1].content, "echo(3): two");
        assert_eq!(*factory.created.lock().unwrap(), 2);

        let history = relay.sessions().history("alice").await;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User; 4]);
        assert_eq!(history[1].content, "echo(1): one");
    }

    #[tokio::test]
    async fn assistant_reply_role_is_configurable() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let relay = Relay::new(channel, Arc::new(EchoFactory::new())).with_reply_role(Role::Assistant);

        relay.handle_message(&dm("bob", "m1", "hi")).await.unwrap();

        let history = relay.sessions().history("bob").await;
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn single_step_output_sends_nothing() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let mut factory = EchoFactory::new();
        factory.steps = 1;
        let relay = Relay::new(channel.clone(), Arc::new(factory));

        relay.handle_message(&dm("carol", "m1", "hi")).await.unwrap();

        assert!(channel.sent().is_empty());
        assert_eq!(relay.sessions().history("carol").await.len(), 1);
    }

    #[tokio::test]
    async fn construction_failure_is_an_error() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let mut factory = EchoFactory::new();
        factory.fail = true;
        let relay = Relay::new(channel.clone(), Arc::new(factory));

        let err = relay.handle_message(&dm("dave", "m1", "hi")).await.unwrap_err();
        assert!(matches!(err, RelayError::Agent(AgentError::Construction(_))));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_send_keeps_reply_out_of_history() {
        let mut channel = MockChannel::new(vec![]);
        channel.fail_send = true;
        let relay = Relay::new(Arc::new(channel), Arc::new(EchoFactory::new()));

        let err = relay.handle_message(&dm("erin", "m1", "hi")).await.unwrap_err();
        assert!(matches!(err, RelayError::Channel(_)));
        assert_eq!(relay.sessions().history("erin").await.len(), 1);
    }

    #[test]
    fn screen_filters_guild_bot_and_empty() {
        assert_eq!(Relay::screen(&dm("u", "m", "hi")), Ok(()));

        let mut guild = dm("u", "m", "hi");
        guild.is_direct = false;
        assert_eq!(Relay::screen(&guild), Err(Skip::NotDirect));

        let mut bot = dm("u", "m", "hi");
        bot.sender_is_bot = true;
        assert_eq!(Relay::screen(&bot), Err(Skip::FromBot));

        assert_eq!(Relay::screen(&dm("u", "m", "  \n ")), Err(Skip::Empty));
    }

    #[tokio::test]
    async fn run_serves_users_concurrently_and_in_isolation() {
        let mut bot_msg = dm("bot", "m0", "beep");
        bot_msg.sender_is_bot = true;
        let mut guild_msg = dm("zed", "m9", "in a server");
        guild_msg.is_direct = false;

        let channel = Arc::new(MockChannel::new(vec![
            Ok(ChannelEvent::Ready {
                bot_name: "relay#0001".into(),
            }),
            Ok(ChannelEvent::Message(dm("alice", "a1", "from alice"))),
            Ok(ChannelEvent::Message(bot_msg)),
            Ok(ChannelEvent::Message(dm("bob", "b1", "from bob"))),
            Err(ChannelError::ConnectionLost("blip".into())),
            Ok(ChannelEvent::Message(guild_msg)),
            Ok(ChannelEvent::Message(dm("carol", "c1", "   "))),
        ]));
        let factory = Arc::new(EchoFactory::new());
        let relay = Arc::new(Relay::new(channel.clone(), factory.clone()));

        relay.clone().run().await.unwrap();

        let mut sent = channel.sent();
        sent.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "echo(1): from alice");
        assert_eq!(sent[1].content, "echo(1): from bob");
        assert_eq!(*factory.created.lock().unwrap(), 2);

        let alice = relay.sessions().history("alice").await;
        assert!(alice.iter().all(|m| !m.content.contains("bob")));
        assert_eq!(relay.sessions().user_count().await, 2);
    }

    #[tokio::test]
    async fn fatal_channel_error_ends_run() {
        let channel = Arc::new(MockChannel::new(vec![
            Err(ChannelError::Fatal("Authentication failed".into())),
            Ok(ChannelEvent::Message(dm("late", "m1", "never handled"))),
        ]));
        let relay = Arc::new(Relay::new(channel.clone(), Arc::new(EchoFactory::new())));

        let err = relay.run().await.unwrap_err();
        assert!(matches!(err, RelayError::Channel(ChannelError::Fatal(_))));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn stream_failure_is_an_error_and_sends_nothing() {
        let channel = Arc::new(MockChannel::new(vec![]));
        let relay = Relay::new(channel.clone(), Arc::new(EchoFactory::new()));

        let err = relay.handle_message(&dm("fay", "m1", "boom")).await.unwrap_err();

        assert!(matches!(err, RelayError::Agent(AgentError::RecursionLimit(25))));
        assert!(channel.sent().is_empty());
        let history = relay.sessions().history("fay").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "boom");
    }

    #[tokio::test]
    async fn run_keeps_serving_after_a_stream_failure() {
        let channel = Arc::new(MockChannel::new(vec![
            Ok(ChannelEvent::Message(dm("gus", "m1", "boom"))),
            Ok(ChannelEvent::Message(dm("hal", "m2", "still there?"))),
        ]));
        let relay = Arc::new(Relay::new(channel.clone(), Arc::new(EchoFactory::new())));

        relay.clone().run().await.unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, "dm-hal");
        assert_eq!(sent[0].content, "echo(1): still there?");
        assert_eq!(relay.sessions().history("gus").await.len(), 1);
    }

    #[tokio::test]
    async fn gateway_give_up_fails_run_after_in_flight_replies() {
        let channel = Arc::new(MockChannel::new(vec![
            Ok(ChannelEvent::Message(dm("ivy", "m1", "hello"))),
            Err(ChannelError::Fatal(
                "Gave up after 8 reconnect attempts: connection reset".into(),
            )),
        ]));
        let relay = Arc::new(Relay::new(channel.clone(), Arc::new(EchoFactory::new())));

        let err = relay.run().await.unwrap_err();

        assert!(matches!(err, RelayError::Channel(ChannelError::Fatal(ref r)) if r.starts_with("Gave up")));
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn from_config_applies_relay_settings() {
        let mut config = AppConfig::default();
        config.agent.thread_id = "custom".into();
        config.relay.reply_role = Role::Assistant;
        config.relay.history.max_messages_per_user = Some(10);

        let relay = Relay::from_config(
            &config,
            Arc::new(MockChannel::new(vec![])),
            Arc::new(EchoFactory::new()),
        );
        assert_eq!(relay.thread_id, "custom");
        assert_eq!(relay.reply_role, Role::Assistant);
        assert_eq!(relay.sessions().policy().max_messages_per_user, Some(10));
    }
}
