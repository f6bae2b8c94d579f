//! Channel subscriptions
//!
//! A subscription owns a dedicated pub/sub connection and one message loop.
//! Every message is handed to the handler on its own task, at most
//! `subscriber_workers` at a time; the loop waits for a free worker before
//! reading the next message.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{RedisStore, StoreError};

/// Message received on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: String,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Handler for incoming messages
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message; nothing observes the outcome
    async fn handle(&self, message: Message);
}

/// [`MessageHandler`] backed by an async closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        (self.f)(message).await
    }
}

/// Adapt `|message| async move { ... }` into a [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnHandler { f }
}

/// Handle to a running subscription
///
/// Dropping the handle leaves the loop running; call [`Subscription::cancel`]
/// to stop it.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop consuming messages. Handlers already running are not interrupted.
    pub fn cancel(&self) {
        info!("Cancelling subscription for channel: {}", self.channel);
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the message loop has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the message loop ends (cancelled or stream closed)
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!("Message loop for channel {} panicked: {}", self.channel, e);
        }
    }
}

impl RedisStore {
    /// Subscribe `handler` to `channel`.
    ///
    /// Returns once SUBSCRIBE is acknowledged; messages are consumed in the
    /// background until the subscription or the store context is cancelled.
    pub async fn subscribe<H: MessageHandler>(
        &self,
        channel: &str,
        handler: H,
    ) -> Result<Subscription, StoreError> {
        let stream = self.messages(channel).await?;
        let cancel_token = self.context().cancellation_token().child_token();
        let workers = self.config().subscriber_workers;

        let task = spawn_message_loop(
            channel.to_string(),
            stream,
            Arc::new(handler),
            workers,
            cancel_token.clone(),
        );

        Ok(Subscription {
            channel: channel.to_string(),
            cancel_token,
            task,
        })
    }

    /// Subscribe to `channel` and consume messages directly.
    ///
    /// The stream ends when the server closes the connection.
    pub async fn messages(&self, channel: &str) -> Result<BoxStream<'static, Message>, StoreError> {
        let ctx = self.context();
        let mut pubsub = ctx.run(self.backend().pubsub()).await?;
        ctx.run(async { Ok::<_, StoreError>(pubsub.subscribe(channel).await?) })
            .await?;

        debug!("Subscribed to channel: {}", channel);

        Ok(pubsub
            .into_on_message()
            .filter_map(|msg| futures::future::ready(to_message(&msg)))
            .boxed())
    }
}

fn to_message(msg: &redis::Msg) -> Option<Message> {
    match msg.get_payload::<String>() {
        Ok(payload) => Some(Message::new(msg.get_channel_name(), payload)),
        Err(e) => {
            warn!(
                "Dropping undecodable message on channel {}: {}",
                msg.get_channel_name(),
                e
            );
            None
        }
    }
}

fn spawn_message_loop<S, H>(
    channel: String,
    mut stream: S,
    handler: Arc<H>,
    workers: usize,
    cancel_token: CancellationToken,
) -> JoinHandle<()>
where
    S: Stream<Item = Message> + Send + Unpin + 'static,
    H: MessageHandler,
{
    tokio::spawn(async move {
        info!("Starting message loop for channel: {} ({} workers)", channel, workers);
        let permits = Arc::new(Semaphore::new(workers));

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("Message loop cancelled for channel: {}", channel);
                    break;
                }
                next = stream.next() => match next {
                    Some(message) => message,
                    None => {
                        warn!("Subscription stream closed for channel: {}", channel);
                        break;
                    }
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("Message loop cancelled for channel: {}", channel);
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(message).await;
                drop(permit);
            });
        }

        info!("Message loop ended for channel: {}", channel);
    })
}
