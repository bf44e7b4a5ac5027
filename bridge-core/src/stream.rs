//! Bridge from callback-delivered broker messages to a push event stream.
//!
//! One subscription request becomes one driver task plus one output channel.
//! Every writer — the broker's delivery task, the heartbeat, and the driver
//! itself — funnels through the same unbounded channel, whose receiver is
//! the sole frame writer; that channel is what serializes concurrent writes.
//!
//! A subscription moves through `Acquiring → Subscribing → Streaming →
//! Terminated`. The terminal state is reached exactly once, and nothing is
//! emitted after it: late deliveries and heartbeat ticks that race
//! termination are dropped silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_client::{BrokerConnection, BrokerId, MessageDelivery, MessageSink, QoS};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::ConnectionProvider;
use crate::config::BridgeConfig;

/// Error codes carried by terminal `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Acquiring a broker connection failed
    ClientConnect,
    /// The subscribe request failed or timed out
    Subscribe,
    /// A message could not be written to the stream
    Send,
    /// The stream exceeded its configured lifetime
    Timeout,
    /// The stream transport failed while writing a frame
    EmitterIo,
    /// A keep-alive frame could not be written
    Heartbeat,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientConnect => "CLIENT_CONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Send => "SEND",
            Self::Timeout => "TIMEOUT",
            Self::EmitterIo => "EMITTER_IO",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events pushed to the stream consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The subscription is live; messages follow
    Subscribed {
        /// The subscribed topic filter
        topic: String,
    },
    /// One delivered message, decoded as UTF-8 text
    Message {
        /// Decoded payload
        text: String,
    },
    /// Terminal failure; the stream closes after this event
    Error {
        /// Classification of the failure
        code: ErrorCode,
        /// Human-readable description
        message: String,
    },
    /// Keep-alive frame, rendered as a comment on the wire
    Heartbeat,
}

/// Per-request subscription state.
///
/// Owned by one stream request; the broker connection it subscribes on is
/// shared and survives the context.
struct SubscriptionContext {
    broker_id: BrokerId,
    topic_filter: String,
    events: mpsc::UnboundedSender<StreamEvent>,
    terminated: AtomicBool,
}

impl SubscriptionContext {
    /// Write one event unless the context is terminated or the consumer is
    /// gone. Returns whether the event was accepted.
    fn emit(&self, event: StreamEvent) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            return false;
        }
        self.events.send(event).is_ok()
    }

    /// Flip into the terminal state. Returns true for exactly one caller.
    fn begin_termination(&self) -> bool {
        !self.terminated.swap(true, Ordering::AcqRel)
    }
}

impl MessageSink for SubscriptionContext {
    fn on_message(&self, delivery: MessageDelivery) {
        let text = String::from_utf8_lossy(&delivery.payload).into_owned();
        if !self.emit(StreamEvent::Message { text }) {
            // Late delivery racing termination; dropped by design of the
            // terminal state. The driver notices the closed channel itself.
            debug!(
                broker_id = %self.broker_id,
                topic = %delivery.topic,
                "dropped message delivered after stream termination"
            );
        }
    }
}

/// Turns one subscription request into a push event stream.
pub struct StreamBridge {
    connections: Arc<dyn ConnectionProvider>,
    config: BridgeConfig,
}

impl StreamBridge {
    /// Create a bridge over a connection provider.
    pub fn new(connections: Arc<dyn ConnectionProvider>, config: BridgeConfig) -> Self {
        Self {
            connections,
            config,
        }
    }

    /// Open a stream of events for one topic filter on one broker.
    ///
    /// The returned stream yields `subscribed`, `message`, `error`, and
    /// heartbeat events and ends when the subscription terminates. Dropping
    /// the stream disconnects the consumer: the subscription is torn down
    /// (best-effort unsubscribe included) but the underlying shared broker
    /// connection stays cached for other requests.
    pub fn open(
        &self,
        broker_id: BrokerId,
        topic_filter: impl Into<String>,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let (events, receiver) = mpsc::unbounded_channel();
        let context = Arc::new(SubscriptionContext {
            broker_id,
            topic_filter: topic_filter.into(),
            events,
            terminated: AtomicBool::new(false),
        });

        tokio::spawn(drive(
            context,
            Arc::clone(&self.connections),
            self.config.clone(),
        ));

        futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
    }
}

/// Drive one subscription from acquisition to teardown.
async fn drive(
    context: Arc<SubscriptionContext>,
    connections: Arc<dyn ConnectionProvider>,
    config: BridgeConfig,
) {
    debug!(
        broker_id = %context.broker_id,
        topic = %context.topic_filter,
        "starting subscription stream"
    );

    // Acquiring. A failure here terminates without an unsubscribe attempt:
    // nothing was subscribed.
    let connection = match connections.acquire(&context.broker_id).await {
        Ok(connection) => connection,
        Err(err) => {
            error!(
                broker_id = %context.broker_id,
                error = %err,
                "connection acquisition failed for stream"
            );
            context.emit(StreamEvent::Error {
                code: ErrorCode::ClientConnect,
                message: format!("broker connection failed: {err}"),
            });
            context.begin_termination();
            return;
        }
    };

    // Subscribing. The context itself is the sink handed to the broker
    // connection; deliveries flow through the shared output channel.
    let sink: Arc<dyn MessageSink> = context.clone();
    let subscribed = tokio::time::timeout(
        config.subscribe_timeout,
        connection.subscribe(&context.topic_filter, QoS::AtLeastOnce, sink),
    )
    .await;

    match subscribed {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(
                broker_id = %context.broker_id,
                topic = %context.topic_filter,
                error = %err,
                "subscribe failed"
            );
            context.emit(StreamEvent::Error {
                code: ErrorCode::Subscribe,
                message: format!("subscribe failed: {err}"),
            });
            teardown(&context, connection.as_ref(), &config).await;
            return;
        }
        Err(_) => {
            error!(
                broker_id = %context.broker_id,
                topic = %context.topic_filter,
                "subscribe timed out"
            );
            context.emit(StreamEvent::Error {
                code: ErrorCode::Subscribe,
                message: format!(
                    "subscribe timed out after {:?}",
                    config.subscribe_timeout
                ),
            });
            teardown(&context, connection.as_ref(), &config).await;
            return;
        }
    }

    info!(
        broker_id = %context.broker_id,
        topic = %context.topic_filter,
        "subscription established"
    );
    context.emit(StreamEvent::Subscribed {
        topic: context.topic_filter.clone(),
    });

    // Streaming: heartbeats, the optional lifetime bound, and consumer
    // disconnect all run in this one task.
    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = config.stream_timeout.map(|timeout| Instant::now() + timeout);

    loop {
        tokio::select! {
            _ = context.events.closed() => {
                debug!(
                    broker_id = %context.broker_id,
                    topic = %context.topic_filter,
                    "stream consumer disconnected"
                );
                break;
            }
            _ = heartbeat.tick() => {
                if !context.emit(StreamEvent::Heartbeat) {
                    // The consumer vanished between the closed() check and
                    // the tick; the error below is best-effort, exactly like
                    // the rest of the teardown path.
                    context.emit(StreamEvent::Error {
                        code: ErrorCode::Heartbeat,
                        message: "keep-alive frame could not be written".to_string(),
                    });
                    break;
                }
            }
            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                warn!(
                    broker_id = %context.broker_id,
                    topic = %context.topic_filter,
                    "stream reached its configured lifetime"
                );
                context.emit(StreamEvent::Error {
                    code: ErrorCode::Timeout,
                    message: "stream timed out".to_string(),
                });
                break;
            }
        }
    }

    teardown(&context, connection.as_ref(), &config).await;
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // Branch is disabled by the select guard; never polled.
        None => std::future::pending().await,
    }
}

/// Tear the subscription down exactly once: mark terminal, then best-effort
/// unsubscribe bounded by the configured timeout. Unsubscribe failures are
/// logged and swallowed; cleanup always completes.
async fn teardown(
    context: &SubscriptionContext,
    connection: &dyn BrokerConnection,
    config: &BridgeConfig,
) {
    if !context.begin_termination() {
        return;
    }

    match connection
        .unsubscribe(&context.topic_filter, config.unsubscribe_timeout)
        .await
    {
        Ok(()) => {
            debug!(
                broker_id = %context.broker_id,
                topic = %context.topic_filter,
                "unsubscribed"
            );
        }
        Err(err) => {
            let err = crate::error::BridgeError::Unsubscribe(err.to_string());
            warn!(
                broker_id = %context.broker_id,
                topic = %context.topic_filter,
                error = %err,
                "unsubscribe failed during stream teardown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_on_the_wire() {
        assert_eq!(ErrorCode::ClientConnect.as_str(), "CLIENT_CONNECT");
        assert_eq!(ErrorCode::Subscribe.as_str(), "SUBSCRIBE");
        assert_eq!(ErrorCode::Send.as_str(), "SEND");
        assert_eq!(ErrorCode::Timeout.as_str(), "TIMEOUT");
        assert_eq!(ErrorCode::EmitterIo.as_str(), "EMITTER_IO");
        assert_eq!(ErrorCode::Heartbeat.as_str(), "HEARTBEAT");
    }

    #[test]
    fn termination_is_exactly_once() {
        let (events, _receiver) = mpsc::unbounded_channel();
        let context = SubscriptionContext {
            broker_id: BrokerId::new("1"),
            topic_filter: "a/b".to_string(),
            events,
            terminated: AtomicBool::new(false),
        };

        assert!(context.begin_termination());
        assert!(!context.begin_termination());
        assert!(!context.emit(StreamEvent::Heartbeat));
    }

    #[test]
    fn sink_decodes_payload_as_utf8() {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let context = SubscriptionContext {
            broker_id: BrokerId::new("1"),
            topic_filter: "a/b".to_string(),
            events,
            terminated: AtomicBool::new(false),
        };

        context.on_message(MessageDelivery {
            topic: "a/b".to_string(),
            payload: bytes::Bytes::from_static(b"{\"x\":1}"),
        });

        match receiver.try_recv().unwrap() {
            StreamEvent::Message { text } => assert_eq!(text, "{\"x\":1}"),
            other => panic!("expected message event, got {other:?}"),
        }
    }
}
