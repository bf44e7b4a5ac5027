//! `rumqttc`-backed implementation of the broker client seam.
//!
//! Each connection owns one driver task polling the `rumqttc` event loop.
//! The driver routes incoming publishes to registered sinks, completes
//! acknowledgement waiters, and reconnects with exponential backoff after a
//! transport drop. Requests made through `AsyncClient` only queue packets;
//! the acknowledgement waiters are what turn the queue-only API into the
//! ack-resolving contract of [`BrokerConnection`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, SubscribeReasonCode};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{BrokerConnection, BrokerConnector, MessageSink};
use crate::error::{ClientError, Result};
use crate::topic;
use crate::types::{BrokerDescriptor, Credentials, MessageDelivery, QoS};

/// Tunables for the rumqttc transport.
#[derive(Debug, Clone)]
pub struct RumqttOptions {
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Capacity of the request channel between client handles and the event loop
    pub request_capacity: usize,
    /// Initial delay before a reconnect attempt
    pub reconnect_min_delay: Duration,
    /// Upper bound for the reconnect backoff
    pub reconnect_max_delay: Duration,
}

impl Default for RumqttOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            request_capacity: 64,
            reconnect_min_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Transport state as observed by the driver task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected(String),
}

/// FIFO of acknowledgement waiters for one packet type.
///
/// The broker acknowledges requests in submission order on a single
/// connection, so a FIFO is sufficient: every successfully queued request
/// registers exactly one waiter, and every acknowledgement completes the
/// oldest one. Requests that fail to queue cancel their waiter by token so
/// the queue never drifts out of step with the wire.
#[derive(Default)]
struct AckQueue {
    waiters: Mutex<VecDeque<(u64, oneshot::Sender<()>)>>,
    next_token: AtomicU64,
}

impl AckQueue {
    fn register(&self) -> (u64, oneshot::Receiver<()>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("ack queue lock poisoned")
            .push_back((token, tx));
        (token, rx)
    }

    fn cancel(&self, token: u64) {
        self.waiters
            .lock()
            .expect("ack queue lock poisoned")
            .retain(|(t, _)| *t != token);
    }

    /// Complete the oldest waiter; on `ok == false` the waiter's sender is
    /// dropped so the receiver observes a failure.
    fn complete_next(&self, ok: bool) {
        let waiter = self
            .waiters
            .lock()
            .expect("ack queue lock poisoned")
            .pop_front();
        if let Some((_, tx)) = waiter {
            if ok {
                let _ = tx.send(());
            }
        }
    }

    fn fail_all(&self) {
        self.waiters
            .lock()
            .expect("ack queue lock poisoned")
            .clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiters.lock().expect("ack queue lock poisoned").len()
    }
}

/// Waiter queues for every acknowledged packet type.
#[derive(Default)]
struct AckRegistry {
    sub: AckQueue,
    unsub: AckQueue,
    puback: AckQueue,
    pubcomp: AckQueue,
}

impl AckRegistry {
    fn fail_all(&self) {
        self.sub.fail_all();
        self.unsub.fail_all();
        self.puback.fail_all();
        self.pubcomp.fail_all();
    }
}

/// A registered subscription sink with the QoS needed for resubscription.
///
/// A filter can carry several sinks (independent consumers of the same
/// filter on one shared connection); a wire-level unsubscribe for the
/// filter detaches all of them, matching MQTT unsubscribe semantics.
struct SinkEntry {
    qos: QoS,
    sink: Arc<dyn MessageSink>,
}

/// Production connector building rumqttc connections.
#[derive(Debug, Default)]
pub struct RumqttConnector {
    options: RumqttOptions,
}

impl RumqttConnector {
    /// Create a connector with the given transport tunables.
    pub fn new(options: RumqttOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    async fn connect(
        &self,
        descriptor: &BrokerDescriptor,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Arc<dyn BrokerConnection>> {
        let client_id = format!("http-bridge-{}", Uuid::new_v4());
        let mut mqtt_options = MqttOptions::new(client_id, descriptor.host.clone(), descriptor.port);
        mqtt_options.set_credentials(credentials.username.as_str(), credentials.password.as_str());
        mqtt_options.set_keep_alive(self.options.keep_alive);
        mqtt_options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(mqtt_options, self.options.request_capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let sinks: Arc<DashMap<String, Vec<SinkEntry>>> = Arc::new(DashMap::new());
        let acks = Arc::new(AckRegistry::default());
        let closed = Arc::new(AtomicBool::new(false));
        let broker = format!("{}:{}", descriptor.host, descriptor.port);

        debug!(broker = %broker, broker_id = %descriptor.id, "connecting");
        tokio::spawn(drive(
            event_loop,
            client.clone(),
            status_tx,
            Arc::clone(&sinks),
            Arc::clone(&acks),
            Arc::clone(&closed),
            self.options.clone(),
            broker.clone(),
        ));

        let connection = Arc::new(RumqttConnection {
            client,
            status: status_rx.clone(),
            sinks,
            acks,
            closed,
            broker: broker.clone(),
        });

        match tokio::time::timeout(timeout, wait_for_connection(status_rx)).await {
            Ok(ConnectionStatus::Connected) => {
                info!(broker = %broker, broker_id = %descriptor.id, "connected");
                Ok(connection)
            }
            Ok(ConnectionStatus::Disconnected(reason)) => {
                connection.disconnect().await;
                Err(ClientError::Connect(reason))
            }
            // wait_for_connection never yields Connecting
            Ok(ConnectionStatus::Connecting) => {
                connection.disconnect().await;
                Err(ClientError::Connect("connection never left the connecting state".to_string()))
            }
            Err(_) => {
                connection.disconnect().await;
                Err(ClientError::ConnectTimeout(timeout))
            }
        }
    }
}

/// Wait for the driver to report a terminal connect outcome.
async fn wait_for_connection(mut status: watch::Receiver<ConnectionStatus>) -> ConnectionStatus {
    loop {
        let current = status.borrow().clone();
        match current {
            ConnectionStatus::Connecting => {
                if status.changed().await.is_err() {
                    return ConnectionStatus::Disconnected(
                        "connection driver exited".to_string(),
                    );
                }
            }
            other => return other,
        }
    }
}

struct RumqttConnection {
    client: AsyncClient,
    status: watch::Receiver<ConnectionStatus>,
    sinks: Arc<DashMap<String, Vec<SinkEntry>>>,
    acks: Arc<AckRegistry>,
    closed: Arc<AtomicBool>,
    broker: String,
}

impl RumqttConnection {
    /// Detach one sink from a filter, dropping the filter entry when it was
    /// the last one.
    fn remove_sink(&self, filter: &str, sink: &Arc<dyn MessageSink>) {
        if let Some(mut entry) = self.sinks.get_mut(filter) {
            entry.retain(|holder| !Arc::ptr_eq(&holder.sink, sink));
            let emptied = entry.is_empty();
            drop(entry);
            if emptied {
                self.sinks.remove_if(filter, |_, holders| holders.is_empty());
            }
        }
    }
}

#[async_trait]
impl BrokerConnection for RumqttConnection {
    fn is_connected(&self) -> bool {
        matches!(*self.status.borrow(), ConnectionStatus::Connected)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        let waiter = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some((&self.acks.puback, self.acks.puback.register())),
            QoS::ExactlyOnce => Some((&self.acks.pubcomp, self.acks.pubcomp.register())),
        };

        if let Err(err) = self
            .client
            .publish(topic.to_string(), to_rumqtt_qos(qos), retain, payload)
            .await
        {
            if let Some((queue, (token, _))) = &waiter {
                queue.cancel(*token);
            }
            return Err(ClientError::Publish(err.to_string()));
        }

        if let Some((_, (_, rx))) = waiter {
            rx.await.map_err(|_| {
                ClientError::Publish("connection lost before publish acknowledgement".to_string())
            })?;
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS, sink: Arc<dyn MessageSink>) -> Result<()> {
        topic::validate_filter(filter)?;
        self.sinks
            .entry(filter.to_string())
            .or_default()
            .push(SinkEntry {
                qos,
                sink: Arc::clone(&sink),
            });

        let (token, rx) = self.acks.sub.register();
        if let Err(err) = self
            .client
            .subscribe(filter.to_string(), to_rumqtt_qos(qos))
            .await
        {
            self.acks.sub.cancel(token);
            self.remove_sink(filter, &sink);
            return Err(ClientError::Subscribe(err.to_string()));
        }

        match rx.await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.remove_sink(filter, &sink);
                Err(ClientError::Subscribe(
                    "subscription rejected or connection lost before acknowledgement".to_string(),
                ))
            }
        }
    }

    async fn unsubscribe(&self, filter: &str, timeout: Duration) -> Result<()> {
        // Stop deliveries before the wire round-trip.
        self.sinks.remove(filter);

        let (token, rx) = self.acks.unsub.register();
        if let Err(err) = self.client.unsubscribe(filter.to_string()).await {
            self.acks.unsub.cancel(token);
            return Err(ClientError::Unsubscribe(err.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ClientError::Unsubscribe(
                "connection lost before unsubscribe acknowledgement".to_string(),
            )),
            Err(_) => Err(ClientError::Unsubscribe(format!(
                "no acknowledgement within {timeout:?}"
            ))),
        }
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.acks.fail_all();
        if let Err(err) = self.client.disconnect().await {
            debug!(broker = %self.broker, error = %err, "disconnect request failed");
        }
    }
}

/// Event-loop driver: one task per connection.
#[allow(clippy::too_many_arguments)]
async fn drive(
    mut event_loop: EventLoop,
    client: AsyncClient,
    status_tx: watch::Sender<ConnectionStatus>,
    sinks: Arc<DashMap<String, Vec<SinkEntry>>>,
    acks: Arc<AckRegistry>,
    closed: Arc<AtomicBool>,
    options: RumqttOptions,
    broker: String,
) {
    let mut ever_connected = false;
    let mut reconnect_delay = options.reconnect_min_delay;

    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }

        match event_loop.poll().await {
            Ok(Event::Incoming(packet)) => match packet {
                Packet::ConnAck(ack) => {
                    if ack.code == ConnectReturnCode::Success {
                        if ever_connected {
                            info!(broker = %broker, "reconnected, restoring subscriptions");
                            resubscribe(&client, &sinks, &acks, &broker);
                        } else {
                            debug!(broker = %broker, "connection acknowledged");
                        }
                        ever_connected = true;
                        reconnect_delay = options.reconnect_min_delay;
                        if status_tx.send(ConnectionStatus::Connected).is_err() {
                            // Every handle to this connection is gone; nobody
                            // can ever use it.
                            debug!(broker = %broker, "connection orphaned, stopping driver");
                            break;
                        }
                    } else {
                        let reason = format!("broker refused connection: {:?}", ack.code);
                        let observed = status_tx
                            .send(ConnectionStatus::Disconnected(reason))
                            .is_ok();
                        acks.fail_all();
                        if !ever_connected || !observed {
                            break;
                        }
                    }
                }
                Packet::Publish(publish) => {
                    for entry in sinks.iter() {
                        if topic::matches_filter(&publish.topic, entry.key()) {
                            for holder in entry.value() {
                                holder.sink.on_message(MessageDelivery {
                                    topic: publish.topic.clone(),
                                    payload: publish.payload.clone(),
                                });
                            }
                        }
                    }
                }
                Packet::SubAck(ack) => {
                    let rejected = ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure));
                    acks.sub.complete_next(!rejected);
                }
                Packet::UnsubAck(_) => acks.unsub.complete_next(true),
                Packet::PubAck(_) => acks.puback.complete_next(true),
                Packet::PubComp(_) => acks.pubcomp.complete_next(true),
                Packet::Disconnect => {
                    let observed = status_tx
                        .send(ConnectionStatus::Disconnected(
                            "broker closed the connection".to_string(),
                        ))
                        .is_ok();
                    acks.fail_all();
                    if !observed {
                        break;
                    }
                }
                _ => {}
            },
            Ok(Event::Outgoing(_)) => {}
            Err(err) => {
                let reason = err.to_string();
                let observed = status_tx
                    .send(ConnectionStatus::Disconnected(reason.clone()))
                    .is_ok();
                acks.fail_all();

                if closed.load(Ordering::Acquire) {
                    debug!(broker = %broker, "connection driver stopped");
                    break;
                }
                if !observed {
                    debug!(broker = %broker, "connection orphaned, stopping driver");
                    break;
                }
                if !ever_connected {
                    warn!(broker = %broker, error = %reason, "initial connect failed");
                    break;
                }

                warn!(
                    broker = %broker,
                    error = %reason,
                    delay = ?reconnect_delay,
                    "transport dropped, reconnecting"
                );
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(options.reconnect_max_delay);
            }
        }
    }
}

/// Re-issue subscribe requests for every registered sink after a reconnect.
///
/// Placeholder waiters keep the suback queue aligned with the wire; nobody
/// observes these acknowledgements.
fn resubscribe(
    client: &AsyncClient,
    sinks: &DashMap<String, Vec<SinkEntry>>,
    acks: &AckRegistry,
    broker: &str,
) {
    for entry in sinks.iter() {
        let Some(qos) = entry.value().first().map(|holder| holder.qos) else {
            continue;
        };
        let (token, rx) = acks.sub.register();
        drop(rx);
        if let Err(err) = client.try_subscribe(entry.key().clone(), to_rumqtt_qos(qos)) {
            acks.sub.cancel(token);
            warn!(
                broker = %broker,
                filter = %entry.key(),
                error = %err,
                "failed to restore subscription after reconnect"
            );
        }
    }
}

fn to_rumqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_queue_completes_in_order() {
        let queue = AckQueue::default();
        let (_t1, mut rx1) = queue.register();
        let (_t2, mut rx2) = queue.register();

        queue.complete_next(true);
        assert!(matches!(rx1.try_recv(), Ok(())));
        assert!(rx2.try_recv().is_err());

        queue.complete_next(true);
        assert!(matches!(rx2.try_recv(), Ok(())));
    }

    #[test]
    fn ack_queue_failure_drops_sender() {
        let queue = AckQueue::default();
        let (_token, rx) = queue.register();
        queue.complete_next(false);
        assert!(tokio_test::block_on(rx).is_err());
    }

    #[test]
    fn ack_queue_cancel_removes_only_the_token() {
        let queue = AckQueue::default();
        let (t1, rx1) = queue.register();
        let (_t2, mut rx2) = queue.register();

        queue.cancel(t1);
        assert_eq!(queue.len(), 1);
        drop(rx1);

        queue.complete_next(true);
        assert!(matches!(rx2.try_recv(), Ok(())));
    }

    #[test]
    fn ack_queue_fail_all_clears_waiters() {
        let queue = AckQueue::default();
        let (_t, rx) = queue.register();
        queue.fail_all();
        assert_eq!(queue.len(), 0);
        assert!(tokio_test::block_on(rx).is_err());
    }

    #[test]
    fn qos_conversion() {
        assert_eq!(to_rumqtt_qos(QoS::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(to_rumqtt_qos(QoS::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
        assert_eq!(to_rumqtt_qos(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }
}
