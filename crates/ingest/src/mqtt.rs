//! MQTT channel driver built on `rumqttc`.
//!
//! The event loop reconnects on its own after a connection error; the topic is
//! (re)subscribed after every `ConnAck` so a reconnect resumes delivery. A
//! subscribe request that does not fit the request channel is retried after
//! each later poll until it is queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bsn_core::config::MqttConfig;

use crate::error::IngestError;
use crate::handler::MessageHandler;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Capacity of the client request channel.
const REQUEST_CAPACITY: usize = 64;
const MIN_KEEP_ALIVE_SECS: u64 = 5;

pub fn qos_from_level(level: u8) -> Result<QoS, IngestError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(IngestError::InvalidQos(other)),
    }
}

/// Long-lived subscription to the telemetry topic.
pub struct MqttListener {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    qos: QoS,
    broker: String,
    handler: Arc<dyn MessageHandler>,
    connected: Arc<AtomicBool>,
    subscribe_pending: bool,
}

impl MqttListener {
    pub fn new(config: &MqttConfig, handler: Arc<dyn MessageHandler>) -> Result<Self, IngestError> {
        let (host, port) = config.broker_addr()?;
        let qos = qos_from_level(config.qos)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS)));
        options.set_clean_session(true);
        if let Some(user) = config.username.as_deref().filter(|u| !u.trim().is_empty()) {
            options.set_credentials(user, config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Ok(Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            qos,
            broker: config.broker.clone(),
            handler,
            connected: Arc::new(AtomicBool::new(false)),
            subscribe_pending: false,
        })
    }

    /// Shared flag tracking the broker session, for health reporting.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Drive the connection until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(broker = %self.broker, topic = %self.topic, "MQTT listener starting");

        loop {
            tokio::select! {
                polled = self.eventloop.poll() => self.handle(polled).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.disconnect().await;
        info!("MQTT listener stopped");
    }

    async fn handle(&mut self, polled: Result<Event, rumqttc::ConnectionError>) {
        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                self.connected.store(true, Ordering::Relaxed);
                info!(broker = %self.broker, "MQTT connected");
                self.subscribe_pending = true;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                self.handler.on_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!(pkid = ack.pkid, "MQTT subscription acknowledged");
            }
            Ok(_) => {}
            Err(e) => {
                self.subscribe_pending = false;
                if self.connected.swap(false, Ordering::Relaxed) {
                    warn!(broker = %self.broker, error = %e, "MQTT connection lost");
                } else {
                    warn!(broker = %self.broker, error = %e, "MQTT connection error");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
        self.retry_subscribe();
    }

    /// Queue the topic subscription if one is owed. `try_subscribe` because
    /// the event loop is polled on this task: an awaiting call could wait on
    /// itself when the request channel is full.
    fn retry_subscribe(&mut self) {
        if !self.subscribe_pending {
            return;
        }
        match self.subscribe() {
            Ok(()) => {
                self.subscribe_pending = false;
                info!(topic = %self.topic, "MQTT subscription requested");
            }
            Err(e) => warn!(topic = %self.topic, error = %e, "MQTT subscribe deferred to next poll"),
        }
    }

    fn subscribe(&self) -> Result<(), IngestError> {
        self.client.try_subscribe(self.topic.clone(), self.qos)?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if !self.connected.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "MQTT disconnect error");
            return;
        }
        // Keep polling until the DISCONNECT packet has been flushed.
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
            warn!("MQTT disconnect did not complete in time");
        }
        self.connected.store(false, Ordering::Relaxed);
    }
}
