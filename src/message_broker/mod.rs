// region:    --- Imports
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Kafka Producer

#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

impl KafkaProducer {
    pub fn new(brokers: &str) -> Self {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .expect("Producer creation error");

        KafkaProducer {
            producer: Arc::new(producer),
        }
    }

    /// Produce one message.
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        debug!(
            "{:<12} --> producing message: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, std::time::Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }
}

// endregion: --- Kafka Producer

// region:    --- Kafka Consumer

pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Self {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()
            .expect("Consumer creation failed");

        KafkaConsumer {
            consumer: Arc::new(consumer),
        }
    }

    /// Receive loop. Topics starting with `^` are regex subscriptions, so a
    /// single call can follow every per-auction topic as auctions appear.
    /// The handler gets the raw topic and payload; what counts as malformed
    /// is the handler's call, not the broker layer's.
    pub async fn consume<F, Fut>(
        &self,
        topics: &[&str],
        handler: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Fn(String, Vec<u8>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>>
            + Send
            + 'static,
    {
        info!(
            "{:<12} --> consuming from topics: {:?}",
            "Consumer", topics
        );
        self.consumer.subscribe(topics)?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    debug!(
                        "{:<12} --> message received: topic={}, partition={}, offset={}",
                        "Consumer",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    );

                    if let Some(payload) = message.payload() {
                        if let Err(e) =
                            handler(message.topic().to_string(), payload.to_vec()).await
                        {
                            error!("{:<12} --> handler error: {:?}", "Consumer", e);
                        }
                    } else {
                        warn!("{:<12} --> empty payload received", "Consumer");
                    }
                }
                Err(e) => error!("{:<12} --> receive error: {:?}", "Consumer", e),
            }
        }
    }
}

// endregion: --- Kafka Consumer

// region:    --- Kafka Manager

pub struct KafkaManager {
    producer: Arc<KafkaProducer>,
    consumer: Arc<KafkaConsumer>,
    brokers: String,
}

impl KafkaManager {
    pub fn new(brokers: &str, group_id: &str) -> Self {
        let producer = Arc::new(KafkaProducer::new(brokers));
        let consumer = Arc::new(KafkaConsumer::new(brokers, group_id));

        KafkaManager {
            producer,
            consumer,
            brokers: brokers.to_string(),
        }
    }

    pub fn get_producer(&self) -> Arc<KafkaProducer> {
        Arc::clone(&self.producer)
    }

    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    /// Round-trip a message through the broker to fail fast on a broken
    /// Kafka connection before the service starts accepting bids.
    pub async fn initialize(&self) -> Result<(), String> {
        info!("{:<12} --> Kafka initialization started", "Manager");

        self.consumer
            .consumer
            .subscribe(&["init-topic"])
            .map_err(|e| e.to_string())?;

        self.producer
            .send_message("init-topic", "init-key", "init-message")
            .await?;

        let mut attempts = 0;
        let max_attempts = 10;
        while attempts < max_attempts {
            match time::timeout(Duration::from_secs(1), self.consumer.consumer.recv()).await {
                Ok(Ok(message)) => {
                    if let Some(payload) = message.payload() {
                        if payload == b"init-message" {
                            info!("{:<12} --> Kafka init message confirmed", "Manager");
                            return Ok(());
                        }
                    }
                }
                Ok(Err(e)) => error!("{:<12} --> Kafka init receive error: {:?}", "Manager", e),
                Err(_) => {
                    attempts += 1;
                    warn!(
                        "{:<12} --> waiting for Kafka init message... (attempt: {}/{})",
                        "Manager", attempts, max_attempts
                    );
                }
            }
        }

        Err("Kafka init message was never received".to_string())
    }

    /// Create a topic. Called when an auction opens so its bid topic exists
    /// before the first watcher subscribes.
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!("{:<12} --> creating topic: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("AdminClient creation failed: {:?}", e))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        match admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
        {
            Ok(_) => {
                info!("{:<12} --> topic created: {}", "Manager", topic_name);
                Ok(())
            }
            Err(e) => {
                error!("{:<12} --> topic creation failed: {:?}", "Manager", e);
                Err(format!("Topic creation failed: {:?}", e))
            }
        }
    }
}

// endregion: --- Kafka Manager
