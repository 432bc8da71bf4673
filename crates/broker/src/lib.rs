//! `ad-broker`: durable topic log on Redis streams.
//!
//! Topics are streams, consumers are consumer groups, and delivery is
//! at-least-once: a message is acknowledged after its callback returns,
//! and callback failures are appended to a bounded `{topic}-dlq` stream
//! before the ack so nothing is silently lost.

mod broker;
mod connect;
mod envelope;

pub use broker::{dlq_topic, Broker, ConsumerOptions};
pub use connect::RedisConnector;
pub use envelope::{Envelope, EnvelopeError, EnvelopeMetadata};
