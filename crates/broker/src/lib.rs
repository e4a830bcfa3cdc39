//! Broker-facing components: partition commit gate (§4.2), consumer
//! runtime (§4.3), partition sequencer (§4.4), and dead-letter pipeline
//! (§4.5).

pub mod config;
pub mod consumer;
pub mod dlq;
pub mod gate;
pub mod producer;
pub mod sequencer;
pub mod topics;

pub use config::{ConsumerProfile, ConsumerRuntimeConfig};
pub use consumer::{ConsumerRuntime, KafkaOffsetClient, RuntimeContext};
pub use dlq::{DlqEnvelope, DlqProducer, DlqSink};
pub use gate::{OffsetCommitter, OffsetStore, PartitionGate};
pub use producer::{OutboundMessage, Producer};
pub use sequencer::PartitionSequencer;
pub use topics::TopicSpec;
