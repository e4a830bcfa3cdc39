//! Recorder persistence core (§4.6): transforms Kafka records into
//! conversation rows and persists them with classified retry.

pub mod client;
pub mod config;
pub mod insert;
pub mod model;
pub mod pipeline;

pub use client::RecorderClient;
pub use config::RecorderConfig;
pub use insert::{insert_rows, InsertOutcome};
pub use model::{expand_rows, ConversationRow, ConversationSource, QaPair};
pub use pipeline::process_record;
