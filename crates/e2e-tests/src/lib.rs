//! End-to-end test infrastructure for the index batcher.
//!
//! Provides a shared TestHarness and helpers for driving a
//! `BufferedSender` against the mock index client.

use std::sync::Arc;
use std::time::Duration;

use batcher_pipeline::mock::{MockIndexClient, RecordingHooks};
use batcher_pipeline::BufferedSender;
use batcher_types::SenderConfig;
use serde::Serialize;

/// Sample document type used across the tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotel {
    pub hotel_id: String,
    pub name: String,
    pub rating: u8,
}

/// Create one hotel document.
pub fn hotel(id: &str) -> Hotel {
    Hotel {
        hotel_id: id.to_string(),
        name: format!("Hotel {id}"),
        rating: 4,
    }
}

/// Create hotel documents for the given ids, in order.
pub fn hotels(ids: &[&str]) -> Vec<Hotel> {
    ids.iter().map(|id| hotel(id)).collect()
}

/// Create `count` hotels with ids `h0`, `h1`, ...
pub fn numbered_hotels(count: usize) -> Vec<Hotel> {
    (0..count).map(|i| hotel(&format!("h{i}"))).collect()
}

/// Config with auto-flush off and no throttling waits.
///
/// Only explicit `flush()`/`close()` calls submit anything.
pub fn manual_config() -> SenderConfig {
    SenderConfig::default()
        .with_auto_flush(false)
        .with_throttling_delay(Duration::ZERO, Duration::ZERO)
}

/// Shared test harness for E2E tests.
///
/// Wires a sender to a mock client and recording hooks, keyed by
/// `Hotel::hotel_id`.
pub struct TestHarness {
    /// Mock network collaborator
    pub client: Arc<MockIndexClient>,
    /// Every hook invocation, in order
    pub hooks: Arc<RecordingHooks>,
    /// Sender under test
    pub sender: BufferedSender<Hotel>,
}

impl TestHarness {
    /// Create a harness. Must be called inside a Tokio runtime.
    pub fn new(client: MockIndexClient, config: SenderConfig) -> Self {
        let client = Arc::new(client);
        let hooks = Arc::new(RecordingHooks::new());
        let sender = BufferedSender::<Hotel>::builder(client.clone())
            .config(config)
            .key_extractor(|hotel: &Hotel| hotel.hotel_id.clone())
            .hooks(hooks.clone())
            .build()
            .expect("Failed to build sender");

        Self {
            client,
            hooks,
            sender,
        }
    }

    /// Harness with auto-flush off and no throttling waits.
    pub fn manual(client: MockIndexClient) -> Self {
        Self::new(client, manual_config())
    }
}
