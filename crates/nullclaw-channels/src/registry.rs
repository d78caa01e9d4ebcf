//! Name-keyed map of outbound channel handles, plus the single-threaded
//! dispatcher that drains the bus into them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nullclaw_bus::{Bus, Recv};
use nullclaw_core::scrubber::scrub;
use tracing::{debug, warn};

use crate::channel::OutboundChannel;

/// Name-keyed map of registered outbound channels. `register` replaces any
/// existing entry under the same name.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn OutboundChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Arc<dyn OutboundChannel>) {
        let name = channel.name().to_string();
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OutboundChannel>> {
        self.channels.get(name).cloned()
    }
}

/// Running counters surfaced by the dispatcher for diagnostics.
#[derive(Default)]
pub struct DispatcherStats {
    pub events_dispatched: AtomicU64,
    pub events_dropped_unknown_channel: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Drains a [`Bus`] on one dedicated thread, routing each event to the
/// registered channel whose name matches `event.target_channel`.
pub struct OutboundDispatcher {
    registry: ChannelRegistry,
    bus: Arc<Bus>,
    stats: Arc<DispatcherStats>,
}

impl OutboundDispatcher {
    pub fn new(registry: ChannelRegistry, bus: Arc<Bus>) -> Self {
        Self {
            registry,
            bus,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DispatcherStats> {
        self.stats.clone()
    }

    /// Runs until the bus is closed and drained. Intended to be the body of
    /// a dedicated dispatcher thread.
    pub fn run(&self) {
        loop {
            match self.bus.recv() {
                Recv::Event(event) => {
                    match self.registry.get(&event.target_channel) {
                        Some(channel) => {
                            if let Err(e) = channel.send(&event) {
                                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    channel = %event.target_channel,
                                    error = %scrub(&e.to_string()),
                                    "send failed"
                                );
                            } else {
                                self.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        None => {
                            self.stats
                                .events_dropped_unknown_channel
                                .fetch_add(1, Ordering::Relaxed);
                            debug!(
                                channel = %scrub(&event.target_channel),
                                "dropping event for unknown channel"
                            );
                        }
                    }
                }
                Recv::EndOfStream => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nullclaw_bus::Event;
    use std::sync::Mutex;

    struct RecordingChannel {
        name: String,
        received: Mutex<Vec<String>>,
    }

    impl OutboundChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }
        fn send(&self, event: &Event) -> Result<(), crate::error::ChannelError> {
            self.received.lock().unwrap().push(event.payload.clone());
            Ok(())
        }
    }

    #[test]
    fn dispatches_known_channel_and_drops_unknown() {
        let bus = Arc::new(Bus::new());
        let mut registry = ChannelRegistry::new();
        let channel = Arc::new(RecordingChannel {
            name: "telegram".into(),
            received: Mutex::new(Vec::new()),
        });
        registry.register(channel.clone());

        bus.publish(Event::new("telegram", "hello"));
        bus.publish(Event::new("nowhere", "lost"));
        bus.close();

        let dispatcher = OutboundDispatcher::new(registry, bus);
        dispatcher.run();

        assert_eq!(channel.received.lock().unwrap().as_slice(), ["hello"]);
        let stats = dispatcher.stats();
        assert_eq!(stats.events_dispatched.load(Ordering::Relaxed), 1);
        assert_eq!(stats.events_dropped_unknown_channel.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn send_failure_increments_counter_and_continues() {
        struct AlwaysFails;
        impl OutboundChannel for AlwaysFails {
            fn name(&self) -> &str {
                "flaky"
            }
            fn send(&self, _event: &Event) -> Result<(), crate::error::ChannelError> {
                Err(crate::error::ChannelError::SendFailed("nope".into()))
            }
        }

        let bus = Arc::new(Bus::new());
        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(AlwaysFails));
        bus.publish(Event::new("flaky", "x"));
        bus.publish(Event::new("flaky", "y"));
        bus.close();

        let dispatcher = OutboundDispatcher::new(registry, bus);
        dispatcher.run();

        assert_eq!(dispatcher.stats().send_failures.load(Ordering::Relaxed), 2);
    }
}
