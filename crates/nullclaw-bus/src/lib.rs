//! A closable FIFO queue of outbound [`Event`]s: many producers, one
//! consumer. Used to decouple the provider pipeline from the channel
//! dispatcher.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// An outbound message bound for a named channel.
#[derive(Debug, Clone)]
pub struct Event {
    pub target_channel: String,
    pub chat_id: Option<String>,
    pub payload: String,
    pub enqueued_at: i64,
}

impl Event {
    pub fn new(target_channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            target_channel: target_channel.into(),
            chat_id: None,
            payload: payload.into(),
            enqueued_at: now_secs(),
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Result of a [`Bus::recv`] call.
#[derive(Debug)]
pub enum Recv {
    Event(Event),
    EndOfStream,
}

struct State {
    queue: VecDeque<Event>,
    closed: bool,
}

/// A closable single-consumer event queue.
///
/// `publish` after `close()` is a silent no-op: this matches the
/// dispatcher's log-and-drop treatment of unreachable targets and keeps
/// callers from needing to handle a late-shutdown error path.
pub struct Bus {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Append an event. Never blocks beyond acquiring the mutex.
    pub fn publish(&self, event: Event) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.queue.push_back(event);
        self.condvar.notify_one();
    }

    /// Block until an event is available or the bus is closed and drained.
    pub fn recv(&self) -> Recv {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Recv::Event(event);
            }
            if state.closed {
                return Recv::EndOfStream;
            }
            state = self.condvar.wait(state).unwrap();
        }
    }

    /// Mark the bus closed and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_then_close_delivers_all_queued_events_in_order() {
        let bus = Bus::new();
        for i in 0..5 {
            bus.publish(Event::new("chan", format!("msg-{i}")));
        }
        bus.close();

        for i in 0..5 {
            match bus.recv() {
                Recv::Event(e) => assert_eq!(e.payload, format!("msg-{i}")),
                Recv::EndOfStream => panic!("ended early"),
            }
        }
        assert!(matches!(bus.recv(), Recv::EndOfStream));
        assert!(matches!(bus.recv(), Recv::EndOfStream));
    }

    #[test]
    fn publish_after_close_is_silent_no_op() {
        let bus = Bus::new();
        bus.close();
        bus.publish(Event::new("chan", "too late"));
        assert!(matches!(bus.recv(), Recv::EndOfStream));
    }

    #[test]
    fn recv_blocks_until_publish_from_another_thread() {
        let bus = Arc::new(Bus::new());
        let producer = {
            let bus = bus.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                bus.publish(Event::new("chan", "hello"));
                bus.close();
            })
        };

        match bus.recv() {
            Recv::Event(e) => assert_eq!(e.payload, "hello"),
            Recv::EndOfStream => panic!("expected an event"),
        }
        assert!(matches!(bus.recv(), Recv::EndOfStream));
        producer.join().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let bus = Bus::new();
        bus.close();
        bus.close();
        assert!(bus.is_closed());
    }
}
