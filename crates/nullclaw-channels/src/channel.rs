use nullclaw_bus::Event;

use crate::error::ChannelError;

/// Common interface implemented by every outbound channel adapter. Calls run
/// on the dispatcher thread, so implementations should not block for long.
pub trait OutboundChannel: Send + Sync {
    /// Stable lowercase identifier, used as the registry key and the
    /// [`Event::target_channel`] match.
    fn name(&self) -> &str;

    /// Deliver one event.
    fn send(&self, event: &Event) -> Result<(), ChannelError>;

    /// Active health probe. Absent in the base implementation — a channel
    /// that has nothing cheap to probe reports healthy unconditionally.
    fn health_probe(&self) -> bool {
        true
    }
}
