pub mod channel;
pub mod error;
pub mod hotplug;
pub mod registry;
pub mod supervised;
pub mod supervisor;
pub mod transcription;
pub mod types;

pub use channel::OutboundChannel;
pub use error::ChannelError;
pub use hotplug::{parse_udev_log, DeviceAction, DeviceEvent};
pub use registry::{ChannelRegistry, DispatcherStats, OutboundDispatcher};
pub use supervised::{ChannelState, SupervisedChannel};
pub use supervisor::ChannelSupervisor;
pub use types::{ChannelStatus, InboundMessage};
