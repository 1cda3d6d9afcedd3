//! Core value types for the simple wireless channel model

pub mod address;
pub mod packet;
pub mod time;
pub mod types;

pub use address::{AddressParseError, Mac48Address};
pub use packet::{Destination, EthernetHeader, Packet, PacketError, PacketTags, TaggedPacket};
pub use time::{DataRate, DataRateParseError, SimTime};
pub use types::{
    ChannelId, DeviceId, NodeId, PacketUid, ProtocolNumber, Vector3, DEFAULT_MTU,
    PROPAGATION_NS_PER_UNIT,
};
