//! Arena owning every channel and device of a simulated wireless network

use log::info;
use simple_wireless_core::{
    ChannelId, DeviceId, Mac48Address, NodeId, Packet, ProtocolNumber, SimTime,
};

use crate::channel::SimpleWirelessChannel;
use crate::config::{ChannelConfig, DeviceConfig};
use crate::context::{RadioContext, RadioEvent};
use crate::device::SimpleWirelessNetDevice;
use crate::RadioError;

/// Devices and channels addressed by index. Scheduled [`RadioEvent`]s are
/// handed back through [`WirelessNetwork::handle_event`].
#[derive(Default)]
pub struct WirelessNetwork {
    channels: Vec<SimpleWirelessChannel>,
    devices: Vec<SimpleWirelessNetDevice>,
    allocated_addresses: u64,
}

impl WirelessNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&mut self, config: &ChannelConfig) -> Result<ChannelId, RadioError> {
        let id = ChannelId(self.channels.len());
        self.channels.push(SimpleWirelessChannel::new(id, config)?);
        Ok(id)
    }

    /// Creates a device on `node` with the next free MAC address and
    /// attaches it to `channel`.
    pub fn add_device(
        &mut self,
        node: NodeId,
        channel: ChannelId,
        config: &DeviceConfig,
    ) -> Result<DeviceId, RadioError> {
        let address = Mac48Address::from_index(self.allocated_addresses + 1);
        let id = self.add_device_with_address(node, channel, address, config)?;
        self.allocated_addresses += 1;
        Ok(id)
    }

    pub fn add_device_with_address(
        &mut self,
        node: NodeId,
        channel: ChannelId,
        address: Mac48Address,
        config: &DeviceConfig,
    ) -> Result<DeviceId, RadioError> {
        let id = DeviceId(self.devices.len());
        let mut device = SimpleWirelessNetDevice::new(id, node, address, config)?;
        let chan = self
            .channels
            .get_mut(channel.0)
            .ok_or(RadioError::UnknownChannel(channel))?;
        let if_index = self.devices.iter().filter(|d| d.node() == node).count();
        device.set_if_index(if_index as u32);
        device.set_channel(channel);
        chan.attach(id, node);
        info!("Node {} gets {} ({}) on {}", node, id, address, channel);
        self.devices.push(device);
        Ok(id)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&SimpleWirelessChannel> {
        self.channels.get(id.0)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut SimpleWirelessChannel> {
        self.channels.get_mut(id.0)
    }

    pub fn channels(&self) -> &[SimpleWirelessChannel] {
        &self.channels
    }

    pub fn device(&self, id: DeviceId) -> Option<&SimpleWirelessNetDevice> {
        self.devices.get(id.0)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut SimpleWirelessNetDevice> {
        self.devices.get_mut(id.0)
    }

    pub fn devices(&self) -> &[SimpleWirelessNetDevice] {
        &self.devices
    }

    pub fn devices_of(&self, node: NodeId) -> impl Iterator<Item = &SimpleWirelessNetDevice> + '_ {
        self.devices.iter().filter(move |d| d.node() == node)
    }

    /// Turns on fixed contention and resets the neighbour count of every
    /// device already attached, so they contend from their first frame.
    pub fn enable_fixed_contention(
        &mut self,
        channel: ChannelId,
        range: f64,
    ) -> Result<(), RadioError> {
        let chan = self
            .channels
            .get_mut(channel.0)
            .ok_or(RadioError::UnknownChannel(channel))?;
        chan.set_fixed_contention(true);
        chan.set_fixed_contention_range(range);
        for attachment in chan.attachments() {
            if let Some(device) = self.devices.get_mut(attachment.device.0) {
                device.clear_neighbor_count();
            }
        }
        Ok(())
    }

    /// Builds the stochastic link tables. Call after every device is added.
    pub fn init_stochastic_model(&mut self, now: SimTime) {
        for channel in &mut self.channels {
            channel.init_stochastic_model(now);
        }
    }

    pub fn send<C: RadioContext>(
        &mut self,
        device: DeviceId,
        packet: Packet,
        to: Mac48Address,
        protocol: ProtocolNumber,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        let (dev, chan) = self.split(device)?;
        dev.send(packet, to, protocol, chan, ctx)
    }

    pub fn send_from<C: RadioContext>(
        &mut self,
        device: DeviceId,
        packet: Packet,
        from: Mac48Address,
        to: Mac48Address,
        protocol: ProtocolNumber,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        let (dev, chan) = self.split(device)?;
        dev.send_from(packet, from, to, protocol, chan, ctx)
    }

    /// Runs a previously scheduled event.
    pub fn handle_event<C: RadioContext>(
        &mut self,
        event: RadioEvent,
        ctx: &mut C,
    ) -> Result<(), RadioError> {
        match event {
            RadioEvent::TransmitComplete { device } => {
                let (dev, chan) = self.split(device)?;
                dev.transmit_complete(chan, ctx)
            }
            RadioEvent::Receive { device, arrival } => {
                let dev = self
                    .devices
                    .get_mut(device.0)
                    .ok_or(RadioError::UnknownDevice(device))?;
                dev.receive(arrival);
                Ok(())
            }
        }
    }

    fn split(
        &mut self,
        device: DeviceId,
    ) -> Result<(&mut SimpleWirelessNetDevice, &mut SimpleWirelessChannel), RadioError> {
        let dev = self
            .devices
            .get_mut(device.0)
            .ok_or(RadioError::UnknownDevice(device))?;
        let channel = dev.channel().ok_or(RadioError::UnknownDevice(device))?;
        let chan = self
            .channels
            .get_mut(channel.0)
            .ok_or(RadioError::UnknownChannel(channel))?;
        Ok((dev, chan))
    }
}
