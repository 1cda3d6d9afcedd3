//! pcap export of sniffed frames

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use log::{trace, warn};
use simple_wireless_core::{DeviceId, EthernetHeader, Packet, SimTime};
use simple_wireless_radio::DeviceObserver;

use crate::simulator::SimClock;

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION: (u16, u16) = (2, 4);
const SNAPLEN: u32 = 65_535;
/// Ethernet link type.
pub const DLT_EN10MB: u32 = 1;

/// Classic little-endian pcap writer with microsecond timestamps.
pub struct PcapWriter<W: Write> {
    out: W,
    packets: u64,
}

impl PcapWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(&PCAP_MAGIC.to_le_bytes())?;
        out.write_all(&PCAP_VERSION.0.to_le_bytes())?;
        out.write_all(&PCAP_VERSION.1.to_le_bytes())?;
        out.write_all(&0i32.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&SNAPLEN.to_le_bytes())?;
        out.write_all(&DLT_EN10MB.to_le_bytes())?;
        Ok(Self { out, packets: 0 })
    }

    pub fn write_frame(&mut self, at: SimTime, frame: &[u8]) -> io::Result<()> {
        let nanos = at.as_nanos();
        let secs = (nanos / 1_000_000_000) as u32;
        let micros = ((nanos % 1_000_000_000) / 1_000) as u32;
        let captured = frame.len().min(SNAPLEN as usize);
        self.out.write_all(&secs.to_le_bytes())?;
        self.out.write_all(&micros.to_le_bytes())?;
        self.out.write_all(&(captured as u32).to_le_bytes())?;
        self.out.write_all(&(frame.len() as u32).to_le_bytes())?;
        self.out.write_all(&frame[..captured])?;
        self.packets += 1;
        Ok(())
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Writes every sniffed frame of the devices it observes to one capture.
/// Write failures are logged and counted; the simulation carries on.
pub struct PcapObserver<W: Write> {
    writer: Rc<RefCell<PcapWriter<W>>>,
    clock: SimClock,
    failures: Rc<Cell<u64>>,
}

impl<W: Write> PcapObserver<W> {
    pub fn new(writer: Rc<RefCell<PcapWriter<W>>>, clock: SimClock) -> Self {
        Self {
            writer,
            clock,
            failures: Rc::default(),
        }
    }

    /// Handle on the failure count that stays readable after the observer
    /// is handed to a device.
    pub fn failures(&self) -> Rc<Cell<u64>> {
        self.failures.clone()
    }
}

impl<W: Write> DeviceObserver for PcapObserver<W> {
    fn sniffer(&mut self, device: DeviceId, frame: &Packet) {
        let data = frame.data();
        trace!(
            "{} sniffed {} bytes, header {}",
            device,
            data.len(),
            hex::encode(&data[..data.len().min(EthernetHeader::SIZE)])
        );
        if let Err(e) = self.writer.borrow_mut().write_frame(self.clock.now(), data) {
            warn!("{} pcap write failed: {}", device, e);
            self.failures.set(self.failures.get() + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layout() {
        let mut writer = PcapWriter::new(Vec::new()).unwrap();
        writer
            .write_frame(SimTime::from_micros(1_500_002), &[0xaa; 20])
            .unwrap();
        assert_eq!(writer.packets(), 1);
        let bytes = writer.into_inner();

        assert_eq!(bytes.len(), 24 + 16 + 20);
        assert_eq!(&bytes[0..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), DLT_EN10MB);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 500_002);
        assert_eq!(u32::from_le_bytes(bytes[32..36].try_into().unwrap()), 20);
        assert_eq!(&bytes[40..], &[0xaa; 20]);
    }

    #[test]
    fn test_observer_writes_sniffed_frames() {
        let writer = Rc::new(RefCell::new(PcapWriter::new(Vec::new()).unwrap()));
        let mut observer = PcapObserver::new(writer.clone(), SimClock::default());
        observer.sniffer(DeviceId(0), &Packet::new(60));
        observer.sniffer(DeviceId(1), &Packet::new(14));
        assert_eq!(writer.borrow().packets(), 2);
        assert_eq!(observer.failures().get(), 0);
    }
}
