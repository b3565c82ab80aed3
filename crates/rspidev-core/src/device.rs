//! The spidev device handle
//!
//! This module provides [`SpiDevice`], which owns one open spidev node and
//! the transfer parameters negotiated with the kernel for it.

use crate::bus::{Segment, SpiBus};
use crate::dump::hex_dump;
use crate::error::{Error, Param, Phase, Result};
use crate::spidev::SpidevBus;

use bitflags::bitflags;
use std::path::Path;

/// Default SPI clock speed in Hz (500 kHz)
pub const DEFAULT_SPEED_HZ: u32 = 500_000;

/// Default word size
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

bitflags! {
    /// SPI mode word, matching the kernel's 32-bit `SPI_MODE` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mode: u32 {
        /// Clock phase
        const CPHA = 0x01;
        /// Clock polarity
        const CPOL = 0x02;
        /// Chip select active high
        const CS_HIGH = 0x04;
        /// Least significant bit first
        const LSB_FIRST = 0x08;
        /// SI/SO signals shared (3-wire)
        const THREE_WIRE = 0x10;
        /// Loopback self-test mode
        const LOOP = 0x20;
        /// No chip select
        const NO_CS = 0x40;
        /// Slave pulls low to pause
        const READY = 0x80;
        /// Transmit on two lanes
        const TX_DUAL = 0x100;
        /// Transmit on four lanes
        const TX_QUAD = 0x200;
        /// Receive on two lanes
        const RX_DUAL = 0x400;
        /// Receive on four lanes
        const RX_QUAD = 0x800;
    }
}

impl Mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: Mode = Mode::empty();
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: Mode = Mode::CPHA;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: Mode = Mode::CPOL;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: Mode = Mode::CPOL.union(Mode::CPHA);
}

/// Requested parameters for opening a spidev device
///
/// These are requests, not guarantees: the kernel may coerce any of them,
/// and the open handle reports what the kernel actually accepted.
#[derive(Debug, Clone)]
pub struct Config {
    /// SPI mode flags
    pub mode: Mode,
    /// Word size for framing transfers
    pub bits_per_word: u8,
    /// Maximum clock speed in Hz
    pub speed_hz: u32,
    /// Delay after a transfer before chip select is changed, in microseconds
    pub delay_usecs: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::MODE_0,
            bits_per_word: DEFAULT_BITS_PER_WORD,
            speed_hz: DEFAULT_SPEED_HZ,
            delay_usecs: 0,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested SPI mode flags
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the requested word size
    pub fn with_bits_per_word(mut self, bits_per_word: u8) -> Self {
        self.bits_per_word = bits_per_word;
        self
    }

    /// Set the requested clock speed in Hz
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the post-transfer delay in microseconds
    pub fn with_delay(mut self, delay_usecs: u16) -> Self {
        self.delay_usecs = delay_usecs;
        self
    }
}

/// One open connection to a SPI character device.
///
/// The handle is binary: open or closed. `transfer` is the only operation
/// permitted while open; `close` is terminal and closing twice is an error.
#[derive(Debug)]
pub struct SpiDevice<B: SpiBus = SpidevBus> {
    /// `None` once closed; nothing touches the kernel in that state
    bus: Option<B>,
    mode: Mode,
    bits_per_word: u8,
    speed_hz: u32,
    delay_usecs: u16,
}

impl SpiDevice<SpidevBus> {
    /// Open the device node at `path` and negotiate `config` against it.
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let bus = SpidevBus::open(path).map_err(|e| Error::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::open_with(bus, config)
    }
}

impl<B: SpiBus> SpiDevice<B> {
    /// Negotiate `config` against an already-opened bus.
    ///
    /// Each parameter is written and then read back, in the order mode,
    /// bits per word, speed; the handle keeps the read-back values. The
    /// sequence aborts on the first ioctl failure, dropping the bus so the
    /// descriptor is released and no partially-configured handle escapes.
    pub fn open_with(mut bus: B, config: &Config) -> Result<Self> {
        bus.set_mode(config.mode.bits()).map_err(|e| Error::Config {
            param: Param::Mode,
            phase: Phase::Set,
            source: e,
        })?;
        let mode = Mode::from_bits_retain(bus.get_mode().map_err(|e| Error::Config {
            param: Param::Mode,
            phase: Phase::Get,
            source: e,
        })?);

        bus.set_bits_per_word(config.bits_per_word)
            .map_err(|e| Error::Config {
                param: Param::BitsPerWord,
                phase: Phase::Set,
                source: e,
            })?;
        let bits_per_word = bus.get_bits_per_word().map_err(|e| Error::Config {
            param: Param::BitsPerWord,
            phase: Phase::Get,
            source: e,
        })?;

        bus.set_max_speed_hz(config.speed_hz)
            .map_err(|e| Error::Config {
                param: Param::MaxSpeedHz,
                phase: Phase::Set,
                source: e,
            })?;
        let speed_hz = bus.get_max_speed_hz().map_err(|e| Error::Config {
            param: Param::MaxSpeedHz,
            phase: Phase::Get,
            source: e,
        })?;

        log::info!("spi mode: {:#x}", mode.bits());
        log::info!("bits per word: {}", bits_per_word);
        log::info!("max speed: {} Hz ({} kHz)", speed_hz, speed_hz / 1000);
        log::info!("delay: {} us", config.delay_usecs);

        Ok(Self {
            bus: Some(bus),
            mode,
            bits_per_word,
            speed_hz,
            delay_usecs: config.delay_usecs,
        })
    }

    /// Mode flags the kernel accepted
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Word size the kernel accepted
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Clock speed the kernel accepted, in Hz
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Post-transfer delay in microseconds
    pub fn delay_usecs(&self) -> u16 {
        self.delay_usecs
    }

    pub fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    /// Release the device node.
    ///
    /// Closing an already-closed handle is an error, not a no-op, so
    /// "nothing to close" stays distinguishable from success.
    pub fn close(&mut self) -> Result<()> {
        match self.bus.take() {
            Some(bus) => {
                drop(bus);
                log::debug!("spi device closed");
                Ok(())
            }
            None => Err(Error::NotOpen),
        }
    }

    /// Exchange `len` bytes with the peripheral.
    ///
    /// Builds one transfer descriptor carrying the negotiated delay, speed
    /// and word size and issues it as a single kernel message. Lane counts
    /// come from the mode flags (quad beats dual). Dual and quad variants
    /// are half-duplex on the wire, so unless loopback is enabled a
    /// multi-lane transmit mode drops the receive buffer from the descriptor
    /// and a multi-lane receive mode drops the transmit buffer.
    pub fn transfer(
        &mut self,
        tx: Option<&[u8]>,
        mut rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<()> {
        let bus = self.bus.as_mut().ok_or(Error::NotOpen)?;

        if let Some(buf) = tx {
            if buf.len() < len {
                return Err(Error::BufferTooSmall {
                    len,
                    capacity: buf.len(),
                });
            }
        }
        if let Some(buf) = rx.as_deref() {
            if buf.len() < len {
                return Err(Error::BufferTooSmall {
                    len,
                    capacity: buf.len(),
                });
            }
        }

        let tx_nbits = if self.mode.contains(Mode::TX_QUAD) {
            4
        } else if self.mode.contains(Mode::TX_DUAL) {
            2
        } else {
            0
        };
        let rx_nbits = if self.mode.contains(Mode::RX_QUAD) {
            4
        } else if self.mode.contains(Mode::RX_DUAL) {
            2
        } else {
            0
        };

        let mut tx_ref = tx;
        let mut rx_ref = rx.as_deref_mut();
        let mut rx_suppressed = false;
        if !self.mode.contains(Mode::LOOP) {
            if self.mode.intersects(Mode::TX_QUAD | Mode::TX_DUAL) {
                rx_ref = None;
                rx_suppressed = true;
            } else if self.mode.intersects(Mode::RX_QUAD | Mode::RX_DUAL) {
                tx_ref = None;
            }
        }

        if log::log_enabled!(log::Level::Trace) {
            if let Some(buf) = tx_ref {
                log::trace!("tx:\n{}", hex_dump(&buf[..len]));
            }
        }

        let mut segment = Segment {
            tx: tx_ref.map(|b| &b[..len]),
            rx: rx_ref.map(|b| &mut b[..len]),
            len: len as u32,
            speed_hz: self.speed_hz,
            delay_usecs: self.delay_usecs,
            bits_per_word: self.bits_per_word,
            tx_nbits,
            rx_nbits,
        };

        let transferred = bus.transfer(&mut segment).map_err(Error::Transfer)?;
        if transferred < len {
            return Err(Error::TransferIncomplete { len, transferred });
        }

        if log::log_enabled!(log::Level::Trace) && !rx_suppressed {
            if let Some(buf) = rx.as_deref() {
                log::trace!("rx:\n{}", hex_dump(&buf[..len]));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Segment, SpiBus};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailPoint {
        SetMode,
        GetBits,
        SetSpeed,
    }

    /// State shared with the test body so it survives the bus being
    /// consumed by `open_with`.
    #[derive(Debug, Default)]
    struct Shared {
        dropped: bool,
        transfers: usize,
        last_had_tx: Option<bool>,
        last_had_rx: Option<bool>,
        last_tx_nbits: Option<u8>,
    }

    /// Simulated kernel standing in for a real spidev descriptor.
    #[derive(Debug)]
    struct MockBus {
        mode: u32,
        bits: u8,
        speed: u32,
        /// Speed the kernel coerces any request to, when set
        accepted_speed: Option<u32>,
        fail: Option<FailPoint>,
        /// Report this many bytes fewer than requested
        short_by: usize,
        /// Copy tx into rx on transfer
        echo: bool,
        shared: Rc<RefCell<Shared>>,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                mode: 0,
                bits: 0,
                speed: 0,
                accepted_speed: None,
                fail: None,
                short_by: 0,
                echo: false,
                shared: Rc::default(),
            }
        }

        fn echo() -> Self {
            let mut bus = Self::new();
            bus.echo = true;
            bus
        }

        fn rejected() -> io::Error {
            io::Error::new(io::ErrorKind::InvalidInput, "rejected by kernel")
        }
    }

    impl SpiBus for MockBus {
        fn set_mode(&mut self, mode: u32) -> io::Result<()> {
            if self.fail == Some(FailPoint::SetMode) {
                return Err(Self::rejected());
            }
            self.mode = mode;
            Ok(())
        }

        fn get_mode(&mut self) -> io::Result<u32> {
            Ok(self.mode)
        }

        fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
            self.bits = bits;
            Ok(())
        }

        fn get_bits_per_word(&mut self) -> io::Result<u8> {
            if self.fail == Some(FailPoint::GetBits) {
                return Err(Self::rejected());
            }
            Ok(self.bits)
        }

        fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
            if self.fail == Some(FailPoint::SetSpeed) {
                return Err(Self::rejected());
            }
            self.speed = self.accepted_speed.unwrap_or(speed_hz);
            Ok(())
        }

        fn get_max_speed_hz(&mut self) -> io::Result<u32> {
            Ok(self.speed)
        }

        fn transfer(&mut self, segment: &mut Segment<'_>) -> io::Result<usize> {
            let mut shared = self.shared.borrow_mut();
            shared.transfers += 1;
            shared.last_had_tx = Some(segment.tx.is_some());
            shared.last_had_rx = Some(segment.rx.is_some());
            shared.last_tx_nbits = Some(segment.tx_nbits);
            if self.echo {
                if let (Some(tx), Some(rx)) = (segment.tx, segment.rx.as_deref_mut()) {
                    rx.copy_from_slice(tx);
                }
            }
            Ok((segment.len as usize).saturating_sub(self.short_by))
        }
    }

    impl Drop for MockBus {
        fn drop(&mut self) {
            self.shared.borrow_mut().dropped = true;
        }
    }

    #[test]
    fn handle_reports_what_the_kernel_accepted() {
        let mut bus = MockBus::new();
        bus.accepted_speed = Some(400_000);
        let config = Config::new()
            .with_mode(Mode::MODE_3)
            .with_bits_per_word(8)
            .with_speed(500_000)
            .with_delay(10);
        let dev = SpiDevice::open_with(bus, &config).unwrap();
        assert_eq!(dev.mode(), Mode::MODE_3);
        assert_eq!(dev.bits_per_word(), 8);
        assert_eq!(dev.speed_hz(), 400_000);
        assert_eq!(dev.delay_usecs(), 10);
    }

    #[test]
    fn transfer_on_closed_handle_never_reaches_bus() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let mut dev = SpiDevice::open_with(bus, &Config::new()).unwrap();
        dev.close().unwrap();

        let mut rx = [0u8; 2];
        let err = dev.transfer(Some(&[1, 2]), Some(&mut rx), 2).unwrap_err();
        assert!(matches!(err, Error::NotOpen));
        assert_eq!(shared.borrow().transfers, 0);
    }

    #[test]
    fn close_is_terminal() {
        let mut dev = SpiDevice::open_with(MockBus::new(), &Config::new()).unwrap();
        assert!(dev.is_open());
        dev.close().unwrap();
        assert!(!dev.is_open());
        assert!(matches!(dev.close(), Err(Error::NotOpen)));
    }

    #[test]
    fn length_beyond_capacity_is_rejected() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let mut dev = SpiDevice::open_with(bus, &Config::new()).unwrap();

        let err = dev.transfer(Some(&[0u8; 2]), None, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferTooSmall { len: 4, capacity: 2 }
        ));
        assert_eq!(shared.borrow().transfers, 0);
    }

    #[test]
    fn dual_tx_without_loopback_clears_rx() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let config = Config::new().with_mode(Mode::TX_DUAL);
        let mut dev = SpiDevice::open_with(bus, &config).unwrap();

        let mut rx = [0u8; 4];
        dev.transfer(Some(&[0u8; 4]), Some(&mut rx), 4).unwrap();
        let shared = shared.borrow();
        assert_eq!(shared.last_had_tx, Some(true));
        assert_eq!(shared.last_had_rx, Some(false));
        assert_eq!(shared.last_tx_nbits, Some(2));
    }

    #[test]
    fn loopback_keeps_rx_alongside_dual_tx() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let config = Config::new().with_mode(Mode::LOOP | Mode::TX_DUAL);
        let mut dev = SpiDevice::open_with(bus, &config).unwrap();

        let mut rx = [0u8; 4];
        dev.transfer(Some(&[0u8; 4]), Some(&mut rx), 4).unwrap();
        assert_eq!(shared.borrow().last_had_rx, Some(true));
    }

    #[test]
    fn multi_lane_rx_clears_tx() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let config = Config::new().with_mode(Mode::RX_QUAD);
        let mut dev = SpiDevice::open_with(bus, &config).unwrap();

        let mut rx = [0u8; 4];
        dev.transfer(Some(&[0u8; 4]), Some(&mut rx), 4).unwrap();
        let shared = shared.borrow();
        assert_eq!(shared.last_had_tx, Some(false));
        assert_eq!(shared.last_had_rx, Some(true));
    }

    #[test]
    fn quad_beats_dual_for_lane_count() {
        let bus = MockBus::new();
        let shared = bus.shared.clone();
        let config = Config::new().with_mode(Mode::LOOP | Mode::TX_DUAL | Mode::TX_QUAD);
        let mut dev = SpiDevice::open_with(bus, &config).unwrap();

        dev.transfer(Some(&[0u8; 4]), None, 4).unwrap();
        assert_eq!(shared.borrow().last_tx_nbits, Some(4));
    }

    #[test]
    fn short_transfer_is_an_error() {
        let mut bus = MockBus::new();
        bus.short_by = 1;
        let mut dev = SpiDevice::open_with(bus, &Config::new()).unwrap();

        let err = dev.transfer(Some(&[0u8; 4]), None, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::TransferIncomplete {
                len: 4,
                transferred: 3
            }
        ));
    }

    #[test]
    fn full_duplex_echo_round_trip() {
        let bus = MockBus::echo();
        let config = Config::new()
            .with_mode(Mode::MODE_0)
            .with_bits_per_word(8)
            .with_speed(500_000);
        let mut dev = SpiDevice::open_with(bus, &config).unwrap();
        assert_eq!(dev.mode(), Mode::MODE_0);
        assert_eq!(dev.bits_per_word(), 8);
        assert_eq!(dev.speed_hz(), 500_000);

        let tx = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut rx = [0u8; 4];
        dev.transfer(Some(&tx), Some(&mut rx), 4).unwrap();
        assert_eq!(rx, tx);
        dev.close().unwrap();
    }

    #[test]
    fn failed_negotiation_releases_the_bus() {
        let mut bus = MockBus::new();
        bus.fail = Some(FailPoint::SetSpeed);
        let shared = bus.shared.clone();

        let err = SpiDevice::open_with(bus, &Config::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                param: Param::MaxSpeedHz,
                phase: Phase::Set,
                ..
            }
        ));
        assert!(shared.borrow().dropped);
    }

    #[test]
    fn set_and_get_phases_are_distinguished() {
        let mut bus = MockBus::new();
        bus.fail = Some(FailPoint::SetMode);
        let err = SpiDevice::open_with(bus, &Config::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                param: Param::Mode,
                phase: Phase::Set,
                ..
            }
        ));

        let mut bus = MockBus::new();
        bus.fail = Some(FailPoint::GetBits);
        let err = SpiDevice::open_with(bus, &Config::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                param: Param::BitsPerWord,
                phase: Phase::Get,
                ..
            }
        ));
    }

    #[test]
    fn open_missing_device_holds_no_descriptor() {
        let err = SpiDevice::open("/dev/spidev-test-missing", &Config::new()).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }
}
