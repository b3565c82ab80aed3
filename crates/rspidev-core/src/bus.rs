//! The kernel bus seam
//!
//! `SpiBus` is the narrow capability surface the device handle drives:
//! set/get for each negotiated parameter plus a one-segment transfer. The
//! real implementation is [`crate::spidev::SpidevBus`]; tests supply a
//! simulated bus instead.

use std::io;

/// One transfer descriptor, the safe image of the kernel's
/// `struct spi_ioc_transfer`.
///
/// Absent buffers become null pointers on the wire. Lane counts of 0 mean
/// single-lane (the kernel default).
#[derive(Debug)]
pub struct Segment<'a> {
    pub tx: Option<&'a [u8]>,
    pub rx: Option<&'a mut [u8]>,
    pub len: u32,
    pub speed_hz: u32,
    pub delay_usecs: u16,
    pub bits_per_word: u8,
    pub tx_nbits: u8,
    pub rx_nbits: u8,
}

/// Capability surface of one spidev file descriptor.
///
/// Mode is carried as the raw 32-bit kernel flag word here; the typed
/// [`crate::Mode`] wrapper lives one layer up on the device handle.
pub trait SpiBus {
    fn set_mode(&mut self, mode: u32) -> io::Result<()>;
    fn get_mode(&mut self) -> io::Result<u32>;

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()>;
    fn get_bits_per_word(&mut self) -> io::Result<u8>;

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;
    fn get_max_speed_hz(&mut self) -> io::Result<u32>;

    /// Issues one message containing exactly `segment` and returns the byte
    /// count the kernel reports as transferred.
    fn transfer(&mut self, segment: &mut Segment<'_>) -> io::Result<usize>;
}
