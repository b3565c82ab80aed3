//! Real spidev backend
//!
//! Implements [`SpiBus`] on top of an open `/dev/spidevX.Y` file descriptor
//! using the kernel's ioctl surface.

use crate::bus::{Segment, SpiBus};

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_read;
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;
    const SPI_IOC_TYPE_MODE32: u8 = 5;

    // Generate ioctl functions. The 32-bit mode variant is used because the
    // dual/quad lane flags live above bit 7.
    ioctl_read!(spi_ioc_rd_mode32, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE32, u32);
    ioctl_write_ptr!(spi_ioc_wr_mode32, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE32, u32);
    ioctl_read!(
        spi_ioc_rd_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    // SPI_IOC_MESSAGE ioctl number calculation
    // This is SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[SPI_MSGSIZE(n)])
    // where SPI_MSGSIZE(n) = (n) * sizeof(struct spi_ioc_transfer)

    /// Size of spi_ioc_transfer struct (for 64-bit systems)
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOW = _IOC(_IOC_WRITE, type, nr, size)
        // _IOC(dir, type, nr, size) = ((dir)<<30)|((size)<<16)|((type)<<8)|(nr)
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Raw transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

/// An open spidev file descriptor.
///
/// Dropping it closes the descriptor; the device handle relies on that for
/// rollback when negotiation fails mid-sequence.
#[derive(Debug)]
pub struct SpidevBus {
    file: File,
}

impl SpidevBus {
    /// Open the device node at `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        log::debug!("spidev: opened {}", path.as_ref().display());
        Ok(Self { file })
    }

    fn fd(&self) -> i32 {
        self.file.as_raw_fd()
    }
}

impl SpiBus for SpidevBus {
    fn set_mode(&mut self, mode: u32) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_mode32(self.fd(), &mode) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(())
    }

    fn get_mode(&mut self) -> io::Result<u32> {
        let mut mode = 0u32;
        unsafe { ioctl::spi_ioc_rd_mode32(self.fd(), &mut mode) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(mode)
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_bits_per_word(self.fd(), &bits) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(())
    }

    fn get_bits_per_word(&mut self) -> io::Result<u8> {
        let mut bits = 0u8;
        unsafe { ioctl::spi_ioc_rd_bits_per_word(self.fd(), &mut bits) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(bits)
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(self.fd(), &speed_hz) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(())
    }

    fn get_max_speed_hz(&mut self) -> io::Result<u32> {
        let mut speed = 0u32;
        unsafe { ioctl::spi_ioc_rd_max_speed_hz(self.fd(), &mut speed) }
            .map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(speed)
    }

    fn transfer(&mut self, segment: &mut Segment<'_>) -> io::Result<usize> {
        let raw = SpiIocTransfer {
            tx_buf: segment.tx.map_or(0, |b| b.as_ptr() as u64),
            rx_buf: segment.rx.as_mut().map_or(0, |b| b.as_mut_ptr() as u64),
            len: segment.len,
            speed_hz: segment.speed_hz,
            delay_usecs: segment.delay_usecs,
            bits_per_word: segment.bits_per_word,
            tx_nbits: segment.tx_nbits,
            rx_nbits: segment.rx_nbits,
            ..Default::default()
        };

        // Batch of size one
        let ret = unsafe { libc::ioctl(self.fd(), ioctl::spi_ioc_message(1), &raw) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}
