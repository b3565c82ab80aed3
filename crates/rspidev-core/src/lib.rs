//! rspidev-core - userspace access to Linux spidev devices
//!
//! This crate talks to SPI peripherals through the kernel's generic SPI
//! character-device interface at `/dev/spidevX.Y`, where X is the bus number
//! and Y is the chip select.
//!
//! # Overview
//!
//! A [`SpiDevice`] owns one open device node. Opening it negotiates the
//! transfer parameters (mode flags, bits per word, max clock speed) against
//! the kernel: each value is written and then read back, and the handle keeps
//! what the kernel reports rather than what was requested. Transfers go out
//! as a single `SPI_IOC_MESSAGE` ioctl carrying one descriptor.
//!
//! # Example
//!
//! ```no_run
//! use rspidev_core::{Config, Mode, SpiDevice};
//!
//! let config = Config::new()
//!     .with_speed(500_000)
//!     .with_mode(Mode::MODE_0);
//! let mut spi = SpiDevice::open("/dev/spidev0.0", &config)?;
//!
//! let tx = [0xDE, 0xAD, 0xBE, 0xEF];
//! let mut rx = [0u8; 4];
//! spi.transfer(Some(&tx), Some(&mut rx), 4)?;
//! spi.close()?;
//! # Ok::<(), rspidev_core::Error>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to the `/dev/spidevX.Y` device
//!
//! The kernel surface is reachable only through the [`SpiBus`] trait, so
//! tests can substitute a simulated bus for the real [`SpidevBus`].

pub mod bus;
pub mod device;
pub mod dump;
pub mod error;
pub mod spidev;

// Re-exports
pub use bus::{Segment, SpiBus};
pub use device::{Config, Mode, SpiDevice};
pub use dump::hex_dump;
pub use error::{Error, Param, Phase, Result};
pub use spidev::SpidevBus;
