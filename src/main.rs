//! rspidev - SPI testing utility for Linux spidev devices
//!
//! Opens a `/dev/spidevX.Y` node, negotiates mode, bits per word and clock
//! speed against the kernel, performs one full-duplex transfer and dumps the
//! response. Payload comes from `-p`, `--input` or a built-in test pattern.

mod cli;

use clap::Parser;
use cli::Cli;
use rspidev_core::{hex_dump, Config, SpiDevice};
use std::fs;

/// Default payload, the same pattern the kernel's spidev test tool sends.
const DEFAULT_TX: [u8; 38] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0x40, 0x00, 0x00, 0x00, 0x00, 0x95, //
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0xDE, 0xAD, 0xBE, 0xEF, 0xBA, 0xAD, //
    0xF0, 0x0D,
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let tx: Vec<u8> = if let Some(path) = &cli.input {
        fs::read(path)?
    } else if let Some(payload) = &cli.payload {
        payload.0.clone()
    } else {
        DEFAULT_TX.to_vec()
    };
    let mut rx = vec![0u8; tx.len()];

    let config = Config::new()
        .with_mode(cli.mode())
        .with_bits_per_word(cli.bpw)
        .with_speed(cli.speed)
        .with_delay(cli.delay);

    let mut spi = SpiDevice::open(&cli.device, &config)?;

    let len = tx.len();
    spi.transfer(Some(&tx), Some(&mut rx), len)?;

    match &cli.output {
        Some(path) => fs::write(path, &rx)?,
        None => print!("{}", hex_dump(&rx)),
    }

    spi.close()?;
    Ok(())
}
