//! CLI argument parsing

use clap::Parser;
use rspidev_core::Mode;
use std::path::PathBuf;

/// Payload bytes parsed from a hex string argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPayload(pub Vec<u8>);

/// Parse a payload given as hex bytes, e.g. "deadbeef" or "DE AD BE EF".
pub fn parse_hex_bytes(s: &str) -> Result<HexPayload, String> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in payload: {s}"));
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte: {}", &digits[i..i + 2]))
        })
        .collect::<Result<Vec<u8>, String>>()?;
    Ok(HexPayload(bytes))
}

#[derive(Parser)]
#[command(name = "rspidev")]
#[command(author, version, about = "SPI testing utility for Linux spidev devices", long_about = None)]
pub struct Cli {
    /// Device node to use
    #[arg(short = 'D', long, default_value = "/dev/spidev1.1")]
    pub device: PathBuf,

    /// Max clock speed in Hz
    #[arg(short, long, default_value_t = 500_000)]
    pub speed: u32,

    /// Delay after each transfer in microseconds
    #[arg(short, long, default_value_t = 0)]
    pub delay: u16,

    /// Bits per word
    #[arg(short, long, default_value_t = 8)]
    pub bpw: u8,

    /// Payload to send, as hex bytes (e.g. "de ad be ef")
    #[arg(short = 'p', long, value_parser = parse_hex_bytes)]
    pub payload: Option<HexPayload>,

    /// Send the contents of a file instead of -p
    #[arg(long, conflicts_with = "payload")]
    pub input: Option<PathBuf>,

    /// Write received bytes to a file instead of dumping them
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Clock phase (CPHA)
    #[arg(short = 'H', long)]
    pub cpha: bool,

    /// Clock polarity (CPOL)
    #[arg(short = 'O', long)]
    pub cpol: bool,

    /// Least significant bit first
    #[arg(short = 'L', long)]
    pub lsb: bool,

    /// Chip select active high
    #[arg(short = 'C', long)]
    pub cs_high: bool,

    /// SI/SO signals shared (3-wire)
    #[arg(short = '3', long)]
    pub three_wire: bool,

    /// Loopback self-test mode
    #[arg(short = 'l', long)]
    pub loopback: bool,

    /// No chip select
    #[arg(short = 'N', long)]
    pub no_cs: bool,

    /// Slave pulls low to pause
    #[arg(short = 'R', long)]
    pub ready: bool,

    /// Dual-lane transfer
    #[arg(short = '2', long)]
    pub dual: bool,

    /// Quad-lane transfer
    #[arg(short = '4', long)]
    pub quad: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Assemble the mode word from the individual switches.
    ///
    /// Dual/quad select the transmit lanes; under loopback the matching
    /// receive flag is mirrored so the self-test exercises both directions.
    pub fn mode(&self) -> Mode {
        let mut mode = Mode::empty();
        if self.cpha {
            mode |= Mode::CPHA;
        }
        if self.cpol {
            mode |= Mode::CPOL;
        }
        if self.lsb {
            mode |= Mode::LSB_FIRST;
        }
        if self.cs_high {
            mode |= Mode::CS_HIGH;
        }
        if self.three_wire {
            mode |= Mode::THREE_WIRE;
        }
        if self.loopback {
            mode |= Mode::LOOP;
        }
        if self.no_cs {
            mode |= Mode::NO_CS;
        }
        if self.ready {
            mode |= Mode::READY;
        }
        if self.dual {
            mode |= Mode::TX_DUAL;
        }
        if self.quad {
            mode |= Mode::TX_QUAD;
        }
        if mode.contains(Mode::LOOP) {
            if mode.contains(Mode::TX_DUAL) {
                mode |= Mode::RX_DUAL;
            }
            if mode.contains(Mode::TX_QUAD) {
                mode |= Mode::RX_QUAD;
            }
        }
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_payload_with_separators() {
        assert_eq!(
            parse_hex_bytes("de ad,be ef").unwrap(),
            HexPayload(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn mode_switches_map_to_flags() {
        let cli = Cli::try_parse_from(["rspidev", "--cpol", "--cpha", "--cs-high"]).unwrap();
        assert_eq!(cli.mode(), Mode::MODE_3 | Mode::CS_HIGH);
    }

    #[test]
    fn loopback_mirrors_dual_to_receive() {
        let cli = Cli::try_parse_from(["rspidev", "--loopback", "--dual"]).unwrap();
        assert!(cli.mode().contains(Mode::TX_DUAL | Mode::RX_DUAL));

        let cli = Cli::try_parse_from(["rspidev", "--dual"]).unwrap();
        assert!(!cli.mode().contains(Mode::RX_DUAL));
    }
}
