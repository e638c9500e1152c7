//! ==============================================================================
//! hal.rs - MH-Z19 driver (hardware abstraction layer)
//! ==============================================================================
//!
//! purpose:
//!     provides the one capability the host needs from hardware: "ask the
//!     MH-Z19 for its co2 concentration". abstracts the difference between
//!     running on a real Raspberry Pi (UART via `rppal`) and a development
//!     machine (simulated sensor).
//!
//! design philosophy:
//!     - "Compile Anywhere": without feature="hardware" nothing touches a tty.
//!     - "Fail Per Cycle": the port is opened lazily and dropped after a fault,
//!       so an unplugged sensor shows up as an error reading, not a crash.
//!
//! wire format (9600 8N1):
//!
//!     request   FF 01 86 00 00 00 00 00 79
//!     response  FF 86 HH LL xx xx xx xx CS     ppm = HH * 256 + LL
//!
//!     CS = two's complement of the sum of bytes 1..=7
//!
//! relationships:
//!     - used by: sensor.rs (read_co2), main.rs (driver construction)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use crate::domain::FaultKind;
use std::fmt;
use std::time::{Duration, Instant};

// the frame codec is only driven by the rppal build; tests cover it everywhere
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub const FRAME_LEN: usize = 9;

/// "read gas concentration" command for sensor #1
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub const READ_COMMAND: [u8; FRAME_LEN] = [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79];

pub trait Co2Driver: Send {
    /// perform one blocking read.
    /// `Ok(None)` means the sensor answered but gave nothing usable.
    fn read_ppm(&mut self) -> Result<Option<i64>, DriverError>;
}

/// a driver fault with its kind and a human readable detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    kind: FaultKind,
    detail: String,
}

impl DriverError {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match e.kind() {
            ErrorKind::NotFound => FaultKind::DeviceNotFound,
            ErrorKind::PermissionDenied => FaultKind::PermissionDenied,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FaultKind::Timeout,
            _ => FaultKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

/// checksum over bytes 1..=7 of a frame
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    let sum = frame[1..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

/// decode a response frame into ppm.
/// a frame without the `FF 86` header carries no usable data.
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub fn parse_response(frame: &[u8; FRAME_LEN]) -> Result<Option<i64>, DriverError> {
    if frame[0] != 0xFF || frame[1] != 0x86 {
        return Ok(None);
    }
    let expected = checksum(frame);
    if frame[8] != expected {
        return Err(DriverError::new(
            FaultKind::ChecksumMismatch,
            format!("expected 0x{:02X}, got 0x{:02X}", expected, frame[8]),
        ));
    }
    Ok(Some(i64::from(frame[2]) * 256 + i64::from(frame[3])))
}

/// keep reading until a whole frame is in.
/// `read` may return short (or zero) counts; with a `timeout` a frame still
/// short when it runs out is a `Timeout` fault, without one this waits for good.
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
pub fn collect_frame<R>(mut read: R, timeout: Option<Duration>) -> Result<[u8; FRAME_LEN], DriverError>
where
    R: FnMut(&mut [u8]) -> Result<usize, DriverError>,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut frame = [0u8; FRAME_LEN];
    let mut received = 0;

    while received < FRAME_LEN {
        received += read(&mut frame[received..])?;
        if received < FRAME_LEN && deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DriverError::new(
                FaultKind::Timeout,
                format!("received {} of {} bytes", received, FRAME_LEN),
            ));
        }
    }
    Ok(frame)
}

// ==============================================================================================
// SIMULATED IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================

/// longest a single uart read waits for the next byte (VTIME = 1)
#[cfg(feature = "hardware")]
const READ_SLICE: Duration = Duration::from_millis(100);

/// cycles that report 0 ppm before the simulated sensor "warms up"
#[cfg(not(feature = "hardware"))]
const SIM_WARMUP_CYCLES: u32 = 3;

#[cfg(not(feature = "hardware"))]
pub struct Mhz19 {
    cycle: u32,
    level: i64,
    direction: i64,
}

#[cfg(not(feature = "hardware"))]
impl Mhz19 {
    pub fn new(_serial: &crate::config::SerialConfig) -> Self {
        tracing::info!("Using SIMULATED MH-Z19 (No hardware access)");
        Self {
            cycle: 0,
            level: 600,
            direction: 1,
        }
    }
}

#[cfg(not(feature = "hardware"))]
impl Co2Driver for Mhz19 {
    fn read_ppm(&mut self) -> Result<Option<i64>, DriverError> {
        self.cycle += 1;
        if self.cycle <= SIM_WARMUP_CYCLES {
            return Ok(Some(0));
        }

        // drift up and down between 500 and 1200 with +/-25 ppm of jitter
        let jitter = i64::from(self.cycle.wrapping_mul(37) % 51) - 25;
        self.level += self.direction * 5 + jitter;
        if self.level > 1200 {
            self.direction = -1;
        }
        if self.level < 500 {
            self.direction = 1;
        }
        let ppm = self.level.clamp(400, 2000);
        tracing::debug!("[SIM MH-Z19] cycle {} -> {} ppm", self.cycle, ppm);
        Ok(Some(ppm))
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct Mhz19 {
    device: std::path::PathBuf,
    baud_rate: u32,
    /// `None` blocks until the sensor answers
    read_timeout: Option<Duration>,
    uart: Option<rppal::uart::Uart>,
}

#[cfg(feature = "hardware")]
impl Mhz19 {
    pub fn new(serial: &crate::config::SerialConfig) -> Self {
        tracing::info!("Using REAL MH-Z19 on {} (rppal)", serial.device.display());
        Self {
            device: serial.device.clone(),
            baud_rate: serial.baud_rate,
            read_timeout: match serial.read_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            uart: None,
        }
    }

    fn open(&self) -> Result<rppal::uart::Uart, DriverError> {
        use rppal::uart::{Parity, Uart};

        let mut uart = Uart::with_path(&self.device, self.baud_rate, Parity::None, 8, 1)
            .map_err(uart_error)?;
        // VMIN > 0 together with VTIME > 0 never times out on a silent line,
        // so a deadline polls in short slices and collect_frame enforces it
        let (min_length, slice) = match self.read_timeout {
            None => (FRAME_LEN as u8, Duration::ZERO),
            Some(_) => (0, READ_SLICE),
        };
        uart.set_read_mode(min_length, slice).map_err(uart_error)?;
        uart.set_write_mode(true).map_err(uart_error)?;
        tracing::debug!("[MH-Z19] opened {}", self.device.display());
        Ok(uart)
    }
}

#[cfg(feature = "hardware")]
fn exchange(uart: &mut rppal::uart::Uart, timeout: Option<Duration>) -> Result<Option<i64>, DriverError> {
    use rppal::uart::Queue;

    uart.flush(Queue::Input).map_err(uart_error)?;
    uart.write(&READ_COMMAND).map_err(uart_error)?;

    let frame = collect_frame(|buf| uart.read(buf).map_err(uart_error), timeout)?;
    parse_response(&frame)
}

#[cfg(feature = "hardware")]
fn uart_error(e: rppal::uart::Error) -> DriverError {
    match e {
        rppal::uart::Error::Io(io) => io.into(),
        other => DriverError::new(FaultKind::Io, other.to_string()),
    }
}

#[cfg(feature = "hardware")]
impl Co2Driver for Mhz19 {
    fn read_ppm(&mut self) -> Result<Option<i64>, DriverError> {
        let mut uart = match self.uart.take() {
            Some(uart) => uart,
            None => self.open()?,
        };
        let result = exchange(&mut uart, self.read_timeout);
        // keep the port only while it behaves; the next cycle reopens it
        if result.is_ok() {
            self.uart = Some(uart);
        }
        result
    }
}
