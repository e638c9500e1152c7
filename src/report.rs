//! ==============================================================================
//! report.rs - reading sinks (console + broker)
//! ==============================================================================
//!
//! purpose:
//!     every poll produces one `Reading`; each reporter gets it in turn.
//!     - ConsoleReporter: one json record per line on stdout, flushed
//!     - BrokerReporter: stamped payload published at-least-once
//!
//! both render json in the `{"co2": 612, "status": "OK"}` style
//! (space after `,` and `:`), so downstream line parsers see the same
//! shape on stdout and on the topic.
//!
//! relationships:
//!     - used by: runtime.rs (poll loop), main.rs (sink wiring)
//!     - uses: broker.rs via the `Publish` trait
//!
//! ==============================================================================

use crate::domain::{PublishPayload, Reading};
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// a sink for readings. errors returned here stop the poll loop,
/// so only sinks whose failure is fatal should return them.
pub trait Reporter: Send {
    fn report(&mut self, reading: &Reading) -> Result<()>;
}

// ==============================================================================
// json rendering
// ==============================================================================

/// compact json with a space after separators
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

pub fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

// ==============================================================================
// console
// ==============================================================================

pub struct ConsoleReporter<W> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&mut self, reading: &Reading) -> Result<()> {
        let mut line = to_spaced_json(reading)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()?;
        Ok(())
    }
}

// ==============================================================================
// broker
// ==============================================================================

/// rejection reported by the broker client for a single publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishError {
    code: String,
}

impl PublishError {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl std::error::Error for PublishError {}

/// hands a payload to the broker client without waiting for delivery
pub trait Publish: Send {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

pub struct BrokerReporter<P> {
    publisher: P,
    topic: String,
    sensor: String,
}

impl<P: Publish> BrokerReporter<P> {
    pub fn new(publisher: P, topic: impl Into<String>, sensor: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            sensor: sensor.into(),
        }
    }

    /// stamp and publish one reading.
    /// the result is logged here; callers may ignore it.
    pub fn publish(&self, reading: &Reading) -> Result<(), PublishError> {
        let payload = PublishPayload::new(reading, now_iso8601(), &self.sensor);
        let message = to_spaced_json(&payload).map_err(|e| PublishError::new(e.to_string()))?;
        let text = String::from_utf8_lossy(&message).into_owned();

        match self.publisher.publish(&self.topic, message) {
            Ok(()) => {
                tracing::info!("[MQTT] Published: {}", text);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[MQTT] ⚠ Failed to publish: {}", e);
                Err(e)
            }
        }
    }
}

impl<P: Publish> Reporter for BrokerReporter<P> {
    fn report(&mut self, reading: &Reading) -> Result<()> {
        // a missed publish is skipped until the next cycle
        let _ = self.publish(reading);
        Ok(())
    }
}

fn now_iso8601() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}
