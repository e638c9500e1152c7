use serde::{Serialize, Serializer};
use std::fmt;

/// kind of fault raised by the sensor driver.
/// the name is what follows `ERROR:` in a reading's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// the device did not answer with a full frame in time
    Timeout,
    /// the serial device path does not exist
    DeviceNotFound,
    /// the serial device exists but cannot be opened
    PermissionDenied,
    /// a response frame failed its checksum
    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    ChecksumMismatch,
    /// any other serial i/o failure
    Io,
    /// the driver panicked mid-read
    Panic,
}

impl FaultKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Timeout => "TimeoutError",
            Self::DeviceNotFound => "DeviceNotFound",
            Self::PermissionDenied => "PermissionError",
            Self::ChecksumMismatch => "ChecksumError",
            Self::Io => "IoError",
            Self::Panic => "DriverPanic",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// outcome of one driver call, before classification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sample {
    /// the driver answered; `None` means it had no usable value
    Ppm(Option<i64>),
    Fault(FaultKind),
}

/// reading status label: `OK`, `WARMUP` or `ERROR:<kind>`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// covers both a warming sensor and a bogus zero / negative value
    Warmup,
    Error(FaultKind),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Warmup => f.write_str("WARMUP"),
            Self::Error(kind) => write!(f, "ERROR:{kind}"),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// one normalized sensor poll.
/// field order is the order of the console record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// co2 concentration in ppm, absent on faults or empty responses
    pub co2: Option<i64>,
    pub status: Status,
}

impl Reading {
    /// classify a raw ppm value. only a present, positive value is `OK`;
    /// everything else is `WARMUP` and keeps the raw value.
    pub fn classify(ppm: Option<i64>) -> Self {
        let status = match ppm {
            Some(value) if value > 0 => Status::Ok,
            _ => Status::Warmup,
        };
        Self { co2: ppm, status }
    }

    pub fn fault(kind: FaultKind) -> Self {
        Self {
            co2: None,
            status: Status::Error(kind),
        }
    }

    pub fn from_sample(sample: Sample) -> Self {
        match sample {
            Sample::Ppm(ppm) => Self::classify(ppm),
            Sample::Fault(kind) => Self::fault(kind),
        }
    }
}

/// what goes out on the broker topic
#[derive(Clone, Debug, Serialize)]
pub struct PublishPayload<'a> {
    pub co2: Option<i64>,
    pub status: Status,
    /// iso-8601, captured when the payload is built
    pub timestamp: String,
    pub sensor: &'a str,
}

impl<'a> PublishPayload<'a> {
    pub fn new(reading: &Reading, timestamp: String, sensor: &'a str) -> Self {
        Self {
            co2: reading.co2,
            status: reading.status,
            timestamp,
            sensor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_ppm_is_ok() {
        for ppm in [1, 400, 612, 5000] {
            let reading = Reading::classify(Some(ppm));
            assert_eq!(reading.status, Status::Ok);
            assert_eq!(reading.co2, Some(ppm));
        }
    }

    #[test]
    fn zero_negative_and_missing_are_warmup_with_raw_value() {
        for ppm in [Some(0), Some(-5), None] {
            let reading = Reading::classify(ppm);
            assert_eq!(reading.status, Status::Warmup);
            assert_eq!(reading.co2, ppm);
        }
    }

    #[test]
    fn fault_sample_has_no_value() {
        let reading = Reading::from_sample(Sample::Fault(FaultKind::Timeout));
        assert_eq!(reading.co2, None);
        assert_eq!(reading.status.to_string(), "ERROR:TimeoutError");
    }

    #[test]
    fn ok_only_when_present_and_positive() {
        let samples = [
            Sample::Ppm(Some(800)),
            Sample::Ppm(Some(0)),
            Sample::Ppm(None),
            Sample::Fault(FaultKind::ChecksumMismatch),
            Sample::Fault(FaultKind::Panic),
        ];
        for sample in samples {
            let reading = Reading::from_sample(sample);
            let positive = matches!(reading.co2, Some(v) if v > 0);
            assert_eq!(reading.status == Status::Ok, positive, "{sample:?}");
        }
    }

    #[test]
    fn status_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&Status::Warmup).unwrap(), "\"WARMUP\"");
        assert_eq!(
            serde_json::to_string(&Status::Error(FaultKind::DeviceNotFound)).unwrap(),
            "\"ERROR:DeviceNotFound\""
        );
    }
}
