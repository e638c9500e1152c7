//! sensor reader - one driver call in, one classified reading out.
//! nothing the driver does (errors or panics) escapes this module.

use crate::domain::{FaultKind, Reading, Sample};
use crate::hal::Co2Driver;
use std::panic::{self, AssertUnwindSafe};

/// call the driver once and turn whatever happens into a typed sample
pub fn sample<D: Co2Driver + ?Sized>(driver: &mut D) -> Sample {
    match panic::catch_unwind(AssertUnwindSafe(|| driver.read_ppm())) {
        Ok(Ok(ppm)) => Sample::Ppm(ppm),
        Ok(Err(e)) => {
            tracing::warn!("[MH-Z19] ⚠ Read error: {}", e);
            Sample::Fault(e.kind())
        }
        Err(_) => {
            tracing::error!("[MH-Z19] ⚠ Driver panicked during read");
            Sample::Fault(FaultKind::Panic)
        }
    }
}

/// poll the sensor and classify the result
pub fn read_co2<D: Co2Driver + ?Sized>(driver: &mut D) -> Reading {
    Reading::from_sample(sample(driver))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Status;
    use crate::hal::DriverError;
    use std::collections::VecDeque;

    /// replays a fixed list of driver outcomes, then reports no data
    pub struct ScriptedDriver {
        script: VecDeque<Result<Option<i64>, DriverError>>,
    }

    impl ScriptedDriver {
        pub fn new(script: Vec<Result<Option<i64>, DriverError>>) -> Self {
            Self { script: script.into() }
        }
    }

    impl Co2Driver for ScriptedDriver {
        fn read_ppm(&mut self) -> Result<Option<i64>, DriverError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    struct PanickingDriver;

    impl Co2Driver for PanickingDriver {
        fn read_ppm(&mut self) -> Result<Option<i64>, DriverError> {
            panic!("uart went away");
        }
    }

    #[test]
    fn good_value_reads_ok() {
        let mut driver = ScriptedDriver::new(vec![Ok(Some(612))]);
        let reading = read_co2(&mut driver);
        assert_eq!(reading, Reading { co2: Some(612), status: Status::Ok });
    }

    #[test]
    fn zero_reads_warmup_not_null() {
        let mut driver = ScriptedDriver::new(vec![Ok(Some(0))]);
        let reading = read_co2(&mut driver);
        assert_eq!(reading, Reading { co2: Some(0), status: Status::Warmup });
    }

    #[test]
    fn empty_response_reads_warmup() {
        let mut driver = ScriptedDriver::new(vec![Ok(None)]);
        assert_eq!(read_co2(&mut driver).status, Status::Warmup);
    }

    #[test]
    fn driver_fault_becomes_error_status() {
        let mut driver = ScriptedDriver::new(vec![
            Err(DriverError::new(FaultKind::Timeout, "no answer")),
            Err(DriverError::new(FaultKind::DeviceNotFound, "/dev/ttyAMA0")),
        ]);

        let first = read_co2(&mut driver);
        assert_eq!(first.co2, None);
        assert_eq!(first.status.to_string(), "ERROR:TimeoutError");

        let second = read_co2(&mut driver);
        assert_eq!(second.co2, None);
        assert!(second.status.to_string().starts_with("ERROR:"));
        assert_eq!(second.status, Status::Error(FaultKind::DeviceNotFound));
    }

    #[test]
    fn driver_panic_is_contained() {
        let reading = read_co2(&mut PanickingDriver);
        assert_eq!(reading.co2, None);
        assert_eq!(reading.status.to_string(), "ERROR:DriverPanic");
    }
}
