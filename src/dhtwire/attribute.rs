// Dhtwire - Interrupt-driven DHT22 decoder and read-out service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::metrics::AcquisitionMetrics;
use crate::retry::RetryPolicy;
use crate::sensor::{AcquisitionController, AcquisitionError, DecodedReading};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Values that can be read from the sensor, one acquisition per read.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Attribute {
    Temperature,
    Humidity,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Temperature => "temperature",
            Attribute::Humidity => "humidity",
        }
    }

    /// Decimal tenths of a unit, e.g. "231" for 23.1c or "-15" for -1.5c
    pub fn render(&self, reading: &DecodedReading) -> String {
        match self {
            Attribute::Temperature => reading.temperature_tenths.to_string(),
            Attribute::Humidity => reading.humidity_tenths.to_string(),
        }
    }
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" | "temp" => Ok(Attribute::Temperature),
            "humidity" | "hum" => Ok(Attribute::Humidity),
            _ => Err(format!("unknown attribute '{}'", s)),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Performs a fresh acquisition for every attribute read. Nothing is cached
/// between reads: callers that want humidity and temperature from the same frame
/// should use `reading` and render both attributes from the result.
#[derive(Clone)]
pub struct AttributeReader {
    controller: Arc<AcquisitionController>,
    timeout: Duration,
    retry: RetryPolicy,
    metrics: Option<AcquisitionMetrics>,
}

impl AttributeReader {
    pub fn new(controller: Arc<AcquisitionController>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            controller,
            timeout,
            retry,
            metrics: None,
        }
    }

    /// Record the result of every acquisition attempt in `metrics`.
    pub fn with_metrics(mut self, metrics: AcquisitionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reading(&self) -> Result<DecodedReading, AcquisitionError> {
        self.retry.run(|| {
            let res = self.controller.read(self.timeout);
            if let Some(m) = &self.metrics {
                m.observe(&res);
            }

            res
        })
    }

    pub fn show(&self, attr: Attribute) -> Result<String, AcquisitionError> {
        self.reading().map(|r| attr.render(&r))
    }
}

impl fmt::Debug for AttributeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeReader")
            .field("controller", &self.controller)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{Attribute, AttributeReader};
    use crate::metrics::{encoded_text, AcquisitionMetrics};
    use crate::retry::RetryPolicy;
    use crate::sensor::test::{frame_edges, ManualClock, MockLine};
    use crate::sensor::{AcquisitionConfig, AcquisitionController, DecodedReading, ErrorKind};
    use prometheus::Registry;
    use std::sync::Arc;
    use std::time::Duration;

    fn reader(edges: Vec<Vec<u64>>, retry: RetryPolicy) -> AttributeReader {
        let clock = Arc::new(ManualClock::default());
        let line = MockLine::new(clock.clone(), edges);
        let controller = AcquisitionController::from_line(line, clock, AcquisitionConfig::default());
        AttributeReader::new(Arc::new(controller), Duration::from_millis(20), retry)
    }

    #[test]
    fn test_render() {
        let reading = DecodedReading {
            humidity_tenths: 652,
            temperature_tenths: 231,
            checksum_ok: true,
        };

        assert_eq!("231", Attribute::Temperature.render(&reading));
        assert_eq!("652", Attribute::Humidity.render(&reading));
    }

    #[test]
    fn test_render_negative() {
        let reading = DecodedReading {
            humidity_tenths: 0,
            temperature_tenths: -15,
            checksum_ok: true,
        };

        assert_eq!("-15", Attribute::Temperature.render(&reading));
        assert_eq!("0", Attribute::Humidity.render(&reading));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Attribute::Temperature, "temperature".parse().unwrap());
        assert_eq!(Attribute::Temperature, "temp".parse().unwrap());
        assert_eq!(Attribute::Humidity, "humidity".parse().unwrap());
        assert_eq!(Attribute::Humidity, "hum".parse().unwrap());
        assert!("pressure".parse::<Attribute>().is_err());
    }

    #[test]
    fn test_show_acquires_each_time() {
        let reader = reader(
            vec![
                frame_edges([0x02, 0x8C, 0x01, 0x11], 0xA0),
                frame_edges([0x01, 0xF4, 0x80, 0x96], 0x0B),
            ],
            RetryPolicy::single(),
        );

        assert_eq!("273", reader.show(Attribute::Temperature).unwrap());
        // Second read gets the second frame, nothing is cached
        assert_eq!("500", reader.show(Attribute::Humidity).unwrap());
        // No frames left
        assert_eq!(
            ErrorKind::Timeout,
            reader.show(Attribute::Humidity).unwrap_err().kind()
        );
    }

    #[test]
    fn test_show_retries_checksum_failure() {
        let reader = reader(
            vec![
                frame_edges([0x02, 0x8C, 0x01, 0x11], 0x00),
                frame_edges([0x02, 0x8C, 0x01, 0x11], 0xA0),
            ],
            RetryPolicy::new(2, Duration::ZERO),
        );

        assert_eq!("652", reader.show(Attribute::Humidity).unwrap());
    }

    #[test]
    fn test_reading_observes_every_attempt() {
        let registry = Registry::new();
        let metrics = AcquisitionMetrics::new(&registry).unwrap();
        let reader = reader(
            vec![Vec::new(), frame_edges([0x02, 0x8C, 0x01, 0x11], 0xA0)],
            RetryPolicy::new(3, Duration::ZERO),
        )
        .with_metrics(metrics);

        let reading = reader.reading().unwrap();
        assert_eq!(652, reading.humidity_tenths);
        assert_eq!(273, reading.temperature_tenths);

        let text = String::from_utf8(encoded_text(&registry).unwrap()).unwrap();
        assert!(text.contains("dhtwire_acquisitions_total 2"));
        assert!(text.contains("dhtwire_errors_total{kind=\"timeout\"} 1"));
    }
}
