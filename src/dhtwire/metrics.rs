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

use crate::sensor::{AcquisitionError, DecodedReading};
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::time::{SystemTime, UNIX_EPOCH};

/// Results of acquisitions, updated after every attempt to read the sensor.
#[derive(Clone)]
pub struct AcquisitionMetrics {
    temperature: Gauge,
    humidity: Gauge,
    last_reading: Gauge,
    acquisitions: Counter,
    errors: CounterVec,
}

impl AcquisitionMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let temperature = Gauge::new("dhtwire_temperature_celsius", "Temperature in celsius")?;
        let humidity = Gauge::new("dhtwire_relative_humidity", "Relative humidity (0-100)")?;
        let last_reading = Gauge::new(
            "dhtwire_last_read_timestamp",
            "Timestamp of last successful read",
        )?;
        let acquisitions = Counter::new("dhtwire_acquisitions_total", "Number of attempted acquisitions")?;
        let errors = CounterVec::new(
            Opts::new("dhtwire_errors_total", "Number of failed acquisitions by type"),
            &["kind"],
        )?;

        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(humidity.clone()))?;
        registry.register(Box::new(last_reading.clone()))?;
        registry.register(Box::new(acquisitions.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            temperature,
            humidity,
            last_reading,
            acquisitions,
            errors,
        })
    }

    pub fn observe(&self, result: &Result<DecodedReading, AcquisitionError>) {
        self.acquisitions.inc();

        match result {
            Ok(reading) => {
                self.temperature.set(reading.temperature().into());
                self.humidity.set(reading.humidity().into());

                // If we can't get the number of seconds since the epoch, skip the update
                if let Ok(d) = SystemTime::now().duration_since(UNIX_EPOCH) {
                    self.last_reading.set(d.as_secs_f64());
                }
            }
            Err(e) => {
                self.errors.with_label_values(&[e.kind().as_label()]).inc();
            }
        }
    }
}

/// Encode all metrics in the registry in the Prometheus text exposition format.
pub fn encoded_text(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    tracing::debug!(
        message = "encoding metric families to text exposition format",
        num_metrics = metric_families.len(),
    );

    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod test {
    use super::{encoded_text, AcquisitionMetrics};
    use crate::sensor::{AcquisitionError, DecodedReading};
    use prometheus::Registry;

    #[test]
    fn test_observe_reading() {
        let registry = Registry::new();
        let metrics = AcquisitionMetrics::new(&registry).unwrap();

        metrics.observe(&Ok(DecodedReading {
            humidity_tenths: 652,
            temperature_tenths: -15,
            checksum_ok: true,
        }));

        assert_eq!(1.0, metrics.acquisitions.get());
        assert_eq!(65.2, metrics.humidity.get());
        assert_eq!(-1.5, metrics.temperature.get());
        assert!(metrics.last_reading.get() > 0.0);
    }

    #[test]
    fn test_observe_errors_by_kind() {
        let registry = Registry::new();
        let metrics = AcquisitionMetrics::new(&registry).unwrap();

        metrics.observe(&Err(AcquisitionError::Timeout { edges: 0 }));
        metrics.observe(&Err(AcquisitionError::Timeout { edges: 12 }));
        metrics.observe(&Err(AcquisitionError::Busy));

        assert_eq!(3.0, metrics.acquisitions.get());
        assert_eq!(2.0, metrics.errors.with_label_values(&["timeout"]).get());
        assert_eq!(1.0, metrics.errors.with_label_values(&["busy"]).get());
        assert_eq!(0.0, metrics.last_reading.get());
    }

    #[test]
    fn test_encoded_text() {
        let registry = Registry::new();
        let metrics = AcquisitionMetrics::new(&registry).unwrap();
        metrics.observe(&Err(AcquisitionError::ChecksumMismatch {
            expected: 1,
            computed: 2,
        }));

        let text = String::from_utf8(encoded_text(&registry).unwrap()).unwrap();
        assert!(text.contains("dhtwire_acquisitions_total 1"));
        assert!(text.contains("dhtwire_errors_total{kind=\"checksum\"} 1"));
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        let _metrics = AcquisitionMetrics::new(&registry).unwrap();
        assert!(AcquisitionMetrics::new(&registry).is_err());
    }
}
