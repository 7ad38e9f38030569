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

use clap::{crate_version, Parser};
use dhtwire::attribute::AttributeReader;
use dhtwire::http::{http_route, RequestContext};
use dhtwire::metrics::AcquisitionMetrics;
use dhtwire::retry::RetryPolicy;
use dhtwire::sensor::{open_line, AcquisitionConfig, AcquisitionController, EdgeTrigger, MonotonicClock};
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{io, process};
use tokio::signal::unix::{self, SignalKind};
use tracing::{event, span, Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9782);
const DEFAULT_TIMEOUT_MS: u64 = 250;
const DEFAULT_START_PULSE_US: u64 = 1_000;
const DEFAULT_THRESHOLD_US: u64 = 100;
const DEFAULT_EDGE_TRIGGER: EdgeTrigger = EdgeTrigger::Both;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;

/// Read temperature and humidity from a DHT22 sensor on demand over HTTP
///
/// Drive the single-wire protocol of a DHT22 sensor connected to a data pin of a
/// local machine, usually a Raspberry PI, by timing edges on the line from an
/// interrupt callback. Every request triggers a fresh acquisition from the sensor.
///
/// The sensor must be connected to one of the General Purpose IO pins (GPIO). The
/// numbering of these pins (and how the pin number is provided to dhtwire) is based
/// on the Broadcom SOC channel.
#[derive(Debug, Parser)]
#[clap(name = "dhtwire", version = crate_version!())]
struct DhtwireApplication {
    /// BCM GPIO pin number the DHT22 sensor data line is connected to
    #[clap(long)]
    bcm_pin: u8,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to bind to. By default, dhtwire will bind to a public address since
    /// readings are meant to be consumed by other machines
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,

    /// Give up waiting for a complete frame from the sensor after this many milliseconds
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Hold the data line low for this many microseconds to request a frame
    #[clap(long, default_value_t = DEFAULT_START_PULSE_US)]
    start_pulse_us: u64,

    /// Time between edges, in microseconds, above which a bit is decoded as a one
    #[clap(long, default_value_t = DEFAULT_THRESHOLD_US)]
    threshold_us: u64,

    /// Edges of the data line to time. Allowed values are 'both', 'falling', and 'rising'
    #[clap(long, default_value_t = DEFAULT_EDGE_TRIGGER)]
    edge_trigger: EdgeTrigger,

    /// Attempts to make for each read before returning an error
    #[clap(long, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Wait this many milliseconds between attempts. The sensor cannot be read more
    /// than once every two seconds
    #[clap(long, default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    retry_backoff_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let opts = DhtwireApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let startup = Instant::now();
    let line = open_line(opts.bcm_pin, opts.edge_trigger).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "failed to initialize data line",
            bcm_pin = opts.bcm_pin,
            error = %e,
        );

        process::exit(1)
    });

    let config = AcquisitionConfig {
        start_pulse: Duration::from_micros(opts.start_pulse_us),
        threshold_us: opts.threshold_us,
    };
    let controller = Arc::new(AcquisitionController::from_line(
        line,
        Arc::new(MonotonicClock::new()),
        config,
    ));

    let registry = prometheus::default_registry().clone();
    let metrics = AcquisitionMetrics::new(&registry).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "failed to register acquisition metrics",
            error = %e,
        );

        process::exit(1)
    });

    let retry = RetryPolicy::new(opts.retries, Duration::from_millis(opts.retry_backoff_ms));
    let reader = AttributeReader::new(controller, Duration::from_millis(opts.timeout_ms), retry).with_metrics(metrics);

    let context = Arc::new(RequestContext::new(reader, registry));
    let service = make_service_fn(move |_| {
        let context = context.clone();

        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                http_route(req, context.clone()).instrument(span!(Level::DEBUG, "dhtwire_request"))
            }))
        }
    });
    let server = Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "server failed to start",
            address = %opts.bind,
            error = %e,
        );

        process::exit(1)
    });

    event!(
        Level::INFO,
        message = "server started",
        address = %opts.bind,
        bcm_pin = opts.bcm_pin,
        edge_trigger = %opts.edge_trigger,
        timeout_ms = opts.timeout_ms,
    );

    server
        .serve(service)
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    event!(
        Level::INFO,
        message = "server shutdown",
        runtime_secs = %startup.elapsed().as_secs(),
    );

    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
