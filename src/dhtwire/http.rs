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

use crate::attribute::{Attribute, AttributeReader};
use crate::metrics::encoded_text;
use crate::sensor::{AcquisitionError, ErrorKind};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use prometheus::{Registry, TEXT_FORMAT};
use std::sync::Arc;
use tokio::task::{self, JoinError};
use tracing::{event, Level};

const PLAIN_FORMAT: &str = "text/plain; charset=utf-8";
const JSON_FORMAT: &str = "application/json";

pub struct RequestContext {
    reader: AttributeReader,
    registry: Registry,
}

impl RequestContext {
    pub fn new(reader: AttributeReader, registry: Registry) -> Self {
        RequestContext { reader, registry }
    }
}

pub async fn http_route(req: Request<Body>, context: Arc<RequestContext>) -> Result<Response<Body>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let res = match (&method, path.as_ref()) {
        (&Method::GET, "/metrics") => match encoded_text(&context.registry) {
            Ok(buffer) => http_body(TEXT_FORMAT, buffer),
            Err(e) => {
                event!(Level::ERROR, message = "error encoding metrics", error = %e);
                http_status_no_body(StatusCode::INTERNAL_SERVER_ERROR)
            }
        },

        (&Method::GET, "/reading") => match acquire(context, |r| r.reading()).await {
            Ok(Ok(reading)) => match serde_json::to_vec(&reading) {
                Ok(buffer) => http_body(JSON_FORMAT, buffer),
                Err(e) => {
                    event!(Level::ERROR, message = "error encoding reading", error = %e);
                    http_status_no_body(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            Ok(Err(e)) => http_acquisition_error(&e),
            Err(e) => http_join_error(&e),
        },

        (&Method::GET, "/temperature") => http_attribute(context, Attribute::Temperature).await,
        (&Method::GET, "/humidity") => http_attribute(context, Attribute::Humidity).await,

        (_, "/metrics") | (_, "/reading") | (_, "/temperature") | (_, "/humidity") => {
            http_status_no_body(StatusCode::METHOD_NOT_ALLOWED)
        }

        _ => http_status_no_body(StatusCode::NOT_FOUND),
    };

    Ok(res)
}

/// Run a blocking acquisition on the thread pool so the sensor read (several
/// milliseconds, more with retries) doesn't stall the executor.
async fn acquire<T, F>(context: Arc<RequestContext>, op: F) -> Result<Result<T, AcquisitionError>, JoinError>
where
    T: Send + 'static,
    F: FnOnce(&AttributeReader) -> Result<T, AcquisitionError> + Send + 'static,
{
    task::spawn_blocking(move || op(&context.reader)).await
}

async fn http_attribute(context: Arc<RequestContext>, attr: Attribute) -> Response<Body> {
    match acquire(context, move |r| r.show(attr)).await {
        Ok(Ok(value)) => http_body(PLAIN_FORMAT, format!("{}\n", value).into_bytes()),
        Ok(Err(e)) => {
            event!(
                Level::WARN,
                message = "unable to read sensor attribute",
                attribute = %attr,
                error = %e,
            );
            http_acquisition_error(&e)
        }
        Err(e) => http_join_error(&e),
    }
}

/// HTTP status for a failed acquisition, chosen so clients can tell retryable
/// conditions apart.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ChecksumMismatch => StatusCode::BAD_GATEWAY,
        ErrorKind::InvalidGpio | ErrorKind::ReservationFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_acquisition_error(e: &AcquisitionError) -> Response<Body> {
    http_status_no_body(status_for(e.kind()))
}

fn http_join_error(e: &JoinError) -> Response<Body> {
    event!(Level::ERROR, message = "sensor read task failed", error = %e);
    http_status_no_body(StatusCode::INTERNAL_SERVER_ERROR)
}

fn http_body(content_type: &'static str, body: Vec<u8>) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    res
}

fn http_status_no_body(code: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = code;
    res
}
