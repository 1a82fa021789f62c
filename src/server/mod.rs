//! Request routing for the rover API.
//!
//! Requests and responses are plain values so the controller can be driven
//! without a socket; [`HttpServer`] adapts them to `tiny_http`.
//!
//! | Route | Method | Handler |
//! |-------|--------|---------|
//! | `/control` | GET | drive both tracks (`left`, `right`) |
//! | `/stream` | GET | one JPEG frame |
//! | `/getconfig` | GET | configuration without passwords |
//! | `/setpins` | POST | motor pins (`IN1`..`IN4`), then restart |
//! | `/setwifi` | POST | credentials (`mode`, `ssid`, `password`), then restart |
//! | `/scanwifi` | GET | nearby network names |
//! | `/` | GET | status page |
//!
//! Mutating handlers never reboot in place: they return a
//! [`PendingRestart`] that the transport acts on after the response is
//! sent.

mod handlers;
mod http;

pub use http::{HttpServer, DEFAULT_HTTP_PORT, MAX_BODY_LEN};

use crate::camera::FrameSource;
use crate::config::ByteStore;
use crate::motor::PwmDriver;
use crate::network::WifiRadio;
use crate::rover::Rover;
use std::time::Duration;

/// Time between a restart-triggering response and the reboot.
pub const RESTART_GRACE: Duration = Duration::from_secs(3);

/// Headers added to every response so a browser app on another origin can
/// call the API.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Methods",
        "GET, POST, PUT, DELETE, OPTIONS",
    ),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
    Other,
}

/// Inbound request with decoded query and form parameters.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
}

impl Request {
    /// Build a request from a target (`/path?query`) and an
    /// `application/x-www-form-urlencoded` body.
    pub fn new(method: Method, target: &str, body: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            path: path.to_string(),
            query: decode_pairs(query),
            form: decode_pairs(body),
        }
    }

    /// GET request.
    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target, "")
    }

    /// POST request with a form body.
    pub fn post(target: &str, body: &str) -> Self {
        Self::new(Method::Post, target, body)
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }

    /// Form body parameter.
    pub fn form_param(&self, name: &str) -> Option<&str> {
        lookup(&self.form, name)
    }

    /// Form body parameter, falling back to the query string.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form_param(name).or_else(|| self.query_param(name))
    }
}

fn decode_pairs(input: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Extra headers, including `Content-Type`.
    pub headers: Vec<(String, String)>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// Response with a body and content type.
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    /// `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status, "text/plain", body)
    }

    /// `application/json` response.
    pub fn json(body: String) -> Self {
        Self::new(200, "application/json", body)
    }

    /// `text/html` response.
    pub fn html(body: String) -> Self {
        Self::new(200, "text/html", body)
    }

    /// Response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text (lossy).
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Request to reboot once the response has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRestart {
    /// Wait between sending the response and rebooting.
    pub delay: Duration,
}

/// Handler result: the response plus an optional restart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Response to send.
    pub response: Response,
    /// Restart to perform after sending it.
    pub restart: Option<PendingRestart>,
}

impl Outcome {
    /// Respond and then restart after [`RESTART_GRACE`].
    pub fn restart_after(response: Response) -> Self {
        Self {
            response,
            restart: Some(PendingRestart {
                delay: RESTART_GRACE,
            }),
        }
    }
}

impl From<Response> for Outcome {
    fn from(response: Response) -> Self {
        Self {
            response,
            restart: None,
        }
    }
}

impl<S, P, F, R> Rover<S, P, F, R>
where
    S: ByteStore,
    P: PwmDriver,
    F: FrameSource,
    R: WifiRadio,
{
    /// Route one request to its handler.
    pub fn handle(&mut self, request: &Request) -> Outcome {
        let mut outcome = match (request.method(), request.path()) {
            (Method::Options, _) => Response::empty(204).into(),
            (Method::Get, "/control") => self.handle_drive(request),
            (Method::Get, "/stream") => self.handle_frame(),
            (Method::Get, "/getconfig") => self.handle_config_read(),
            (Method::Post, "/setpins") => self.handle_pin_update(request),
            (Method::Post, "/setwifi") => self.handle_credential_update(request),
            (Method::Get, "/scanwifi") => self.handle_scan(),
            (Method::Get, "/") => self.handle_status_page(),
            _ => Response::text(404, "Not found").into(),
        };

        for (name, value) in CORS_HEADERS {
            outcome.response.headers.push((name.to_string(), value.to_string()));
        }
        outcome
    }
}
