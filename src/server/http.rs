//! `tiny_http` transport for the rover API.
//!
//! Serves one request at a time on the calling thread. When a handler asks
//! for a restart the response is sent first, then the server waits out the
//! grace period and returns so the caller can reboot.

use super::{Method, PendingRestart, Request, Response};
use crate::camera::FrameSource;
use crate::config::ByteStore;
use crate::motor::PwmDriver;
use crate::network::{Delay, WifiRadio};
use crate::rover::Rover;
use log::{debug, info, warn};
use std::io::{self, Read};
use tiny_http::{Header, Server};

/// Port the firmware listens on.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Largest request body accepted. Forms are a few dozen bytes.
pub const MAX_BODY_LEN: usize = 1024;

/// HTTP listener.
pub struct HttpServer {
    server: Server,
}

impl HttpServer {
    /// Listen on all interfaces. Port 0 picks a free port.
    pub fn bind(port: u16) -> io::Result<Self> {
        let addr = format!("0.0.0.0:{}", port);
        let server = Server::http(&addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        info!("HTTP server listening on {}", addr);
        Ok(Self { server })
    }

    /// Bound port.
    pub fn port(&self) -> Option<u16> {
        self.server.server_addr().to_ip().map(|addr| addr.port())
    }

    /// Serve until a handler requests a restart.
    ///
    /// Returns after the restart grace period has elapsed.
    pub fn serve<S, P, F, R, D>(
        &self,
        rover: &mut Rover<S, P, F, R>,
        delay: &mut D,
    ) -> io::Result<PendingRestart>
    where
        S: ByteStore,
        P: PwmDriver,
        F: FrameSource,
        R: WifiRadio,
        D: Delay,
    {
        loop {
            if let Some(restart) = self.handle_one(rover)? {
                info!("Restarting in {}s", restart.delay.as_secs());
                delay.delay(restart.delay);
                return Ok(restart);
            }
        }
    }

    /// Receive and answer a single request.
    pub fn handle_one<S, P, F, R>(
        &self,
        rover: &mut Rover<S, P, F, R>,
    ) -> io::Result<Option<PendingRestart>>
    where
        S: ByteStore,
        P: PwmDriver,
        F: FrameSource,
        R: WifiRadio,
    {
        let mut incoming = self.server.recv()?;
        let method = match incoming.method() {
            tiny_http::Method::Get => Method::Get,
            tiny_http::Method::Post => Method::Post,
            tiny_http::Method::Options => Method::Options,
            _ => Method::Other,
        };
        let target = incoming.url().to_string();
        debug!("{:?} {}", method, target);

        let mut raw = Vec::new();
        if let Err(e) = incoming
            .as_reader()
            .take(MAX_BODY_LEN as u64 + 1)
            .read_to_end(&mut raw)
        {
            warn!("Failed to read request body: {}", e);
            respond(incoming, Response::text(400, "Unreadable body"));
            return Ok(None);
        }
        if raw.len() > MAX_BODY_LEN {
            respond(incoming, Response::text(413, "Request body too large"));
            return Ok(None);
        }
        let Ok(mut body) = String::from_utf8(raw) else {
            respond(incoming, Response::text(400, "Body is not UTF-8"));
            return Ok(None);
        };

        let outcome = rover.handle(&Request::new(method, &target, &body));
        body.clear();
        respond(incoming, outcome.response);
        Ok(outcome.restart)
    }
}

fn respond(incoming: tiny_http::Request, response: Response) {
    let mut reply = tiny_http::Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in &response.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => reply.add_header(header),
            Err(()) => warn!("Dropping invalid header {}", name),
        }
    }
    if let Err(e) = incoming.respond(reply) {
        warn!("Failed to send response: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCamera;
    use crate::config::MemoryStore;
    use crate::motor::{Channel, RecordingPwm};
    use crate::network::{RecordingDelay, SimulatedRadio};
    use std::io::Write;
    use std::net::TcpStream;
    use std::thread;

    type SimRover = Rover<MemoryStore, RecordingPwm, SimulatedCamera, SimulatedRadio>;

    fn rover() -> SimRover {
        Rover::boot(
            MemoryStore::default(),
            RecordingPwm::new(),
            SimulatedCamera::default(),
            SimulatedRadio::unreachable(),
            &mut RecordingDelay::default(),
        )
        .unwrap()
    }

    fn send(port: u16, raw: String) -> thread::JoinHandle<String> {
        thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.write_all(raw.as_bytes()).unwrap();
            let mut reply = String::new();
            stream.read_to_string(&mut reply).unwrap();
            reply
        })
    }

    #[test]
    fn test_get_over_socket() {
        let server = HttpServer::bind(0).unwrap();
        let port = server.port().unwrap();
        let mut rover = rover();

        let client = send(
            port,
            "GET /control?left=50&right=50 HTTP/1.1\r\nHost: rover\r\nConnection: close\r\n\r\n"
                .to_string(),
        );
        let restart = server.handle_one(&mut rover).unwrap();
        let reply = client.join().unwrap();

        assert!(restart.is_none());
        assert!(reply.starts_with("HTTP/1.1 200"));
        assert!(reply.contains("Access-Control-Allow-Origin: *"));
        assert!(reply.ends_with("OK"));
        assert_eq!(rover.motors().pwm().duty(Channel::LeftForward), 50);
    }

    #[test]
    fn test_post_form_triggers_restart() {
        let server = HttpServer::bind(0).unwrap();
        let port = server.port().unwrap();
        let mut rover = rover();

        let body = "mode=sta&ssid=Home&password=";
        let client = send(
            port,
            format!(
                "POST /setwifi HTTP/1.1\r\nHost: rover\r\nConnection: close\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Content-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        );
        let mut delay = RecordingDelay::default();
        let restart = server.serve(&mut rover, &mut delay).unwrap();
        let reply = client.join().unwrap();

        assert!(reply.contains("WiFi settings saved"));
        assert_eq!(restart.delay.as_secs(), 3);
        assert_eq!(delay.total().as_secs(), 3);
        assert_eq!(rover.config().station_ssid, "Home");
    }

    #[test]
    fn test_oversized_body_rejected() {
        let server = HttpServer::bind(0).unwrap();
        let port = server.port().unwrap();
        let mut rover = rover();

        let body = format!("IN1=2&pad={}", "x".repeat(MAX_BODY_LEN - 9));
        assert_eq!(body.len(), MAX_BODY_LEN + 1);
        let client = send(
            port,
            format!(
                "POST /setpins HTTP/1.1\r\nHost: rover\r\nConnection: close\r\n\
                 Content-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        );
        let restart = server.handle_one(&mut rover).unwrap();
        let reply = client.join().unwrap();

        assert!(restart.is_none());
        assert!(reply.starts_with("HTTP/1.1 413"));
        assert!(!rover.config().saved);
    }
}
