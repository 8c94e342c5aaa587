use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use chrono::Local;
use log::{debug, info, warn};
use native_tls::TlsConnector;
use serde_json::Value;
use tungstenite::handshake::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message, WebSocket};
use uuid::Uuid;
use dtv_core::{ArtConnector, ArtDevice, DeviceError, DisplayStyle, FileType};
use crate::config::TvConfig;
use crate::device::protocol::{self, ChannelEvent, ConnInfo};

/// Opens art channels on Samsung Frame TVs.
#[derive(Debug, Clone)]
pub struct SamsungConnector {
    port: u16,
    client_name: String,
    token: Option<String>,
    timeout: Duration,
    select_wait: Duration,
}

impl SamsungConnector {
    pub fn new(tv: &TvConfig) -> Self {
        Self {
            port: tv.port,
            client_name: tv.client_name.clone(),
            token: tv.token.clone(),
            timeout: tv.timeout,
            select_wait: Duration::from_secs(3).min(tv.timeout),
        }
    }

    /// Connects, asks for the art API version and disconnects.
    pub fn api_version(&self, address: &str) -> Result<String, DeviceError> {
        let mut channel = self.connect(address)?;
        let version = channel.api_version();
        if let Err(e) = channel.close() {
            debug!("Closing version check channel failed: {e}");
        }
        version
    }
}

impl ArtConnector for SamsungConnector {
    type Device = ArtChannel;

    fn connect(&self, address: &str) -> Result<ArtChannel, DeviceError> {
        let addr = resolve(address, self.port)?;
        let tcp = TcpStream::connect_timeout(&addr, self.timeout).map_err(io_error)?;
        tcp.set_read_timeout(Some(self.timeout)).map_err(io_error)?;
        tcp.set_write_timeout(Some(self.timeout)).map_err(io_error)?;

        let url = protocol::channel_url(address, self.port, &self.client_name, self.token.as_deref());
        debug!("Opening art channel {url}");
        let (socket, _) = tungstenite::client_tls_with_config(
            url.as_str(),
            tcp,
            None,
            Some(Connector::NativeTls(insecure_tls()?)),
        )
        .map_err(|e| match e {
            HandshakeError::Failure(err) => ws_error(err),
            HandshakeError::Interrupted(_) => DeviceError::Timeout("websocket handshake interrupted".into()),
        })?;

        let mut channel = ArtChannel {
            socket,
            timeout: self.timeout,
            select_wait: self.select_wait,
        };
        channel.await_ready()?;
        info!("Art channel ready on {address}");
        Ok(channel)
    }
}

/// An open art-mode websocket channel.
pub struct ArtChannel {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    timeout: Duration,
    select_wait: Duration,
}

impl ArtChannel {
    fn await_ready(&mut self) -> Result<(), DeviceError> {
        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            let event = self.read_event()?;
            match event.event.as_str() {
                "ms.channel.ready" => return Ok(()),
                "ms.channel.connect" => {
                    if let Some(token) = event.data.get("token").and_then(Value::as_str) {
                        info!("TV issued token {token}; set TV_TOKEN to skip the pairing prompt");
                    }
                }
                "ms.channel.unauthorized" => {
                    return Err(DeviceError::Connection("TV refused the connection (unauthorized)".into()));
                }
                "ms.channel.timeOut" => {
                    return Err(DeviceError::Timeout("pairing prompt on the TV was not answered".into()));
                }
                other => debug!("Ignoring {other} while waiting for the art channel"),
            }
        }
        Err(DeviceError::Timeout("art channel never became ready".into()))
    }

    fn read_event(&mut self) -> Result<ChannelEvent, DeviceError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return protocol::parse_event(&text),
                Ok(Message::Close(_)) => return Err(DeviceError::Connection("TV closed the art channel".into())),
                Ok(_) => continue,
                Err(e) => return Err(ws_error(e)),
            }
        }
    }

    fn send(&mut self, payload: &Value) -> Result<(), DeviceError> {
        self.socket
            .send(Message::text(protocol::art_request(payload)))
            .map_err(ws_error)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        let tcp = match self.socket.get_mut() {
            MaybeTlsStream::Plain(tcp) => tcp,
            MaybeTlsStream::NativeTls(tls) => tls.get_mut(),
            _ => return Ok(()),
        };
        tcp.set_read_timeout(Some(timeout)).map_err(io_error)
    }

    /// Reads until the art payload named `wanted` arrives or `window` passes.
    fn wait_for(&mut self, wanted: &str, window: Duration) -> Result<Value, DeviceError> {
        self.set_read_timeout(window)?;
        let result = self.wait_for_inner(wanted, window);
        if let Err(e) = self.set_read_timeout(self.timeout) {
            warn!("Could not restore art channel read timeout: {e}");
        }
        result
    }

    fn wait_for_inner(&mut self, wanted: &str, window: Duration) -> Result<Value, DeviceError> {
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let event = self.read_event()?;
            let Some(payload) = protocol::art_payload(&event) else {
                continue;
            };
            match protocol::payload_event(&payload) {
                Some("error") => return Err(protocol::error_from_payload(&payload)),
                Some(name) if name == wanted => return Ok(payload),
                other => debug!("Skipping art event {other:?} while waiting for {wanted}"),
            }
        }
        Err(DeviceError::Timeout(format!("no {wanted} from the TV")))
    }

    pub fn api_version(&mut self) -> Result<String, DeviceError> {
        let id = Uuid::new_v4().to_string();
        self.send(&protocol::api_version_request(&id))?;
        let payload = self.wait_for("get_api_version", self.timeout)?;
        payload
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DeviceError::Failure("get_api_version answer has no version".into()))
    }

    fn send_image_bytes(&self, conn: &ConnInfo, header: &[u8], image: &[u8]) -> Result<(), DeviceError> {
        let addr = resolve(&conn.ip, conn.port)?;
        let tcp = TcpStream::connect_timeout(&addr, self.timeout).map_err(io_error)?;
        tcp.set_write_timeout(Some(self.timeout)).map_err(io_error)?;

        if conn.secured {
            let mut tls = insecure_tls()?
                .connect(&conn.ip, tcp)
                .map_err(|e| DeviceError::Connection(format!("TLS to upload socket failed: {e}")))?;
            write_upload(&mut tls, header, image)
        } else {
            let mut tcp = tcp;
            write_upload(&mut tcp, header, image)
        }
    }
}

impl ArtDevice for ArtChannel {
    fn upload(&mut self, image: &[u8], file_type: FileType, style: &DisplayStyle) -> Result<String, DeviceError> {
        let id = Uuid::new_v4().to_string();
        let image_date = Local::now().format("%Y:%m:%d %H:%M:%S").to_string();
        let request = protocol::send_image_request(
            &id,
            rand::random::<u32>(),
            file_type.as_str(),
            style,
            image.len(),
            &image_date,
        );

        self.send(&request)?;
        let ready = self.wait_for("ready_to_use", self.timeout)?;
        let conn = ConnInfo::from_payload(&ready)?;
        debug!("TV expects image on {}:{} (secured: {})", conn.ip, conn.port, conn.secured);

        let header = protocol::upload_header(image.len(), file_type.as_str(), &conn.key);
        self.send_image_bytes(&conn, &protocol::frame_header(&header), image)?;

        let added = self.wait_for("image_added", self.timeout)?;
        added
            .get("content_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DeviceError::Failure("image_added answer has no content_id".into()))
    }

    fn select_image(&mut self, content_id: &str) -> Result<bool, DeviceError> {
        let id = Uuid::new_v4().to_string();
        self.send(&protocol::select_image_request(&id, content_id))?;
        match self.wait_for("image_selected", self.select_wait) {
            Ok(_) => Ok(true),
            Err(DeviceError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        match self.socket.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => {
                warn!("Art channel did not close cleanly: {e}");
                Err(ws_error(e))
            }
        }
    }
}

fn write_upload(stream: &mut impl Write, header: &[u8], image: &[u8]) -> Result<(), DeviceError> {
    stream.write_all(header).map_err(io_error)?;
    stream.write_all(image).map_err(io_error)?;
    stream.flush().map_err(io_error)
}

fn insecure_tls() -> Result<TlsConnector, DeviceError> {
    TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| DeviceError::Connection(format!("TLS setup failed: {e}")))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, DeviceError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| DeviceError::Connection(format!("cannot resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| DeviceError::Connection(format!("no address for {host}")))
}

fn io_error(e: io::Error) -> DeviceError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DeviceError::Timeout(e.to_string()),
        _ => DeviceError::Connection(e.to_string()),
    }
}

fn ws_error(e: tungstenite::Error) -> DeviceError {
    match e {
        tungstenite::Error::Io(io) => io_error(io),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            DeviceError::Connection("art channel is closed".into())
        }
        tungstenite::Error::Tls(tls) => DeviceError::Connection(format!("TLS error: {tls}")),
        other => DeviceError::Failure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_io_error_mapping() {
        let timeout = io_error(io::Error::new(io::ErrorKind::WouldBlock, "slow"));
        assert!(matches!(timeout, DeviceError::Timeout(_)));
        let refused = io_error(io::Error::new(io::ErrorKind::ConnectionRefused, "no"));
        assert!(matches!(refused, DeviceError::Connection(_)));
        assert!(matches!(ws_error(tungstenite::Error::AlreadyClosed), DeviceError::Connection(_)));
    }

    #[test]
    fn test_connect_to_closed_port_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = SamsungConnector {
            port,
            client_name: "DynamicTV".into(),
            token: None,
            timeout: Duration::from_secs(1),
            select_wait: Duration::from_millis(100),
        };
        assert!(matches!(connector.connect("127.0.0.1"), Err(DeviceError::Connection(_))));
    }

    #[test]
    fn test_plain_upload_socket_receives_framed_payload() {
        use std::io::Read;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            received
        });

        let header = protocol::frame_header(&protocol::upload_header(3, "PNG", "k"));
        let conn = ConnInfo {
            ip: "127.0.0.1".into(),
            port,
            key: "k".into(),
            secured: false,
        };
        {
            let addr = resolve(&conn.ip, conn.port).unwrap();
            let mut tcp = TcpStream::connect(addr).unwrap();
            write_upload(&mut tcp, &header, b"abc").unwrap();
        }

        let received = reader.join().unwrap();
        assert_eq!(&received[..header.len()], header.as_slice());
        assert_eq!(&received[header.len()..], b"abc");
    }

    mod channel {
        use super::*;
        use std::io::Read;
        use std::sync::mpsc;
        use std::thread::{self, JoinHandle};
        use serde_json::json;

        type ServerSocket = WebSocket<TcpStream>;

        /// An `ArtChannel` over plain TCP talking to `script` on a loopback thread.
        fn open_channel<F>(script: F) -> (ArtChannel, JoinHandle<()>)
        where
            F: FnOnce(ServerSocket) + Send + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let server = thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                script(tungstenite::accept(stream).unwrap());
            });

            let tcp = TcpStream::connect(("127.0.0.1", port)).unwrap();
            tcp.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let (socket, _) = tungstenite::client(format!("ws://127.0.0.1:{port}/"), MaybeTlsStream::Plain(tcp)).unwrap();
            let channel = ArtChannel {
                socket,
                timeout: Duration::from_secs(5),
                select_wait: Duration::from_millis(200),
            };
            (channel, server)
        }

        fn send_event(ws: &mut ServerSocket, event: Value) {
            ws.send(Message::text(event.to_string())).unwrap();
        }

        fn send_art(ws: &mut ServerSocket, payload: Value) {
            send_event(ws, json!({"event": "d2d_service_message", "data": payload.to_string()}));
        }

        /// Inner art request of the next client message.
        fn read_request(ws: &mut ServerSocket) -> Value {
            loop {
                if let Message::Text(text) = ws.read().unwrap() {
                    let envelope: Value = serde_json::from_str(&text).unwrap();
                    assert_eq!(envelope["method"], "ms.channel.emit");
                    return serde_json::from_str(envelope["params"]["data"].as_str().unwrap()).unwrap();
                }
            }
        }

        #[test]
        fn test_ready_after_connect_event() {
            let (mut channel, server) = open_channel(|mut ws| {
                send_event(&mut ws, json!({"event": "ms.channel.connect", "data": {"token": "1234"}}));
                send_event(&mut ws, json!({"event": "ms.channel.ready", "data": {}}));
            });
            assert_eq!(channel.await_ready(), Ok(()));
            server.join().unwrap();
        }

        #[test]
        fn test_unauthorized_is_connection_error() {
            let (mut channel, server) = open_channel(|mut ws| {
                send_event(&mut ws, json!({"event": "ms.channel.unauthorized", "data": {}}));
            });
            assert!(matches!(channel.await_ready(), Err(DeviceError::Connection(_))));
            server.join().unwrap();
        }

        #[test]
        fn test_upload_sends_framed_bytes_and_returns_content_id() {
            let (mut channel, server) = open_channel(|mut ws| {
                let request = read_request(&mut ws);
                assert_eq!(request["request"], "send_image");
                assert_eq!(request["file_type"], "PNG");
                assert_eq!(request["file_size"], 3);
                assert_eq!(request["matte_id"], "flexible_polar");

                let data = TcpListener::bind("127.0.0.1:0").unwrap();
                let conn_info = json!({
                    "ip": "127.0.0.1",
                    "port": data.local_addr().unwrap().port(),
                    "key": "k3y",
                    "secured": false,
                });
                // An unrelated event first; it must be skipped.
                send_art(&mut ws, json!({"event": "go_to_standby"}));
                send_art(&mut ws, json!({"event": "ready_to_use", "conn_info": conn_info.to_string()}));

                let (mut upload, _) = data.accept().unwrap();
                let mut len = [0u8; 4];
                upload.read_exact(&mut len).unwrap();
                let mut header = vec![0u8; u32::from_be_bytes(len) as usize];
                upload.read_exact(&mut header).unwrap();
                let header: Value = serde_json::from_slice(&header).unwrap();
                assert_eq!(header["secKey"], "k3y");
                assert_eq!(header["fileLength"], 3);
                let mut body = [0u8; 3];
                upload.read_exact(&mut body).unwrap();
                assert_eq!(&body, b"abc");

                send_art(&mut ws, json!({"event": "image_added", "content_id": "MY_F0042"}));
            });

            let content_id = channel.upload(b"abc", FileType::Png, &DisplayStyle::default()).unwrap();
            assert_eq!(content_id, "MY_F0042");
            server.join().unwrap();
        }

        #[test]
        fn test_select_confirmed() {
            let (mut channel, server) = open_channel(|mut ws| {
                let request = read_request(&mut ws);
                assert_eq!(request["request"], "select_image");
                assert_eq!(request["content_id"], "MY_F0042");
                send_art(&mut ws, json!({"event": "image_selected", "content_id": "MY_F0042"}));
            });
            assert_eq!(channel.select_image("MY_F0042"), Ok(true));
            server.join().unwrap();
        }

        #[test]
        fn test_select_silence_is_not_selected() {
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let (mut channel, server) = open_channel(move |mut ws| {
                read_request(&mut ws);
                let _ = done_rx.recv_timeout(Duration::from_secs(5));
            });

            assert_eq!(channel.select_image("MY_F0042"), Ok(false));
            // The short select window is undone afterwards.
            let MaybeTlsStream::Plain(tcp) = channel.socket.get_ref() else {
                panic!("plain stream expected");
            };
            assert_eq!(tcp.read_timeout().unwrap(), Some(Duration::from_secs(5)));

            done_tx.send(()).unwrap();
            server.join().unwrap();
        }

        #[test]
        fn test_select_error_event_is_failure() {
            let (mut channel, server) = open_channel(|mut ws| {
                read_request(&mut ws);
                send_art(
                    &mut ws,
                    json!({
                        "event": "error",
                        "request_data": "{\"request\":\"select_image\"}",
                        "error_code": "-1",
                    }),
                );
            });
            assert_eq!(
                channel.select_image("MY_F0042"),
                Err(DeviceError::Failure("select_image failed with error code -1".into()))
            );
            server.join().unwrap();
        }
    }
}
