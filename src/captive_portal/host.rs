//! 主机端传输层
//!
//! 在没有硬件时用 tokio 提供 HTTP/1.1 服务，无线驱动和 MQTT 客户端用模拟实现代替。
//! 与设备端一样，一次只处理一个请求，空闲时轮询扫描状态。

use std::time::Duration;

use http::Method;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::broker::{BrokerConfigSink, BrokerCredential, BrokerStatus};
use super::handlers::PortalController;
use super::request::{RequestContext, Response};
use super::scan::{ConnectivityProbe, EncryptionKind, ScanEntry, ScanStatus};

const MAX_BODY_LEN: usize = 4096;
const MAX_LINE_LEN: usize = 1024;
const MAX_HEADERS: usize = 64;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// 模拟的无线驱动：扫描在若干次状态查询后完成
pub struct SimulatedProbe {
    networks: Vec<ScanEntry>,
    scan_polls: u32,
    state: SimulatedScan,
}

enum SimulatedScan {
    Idle,
    Running { remaining: u32 },
    Done,
}

impl SimulatedProbe {
    pub fn new(networks: Vec<ScanEntry>, scan_polls: u32) -> Self {
        Self {
            networks,
            scan_polls,
            state: SimulatedScan::Idle,
        }
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        let network = |ssid: &str, encryption, rssi| ScanEntry {
            ssid: ssid.to_string(),
            encryption,
            rssi,
        };
        Self::new(
            vec![
                network("HomeNetwork", EncryptionKind::WPA2_PSK, -48),
                network("CoffeeShop", EncryptionKind::OPEN, -67),
                network("Neighbor", EncryptionKind::WPA_WPA2_PSK, -81),
            ],
            2,
        )
    }
}

impl ConnectivityProbe for SimulatedProbe {
    fn begin_scan(&mut self) -> anyhow::Result<()> {
        if let SimulatedScan::Running { .. } = self.state {
            anyhow::bail!("scan already running");
        }
        self.state = SimulatedScan::Running {
            remaining: self.scan_polls,
        };
        Ok(())
    }

    fn scan_status(&mut self) -> ScanStatus {
        match &mut self.state {
            SimulatedScan::Idle => ScanStatus::Idle,
            SimulatedScan::Running { remaining } if *remaining > 0 => {
                *remaining -= 1;
                ScanStatus::Running
            }
            SimulatedScan::Running { .. } => {
                self.state = SimulatedScan::Done;
                ScanStatus::Complete(self.networks.len())
            }
            SimulatedScan::Done => ScanStatus::Complete(self.networks.len()),
        }
    }

    fn result_at(&self, index: usize) -> Option<ScanEntry> {
        match self.state {
            SimulatedScan::Done => self.networks.get(index).cloned(),
            _ => None,
        }
    }

    fn clear_results(&mut self) {
        self.state = SimulatedScan::Idle;
    }

    fn join(&mut self, ssid: &str, _password: &str) -> anyhow::Result<()> {
        log::info!("[Simulated] joining {:?}", ssid);
        Ok(())
    }
}

/// 模拟的 MQTT 客户端：配置后即视为已连接
#[derive(Default)]
pub struct SimulatedBroker {
    connected_to: Option<(String, u16)>,
}

impl BrokerConfigSink for SimulatedBroker {
    fn configure(&mut self, credential: &BrokerCredential) -> anyhow::Result<()> {
        log::info!(
            "[Simulated] broker set to {}:{}",
            credential.address,
            credential.port
        );
        self.connected_to = Some((credential.address.clone(), credential.port));
        Ok(())
    }

    fn status(&self) -> Option<BrokerStatus> {
        Some(match self.connected_to {
            Some(_) => BrokerStatus::CONNECTED,
            None => BrokerStatus::DISCONNECTED,
        })
    }
}

/// 控制器与它借用的协作方
pub struct HostPortal<P, B> {
    portal: PortalController,
    probe: P,
    broker: Option<B>,
}

impl<P: ConnectivityProbe, B: BrokerConfigSink> HostPortal<P, B> {
    pub fn new(portal: PortalController, probe: P, broker: Option<B>) -> Self {
        Self {
            portal,
            probe,
            broker,
        }
    }

    pub fn portal(&self) -> &PortalController {
        &self.portal
    }

    pub fn handle(&mut self, request: &RequestContext) -> Response {
        let broker = self.broker.as_mut().map(|b| b as &mut dyn BrokerConfigSink);
        self.portal.handle(request, &mut self.probe, broker)
    }

    pub async fn serve(&mut self, listener: TcpListener, poll_interval: Duration) -> anyhow::Result<()> {
        log::info!(
            "HTTP server {} listening on {}",
            self.portal.server_name(),
            listener.local_addr()?
        );
        self.portal.start(&mut self.probe);

        let mut ticker = tokio::time::interval(poll_interval);
        while self.portal.is_running() {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = self.portal.poll(&mut self.probe);
                    log::debug!("Scan status: {:?}", status);
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::warn!("Failed to accept connection: {:?}", e);
                            continue;
                        }
                    };
                    if let Err(e) = self.serve_connection(stream).await {
                        log::warn!("Connection from {} failed: {:?}", peer, e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn serve_connection(&mut self, mut stream: TcpStream) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let request = tokio::time::timeout(READ_TIMEOUT, read_request(&mut reader))
            .await
            .map_err(|_| anyhow::anyhow!("Timeout reading request"))??;

        let response = self.handle(&request);
        writer.write_all(&encode_response(&response)).await?;
        writer.shutdown().await?;
        Ok(())
    }
}

/// 读取请求行、头部和表单正文
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> anyhow::Result<RequestContext> {
    let mut line = String::new();
    read_line_capped(reader, &mut line).await?;

    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty request line"))?;
    let uri = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing request URI"))?
        .to_string();
    let method = Method::from_bytes(method.as_bytes())?;

    let mut content_length = 0usize;
    let mut headers = 0usize;
    loop {
        let mut header = String::new();
        if read_line_capped(reader, &mut header).await? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        headers += 1;
        anyhow::ensure!(headers <= MAX_HEADERS, "Too many request headers");
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse()?;
            }
        }
    }

    anyhow::ensure!(
        content_length <= MAX_BODY_LEN,
        "Request body too large: {} bytes",
        content_length
    );
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await?;
    let body = String::from_utf8_lossy(&body);

    Ok(RequestContext::from_parts(&uri, method, &body))
}

/// 单行最多 `MAX_LINE_LEN` 字节
async fn read_line_capped<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
) -> anyhow::Result<usize> {
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_line(line)
        .await?;
    anyhow::ensure!(
        read < MAX_LINE_LEN || line.ends_with('\n'),
        "Request line longer than {} bytes",
        MAX_LINE_LEN
    );
    Ok(read)
}

pub fn encode_response(response: &Response) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or(""),
        response.content_type,
        response.body.len()
    );
    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(response.body.as_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;
    use http::StatusCode;

    #[tokio::test]
    async fn test_read_post_request() {
        let raw = b"POST /NetworkChange?x=1 HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 26\r\n\r\nssid=My+Net&password=a%26b";
        let mut reader = &raw[..];
        let request = read_request(&mut reader).await.unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/NetworkChange");
        assert_eq!(request.arg("x"), Some("1"));
        assert_eq!(request.arg("ssid"), Some("My Net"));
        assert_eq!(request.arg("password"), Some("a&b"));
    }

    #[tokio::test]
    async fn test_read_request_errors() {
        let mut empty = &b""[..];
        assert!(read_request(&mut empty).await.is_err());

        let mut huge = &b"POST / HTTP/1.1\r\nContent-Length: 100000\r\n\r\n"[..];
        assert!(read_request(&mut huge).await.is_err());

        let mut truncated = &b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"[..];
        assert!(read_request(&mut truncated).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_headers_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nCookie: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_LINE_LEN * 4));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut reader = &raw[..];
        let err = read_request(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("longer than"));

        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            raw.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let mut reader = &raw[..];
        assert!(read_request(&mut reader).await.is_err());

        // 刚好在上限内
        let mut raw = b"GET /scan HTTP/1.1\r\nX-Long: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_LINE_LEN - 12));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut reader = &raw[..];
        assert_eq!(read_request(&mut reader).await.unwrap().path, "/scan");
    }

    #[tokio::test]
    async fn test_serve_survives_bad_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let portal = PortalController::new(&PortalConfig::default()).unwrap();
        let mut host: HostPortal<SimulatedProbe, SimulatedBroker> =
            HostPortal::new(portal, SimulatedProbe::default(), None);

        let client = async {
            let mut bad = TcpStream::connect(addr).await.unwrap();
            bad.write_all(b"\r\n").await.unwrap();
            bad.shutdown().await.unwrap();
            let mut ignored = Vec::new();
            let _ = bad.read_to_end(&mut ignored).await;

            let mut good = TcpStream::connect(addr).await.unwrap();
            good.write_all(b"GET / HTTP/1.1\r\nHost: portal\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            good.read_to_string(&mut response).await.unwrap();
            response
        };

        tokio::select! {
            result = host.serve(listener, Duration::from_secs(60)) => {
                panic!("serve exited: {:?}", result)
            }
            response = client => {
                assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
                assert!(response.contains("Network Configuration"));
            }
        }
    }

    #[test]
    fn test_encode_response() {
        let bytes = encode_response(&Response::plain(
            StatusCode::BAD_REQUEST,
            "400: Invalid Request",
        ));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 20\r\n"));
        assert!(text.ends_with("\r\n\r\n400: Invalid Request"));
    }

    #[test]
    fn test_simulated_scan_cycle() {
        let mut probe = SimulatedProbe::default();
        assert_eq!(probe.scan_status(), ScanStatus::Idle);
        probe.begin_scan().unwrap();
        assert!(probe.begin_scan().is_err());
        assert_eq!(probe.scan_status(), ScanStatus::Running);
        assert_eq!(probe.scan_status(), ScanStatus::Running);
        assert_eq!(probe.scan_status(), ScanStatus::Complete(3));
        assert_eq!(probe.result_at(1).unwrap().ssid, "CoffeeShop");
        probe.clear_results();
        assert_eq!(probe.result_at(0), None);
        assert_eq!(probe.scan_status(), ScanStatus::Idle);
    }

    #[test]
    fn test_host_portal_flow() {
        let config = PortalConfig {
            broker_support: true,
            ..PortalConfig::default()
        };
        let portal = PortalController::new(&config).unwrap();
        let mut host = HostPortal::new(
            portal,
            SimulatedProbe::new(
                vec![ScanEntry {
                    ssid: "lab".to_string(),
                    encryption: EncryptionKind::OPEN,
                    rssi: -40,
                }],
                0,
            ),
            Some(SimulatedBroker::default()),
        );

        // 第一次访问发起扫描
        let resp = host.handle(&RequestContext::get("/scan"));
        assert!(resp.body.contains("<h1>0 Networks Found</h1>"));
        let resp = host.handle(&RequestContext::get("/scan"));
        assert!(resp.body.contains("<h1>1 Networks Found</h1>"));
        assert!(resp.body.contains("<td>lab</td>"));

        let resp = host.handle(&RequestContext::get("/serverentry"));
        assert!(resp.body.contains("Status: DISCONNECTED"));
        let resp = host.handle(
            &RequestContext::post("/serverchange")
                .with_arg("address", "10.1.1.1")
                .with_arg("port", "1883"),
        );
        assert_eq!(resp.status, StatusCode::OK);
        let resp = host.handle(&RequestContext::get("/serverentry"));
        assert!(resp.body.contains("Status: CONNECTED"));
        assert!(host.portal().broker_support());
    }
}
