//! 设备端：SoftAP、HTTP 服务器和 mDNS

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    http::{
        server::{Configuration, EspHttpConnection, EspHttpServer, Request},
        Method,
    },
    io::{Read, Write},
    ipv4::{self, Mask, Subnet},
    mdns::EspMdns,
    netif::{EspNetif, NetifConfiguration, NetifStack},
    wifi::{
        config::ScanConfig, AccessPointConfiguration, AuthMethod, BlockingWifi,
        ClientConfiguration, Configuration as WifiConfig, EspWifi, WifiDriver,
    },
};

use super::aliases::{AliasEntry, AliasKind};
use super::broker::{BrokerConfigSink, BrokerCredential};
use super::handlers::{NetworkCredential, PortalController};
use super::request::RequestContext;
use super::scan::{ConnectivityProbe, EncryptionKind, ScanEntry, ScanStatus};
use crate::config::{AccessPointConfig, PortalConfig};

const MAX_BODY_LEN: usize = 4096;

/// 回调转发给主循环的事件
#[derive(Debug, Clone)]
pub enum PortalEvent {
    NetworkChange(NetworkCredential),
    ServerChange(BrokerCredential),
    /// 任一别名表发生增删改
    AliasesChanged(AliasKind),
}

/// 基于 esp-idf WiFi 驱动的非阻塞扫描
pub struct EspProbe {
    wifi: BlockingWifi<EspWifi<'static>>,
    ap_config: AccessPointConfiguration,
    scanning: bool,
    results: Option<Vec<ScanEntry>>,
}

impl EspProbe {
    fn fetch_results(&mut self) -> anyhow::Result<Vec<ScanEntry>> {
        let aps = self.wifi.wifi_mut().driver_mut().get_scan_result()?;
        Ok(aps
            .into_iter()
            .map(|ap| ScanEntry {
                ssid: ap.ssid.to_string(),
                encryption: encryption_kind(ap.auth_method),
                rssi: i32::from(ap.signal_strength),
            })
            .collect())
    }
}

fn encryption_kind(auth: Option<AuthMethod>) -> EncryptionKind {
    match auth {
        Some(AuthMethod::None) => EncryptionKind::OPEN,
        Some(AuthMethod::WEP) => EncryptionKind::WEP,
        Some(AuthMethod::WPA) => EncryptionKind::WPA_PSK,
        Some(AuthMethod::WPA2Personal) => EncryptionKind::WPA2_PSK,
        Some(AuthMethod::WPAWPA2Personal) => EncryptionKind::WPA_WPA2_PSK,
        _ => EncryptionKind::UNKNOWN,
    }
}

impl ConnectivityProbe for EspProbe {
    fn begin_scan(&mut self) -> anyhow::Result<()> {
        if self.scanning {
            anyhow::bail!("scan already running");
        }
        self.wifi
            .wifi_mut()
            .driver_mut()
            .start_scan(&ScanConfig::default(), false)?;
        self.scanning = true;
        Ok(())
    }

    fn scan_status(&mut self) -> ScanStatus {
        if self.scanning {
            match self.wifi.wifi().driver().is_scan_done() {
                Ok(false) => return ScanStatus::Running,
                Ok(true) => {
                    self.scanning = false;
                    match self.fetch_results() {
                        Ok(results) => self.results = Some(results),
                        Err(e) => log::warn!("Failed to read scan results: {:?}", e),
                    }
                }
                Err(e) => {
                    log::warn!("Failed to query scan state: {:?}", e);
                    self.scanning = false;
                }
            }
        }
        match &self.results {
            Some(results) => ScanStatus::Complete(results.len()),
            None => ScanStatus::Idle,
        }
    }

    fn result_at(&self, index: usize) -> Option<ScanEntry> {
        self.results.as_ref()?.get(index).cloned()
    }

    fn clear_results(&mut self) {
        self.results = None;
    }

    fn join(&mut self, ssid: &str, password: &str) -> anyhow::Result<()> {
        let client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("SSID too long: {:?}", ssid))?,
            password: password
                .try_into()
                .map_err(|_| anyhow::anyhow!("Password too long"))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        self.wifi
            .set_configuration(&WifiConfig::Mixed(client, self.ap_config.clone()))?;
        self.wifi.wifi_mut().connect()?;
        log::info!("Connecting to {:?}", ssid);
        Ok(())
    }
}

struct PortalState {
    controller: PortalController,
    probe: EspProbe,
    broker: Option<Box<dyn BrokerConfigSink + Send>>,
}

pub struct CaptivePortal {
    state: Arc<Mutex<PortalState>>,
    ap_ip: std::net::Ipv4Addr,
    _server: EspHttpServer<'static>,
    _mdns: EspMdns,
}

impl CaptivePortal {
    /// 启动 SoftAP、HTTP 服务器和 mDNS，返回门户和事件接收端
    pub fn start(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        config: &PortalConfig,
        broker: Option<Box<dyn BrokerConfigSink + Send>>,
    ) -> anyhow::Result<(Self, Receiver<PortalEvent>)> {
        let (tx, rx) = mpsc::channel();

        let mut controller = PortalController::new(config)?;
        register_events(&mut controller, &tx);

        // 1. 配置并启动 SoftAP
        let (wifi, ap_config) = start_ap(modem, sysloop, config)?;
        log::info!("SoftAP started: {}", config.ap_ssid());

        let mut probe = EspProbe {
            wifi,
            ap_config,
            scanning: false,
            results: None,
        };
        controller.start(&mut probe);

        let state = Arc::new(Mutex::new(PortalState {
            controller,
            probe,
            broker,
        }));

        // 2. 启动 HTTP 服务器
        let server = start_http_server(&state, config.http_port)?;
        log::info!(
            "HTTP server started on {}:{}",
            config.access_point.local_ip,
            config.http_port
        );

        // 3. 广播 mDNS 主机名
        let mut mdns = EspMdns::take()?;
        mdns.set_hostname(&config.server_name)?;
        mdns.set_instance_name(&config.server_name)?;
        mdns.add_service(None, "_http", "_tcp", config.http_port, &[])?;
        log::info!("mDNS responder started: {}.local", config.server_name);

        Ok((
            Self {
                state,
                ap_ip: config.access_point.local_ip,
                _server: server,
                _mdns: mdns,
            },
            rx,
        ))
    }

    pub fn ap_ip(&self) -> std::net::Ipv4Addr {
        self.ap_ip
    }

    /// 在两次请求之间调用，扫描结束后重新发起
    pub fn poll(&self) -> anyhow::Result<ScanStatus> {
        let mut state = lock(&self.state)?;
        let PortalState {
            controller, probe, ..
        } = &mut *state;
        Ok(controller.poll(probe))
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        lock(&self.state)?.controller.stop();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state)
            .map(|state| state.controller.is_running())
            .unwrap_or(false)
    }

    /// 当前的别名槽位，用于写回 NVS
    pub fn alias_entries(&self, kind: AliasKind) -> anyhow::Result<Vec<AliasEntry>> {
        let state = lock(&self.state)?;
        Ok(state
            .controller
            .aliases()
            .list(kind)
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

fn lock(state: &Mutex<PortalState>) -> anyhow::Result<MutexGuard<'_, PortalState>> {
    state
        .lock()
        .map_err(|_| anyhow::anyhow!("Portal state poisoned"))
}

fn register_events(controller: &mut PortalController, tx: &Sender<PortalEvent>) {
    let send = |tx: &Sender<PortalEvent>, event: PortalEvent| {
        if let Err(e) = tx.send(event) {
            log::warn!("Portal event dropped: {:?}", e.0);
        }
    };

    let sender = tx.clone();
    controller.on_network_change(move |c| send(&sender, PortalEvent::NetworkChange(c.clone())));
    let sender = tx.clone();
    controller.on_server_change(move |c| send(&sender, PortalEvent::ServerChange(c.clone())));

    for kind in [AliasKind::Publication, AliasKind::Subscription] {
        let add = tx.clone();
        let remove = tx.clone();
        let change = tx.clone();
        let on_add = move |_: &str| send(&add, PortalEvent::AliasesChanged(kind));
        let on_remove = move |_: &str| send(&remove, PortalEvent::AliasesChanged(kind));
        let on_change = move |_: usize, _: &str| send(&change, PortalEvent::AliasesChanged(kind));
        match kind {
            AliasKind::Publication => {
                controller.on_add_publication(on_add);
                controller.on_remove_publication(on_remove);
                controller.on_publication_change(on_change);
            }
            AliasKind::Subscription => {
                controller.on_add_subscription(on_add);
                controller.on_remove_subscription(on_remove);
                controller.on_subscription_change(on_change);
            }
        }
    }
}

fn start_ap(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    config: &PortalConfig,
) -> anyhow::Result<(BlockingWifi<EspWifi<'static>>, AccessPointConfiguration)> {
    let ap: &AccessPointConfig = &config.access_point;

    let ap_netif_config = NetifConfiguration {
        ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
            subnet: Subnet {
                gateway: ap.gateway,
                mask: Mask(ap.netmask),
            },
            dhcp_enabled: true,
            dns: Some(ap.local_ip),
            secondary_dns: None,
        })),
        ..NetifConfiguration::wifi_default_router()
    };
    let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;

    let driver = WifiDriver::new(modem, sysloop.clone(), None)?;
    // 扫描需要 STA 接口
    let sta_netif = EspNetif::new(NetifStack::Sta)?;

    let mut wifi = BlockingWifi::wrap(EspWifi::wrap_all(driver, sta_netif, ap_netif)?, sysloop)?;

    let ssid = config.ap_ssid();
    let ap_config = AccessPointConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("AP SSID too long: {:?}", ssid))?,
        ssid_hidden: false,
        channel: ap.channel,
        password: ap
            .password
            .as_str()
            .try_into()
            .map_err(|_| anyhow::anyhow!("AP password too long"))?,
        auth_method: if ap.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        max_connections: ap.max_connections,
        ..Default::default()
    };

    wifi.set_configuration(&WifiConfig::Mixed(
        ClientConfiguration::default(),
        ap_config.clone(),
    ))?;
    wifi.start()?;

    Ok((wifi, ap_config))
}

fn esp_method(method: &http::Method) -> anyhow::Result<Method> {
    if *method == http::Method::GET {
        Ok(Method::Get)
    } else if *method == http::Method::POST {
        Ok(Method::Post)
    } else {
        anyhow::bail!("Unsupported method {}", method)
    }
}

fn start_http_server(
    state: &Arc<Mutex<PortalState>>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let routes: Vec<(String, http::Method)> = lock(state)?
        .controller
        .routes()
        .routes()
        .map(|(path, method)| (path.to_string(), method.clone()))
        .collect();

    let config = Configuration {
        http_port: port,
        stack_size: 8192,
        // 额外两个是兜底的 GET/POST 通配路由
        max_uri_handlers: routes.len() + 2,
        uri_match_wildcard: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&config)?;

    for (path, method) in routes {
        register(&mut server, &path, method, state.clone())?;
    }
    // 未注册的路径同样交给控制器，统一返回 404 文本
    register(&mut server, "/*", http::Method::GET, state.clone())?;
    register(&mut server, "/*", http::Method::POST, state.clone())?;

    Ok(server)
}

fn register(
    server: &mut EspHttpServer<'static>,
    path: &str,
    method: http::Method,
    state: Arc<Mutex<PortalState>>,
) -> anyhow::Result<()> {
    server.fn_handler::<anyhow::Error, _>(path, esp_method(&method)?, move |req| {
        serve(req, &method, &state)
    })?;
    Ok(())
}

fn serve(
    mut req: Request<&mut EspHttpConnection<'_>>,
    method: &http::Method,
    state: &Mutex<PortalState>,
) -> anyhow::Result<()> {
    let mut body = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let len = req.read(&mut buf)?;
        if len == 0 {
            break;
        }
        body.extend_from_slice(&buf[..len]);
        anyhow::ensure!(body.len() <= MAX_BODY_LEN, "Request body too large");
    }
    let body = String::from_utf8_lossy(&body);
    let request = RequestContext::from_parts(req.uri(), method.clone(), &body);

    let response = {
        let mut state = lock(state)?;
        let PortalState {
            controller,
            probe,
            broker,
        } = &mut *state;
        let broker = broker
            .as_deref_mut()
            .map(|b| b as &mut dyn BrokerConfigSink);
        controller.handle(&request, probe, broker)
    };

    let content_type = format!("{}; charset=utf-8", response.content_type);
    let mut resp = req.into_response(
        response.status.as_u16(),
        response.status.canonical_reason(),
        &[
            ("Content-Type", content_type.as_str()),
            ("Cache-Control", "no-cache"),
        ],
    )?;
    resp.write_all(response.body.as_bytes())?;
    Ok(())
}
