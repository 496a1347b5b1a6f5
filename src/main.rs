use netportal::PortalConfig;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use netportal::captive_portal::{AliasEntry, AliasKind, AliasList, CaptivePortal, PortalEvent};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
    let nvs = esp_idf_svc::nvs::EspDefaultNvs::new(partition, "setting", true)?;

    let mut str_buf = [0; 1024];
    let mut read_str = |key: &str| -> Option<String> {
        nvs.get_str(key, &mut str_buf)
            .map_err(|e| log::error!("Failed to get {}: {:?}", key, e))
            .ok()
            .flatten()
            .map(str::to_string)
    };

    static DEFAULT_PORTAL_CONFIG: Option<&str> = std::option_env!("DEFAULT_PORTAL_CONFIG");

    let mut config = match read_str("portal_config").as_deref().or(DEFAULT_PORTAL_CONFIG) {
        Some(json) => PortalConfig::from_json(json)?,
        None => PortalConfig::default(),
    };

    // 之前在网页上修改过的别名绑定
    let mut restore = |kind: AliasKind, key: &str, entries: &mut Vec<AliasEntry>| {
        let Some(json) = read_str(key) else {
            return;
        };
        let saved = match serde_json::from_str::<Vec<AliasEntry>>(&json) {
            Ok(saved) if saved.len() == entries.len() => saved,
            Ok(_) => {
                log::warn!("Saved {} no longer match the configured slots", key);
                return;
            }
            Err(e) => {
                log::error!("Failed to parse saved {}: {:?}", key, e);
                return;
            }
        };
        match AliasList::new(kind, saved.clone()) {
            Ok(_) => *entries = saved,
            Err(e) => log::warn!("Ignoring saved {}: {}", key, e),
        }
    };
    restore(AliasKind::Publication, "publications", &mut config.publications);
    restore(AliasKind::Subscription, "subscriptions", &mut config.subscriptions);

    log::info!("SSID: {:?}", read_str("ssid"));
    log::info!("Server name: {:?}", config.server_name);

    let (portal, events) = CaptivePortal::start(peripherals.modem, sysloop, &config, None)?;
    log::info!("Portal ready at http://{}/", portal.ap_ip());

    while portal.is_running() {
        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(PortalEvent::NetworkChange(credential)) => {
                nvs.set_str("ssid", &credential.ssid)?;
                nvs.set_str("pass", &credential.password)?;
                log::info!("WiFi settings saved, restarting");
                // 等待响应发送完成
                std::thread::sleep(Duration::from_secs(2));
                unsafe { esp_idf_svc::sys::esp_restart() }
            }
            Ok(PortalEvent::ServerChange(credential)) => {
                nvs.set_str("mqtt_host", &credential.address)?;
                nvs.set_u16("mqtt_port", credential.port)?;
                nvs.set_str("mqtt_user", &credential.username)?;
                nvs.set_str("mqtt_pass", &credential.password)?;
                log::info!("MQTT server saved: {}:{}", credential.address, credential.port);
            }
            Ok(PortalEvent::AliasesChanged(kind)) => {
                let key = match kind {
                    AliasKind::Publication => "publications",
                    AliasKind::Subscription => "subscriptions",
                };
                let json = serde_json::to_string(&portal.alias_entries(kind)?)?;
                if let Err(e) = nvs.set_str(key, &json) {
                    log::error!("Failed to save {}: {:?}", key, e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                portal.poll()?;
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Portal event channel closed");
                break;
            }
        }
    }

    portal.stop()?;
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use std::time::Duration;

    use netportal::captive_portal::host::{HostPortal, SimulatedBroker, SimulatedProbe};
    use netportal::captive_portal::{AliasEntry, PortalController};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::var("NETPORTAL_CONFIG") {
        Ok(path) => {
            log::info!("Loading config from {}", path);
            PortalConfig::from_json(&std::fs::read_to_string(&path)?)?
        }
        Err(_) => PortalConfig {
            broker_support: true,
            publications: vec![AliasEntry::new("temperature"), AliasEntry::new("humidity")],
            subscriptions: vec![AliasEntry::new("relay"), AliasEntry::new("led")],
            http_port: 8080,
            ..PortalConfig::default()
        },
    };

    let mut portal = PortalController::new(&config)?;
    portal.on_network_change(|c| log::info!("New WiFi settings: ssid={:?}", c.ssid));
    portal.on_server_change(|c| log::info!("New MQTT server: {}:{}", c.address, c.port));
    portal.on_add_publication(|name| log::info!("Publication bound: {}", name));
    portal.on_remove_publication(|name| log::info!("Publication unbound: {}", name));
    portal.on_publication_change(|index, name| log::info!("Publication {} renamed to {}", index, name));
    portal.on_add_subscription(|name| log::info!("Subscription bound: {}", name));
    portal.on_remove_subscription(|name| log::info!("Subscription unbound: {}", name));
    portal.on_subscription_change(|index, name| log::info!("Subscription {} renamed to {}", index, name));

    let broker = config.broker_support.then(SimulatedBroker::default);
    let mut host = HostPortal::new(portal, SimulatedProbe::default(), broker);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
        host.serve(listener, Duration::from_secs(1)).await
    })
}
