//! HTTP 路由处理器
//!
//! `PortalController` 持有路由表和别名表。无线驱动和 MQTT 配置接收方只在
//! 每次 `handle` 调用期间借用，控制器不管理它们的生命周期。

use http::Method;

use super::aliases::{AliasError, AliasKind, AliasRegistry};
use super::broker::{parse_port, BrokerConfigSink, BrokerCredential};
use super::error::PortalError;
use super::html;
use super::request::{RequestContext, Response};
use super::routes::{RouteError, RouteTable};
use super::scan::{ConnectivityProbe, ScanSnapshot, ScanStatus};
use crate::config::PortalConfig;

/// 一次 /NetworkChange 提交的内容，只在回调期间存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCredential {
    pub ssid: String,
    pub password: String,
}

/// 处理器看到的单次请求环境
pub struct Exchange<'a> {
    pub request: &'a RequestContext,
    pub probe: &'a mut dyn ConnectivityProbe,
    pub broker: Option<&'a mut dyn BrokerConfigSink>,
}

pub type Handler = fn(&mut PortalController, &mut Exchange<'_>) -> Result<Response, PortalError>;

type NetworkChangeFn = Box<dyn FnMut(&NetworkCredential) + Send>;
type ServerChangeFn = Box<dyn FnMut(&BrokerCredential) + Send>;

pub struct PortalController {
    server_name: String,
    broker_support: bool,
    scan_refresh_secs: u32,
    default_broker_port: u16,
    join_on_network_change: bool,
    routes: RouteTable<Handler>,
    aliases: AliasRegistry,
    on_network_change: Option<NetworkChangeFn>,
    on_server_change: Option<ServerChangeFn>,
    running: bool,
}

impl PortalController {
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let aliases = if config.broker_support {
            AliasRegistry::new(config.publications.clone(), config.subscriptions.clone())?
        } else {
            AliasRegistry::empty()
        };

        Ok(Self {
            server_name: config.server_name.clone(),
            broker_support: config.broker_support,
            scan_refresh_secs: config.scan_refresh_secs,
            default_broker_port: config.default_broker_port,
            join_on_network_change: config.join_on_network_change,
            routes: build_routes(config.broker_support)?,
            aliases,
            on_network_change: None,
            on_server_change: None,
            running: false,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn broker_support(&self) -> bool {
        self.broker_support
    }

    pub fn routes(&self) -> &RouteTable<Handler> {
        &self.routes
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn on_network_change(&mut self, f: impl FnMut(&NetworkCredential) + Send + 'static) {
        self.on_network_change = Some(Box::new(f));
    }

    pub fn on_server_change(&mut self, f: impl FnMut(&BrokerCredential) + Send + 'static) {
        self.on_server_change = Some(Box::new(f));
    }

    pub fn on_add_subscription(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.aliases.on_add(AliasKind::Subscription, f);
    }

    pub fn on_remove_subscription(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.aliases.on_remove(AliasKind::Subscription, f);
    }

    pub fn on_add_publication(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.aliases.on_add(AliasKind::Publication, f);
    }

    pub fn on_remove_publication(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.aliases.on_remove(AliasKind::Publication, f);
    }

    /// 重命名回调，参数为 (下标, 新绑定名)
    pub fn on_subscription_change(&mut self, f: impl FnMut(usize, &str) + Send + 'static) {
        self.aliases.on_change(AliasKind::Subscription, f);
    }

    pub fn on_publication_change(&mut self, f: impl FnMut(usize, &str) + Send + 'static) {
        self.aliases.on_change(AliasKind::Publication, f);
    }

    /// 启动首次扫描，重复调用无效果
    pub fn start(&mut self, probe: &mut dyn ConnectivityProbe) {
        if self.running {
            return;
        }
        log::info!("Portal {} started", self.server_name);
        begin_scan(probe);
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            log::info!("Portal {} stopped", self.server_name);
            self.running = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 两次请求之间调用：扫描空闲时重新发起扫描
    pub fn poll(&mut self, probe: &mut dyn ConnectivityProbe) -> ScanStatus {
        let status = probe.scan_status();
        if self.running && status == ScanStatus::Idle {
            log::debug!("Scan idle, starting a new one");
            begin_scan(probe);
        }
        status
    }

    /// 处理一个请求，任何错误都转换成响应
    pub fn handle<'a>(
        &mut self,
        request: &'a RequestContext,
        probe: &'a mut dyn ConnectivityProbe,
        broker: Option<&'a mut dyn BrokerConfigSink>,
    ) -> Response {
        let response = match self.try_handle(request, probe, broker) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{} {} rejected: {}", request.method, request.path, e);
                e.into_response()
            }
        };
        log::info!(
            "HTTP: {} {} -> {}",
            request.method,
            request.path,
            response.status.as_u16()
        );
        response
    }

    pub fn try_handle<'a>(
        &mut self,
        request: &'a RequestContext,
        probe: &'a mut dyn ConnectivityProbe,
        broker: Option<&'a mut dyn BrokerConfigSink>,
    ) -> Result<Response, PortalError> {
        let handler = *self.routes.dispatch(&request.path, &request.method)?;
        let mut exchange = Exchange {
            request,
            probe,
            broker,
        };
        handler(self, &mut exchange)
    }
}

fn build_routes(broker_support: bool) -> Result<RouteTable<Handler>, RouteError> {
    let mut routes: RouteTable<Handler> = RouteTable::new();

    routes.register("/", Method::GET, handle_index)?;
    routes.register("/manualentry", Method::GET, handle_manual_entry)?;
    routes.register("/manualentry", Method::POST, handle_manual_entry)?;
    routes.register("/scan", Method::GET, handle_scan)?;
    routes.register("/NetworkChange", Method::POST, handle_network_change)?;

    if broker_support {
        routes.register("/serverentry", Method::GET, handle_server_entry)?;
        routes.register("/serverchange", Method::POST, handle_server_change)?;
        routes.register("/subscription", Method::GET, handle_subscriptions)?;
        routes.register("/subscription", Method::POST, handle_subscriptions)?;
        routes.register("/publication", Method::GET, handle_publications)?;
        routes.register("/publication", Method::POST, handle_publications)?;
        routes.register("/modifysubscription", Method::POST, handle_modify_subscription)?;
        routes.register("/modifypublication", Method::POST, handle_modify_publication)?;
    }

    Ok(routes)
}

fn begin_scan(probe: &mut dyn ConnectivityProbe) {
    if let Err(e) = probe.begin_scan() {
        log::warn!("Failed to start WiFi scan: {:?}", e);
    }
}

fn handle_index(portal: &mut PortalController, _: &mut Exchange<'_>) -> Result<Response, PortalError> {
    Ok(Response::html(html::index(portal.broker_support)))
}

fn handle_manual_entry(
    _: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    Ok(Response::html(html::manual_entry(ex.request.arg("ssid"))))
}

fn handle_scan(portal: &mut PortalController, ex: &mut Exchange<'_>) -> Result<Response, PortalError> {
    let snapshot = match ex.probe.scan_status() {
        ScanStatus::Running => {
            log::debug!("Scan still running");
            ScanSnapshot::default()
        }
        ScanStatus::Complete(count) => {
            let snapshot = ScanSnapshot::collect(&*ex.probe, count);
            ex.probe.clear_results();
            begin_scan(ex.probe);
            snapshot
        }
        ScanStatus::Idle => {
            begin_scan(ex.probe);
            ScanSnapshot::default()
        }
    };
    Ok(Response::html(html::scan(&snapshot, portal.scan_refresh_secs)))
}

fn handle_network_change(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    // 密码可以为空
    let ssid = ex
        .request
        .non_empty_arg("ssid")
        .ok_or(PortalError::Validation("ssid"))?;
    let credential = NetworkCredential {
        ssid: ssid.to_string(),
        password: ex.request.arg_or_empty("password").to_string(),
    };

    log::info!("Network change requested: ssid={:?}", credential.ssid);
    if let Some(f) = portal.on_network_change.as_mut() {
        f(&credential);
    }
    if portal.join_on_network_change {
        if let Err(e) = ex.probe.join(&credential.ssid, &credential.password) {
            log::error!("Failed to join {:?}: {:?}", credential.ssid, e);
        }
    }

    Ok(Response::html(html::UPDATED_HTML))
}

fn handle_server_entry(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    let status = ex.broker.as_ref().and_then(|b| b.status());
    Ok(Response::html(html::server_entry(
        portal.default_broker_port,
        status,
    )))
}

fn handle_server_change(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    let request = ex.request;
    let address = request
        .non_empty_arg("address")
        .ok_or(PortalError::Validation("address"))?;
    let port = request
        .non_empty_arg("port")
        .ok_or(PortalError::Validation("port"))?;

    let credential = BrokerCredential {
        address: address.to_string(),
        port: parse_port(port),
        username: request.arg_or_empty("user").to_string(),
        password: request.arg_or_empty("password").to_string(),
    };

    log::info!(
        "Broker change requested: {}:{}",
        credential.address,
        credential.port
    );
    if let Some(broker) = ex.broker.as_mut() {
        if let Err(e) = broker.configure(&credential) {
            log::error!("Failed to configure broker: {:?}", e);
        }
    }
    if let Some(f) = portal.on_server_change.as_mut() {
        f(&credential);
    }

    Ok(Response::html(html::UPDATED_HTML))
}

fn handle_subscriptions(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    handle_alias_list(portal, ex, AliasKind::Subscription)
}

fn handle_publications(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    handle_alias_list(portal, ex, AliasKind::Publication)
}

/// 列表页；POST 带 index 和 name 时先重命名该槽位
fn handle_alias_list(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
    kind: AliasKind,
) -> Result<Response, PortalError> {
    let request = ex.request;
    if request.method == Method::POST && request.has_arg("index") && request.has_arg("name") {
        let raw_index = request.arg_or_empty("index");
        let index = raw_index.trim().parse::<usize>().map_err(|_| {
            PortalError::Alias(AliasError::IndexOutOfRange {
                kind,
                index: usize::MAX,
                capacity: portal.aliases.list(kind).capacity(),
            })
        })?;
        portal
            .aliases
            .rename(kind, index, request.arg_or_empty("name"))?;
    }

    Ok(Response::html(html::alias_list(portal.aliases.list(kind))))
}

fn handle_modify_subscription(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    handle_modify(portal, ex, AliasKind::Subscription)
}

fn handle_modify_publication(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
) -> Result<Response, PortalError> {
    handle_modify(portal, ex, AliasKind::Publication)
}

fn handle_modify(
    portal: &mut PortalController,
    ex: &mut Exchange<'_>,
    kind: AliasKind,
) -> Result<Response, PortalError> {
    let request = ex.request;
    let name = request
        .non_empty_arg("name")
        .ok_or(PortalError::Validation("name"))?;
    let modify = request
        .non_empty_arg("modify")
        .ok_or(PortalError::Validation("modify"))?;

    match modify {
        "add" => {
            portal.aliases.add_binding(kind, name)?;
            Ok(Response::html(html::modified(kind, true)))
        }
        "remove" => {
            portal.aliases.remove_binding(kind, name)?;
            Ok(Response::html(html::modified(kind, false)))
        }
        other => Err(PortalError::BadModifyType(other.to_string())),
    }
}
