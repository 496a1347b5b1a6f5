//! 页面渲染
//!
//! 全部是纯函数：输入当前的别名表或扫描快照，输出 HTML 正文。

use std::fmt::Write;

use super::aliases::{AliasKind, AliasList};
use super::broker::BrokerStatus;
use super::scan::ScanSnapshot;

pub const UPDATED_HTML: &str = "<h1>Updated</h1>";

const STYLE: &str = r#"<style>
    body { font-family: arial, sans-serif; margin: 16px; }
    table { border-collapse: collapse; width: 75%; }
    td, th { border: 1px solid #dddddd; text-align: left; padding: 8px; }
    tr:nth-child(even) { background-color: #dddddd; }
    input { margin: 2px; }
</style>"#;

fn page(head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         {head_extra}{STYLE}</head><body>{body}</body></html>"
    )
}

/// 转义用户提供的文本（SSID、绑定名等）
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn index(broker_support: bool) -> String {
    let mut body = String::from(
        "<h2>Network Configuration</h2>\
         <p><a href=\"/manualentry\">Enter SSID Manually</a></p>\
         <p><a href=\"/scan\">Scan for Networks</a></p>",
    );
    if broker_support {
        body.push_str(
            "<h2>MQTT Configuration</h2>\
             <p><a href=\"/serverentry\">Enter MQTT Server Info</a></p>\
             <p><a href=\"/subscription\">View/Edit Subscriptions</a></p>\
             <p><a href=\"/publication\">View/Edit Publications</a></p>",
        );
    }
    page("", &body)
}

pub fn manual_entry(ssid: Option<&str>) -> String {
    let ssid_attr = match ssid {
        Some(ssid) => format!("value=\"{}\"", escape(ssid)),
        None => "placeholder=\"SSID\"".to_string(),
    };
    let body = format!(
        "<form action=\"/NetworkChange\" method=\"POST\">\
         <input type=\"text\" name=\"ssid\" {ssid_attr}>\
         <input type=\"password\" name=\"password\" placeholder=\"Password\">\
         <input type=\"submit\" value=\"Update\"></form>"
    );
    page("", &body)
}

pub fn scan(snapshot: &ScanSnapshot, refresh_secs: u32) -> String {
    let mut body = format!(
        "<h1>{} Networks Found</h1>\
         <table><tr><th>SSID</th><th>Encryption</th><th>Signal</th><th></th></tr>",
        snapshot.count()
    );

    for entry in &snapshot.entries {
        let ssid = escape(&entry.ssid);
        // 开放网络直接提交空密码，其它网络先进入手动输入页填写密码
        let (action, password) = if entry.encryption.is_open() {
            (
                "/NetworkChange",
                "<input type=\"hidden\" name=\"password\" value=\"\"/>",
            )
        } else {
            ("/manualentry", "")
        };
        let _ = write!(
            body,
            "<tr><td>{ssid}</td><td>{}</td><td>{} dB</td>\
             <td><form action=\"{action}\" method=\"POST\">\
             <input type=\"hidden\" name=\"ssid\" value=\"{ssid}\"/>{password}\
             <input type=\"submit\" name=\"connect\" value=\"Connect\"></form></td></tr>",
            entry.encryption.name(),
            entry.rssi,
        );
    }
    body.push_str("</table>");

    let refresh = format!("<meta http-equiv=\"refresh\" content=\"{refresh_secs}\">");
    page(&refresh, &body)
}

pub fn server_entry(default_port: u16, status: Option<BrokerStatus>) -> String {
    let mut body = String::new();
    if let Some(status) = status {
        let _ = write!(body, "<p>Status: {}</p>", status.name());
    }
    let _ = write!(
        body,
        "<form action=\"/serverchange\" method=\"POST\">\
         <input type=\"text\" name=\"address\" placeholder=\"Server Address\">\
         <input type=\"number\" name=\"port\" placeholder=\"Port\" value=\"{default_port}\">\
         <input type=\"text\" name=\"user\" placeholder=\"User Name\">\
         <input type=\"password\" name=\"password\" placeholder=\"Password\">\
         <input type=\"submit\" value=\"Update\"></form>"
    );
    page("", &body)
}

/// 别名表：每个已绑定槽位一行，行内有重命名和删除两个表单，表尾是新增表单
pub fn alias_list(list: &AliasList) -> String {
    let kind = list.kind();
    let label = kind.label();
    let list_path = kind.list_path();
    let modify_path = kind.modify_path();

    let mut body = format!(
        "<h1>{label}s ({} of {})</h1>",
        list.occupied(),
        list.capacity()
    );

    if list.occupied() > 0 {
        let _ = write!(
            body,
            "<table><tr><th>Alias</th><th>{label} Name</th><th>Remove</th></tr>"
        );
        for (index, entry) in list.iter_occupied() {
            let name = escape(entry.bound_name());
            let _ = write!(
                body,
                "<tr><td>{alias}</td>\
                 <td><form action=\"{list_path}\" method=\"POST\">\
                 <input type=\"hidden\" name=\"index\" value=\"{index}\">\
                 <input type=\"text\" name=\"name\" value=\"{name}\">\
                 <input type=\"submit\" value=\"Update\"></form></td>\
                 <td><form action=\"{modify_path}\" method=\"POST\">\
                 <input type=\"hidden\" name=\"name\" value=\"{name}\">\
                 <input type=\"hidden\" name=\"modify\" value=\"remove\">\
                 <input type=\"submit\" value=\"Remove\"></form></td></tr>",
                alias = escape(entry.alias()),
            );
        }
        body.push_str("</table>");
    }

    if list.occupied() < list.capacity() {
        let _ = write!(
            body,
            "<form action=\"{modify_path}\" method=\"POST\">\
             <input type=\"text\" name=\"name\" placeholder=\"Name\">\
             <input type=\"hidden\" name=\"modify\" value=\"add\">\
             <input type=\"submit\" value=\"Add\"></form>"
        );
    }

    page("", &body)
}

pub fn modified(kind: AliasKind, added: bool) -> String {
    let action = if added { "added" } else { "removed" };
    format!("<h1>{} {}</h1>", kind.label(), action)
}
