//! 请求上下文与响应
//!
//! 传输层负责把 URI 查询串和表单正文解码成参数表，处理器只读取。

use http::{Method, StatusCode};

/// 单个请求：路径、方法和按出现顺序保存的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub path: String,
    pub method: Method,
    args: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
            args: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path, Method::GET)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(path, Method::POST)
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_arg(name, value);
        self
    }

    pub fn push_arg(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.args.push((name.into(), value.into()));
    }

    /// 解析 `application/x-www-form-urlencoded` 串，追加到参数表
    pub fn extend_form(&mut self, encoded: &str) {
        for pair in encoded.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.args.push((decode_component(key), decode_component(value)));
        }
    }

    /// 由完整 URI（可带查询串）和表单正文构造请求
    pub fn from_parts(uri: &str, method: Method, body: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let mut ctx = Self::new(path, method);
        ctx.extend_form(query);
        ctx.extend_form(body);
        ctx
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.iter().any(|(k, _)| k == name)
    }

    /// 同名参数出现多次时取第一个
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 参数缺失时返回空串
    pub fn arg_or_empty(&self, name: &str) -> &str {
        self.arg(name).unwrap_or_default()
    }

    /// 参数存在且非空
    pub fn non_empty_arg(&self, name: &str) -> Option<&str> {
        self.arg(name).filter(|v| !v.is_empty())
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            log::warn!("Invalid form encoding {:?}: {}", raw, e);
            raw
        }
    }
}

/// 处理结果，由传输层写回客户端
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/html",
            body: body.into(),
        }
    }

    pub fn plain(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_merges_query_and_body() {
        let ctx = RequestContext::from_parts(
            "/NetworkChange?ssid=Cafe+WiFi",
            Method::POST,
            "password=p%40ss%26word&ssid=ignored&flag",
        );
        assert_eq!(ctx.path, "/NetworkChange");
        assert_eq!(ctx.arg("ssid"), Some("Cafe WiFi"));
        assert_eq!(ctx.arg("password"), Some("p@ss&word"));
        assert!(ctx.has_arg("flag"));
        assert_eq!(ctx.arg("flag"), Some(""));
        assert_eq!(ctx.non_empty_arg("flag"), None);
        assert_eq!(ctx.arg("missing"), None);
        assert_eq!(ctx.arg_or_empty("missing"), "");
    }

    #[test]
    fn test_from_parts_without_query() {
        let ctx = RequestContext::from_parts("/scan", Method::GET, "");
        assert_eq!(ctx.path, "/scan");
        assert!(!ctx.has_arg("ssid"));
    }

    #[test]
    fn test_invalid_utf8_escape_kept_raw() {
        let ctx = RequestContext::from_parts("/x?name=%FF", Method::GET, "");
        assert_eq!(ctx.arg("name"), Some("%FF"));
    }

    #[test]
    fn test_response_constructors() {
        let ok = Response::html("<h1>Updated</h1>");
        assert_eq!(ok.status, StatusCode::OK);
        assert_eq!(ok.content_type, "text/html");

        let bad = Response::plain(StatusCode::BAD_REQUEST, "400: Invalid Request");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.content_type, "text/plain");
    }
}
