//! 配网门户错误类型

use http::StatusCode;

use super::aliases::AliasError;
use super::request::Response;
use super::routes::RouteError;

/// 请求处理错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// 缺少必填参数或参数为空
    Validation(&'static str),
    /// `modify` 既不是 add 也不是 remove
    BadModifyType(String),
    /// 路由错误
    Route(RouteError),
    /// 别名表操作失败
    Alias(AliasError),
}

impl std::fmt::Display for PortalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalError::Validation(arg) => write!(f, "missing or empty argument: {}", arg),
            PortalError::BadModifyType(value) => write!(f, "bad modify type: {:?}", value),
            PortalError::Route(e) => write!(f, "{}", e),
            PortalError::Alias(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PortalError {}

impl From<RouteError> for PortalError {
    fn from(e: RouteError) -> Self {
        PortalError::Route(e)
    }
}

impl From<AliasError> for PortalError {
    fn from(e: AliasError) -> Self {
        PortalError::Alias(e)
    }
}

impl PortalError {
    pub fn status(&self) -> StatusCode {
        match self {
            PortalError::Route(RouteError::NotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// 转换为纯文本错误响应，正文格式为 `<code>: <message>`
    pub fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            PortalError::Validation(_) => "Invalid Request",
            PortalError::BadModifyType(_) => "Bad Modify Type",
            PortalError::Route(RouteError::NotFound { .. }) => "Not Found",
            PortalError::Route(RouteError::DuplicateRoute { .. }) => "Invalid Route",
            PortalError::Alias(AliasError::CapacityExceeded { .. }) => "List Full",
            PortalError::Alias(AliasError::NotFound { .. }) => "Name Not Found",
            PortalError::Alias(AliasError::AlreadyBound { .. }) => "Name Already Bound",
            PortalError::Alias(AliasError::IndexOutOfRange { .. }) => "Invalid Index",
            PortalError::Alias(AliasError::EmptyName) => "Invalid Request",
            PortalError::Alias(AliasError::EmptyAlias { .. })
            | PortalError::Alias(AliasError::DuplicateBinding { .. }) => "Invalid Alias",
        };
        Response::plain(status, format!("{}: {}", status.as_u16(), message))
    }
}
