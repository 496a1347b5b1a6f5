//! 路由表
//!
//! 路径和方法精确匹配（区分大小写），启动时注册，之后不再修改。

use http::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// 同一 (path, method) 重复注册
    DuplicateRoute { path: String, method: Method },
    /// 没有精确匹配的路由
    NotFound { path: String, method: Method },
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::DuplicateRoute { path, method } => {
                write!(f, "route already registered: {} {}", method, path)
            }
            RouteError::NotFound { path, method } => {
                write!(f, "no route for {} {}", method, path)
            }
        }
    }
}

impl std::error::Error for RouteError {}

struct Route<H> {
    path: String,
    method: Method,
    handler: H,
}

/// `(path, method) -> handler` 映射
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, method: Method, handler: H) -> Result<(), RouteError> {
        if self.find(path, &method).is_some() {
            return Err(RouteError::DuplicateRoute {
                path: path.to_string(),
                method,
            });
        }

        self.routes.push(Route {
            path: path.to_string(),
            method,
            handler,
        });
        Ok(())
    }

    pub fn dispatch(&self, path: &str, method: &Method) -> Result<&H, RouteError> {
        self.find(path, method)
            .map(|route| &route.handler)
            .ok_or_else(|| RouteError::NotFound {
                path: path.to_string(),
                method: method.clone(),
            })
    }

    /// 按注册顺序列出所有 `(path, method)`，供传输层绑定
    pub fn routes(&self) -> impl Iterator<Item = (&str, &Method)> {
        self.routes.iter().map(|r| (r.path.as_str(), &r.method))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn find(&self, path: &str, method: &Method) -> Option<&Route<H>> {
        self.routes
            .iter()
            .find(|r| r.path == path && r.method == *method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable<u8> {
        let mut table = RouteTable::new();
        table.register("/", Method::GET, 0).unwrap();
        table.register("/scan", Method::GET, 1).unwrap();
        table.register("/manualentry", Method::GET, 2).unwrap();
        table.register("/manualentry", Method::POST, 3).unwrap();
        table
    }

    #[test]
    fn test_dispatch_exact_match() {
        let table = table();
        assert_eq!(table.dispatch("/scan", &Method::GET), Ok(&1));
        assert_eq!(table.dispatch("/manualentry", &Method::POST), Ok(&3));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_dispatch_not_found() {
        let table = table();
        for (path, method) in [
            ("/Scan", Method::GET),
            ("/scan/", Method::GET),
            ("/scan", Method::POST),
            ("/sca", Method::GET),
            ("", Method::GET),
        ] {
            assert_eq!(
                table.dispatch(path, &method),
                Err(RouteError::NotFound {
                    path: path.to_string(),
                    method
                })
            );
        }
    }

    #[test]
    fn test_duplicate_route() {
        let mut table = table();
        let err = table.register("/scan", Method::GET, 9).unwrap_err();
        assert_eq!(
            err,
            RouteError::DuplicateRoute {
                path: "/scan".to_string(),
                method: Method::GET
            }
        );
        // 原处理器保持不变
        assert_eq!(table.dispatch("/scan", &Method::GET), Ok(&1));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_routes_in_registration_order() {
        let table = table();
        let routes: Vec<_> = table.routes().map(|(p, m)| format!("{} {}", m, p)).collect();
        assert_eq!(
            routes,
            vec!["GET /", "GET /scan", "GET /manualentry", "POST /manualentry"]
        );
    }
}
