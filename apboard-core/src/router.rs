use crate::http::Method;

/// Which handler serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Page,
    Sensor,
    Color,
    Message,
    Scan,
    Connect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// 路径必须完全相等
    Exact,
    /// The path equals the pattern or continues it with a `/` segment,
    /// so `/api` covers `/api/x` but not `/apis`.
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    pub path: &'static str,
    pub matching: PathMatch,
    pub route: Route,
}

impl RouteEntry {
    pub fn exact(method: Method, path: &'static str, route: Route) -> Self {
        Self {
            method,
            path,
            matching: PathMatch::Exact,
            route,
        }
    }

    pub fn prefix(method: Method, path: &'static str, route: Route) -> Self {
        Self {
            method,
            path,
            matching: PathMatch::Prefix,
            route,
        }
    }

    fn matches_path(&self, path: &str) -> bool {
        match self.matching {
            PathMatch::Exact => path == self.path,
            PathMatch::Prefix => match path.strip_prefix(self.path) {
                Some(rest) => rest.is_empty() || rest.starts_with('/') || self.path.ends_with('/'),
                None => false,
            },
        }
    }
}

/// Result of looking a request up in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Route(Route),
    /// A route owns this path, but not for this method.
    MethodNotAllowed,
}

/// Ordered, immutable route table. The first matching entry wins and
/// anything unmatched goes to the UI page.
#[derive(Debug, Clone)]
pub struct Router {
    entries: Vec<RouteEntry>,
}

impl Router {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Resolved {
        let mut path_known = false;
        for entry in self.entries.iter().filter(|e| e.matches_path(path)) {
            if entry.method == *method {
                return Resolved::Route(entry.route);
            }
            path_known = true;
        }
        if path_known {
            Resolved::MethodNotAllowed
        } else {
            Resolved::Route(Route::Page)
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(vec![
            RouteEntry::exact(Method::Get, "/", Route::Page),
            RouteEntry::exact(Method::Get, "/sensor", Route::Sensor),
            RouteEntry::exact(Method::Get, "/color", Route::Color),
            RouteEntry::exact(Method::Get, "/message", Route::Message),
            RouteEntry::exact(Method::Get, "/scan", Route::Scan),
            RouteEntry::exact(Method::Post, "/connect", Route::Connect),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_routes_each_endpoint() {
        let router = Router::default();
        let cases = [
            (Method::Get, "/", Route::Page),
            (Method::Get, "/sensor", Route::Sensor),
            (Method::Get, "/color", Route::Color),
            (Method::Get, "/message", Route::Message),
            (Method::Get, "/scan", Route::Scan),
            (Method::Post, "/connect", Route::Connect),
        ];
        for (method, path, route) in cases {
            assert_eq!(router.resolve(&method, path), Resolved::Route(route), "{method} {path}");
        }
    }

    #[test]
    fn connect_does_not_match_connections() {
        let router = Router::default();
        assert_eq!(router.resolve(&Method::Post, "/connections"), Resolved::Route(Route::Page));
        assert_eq!(router.resolve(&Method::Get, "/sensors"), Resolved::Route(Route::Page));
    }

    #[test]
    fn wrong_method_on_known_path_is_rejected() {
        let router = Router::default();
        assert_eq!(router.resolve(&Method::Get, "/connect"), Resolved::MethodNotAllowed);
        assert_eq!(router.resolve(&Method::Post, "/sensor"), Resolved::MethodNotAllowed);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let router = Router::default();
        assert_eq!(router.resolve(&Method::Get, "/SENSOR"), Resolved::Route(Route::Page));
    }

    #[test]
    fn unmatched_paths_fall_back_to_page() {
        let router = Router::default();
        assert_eq!(router.resolve(&Method::Get, "/app.js"), Resolved::Route(Route::Page));
        assert_eq!(router.resolve(&Method::Delete, "/nowhere"), Resolved::Route(Route::Page));
    }

    #[test]
    fn prefix_entries_cover_whole_segments() {
        let router = Router::new(vec![
            RouteEntry::prefix(Method::Get, "/api/scan", Route::Scan),
            RouteEntry::exact(Method::Get, "/api/scan/now", Route::Sensor),
        ]);
        assert_eq!(router.resolve(&Method::Get, "/api/scan"), Resolved::Route(Route::Scan));
        // 先匹配的条目优先
        assert_eq!(router.resolve(&Method::Get, "/api/scan/now"), Resolved::Route(Route::Scan));
        assert_eq!(router.resolve(&Method::Get, "/api/scanner"), Resolved::Route(Route::Page));
    }
}
