use crate::framer::RawRequest;
use crate::notify::NotifyHandler;
use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Version,
    Notify,
    NotFound,
}

/// The complete route table. Matching is exact and case-sensitive.
const ROUTES: &[(&str, &str, Route)] = &[
    ("GET", "/health", Route::Health),
    ("GET", "/version", Route::Version),
    ("POST", "/notify", Route::Notify),
];

impl Route {
    pub fn resolve(method: &str, path: &str) -> Route {
        ROUTES
            .iter()
            .find(|(m, p, _)| *m == method && *p == path)
            .map(|(_, _, route)| *route)
            .unwrap_or(Route::NotFound)
    }
}

pub struct Router {
    notify: NotifyHandler,
    version: String,
}

impl Router {
    pub fn new(notify: NotifyHandler) -> Self {
        Self {
            notify,
            version: dandy_build_info::build_id().to_string(),
        }
    }

    /// Override the identifier served by `GET /version`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub async fn handle(&self, request: &RawRequest) -> Response {
        match Route::resolve(&request.method, &request.path) {
            Route::Health => Response::text(200, "OK"),
            Route::Version => Response::text(200, self.version.clone()),
            Route::Notify => self.notify.handle(request).await,
            Route::NotFound => Response::text(404, "Not Found"),
        }
    }
}
