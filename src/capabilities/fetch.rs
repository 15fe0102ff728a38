//! Outbound HTTP capability
//!
//! `fetch(url[, options])` performs a synchronous request from the script's
//! point of view. Transport failures do not abort the script; they come back
//! as a status 500 response whose body holds the error.

use rhai::{Dynamic, Map};
use std::sync::OnceLock;
use std::time::Duration;

use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::script::{Capability, CapabilityError, Namespace, SessionContext};

/// `fetch(url)` and `fetch(url, #{ method, headers, body })`
pub struct Fetch {
    timeout: Duration,
    client: OnceLock<Result<HttpClient, String>>,
}

impl Fetch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceLock::new(),
        }
    }

    /// Shared client, built on first registration
    fn client(&self) -> Result<HttpClient, CapabilityError> {
        self.client
            .get_or_init(|| HttpClient::with_timeout(self.timeout).map_err(|e| e.to_string()))
            .clone()
            .map_err(|reason| CapabilityError::registration("fetch", reason))
    }
}

/// Build a request from script options; unknown keys are ignored
pub fn request_from_options(url: &str, options: &Map) -> HttpRequest {
    let method = options
        .get("method")
        .and_then(|v| v.clone().into_string().ok())
        .unwrap_or_else(|| "GET".to_string());

    let mut request = HttpRequest::new(method.to_uppercase(), url);

    if let Some(headers) = options.get("headers").and_then(|v| v.read_lock::<Map>()) {
        for (name, value) in headers.iter() {
            if let Ok(value) = value.clone().into_string() {
                request = request.header(name.as_str(), value);
            }
        }
    }

    if let Some(body) = options.get("body").filter(|v| !v.is_unit()) {
        request = request.body(body.to_string());
    }

    request
}

pub fn response_to_map(response: HttpResponse) -> Map {
    let ok = response.is_success();
    let headers: Map = response
        .headers
        .into_iter()
        .map(|(k, v)| (k.into(), Dynamic::from(v)))
        .collect();

    let mut map = Map::new();
    map.insert("status".into(), Dynamic::from(i64::from(response.status_code)));
    map.insert("status_text".into(), Dynamic::from(response.status_text));
    map.insert("ok".into(), Dynamic::from(ok));
    map.insert("url".into(), Dynamic::from(response.url));
    map.insert("headers".into(), Dynamic::from_map(headers));
    map.insert("body".into(), Dynamic::from(response.body));
    map
}

fn perform(client: &HttpClient, ctx: &SessionContext, request: HttpRequest) -> Map {
    let url = request.url.clone();

    let response = match ctx.block_on_cancellable(client.send(request)) {
        Some(Ok(response)) => response,
        Some(Err(err)) => HttpResponse::from_error(&url, &err),
        None => HttpResponse::from_error(
            &url,
            &HttpError::RequestFailed("request cancelled".to_string()),
        ),
    };

    response_to_map(response)
}

impl Capability for Fetch {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn exports(&self) -> &'static [&'static str] {
        &["fetch"]
    }

    fn register(&self, ns: &mut Namespace<'_>) -> Result<(), CapabilityError> {
        let client = self.client()?;
        let ctx = ns.context().clone();
        let engine = ns.engine();

        let (c, x) = (client.clone(), ctx.clone());
        engine.register_fn("fetch", move |url: &str| {
            perform(&c, &x, HttpRequest::get(url))
        });

        engine.register_fn("fetch", move |url: &str, options: Map| {
            perform(&client, &ctx, request_from_options(url, &options))
        });

        Ok(())
    }
}
