use log::*;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tide::http::headers::{HeaderValue, AUTHORIZATION};
use tide::security::{CorsMiddleware, Origin};
use tide::{Middleware, Next, Request};

use crate::error::AppError;
use crate::AppState;

/**
 * Any origin may call us, the same as the browser clients expect
 */
pub fn cors() -> tide::Result<CorsMiddleware> {
    Ok(CorsMiddleware::new()
        .allow_methods("GET, POST, PUT, DELETE, OPTIONS".parse::<HeaderValue>()?)
        .allow_headers("Origin, Content-Type, Accept, Authorization".parse::<HeaderValue>()?)
        .allow_origin(Origin::from("*"))
        .allow_credentials(false))
}

/**
 * Rejects requests without a valid bearer token and stores the `AuthUser` for handlers
 */
#[derive(Debug, Default, Clone)]
pub struct JwtAuth;

#[tide::utils::async_trait]
impl Middleware<AppState> for JwtAuth {
    async fn handle(&self, mut req: Request<AppState>, next: Next<'_, AppState>) -> tide::Result {
        let header = match req.header(AUTHORIZATION) {
            Some(values) => values.last().as_str().to_string(),
            None => return Err(AppError::Unauthorized("Missing Authorization header".to_string()).into()),
        };

        let user = req.state().tokens.verify(&header)?;
        debug!("authenticated {} ({})", user.identifier, user.id);
        req.set_ext(user);
        Ok(next.run(req).await)
    }
}

struct Window {
    started: Instant,
    count: u32,
}

struct Windows {
    by_client: HashMap<String, Window>,
    last_sweep: Instant,
}

/**
 * Reduce an address to the IP it came from, dropping any port
 */
pub fn client_ip(addr: &str) -> String {
    let addr = addr.trim();
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }
    if let Ok(ip) = addr.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        return ip.to_string();
    }
    addr.to_string()
}

/**
 * The key a request is counted under
 *
 * `forwarded` is only honoured when the operator has said a proxy sets it.
 */
pub fn client_key(peer: Option<&str>, forwarded: Option<&str>, trust_forwarded: bool) -> String {
    let source = if trust_forwarded { forwarded.or(peer) } else { peer };
    match source {
        Some(addr) if !addr.trim().is_empty() => client_ip(addr),
        _ => "unknown".to_string(),
    }
}

/**
 * Fixed-window request limiter keyed on the client IP
 */
pub struct RateLimiter {
    max: u32,
    window: Duration,
    trust_forwarded: bool,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration, trust_forwarded: bool) -> Self {
        RateLimiter {
            max,
            window,
            trust_forwarded,
            windows: Mutex::new(Windows {
                by_client: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /**
     * Count one request from `client`, false once it is over its budget
     */
    pub fn admit(&self, client: &str, now: Instant) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if now.duration_since(windows.last_sweep) >= self.window {
            let window = self.window;
            windows
                .by_client
                .retain(|_, w| now.duration_since(w.started) < window);
            windows.last_sweep = now;
        }

        let entry = windows
            .by_client
            .entry(client.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.max
    }

    pub fn tracked_clients(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.by_client.len(),
            Err(poisoned) => poisoned.into_inner().by_client.len(),
        }
    }
}

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> Middleware<State> for RateLimiter {
    async fn handle(&self, req: Request<State>, next: Next<'_, State>) -> tide::Result {
        // remote() prefers Forwarded/X-Forwarded-For over the socket peer
        let client = client_key(req.peer_addr(), req.remote(), self.trust_forwarded);
        if !self.admit(&client, Instant::now()) {
            warn!("rate limit exceeded for {}", client);
            return Err(AppError::TooManyRequests.into());
        }
        Ok(next.run(req).await)
    }
}
