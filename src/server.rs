//! HTTP front end for browser sign-in and the profile page.
//!
//! A deliberately small hand-rolled HTTP/1.1 server: one tokio task per
//! connection, request line plus headers parsed by hand, fixed set of routes.
//! Handlers obtain Graph tokens through the shared auth provider and redirect
//! to sign-in whenever the provider says the user must re-authenticate.

use crate::auth::confidential::parse_callback_query;
use crate::auth::provider::GraphAuthProvider;
use crate::error::AuthError;
use crate::graph::GraphClient;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Shared state handed to every connection task.
pub struct AppState {
    pub provider: Arc<GraphAuthProvider>,
    pub graph: Arc<GraphClient>,
    /// Path registered as the OAuth redirect target.
    pub callback_path: String,
    /// CSRF states issued by /signin and not yet redeemed.
    pending_states: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new(
        provider: Arc<GraphAuthProvider>,
        graph: Arc<GraphClient>,
        callback_path: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            graph,
            callback_path: callback_path.into(),
            pending_states: Mutex::new(HashSet::new()),
        }
    }
}

/// A response ready to be serialized onto the wire.
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub set_cookie: Option<String>,
    pub location: Option<String>,
    pub body: String,
}

impl HttpResponse {
    fn html(status: u16, reason: &'static str, body: String) -> Self {
        Self {
            status,
            reason,
            content_type: "text/html; charset=utf-8",
            set_cookie: None,
            location: None,
            body,
        }
    }

    fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            reason: "Found",
            content_type: "text/plain",
            set_cookie: None,
            location: Some(location.into()),
            body: String::new(),
        }
    }

    fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.set_cookie = Some(cookie.into());
        self
    }

    fn not_found() -> Self {
        Self::html(404, "Not Found", error_page("Page not found."))
    }

    /// Serialize the full HTTP/1.1 response.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        if let Some(location) = &self.location {
            head.push_str(&format!("Location: {}\r\n", location));
        }
        if let Some(cookie) = &self.set_cookie {
            head.push_str(&format!("Set-Cookie: {}\r\n", cookie));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

/// Run the server until the process is stopped.
pub async fn run(state: Arc<AppState>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on http://{}", listen_addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        debug!("Connection from {}", peer_addr);

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                warn!("Connection error: {}", e);
            }
        });
    }
}

/// Read one request, route it, write one response.
async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> anyhow::Result<()> {
    let mut buffer = [0u8; 8192];
    let bytes_read = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..bytes_read]);

    let response = match parse_request(&request) {
        Some((method, target, cookie_header)) => {
            route_request(&state, method, target, cookie_header.as_deref()).await
        }
        None => HttpResponse::html(400, "Bad Request", error_page("Malformed request.")),
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Parse the request line and the Cookie header, if any.
///
/// Returns (method, request-target, cookie header value).
fn parse_request(request: &str) -> Option<(&str, &str, Option<String>)> {
    let mut lines = request.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;

    let cookie = lines
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("cookie") {
                Some(value.trim().to_string())
            } else {
                None
            }
        });

    Some((method, target, cookie))
}

/// Extract a cookie value by name from a Cookie header.
fn cookie_value(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Dispatch a request to its handler.
async fn route_request(
    state: &AppState,
    method: &str,
    target: &str,
    cookie_header: Option<&str>,
) -> HttpResponse {
    if method != "GET" {
        return HttpResponse::html(
            405,
            "Method Not Allowed",
            error_page("Method not allowed."),
        );
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    match path {
        "/" => landing(),
        "/signin" => sign_in(state).await,
        "/me" => profile(state, cookie_header).await,
        p if p == state.callback_path => callback(state, query).await,
        _ => HttpResponse::not_found(),
    }
}

/// Landing page with a sign-in link.
fn landing() -> HttpResponse {
    HttpResponse::html(
        200,
        "OK",
        page(
            "Microsoft Graph Connect",
            "<h1>Microsoft Graph Connect</h1>\
             <p>Sign in with your work or school account to view your profile.</p>\
             <p><a href=\"/signin\">Sign in</a></p>",
        ),
    )
}

/// Start the authorization-code flow: remember the state, redirect to Azure AD.
async fn sign_in(state: &AppState) -> HttpResponse {
    let (auth_url, csrf_state) = state.provider.generate_auth_url();
    state.pending_states.lock().await.insert(csrf_state);
    info!("Redirecting to authority for sign-in");
    HttpResponse::redirect(auth_url.to_string())
}

/// OAuth redirect target: validate state, exchange the code, set the session cookie.
async fn callback(state: &AppState, query: &str) -> HttpResponse {
    let (code, csrf_state) = match parse_callback_query(query) {
        Ok(parsed) => parsed,
        Err(AuthError::OAuthFailed(description)) => {
            warn!("Authority returned an error on callback: {}", description);
            return HttpResponse::html(200, "OK", error_page(&description));
        }
        Err(e) => {
            warn!("Invalid callback request: {}", e);
            return HttpResponse::html(400, "Bad Request", error_page(&e.to_string()));
        }
    };

    if !state.pending_states.lock().await.remove(&csrf_state) {
        warn!("Callback carried an unknown state token");
        let e = AuthError::StateValidationFailed;
        return HttpResponse::html(400, "Bad Request", error_page(&e.to_string()));
    }

    match state
        .provider
        .get_user_access_token_by_authorization_code(&code)
        .await
    {
        Ok(result) => {
            info!("Sign-in completed for {}", result.user_id);
            HttpResponse::redirect("/me")
                .with_cookie(format!("user={}; HttpOnly; Path=/", result.user_id))
        }
        Err(e) => {
            error!("Authorization code exchange failed: {} ({})", e, e.code());
            HttpResponse::html(502, "Bad Gateway", error_page(&e.to_string()))
        }
    }
}

/// Profile page: silent token, then Graph /me.
async fn profile(state: &AppState, cookie_header: Option<&str>) -> HttpResponse {
    let user_id = match cookie_header.and_then(|header| cookie_value(header, "user")) {
        Some(user_id) => user_id,
        None => return HttpResponse::redirect("/signin"),
    };

    let access_token = match state.provider.get_user_access_token(&user_id).await {
        Ok(token) => token,
        Err(e) if e.requires_sign_in() => {
            info!("Re-authentication required for {}: {}", user_id, e.code());
            return HttpResponse::redirect("/signin");
        }
        Err(e) => {
            error!("Token acquisition failed for {}: {}", user_id, e);
            return HttpResponse::html(502, "Bad Gateway", error_page(&e.to_string()));
        }
    };

    match state.graph.get_user_profile(&access_token).await {
        Ok(profile) => HttpResponse::html(
            200,
            "OK",
            page(
                "Your profile",
                &format!(
                    "<h1>{}</h1><p>{}</p><p class=\"hint\">{}</p>",
                    html_escape(&profile.display_name_or_upn()),
                    html_escape(&profile.email()),
                    html_escape(profile.job_title.as_deref().unwrap_or("")),
                ),
            ),
        ),
        Err(e) => {
            error!("Graph request failed for {}: {}", user_id, e);
            HttpResponse::html(502, "Bad Gateway", error_page(&e.to_string()))
        }
    }
}

/// Minimal HTML escaping for values interpolated into pages.
fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Shared page shell.
fn page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 640px;
            margin: 4rem auto;
            padding: 0 1rem;
            color: #1F2937;
        }}
        .hint {{ font-size: 0.875rem; color: #9CA3AF; }}
        .error {{ color: #EF4444; }}
    </style>
</head>
<body>
{}
</body>
</html>"#,
        title, content
    )
}

/// Error page shown when sign-in or a downstream call fails.
fn error_page(description: &str) -> String {
    page(
        "Something went wrong",
        &format!(
            "<h1 class=\"error\">Something went wrong</h1><p>{}</p>\
             <p class=\"hint\"><a href=\"/signin\">Try signing in again</a></p>",
            html_escape(description)
        ),
    )
}
