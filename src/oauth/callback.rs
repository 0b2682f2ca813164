use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::AuthError;

pub const CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
/// Upper bound on graceful shutdown of the accept loop.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

const MAX_REQUEST_BYTES: usize = 8192;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameters delivered to the redirect endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
    pub error: String,
    pub error_description: String,
}

impl CallbackResult {
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Renders the page shown in the browser once the redirect lands.
pub type PageRenderer = fn(success: bool, result: &CallbackResult) -> Vec<u8>;

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>;

/// Short-lived loopback HTTP listener for the authorization redirect.
///
/// Lifecycle: [`bind`](Self::bind) → [`start`](Self::start) →
/// [`wait_for_callback`](Self::wait_for_callback) → [`stop`](Self::stop).
/// Only the first `/callback` request is delivered; later ones get a page
/// but never re-signal. Dropping the listener aborts the accept loop.
pub struct CallbackListener {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    renderer: PageRenderer,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    result_tx: Option<oneshot::Sender<CallbackResult>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1` on an OS-assigned port.
    pub async fn bind() -> Result<Self, AuthError> {
        Self::bind_with_renderer(render_page).await
    }

    pub async fn bind_with_renderer(renderer: PageRenderer) -> Result<Self, AuthError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(AuthError::ListenerBindFailed)?;
        let addr = listener.local_addr().map_err(AuthError::ListenerBindFailed)?;
        let (result_tx, result_rx) = oneshot::channel();
        Ok(Self {
            addr,
            listener: Some(listener),
            renderer,
            result_rx: Some(result_rx),
            result_tx: Some(result_tx),
            shutdown_tx: None,
            task: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{CALLBACK_PATH}", self.addr.port())
    }

    /// Spawn the accept loop. Calling it again is a no-op.
    pub fn start(&mut self) {
        let (Some(listener), Some(result_tx)) = (self.listener.take(), self.result_tx.take())
        else {
            return;
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            slot,
            self.renderer,
            shutdown_rx,
        )));
        tracing::debug!(redirect_uri = %self.redirect_uri(), "callback listener started");
    }

    /// Wait for the first callback, or fail with `CallbackTimeout`.
    pub async fn wait_for_callback(&mut self, timeout: Duration) -> Result<CallbackResult, AuthError> {
        let rx = self.result_rx.take().ok_or(AuthError::ListenerClosed)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::ListenerClosed),
            Err(_) => Err(AuthError::CallbackTimeout(timeout)),
        }
    }

    /// Shut the listener down and release its port. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        // Never started: dropping the socket releases the port.
        self.listener.take();
        self.result_tx.take();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                tracing::warn!("callback listener did not stop in time; aborting");
                task.abort();
            }
            tracing::debug!(port = self.addr.port(), "callback listener stopped");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    slot: ResultSlot,
    renderer: PageRenderer,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let slot = Arc::clone(&slot);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &slot, renderer).await {
                            tracing::debug!("callback connection error: {e}");
                        }
                    });
                }
                Err(e) => tracing::warn!("callback listener accept failed: {e}"),
            },
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    slot: &ResultSlot,
    renderer: PageRenderer,
) -> std::io::Result<()> {
    let request = match tokio::time::timeout(READ_TIMEOUT, read_request_head(&mut stream)).await {
        Ok(head) => head?,
        Err(_) => return Ok(()),
    };

    let Some(query) = parse_callback_target(&request) else {
        return write_response(&mut stream, "404 Not Found", "text/plain", b"Not Found").await;
    };
    let result = parse_query(query);

    // Hand off before rendering so a rendering or write failure cannot lose it.
    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    match sender {
        Some(tx) => {
            let _ = tx.send(result.clone());
        }
        None => tracing::debug!("ignoring repeated callback request"),
    }

    let success = !result.is_error();
    let body = renderer(success, &result);
    let status = if success { "200 OK" } else { "400 Bad Request" };
    write_response(&mut stream, status, "text/html; charset=utf-8", &body).await
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await
}

/// Return the query string of a `GET /callback` request line, or None for
/// any other method or path.
fn parse_callback_target(request: &str) -> Option<&str> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    (path == CALLBACK_PATH).then_some(query)
}

fn parse_query(query: &str) -> CallbackResult {
    let mut result = CallbackResult::default();
    for param in query.split('&') {
        let (key, value) = param.split_once('=').unwrap_or((param, ""));
        let slot = match key {
            "code" => &mut result.code,
            "state" => &mut result.state,
            "error" => &mut result.error,
            "error_description" => &mut result.error_description,
            _ => continue,
        };
        if slot.is_empty() {
            *slot = urldecode(value);
        }
    }
    result
}

pub(crate) fn urldecode(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    let mut iter = s.bytes();
    while let Some(b) = iter.next() {
        match b {
            b'%' => {
                let hex = [iter.next(), iter.next()];
                match hex {
                    [Some(h), Some(l)] => match (hex_val(h), hex_val(l)) {
                        (Some(h), Some(l)) => bytes.push(h << 4 | l),
                        _ => bytes.extend_from_slice(&[b'%', h, l]),
                    },
                    [Some(h), None] => bytes.extend_from_slice(&[b'%', h]),
                    _ => bytes.push(b'%'),
                }
            }
            b'+' => bytes.push(b' '),
            _ => bytes.push(b),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Default confirmation page.
pub fn render_page(success: bool, result: &CallbackResult) -> Vec<u8> {
    let (title, detail) = if success {
        (
            "Authentication successful!",
            "<p>You can close this window and return to the terminal.</p>".to_string(),
        )
    } else {
        let desc = if result.error_description.is_empty() {
            String::new()
        } else {
            format!(": {}", html_escape(&result.error_description))
        };
        (
            "Authentication failed",
            format!(
                "<p><strong>{}</strong>{desc}</p><p>You can close this window and try again.</p>",
                html_escape(&result.error)
            ),
        )
    };
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\">\
         <h1>{title}</h1>{detail}</body></html>"
    )
    .into_bytes()
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
