use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinError;
use tokio::time::{timeout, timeout_at, Instant};

use crate::handlers::{dispatch, PanelContext};
use crate::http::{frame_len, MalformedRequest, Request, Response};
use crate::router::Router;
use crate::{Error, Result};

const READ_CHUNK: usize = 1024;
const LINGER_BYTES: usize = 64 * 1024;

/// Per-connection bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub max_request_bytes: usize,
    /// Bounds the whole request, from accept to the last byte, however the
    /// client spaces its writes.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_request_bytes: 4096,
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// 服务循环的三个状态：Listening -> Accepting -> Serving -> Listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Listening,
    Accepting,
    Serving,
}

/// A strictly sequential HTTP/1.1 listener: one connection at a time, one
/// request per connection.
pub struct WebServer {
    listener: TcpListener,
    context: PanelContext,
    router: Arc<Router>,
    limits: ServerLimits,
}

impl WebServer {
    /// Binds the listener. This is the only fallible step of the server.
    pub async fn bind(addr: SocketAddr, context: PanelContext, limits: ServerLimits) -> Result<Self> {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("❌ Failed to bind {}: {}", addr, e);
                return Err(e.into());
            }
        };
        tracing::info!("🌐 Web server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            context,
            router: Arc::new(Router::default()),
            limits,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until the task is dropped. Errors on a single
    /// connection are logged and never end the loop.
    pub async fn run(self) -> Result<()> {
        let mut state = LoopState::Listening;
        loop {
            advance(&mut state, LoopState::Listening);
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    // 例如文件描述符耗尽，稍后再试
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            advance(&mut state, LoopState::Accepting);
            tracing::debug!(%peer, "Accepted connection");

            advance(&mut state, LoopState::Serving);
            self.serve_connection(stream, peer).await;
        }
    }

    async fn serve_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let mut rejected = false;
        let response = match read_request(&mut stream, &self.limits).await {
            Ok(Some(raw)) => self.respond(raw, peer).await,
            Ok(None) => {
                tracing::debug!(%peer, "Connection closed without a request");
                return;
            }
            Err(e) => {
                tracing::warn!(%peer, status = 400, "{}", Error::from(e));
                rejected = true;
                Response::bad_request()
            }
        };

        let bytes = response.to_bytes();
        let written = timeout(self.limits.write_timeout, async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(%peer, "Failed to write response: {}", e),
            Err(_) => tracing::warn!(%peer, "Timed out writing response"),
        }
        if rejected {
            discard_unread(&mut stream, &self.limits).await;
        }
        // stream 在这里被丢弃，连接关闭
    }

    async fn respond(&self, raw: Vec<u8>, peer: SocketAddr) -> Response {
        let request = match Request::parse(&raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer, status = 400, "{}", Error::from(e));
                return Response::bad_request();
            }
        };
        let method = request.method.clone();
        let path = request.path.clone();

        // 在独立任务中运行处理器并立即等待：仍然是串行的，但处理器 panic 不会拖垮循环
        let context = self.context.clone();
        let router = Arc::clone(&self.router);
        let handled = tokio::spawn(async move { dispatch(&context, &router, &request).await }).await;

        let response = match handled {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(%peer, %method, %path, "Handler failed: {}", e);
                Response::internal_error()
            }
            Err(join_error) => {
                let e = Error::HandlerPanic(panic_message(join_error));
                tracing::error!(%peer, %method, %path, "{}", e);
                Response::internal_error()
            }
        };

        tracing::info!(%peer, %method, %path, status = response.status.as_u16(), "Served request");
        response
    }
}

/// 关闭前读掉客户端未发送完的数据，否则内核会用 RST 冲掉刚写出的 400 响应。
/// 总时长不超过一个 `read_timeout`
async fn discard_unread<S>(stream: &mut S, limits: &ServerLimits)
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + limits.read_timeout;
    let mut chunk = [0u8; READ_CHUNK];
    let mut discarded = 0;
    while discarded < LINGER_BYTES {
        match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => discarded += n,
            _ => break,
        }
    }
}

fn advance(state: &mut LoopState, next: LoopState) {
    tracing::trace!("Connection loop: {:?} -> {:?}", state, next);
    *state = next;
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(_) => "handler task was cancelled".to_string(),
    }
}

/// Reads one complete request, chunk by chunk.
///
/// The whole request must arrive within one `read_timeout`. Returns
/// `Ok(None)` when the peer sends nothing before EOF or the deadline.
/// Partial data followed by EOF or the deadline is `Truncated`; more than
/// `max_request_bytes` is `TooLarge`.
async fn read_request<S>(
    stream: &mut S,
    limits: &ServerLimits,
) -> std::result::Result<Option<Vec<u8>>, MalformedRequest>
where
    S: AsyncRead + Unpin,
{
    let too_large = MalformedRequest::TooLarge {
        limit: limits.max_request_bytes,
    };
    let deadline = Instant::now() + limits.read_timeout;
    let mut buf = Vec::with_capacity(READ_CHUNK.min(limits.max_request_bytes));
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some(total) = frame_len(&buf)? {
            if total > limits.max_request_bytes {
                return Err(too_large);
            }
            if buf.len() >= total {
                buf.truncate(total);
                return Ok(Some(buf));
            }
        } else if buf.len() > limits.max_request_bytes {
            return Err(too_large);
        }

        let n = match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!("Read failed: {}", e);
                0
            }
            Err(_) => {
                tracing::debug!("Request not complete after {:?}", limits.read_timeout);
                0
            }
        };
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(MalformedRequest::Truncated)
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn limits(max_request_bytes: usize) -> ServerLimits {
        ServerLimits {
            max_request_bytes,
            ..ServerLimits::default()
        }
    }

    #[tokio::test]
    async fn reassembles_request_split_across_writes() {
        let (mut client, mut server) = duplex(64);
        let writer = tokio::spawn(async move {
            client.write_all(b"POST /connect HTTP/1.1\r\nContent-Le").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"ngth: 12\r\n\r\n{\"ssid\":").await.unwrap();
            tokio::task::yield_now().await;
            client.write_all(b"\"A\"}").await.unwrap();
            client
        });

        let raw = read_request(&mut server, &limits(4096)).await.unwrap().unwrap();
        let _client = writer.await.unwrap();
        let req = Request::parse(&raw).unwrap();
        assert_eq!(req.body, br#"{"ssid":"A"}"#);
    }

    #[tokio::test]
    async fn stops_at_the_end_of_the_frame() {
        let (mut client, mut server) = duplex(256);
        client.write_all(b"GET /scan HTTP/1.1\r\n\r\n").await.unwrap();

        let raw = read_request(&mut server, &limits(4096)).await.unwrap().unwrap();
        assert_eq!(raw, b"GET /scan HTTP/1.1\r\n\r\n");
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let (mut client, mut server) = duplex(8192);
        let head = format!("GET /message?text={} HTTP/1.1\r\n", "a".repeat(2000));
        client.write_all(head.as_bytes()).await.unwrap();

        let err = read_request(&mut server, &limits(512)).await.unwrap_err();
        assert_eq!(err, MalformedRequest::TooLarge { limit: 512 });
    }

    #[tokio::test]
    async fn declared_body_over_the_limit_is_rejected_early() {
        let (mut client, mut server) = duplex(256);
        client
            .write_all(b"POST /connect HTTP/1.1\r\nContent-Length: 100000\r\n\r\n")
            .await
            .unwrap();

        let err = read_request(&mut server, &limits(4096)).await.unwrap_err();
        assert_eq!(err, MalformedRequest::TooLarge { limit: 4096 });
    }

    #[tokio::test]
    async fn silent_close_is_not_a_request() {
        let (client, mut server) = duplex(64);
        drop(client);
        assert_eq!(read_request(&mut server, &limits(4096)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_request_then_close_is_truncated() {
        let (mut client, mut server) = duplex(64);
        client.write_all(b"GET /sensor HTTP/1.1\r\n").await.unwrap();
        drop(client);
        assert_eq!(
            read_request(&mut server, &limits(4096)).await.unwrap_err(),
            MalformedRequest::Truncated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_peer_times_out_silently() {
        let (_client, mut server) = duplex(64);
        let start = tokio::time::Instant::now();
        assert_eq!(read_request(&mut server, &limits(4096)).await.unwrap(), None);
        assert_eq!(start.elapsed(), ServerLimits::default().read_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out_as_truncated() {
        let (mut client, mut server) = duplex(256);
        client
            .write_all(b"POST /connect HTTP/1.1\r\nContent-Length: 20\r\n\r\n{\"ss")
            .await
            .unwrap();
        assert_eq!(
            read_request(&mut server, &limits(4096)).await.unwrap_err(),
            MalformedRequest::Truncated
        );
        drop(client);
    }

    /// Writes one byte every `gap` until `data` is exhausted or the reader hangs up.
    fn drip(mut client: tokio::io::DuplexStream, data: &'static [u8], gap: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            for byte in data {
                if client.write_all(std::slice::from_ref(byte)).await.is_err() {
                    return;
                }
                tokio::time::sleep(gap).await;
            }
            // 保持连接打开，直到读取方放弃
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test(start_paused = true)]
    async fn slow_drip_is_cut_off_at_one_read_timeout() {
        let (client, mut server) = duplex(64);
        let limits = ServerLimits {
            read_timeout: Duration::from_millis(300),
            ..limits(4096)
        };
        let dripper = drip(client, b"GET /sensor HTTP/1.1\r\nHost: panel-with-a-long-name\r\n\r\n", Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        let err = read_request(&mut server, &limits).await.unwrap_err();
        assert_eq!(err, MalformedRequest::Truncated);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        dripper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn draining_stops_at_one_read_timeout() {
        let (client, mut server) = duplex(64);
        let limits = ServerLimits {
            read_timeout: Duration::from_millis(300),
            ..limits(4096)
        };
        let dripper = drip(client, &[b'x'; 4096], Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        discard_unread(&mut server, &limits).await;
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        dripper.abort();
    }

    #[tokio::test]
    async fn panic_payloads_become_messages() {
        let literal: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("sensor bus wedged") });
        assert_eq!(panic_message(literal.await.unwrap_err()), "sensor bus wedged");

        let formatted: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("code {}", 7) });
        assert_eq!(panic_message(formatted.await.unwrap_err()), "code 7");
    }
}
