//! Presigned PUT/GET transfers against a scripted local HTTP server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusty_artifacts_transfer::{
    FailureKind, MemorySink, PresignedTransfer, RetryPolicy, RobustOperationExecutor,
    TransferError,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use url::Url;

// ============================================================================
// Scripted HTTP server
// ============================================================================

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    reason: &'static str,
    body: Vec<u8>,
}

fn reply(status: u16, reason: &'static str, body: &[u8]) -> Reply {
    Reply {
        status,
        reason,
        body: body.to_vec(),
    }
}

/// Serve `replies` in order, one per connection; the last one repeats.
async fn serve(replies: Vec<Reply>) -> (Url, Arc<Mutex<Vec<Recorded>>>) {
    let listener: TcpListener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));

    let log: Arc<Mutex<Vec<Recorded>>> = recorded.clone();
    tokio::spawn(async move {
        let mut served: usize = 0;
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let request: Recorded = match read_request(&mut stream).await {
                Ok(request) => request,
                Err(_) => continue,
            };
            log.lock().push(request);

            let current: &Reply = &replies[served.min(replies.len() - 1)];
            served += 1;
            let head: String = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                current.status,
                current.reason,
                current.body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&current.body).await;
            let _ = stream.shutdown().await;
        }
    });

    let url: Url = Url::parse(&format!(
        "http://{}/artifacts/job/1/log.txt?X-Amz-Signature=abc",
        addr
    ))
    .unwrap();
    (url, recorded)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let mut chunk: [u8; 4096] = [0; 4096];
    let n: usize = stream.read(&mut chunk).await?;
    if n == 0 {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    buf.extend_from_slice(&chunk[..n]);
    Ok(())
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<Recorded> {
    let mut buf: Vec<u8> = Vec::new();
    let header_end: usize = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        read_more(stream, &mut buf).await?;
    };

    let head: String = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method: String = request_line.next().unwrap_or_default().to_string();
    let path: String = request_line.next().unwrap_or_default().to_string();

    let mut content_length: usize = 0;
    let mut chunked: bool = false;
    for line in lines {
        let lower: String = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
    }

    let mut body: Vec<u8> = buf[header_end..].to_vec();
    if chunked {
        while !body.ends_with(b"0\r\n\r\n") {
            read_more(stream, &mut body).await?;
        }
        body = decode_chunked(&body);
    } else {
        while body.len() < content_length {
            read_more(stream, &mut body).await?;
        }
    }

    Ok(Recorded { method, path, body })
}

fn decode_chunked(mut raw: &[u8]) -> Vec<u8> {
    let mut decoded: Vec<u8> = Vec::new();
    while let Some(line_end) = find(raw, b"\r\n") {
        let size_text: String = String::from_utf8_lossy(&raw[..line_end]).into_owned();
        let size: usize = usize::from_str_radix(size_text.trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        let start: usize = line_end + 2;
        decoded.extend_from_slice(&raw[start..start + size]);
        raw = &raw[start + size + 2..];
    }
    decoded
}

// ============================================================================
// Helpers
// ============================================================================

fn transfer(max_attempts: u32) -> PresignedTransfer {
    let policy: RetryPolicy = RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_backoff(Duration::from_millis(1))
        .with_attempt_timeout(Duration::from_secs(10));
    let client: reqwest::Client = reqwest::Client::builder().no_proxy().build().unwrap();
    PresignedTransfer::with_client(client, RobustOperationExecutor::with_defaults().unwrap(), policy)
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_upload_retries_server_error() {
    let dir: TempDir = TempDir::new().unwrap();
    let source: PathBuf = dir.path().join("log.txt");
    std::fs::write(&source, b"build output\n").unwrap();

    let (url, recorded) = serve(vec![
        reply(503, "Service Unavailable", b"SlowDown"),
        reply(200, "OK", b""),
    ])
    .await;
    let sink: MemorySink = MemorySink::new();

    let sent: u64 = transfer(3)
        .upload_file(&url, &source, &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sent, 13);
    let requests: Vec<Recorded> = recorded.lock().clone();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.method, "PUT");
        assert!(request.path.starts_with("/artifacts/job/1/log.txt"));
        assert_eq!(request.body, b"build output\n");
    }

    let lines: Vec<String> = sink.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("503"));
    assert!(!lines[0].contains("X-Amz-Signature"));
    assert!(lines[1].ends_with("completed after 2 attempt(s)"));
    assert!(!lines[1].contains("X-Amz-Signature"));
    assert_eq!(sink.flush_count(), 1);
}

#[tokio::test]
async fn test_upload_client_error_not_retried() {
    let dir: TempDir = TempDir::new().unwrap();
    let source: PathBuf = dir.path().join("log.txt");
    std::fs::write(&source, b"x").unwrap();

    let (url, recorded) = serve(vec![reply(403, "Forbidden", b"<Code>AccessDenied</Code>")]).await;
    let sink: MemorySink = MemorySink::new();

    let err: TransferError = transfer(5)
        .upload_file(&url, &source, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(recorded.lock().len(), 1);
    assert_eq!(err.status(), 403);
    assert_eq!(err.kind(), FailureKind::ClientError);
    assert!(err.to_string().contains("<Code>AccessDenied</Code>"));
    assert!(err.to_string().contains("Forbidden"));
}

#[tokio::test]
async fn test_upload_missing_source_file() {
    let dir: TempDir = TempDir::new().unwrap();
    let (url, recorded) = serve(vec![reply(200, "OK", b"")]).await;
    let sink: MemorySink = MemorySink::new();

    let err: TransferError = transfer(2)
        .upload_file(&url, &dir.path().join("absent.txt"), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Io { .. }));
    assert!(recorded.lock().is_empty());
}

// ============================================================================
// Downloads
// ============================================================================

#[tokio::test]
async fn test_download_retries_then_writes_file() {
    let dir: TempDir = TempDir::new().unwrap();
    let destination: PathBuf = dir.path().join("out.bin");

    let (url, recorded) = serve(vec![
        reply(500, "Internal Server Error", b""),
        reply(200, "OK", b"artifact bytes"),
    ])
    .await;
    let sink: MemorySink = MemorySink::new();

    let written: u64 = transfer(3)
        .download_file(&url, &destination, &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, 14);
    assert_eq!(std::fs::read(&destination).unwrap(), b"artifact bytes");
    let requests: Vec<Recorded> = recorded.lock().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.method == "GET"));
    assert_eq!(sink.lines().len(), 2);
}

#[tokio::test]
async fn test_download_not_found_leaves_no_file() {
    let dir: TempDir = TempDir::new().unwrap();
    let destination: PathBuf = dir.path().join("out.bin");

    let (url, _recorded) = serve(vec![reply(404, "Not Found", b"NoSuchKey")]).await;
    let sink: MemorySink = MemorySink::new();

    let err: TransferError = transfer(3)
        .download_file(&url, &destination, &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), 404);
    assert!(err.to_string().contains("NoSuchKey"));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_download_connection_refused_is_transient() {
    let dir: TempDir = TempDir::new().unwrap();
    let listener: TcpListener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url: Url = Url::parse(&format!("http://{}/artifacts/job/1/log.txt", addr)).unwrap();
    let sink: MemorySink = MemorySink::new();

    let err: TransferError = transfer(2)
        .download_file(&url, &dir.path().join("out.bin"), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Connection { .. }));
    assert_eq!(err.status(), 0);
    assert_eq!(sink.lines().len(), 1);
}
