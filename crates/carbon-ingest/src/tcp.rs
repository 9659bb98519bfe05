//! TCP line ingestor: accepts connections, reads newline-terminated
//! `<key> <value> <timestamp>` records, parses them, and hands the result
//! to a `MetricCache`.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use carbon_cache::{DaemonMetrics, MetricCache, ShutdownSignal};
use carbon_core::DEFAULT_MAX_LINE_BYTES;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

enum ReadLineOutcome {
    Line,
    Eof,
    TooLong,
}

/// Reads one `\n`-terminated line into `buf` (cleared first), refusing to
/// grow past `max_len` bytes. Returns `Eof` if the connection closed with no
/// more data, `TooLong` if the line exceeded `max_len` before a newline was
/// found — in which case the connection is no longer in a recoverable
/// state, since the overflow bytes have already been consumed.
async fn read_line_capped<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<ReadLineOutcome>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    buf.clear();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() {
                ReadLineOutcome::Eof
            } else {
                ReadLineOutcome::Line
            });
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            buf.extend_from_slice(&available[..=pos]);
            let consumed = pos + 1;
            reader.consume(consumed);
            if buf.len() > max_len {
                return Ok(ReadLineOutcome::TooLong);
            }
            return Ok(ReadLineOutcome::Line);
        }
        let chunk_len = available.len();
        buf.extend_from_slice(available);
        reader.consume(chunk_len);
        if buf.len() > max_len {
            return Ok(ReadLineOutcome::TooLong);
        }
    }
}

/// Bind a listener and run the accept loop until `shutdown` fires. Accept
/// errors are logged and the loop continues; a failed bind is fatal and
/// returned to the caller.
pub async fn run(
    bind_addr: SocketAddr,
    cache: MetricCache,
    metrics: Arc<DaemonMetrics>,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "line ingestor listening");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("line ingestor stopping");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let cache = cache.clone();
                        let metrics = Arc::clone(&metrics);
                        tokio::spawn(async move {
                            handle_connection(stream, addr, cache, metrics).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed, continuing");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    cache: MetricCache,
    metrics: Arc<DaemonMetrics>,
) {
    metrics.connections_total.fetch_add(1, Ordering::Relaxed);
    metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(%addr, "connection accepted");

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        match read_line_capped(&mut reader, &mut line, DEFAULT_MAX_LINE_BYTES).await {
            Ok(ReadLineOutcome::Eof) => break,
            Ok(ReadLineOutcome::TooLong) => {
                tracing::warn!(%addr, "line exceeded max length, closing connection");
                let _ = reader.get_mut().shutdown().await;
                break;
            }
            Ok(ReadLineOutcome::Line) => {
                let text = match std::str::from_utf8(&line) {
                    Ok(text) => text.trim_end_matches(['\r', '\n']),
                    Err(_) => {
                        metrics.points_dropped_parse.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%addr, "dropped non-utf8 line");
                        continue;
                    }
                };
                if text.is_empty() {
                    continue;
                }
                match carbon_core::parse_line(text) {
                    Ok(metric) => {
                        if cache.store(metric).await.is_err() {
                            tracing::debug!(%addr, "cache closed, dropping connection");
                            break;
                        }
                        metrics.points_stored.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        metrics.points_dropped_parse.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(%addr, error = %e, line = %text, "rejected line");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connection read error, closing");
                break;
            }
        }
    }

    metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
    tracing::debug!(%addr, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader as TokioBufReader;

    #[tokio::test]
    async fn reads_a_well_formed_line() {
        let data = b"foo.bar 42 100\n".to_vec();
        let mut reader = TokioBufReader::new(&data[..]);
        let mut buf = Vec::new();
        let outcome = read_line_capped(&mut reader, &mut buf, 4096).await.unwrap();
        assert!(matches!(outcome, ReadLineOutcome::Line));
        assert_eq!(buf, b"foo.bar 42 100\n");
    }

    #[tokio::test]
    async fn reports_eof_on_empty_stream() {
        let data: Vec<u8> = Vec::new();
        let mut reader = TokioBufReader::new(&data[..]);
        let mut buf = Vec::new();
        let outcome = read_line_capped(&mut reader, &mut buf, 4096).await.unwrap();
        assert!(matches!(outcome, ReadLineOutcome::Eof));
    }

    #[tokio::test]
    async fn rejects_a_line_over_the_cap() {
        let mut data = vec![b'x'; 100];
        data.push(b'\n');
        let mut reader = TokioBufReader::new(&data[..]);
        let mut buf = Vec::new();
        let outcome = read_line_capped(&mut reader, &mut buf, 10).await.unwrap();
        assert!(matches!(outcome, ReadLineOutcome::TooLong));
    }

    #[tokio::test]
    async fn end_to_end_store_via_tcp() {
        let (cache, _task) = MetricCache::spawn(16);
        let metrics = Arc::new(DaemonMetrics::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

        let cache_for_server = cache.clone();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, cache_for_server, metrics).await;
        });
        let _ = shutdown_rx;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"foo.bar 42 100\n").await.unwrap();
        drop(client);

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if cache.size().await.unwrap() == 1 {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("metric was not stored in time");

        let popped = cache.pop("foo.bar").await.unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(popped[0].value, 42.0);
        assert_eq!(popped[0].timestamp, 100);
    }
}
