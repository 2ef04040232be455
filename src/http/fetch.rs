//! HTTP range fetching.
//!
//! One reqwest client lives per open handle so sequential reads of a file
//! reuse the connection. The fetcher enforces the response-code policy for
//! range requests and carries two local recoveries: a stalled-transfer abort
//! and a single lenient retry for servers whose body length disagrees with
//! their Content-Length header.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONNECTION, RANGE};
use reqwest::{redirect, Client};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{VfsError, VfsResult};

/// Result of a single range request, after policy is applied.
#[derive(Debug)]
pub enum RangeOutcome {
    /// Usable bytes for the requested range.
    Data(Bytes),
    /// Range not satisfiable (past EOF on the remote side).
    Empty,
    /// The URL is stale or revoked; the caller should refresh and retry.
    StaleUrl(u16),
}

/// Component C6: range GETs with connection reuse.
#[derive(Debug, Clone)]
pub struct RangeFetcher {
    http: HttpConfig,
}

impl RangeFetcher {
    pub fn new(http: HttpConfig) -> Self {
        Self { http }
    }

    /// Build a client configured for streaming range requests. Handles own
    /// their client so per-handle connection reuse survives across reads.
    pub fn build_client(&self) -> VfsResult<Client> {
        let mut builder = Client::builder()
            .connect_timeout(self.http.connect_timeout())
            .timeout(self.http.timeout())
            .redirect(redirect::Policy::limited(self.http.max_redirects))
            .user_agent(self.http.user_agent.clone());
        if !self.http.keepalive {
            builder = builder.pool_max_idle_per_host(0);
        }
        Ok(builder.build()?)
    }

    /// Fetch `bytes={start}-{end}` (inclusive) from `url`.
    ///
    /// Response-code policy:
    /// - 206: body as-is
    /// - 200 at offset 0: body truncated to the requested window
    /// - 200 at offset > 0: stale/redirected resource, caller refreshes
    /// - 416: empty bytes
    /// - 403/404/410: caller refreshes
    /// - anything else >= 400: I/O error
    pub async fn get(
        &self,
        client: &Client,
        url: &str,
        start: u64,
        end: u64,
    ) -> VfsResult<RangeOutcome> {
        match self.attempt(client, url, start, end, false).await {
            Err(e) if matches!(e, VfsError::WeirdServerReply { .. }) => {
                warn!(url = %url, start = start, end = end, error = %e,
                      "Content-Length mismatch; retrying with single-use connection");
                let oneshot = Client::builder()
                    .connect_timeout(self.http.connect_timeout())
                    .timeout(self.http.timeout())
                    .redirect(redirect::Policy::limited(self.http.max_redirects))
                    .user_agent(self.http.user_agent.clone())
                    .pool_max_idle_per_host(0)
                    .build()?;
                self.attempt(&oneshot, url, start, end, true).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        client: &Client,
        url: &str,
        start: u64,
        end: u64,
        lenient: bool,
    ) -> VfsResult<RangeOutcome> {
        let connection = if self.http.keepalive && !lenient {
            "keep-alive"
        } else {
            "close"
        };

        let response = client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .header(ACCEPT_ENCODING, "identity")
            .header(CONNECTION, connection)
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(url = %url, start = start, end = end, status = status, "Range request");

        match status {
            206 => {
                let body = self.collect_body(response, lenient).await?;
                Ok(RangeOutcome::Data(body))
            }
            200 if start == 0 => {
                let body = self.collect_body(response, lenient).await?;
                let want = (end - start + 1) as usize;
                let body = if body.len() > want {
                    body.slice(..want)
                } else {
                    body
                };
                Ok(RangeOutcome::Data(body))
            }
            // A 200 for a mid-file range means the URL no longer points at
            // the media (expired link redirected to an error page).
            200 => Ok(RangeOutcome::StaleUrl(status)),
            416 => Ok(RangeOutcome::Empty),
            403 | 404 | 410 => Ok(RangeOutcome::StaleUrl(status)),
            status => Err(VfsError::UnexpectedStatus { status, start, end }),
        }
    }

    /// Drain the response body, aborting when the transfer stalls below the
    /// configured rate floor. In strict mode a Content-Length disagreement or
    /// a mid-body transport error is surfaced as a weird-server reply so the
    /// caller can retry leniently; in lenient mode whatever arrived is kept.
    async fn collect_body(&self, response: reqwest::Response, lenient: bool) -> VfsResult<Bytes> {
        let declared = response.content_length();
        let limit = self.http.low_speed_limit_bytes();
        let window = self.http.low_speed_window();

        let mut stream = response.bytes_stream();
        let mut collected = BytesMut::new();
        let mut window_start = Instant::now();
        let mut window_bytes: u64 = 0;

        loop {
            let next = if window.is_zero() {
                stream.next().await
            } else {
                match tokio::time::timeout(window, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        return Err(VfsError::LowSpeed {
                            limit,
                            window: self.http.low_speed_time_seconds,
                        })
                    }
                }
            };

            match next {
                Some(Ok(chunk)) => {
                    window_bytes += chunk.len() as u64;
                    collected.extend_from_slice(&chunk);

                    let elapsed = window_start.elapsed();
                    if limit > 0 && elapsed >= window {
                        let rate = window_bytes as f64 / elapsed.as_secs_f64();
                        if rate < limit as f64 {
                            return Err(VfsError::LowSpeed {
                                limit,
                                window: self.http.low_speed_time_seconds,
                            });
                        }
                        window_start = Instant::now();
                        window_bytes = 0;
                    }
                }
                Some(Err(e)) => {
                    if lenient && !collected.is_empty() {
                        warn!(error = %e, received = collected.len(),
                              "Body ended early; keeping partial data");
                        break;
                    }
                    return Err(VfsError::WeirdServerReply {
                        declared: declared.unwrap_or(0),
                        received: collected.len() as u64,
                    });
                }
                None => break,
            }
        }

        if !lenient {
            if let Some(declared) = declared {
                if declared != collected.len() as u64 {
                    return Err(VfsError::WeirdServerReply {
                        declared,
                        received: collected.len() as u64,
                    });
                }
            }
        }

        Ok(collected.freeze())
    }
}
