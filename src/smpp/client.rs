//! Bound SMPP client session.
//!
//! One client owns one bound connection. After connect + bind the socket is
//! handed to an I/O task that multiplexes outbound requests (matched to
//! responses by sequence number), answers enquire_link and deliver_sm from
//! the SMSC, and emits its own keep-alive on the configured interval.
//! deliver_sm PDUs are acknowledged on the wire and forwarded to the tenant's
//! DLR correlator channel. Any I/O failure flips the status watch to `Closed`;
//! the pool disposes such clients on return.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SmppChannelConfig;

use super::connection::Connection;
use super::pdu::{
    BindRequest, DeliverSm, DeliverSmResponse, EnquireLink, EnquireLinkResponse, Frame, SubmitSm,
    Unbind,
};
use super::codec::CommandStatus;
use super::SmppError;

/// Session status surfaced to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Bound,
    Closed,
}

/// Outcome of one submit_sm exchange.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub status: CommandStatus,
    pub message_id: Option<String>,
}

struct IoRequest {
    frame: Frame,
    reply: Option<oneshot::Sender<Frame>>,
}

/// Token-bucket pacer implementing the session's native send-speed limit.
struct Pacer {
    state: Mutex<PacerState>,
    rate: f64,
    burst: f64,
}

struct PacerState {
    tokens: f64,
    last_refill: Instant,
}

impl Pacer {
    fn new(max_per_window: u32, burst: u32, window: Duration) -> Self {
        let rate = max_per_window as f64 / window.as_secs_f64().max(0.001);
        Self {
            state: Mutex::new(PacerState {
                tokens: burst.max(1) as f64,
                last_refill: Instant::now(),
            }),
            rate,
            burst: burst.max(1) as f64,
        }
    }

    /// Wait until a send token is available.
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill);
                state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

/// A bound SMPP client.
pub struct SmppClient {
    io_tx: mpsc::Sender<IoRequest>,
    status_rx: watch::Receiver<ClientStatus>,
    sequence: Arc<AtomicU32>,
    pacer: Pacer,
    response_timeout: Duration,
    io_task: JoinHandle<()>,
}

impl SmppClient {
    /// Connect, bind and start the session I/O task.
    ///
    /// Delivery receipts arriving on this session are forwarded to `dlr_tx`.
    pub async fn connect(
        config: &SmppChannelConfig,
        dlr_tx: mpsc::Sender<DeliverSm>,
    ) -> Result<Self, SmppError> {
        let mut conn = Connection::connect(
            &config.host,
            config.port,
            config.use_tls,
            config.pool.connect_timeout,
        )
        .await?;

        let sequence = Arc::new(AtomicU32::new(1));
        let bind_seq = sequence.fetch_add(1, Ordering::Relaxed);
        let bind = BindRequest::new(
            bind_seq,
            config.bind_type,
            &config.system_id,
            &config.password,
        );
        conn.write_bytes(&bind.to_bytes()).await?;

        // Read until the bind response; answer keep-alives arriving early.
        let bind_resp = tokio::time::timeout(config.pool.connect_timeout, async {
            loop {
                match conn.read_frame().await? {
                    Some(Frame::BindResp(resp)) if resp.sequence_number == bind_seq => {
                        return Ok::<_, SmppError>(resp);
                    }
                    Some(Frame::EnquireLink(el)) => {
                        conn.write_frame(&Frame::EnquireLinkResp(EnquireLinkResponse::new(
                            el.sequence_number,
                        )))
                        .await?;
                    }
                    Some(other) => {
                        debug!(pdu = ?other, "ignoring PDU while awaiting bind response");
                    }
                    None => return Err(SmppError::ConnectionReset),
                }
            }
        })
        .await
        .map_err(|_| SmppError::ResponseTimeout)??;

        if !bind_resp.command_status.is_ok() {
            return Err(SmppError::BindRejected(bind_resp.command_status));
        }

        info!(
            host = %config.host,
            port = config.port,
            system_id = %config.system_id,
            bind_type = ?config.bind_type,
            smsc = %bind_resp.system_id,
            "SMPP session bound"
        );

        let (io_tx, io_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(ClientStatus::Bound);

        let io_task = tokio::spawn(io_loop(
            conn,
            io_rx,
            status_tx,
            dlr_tx,
            sequence.clone(),
            config.enquire_link_interval,
        ));

        Ok(Self {
            io_tx,
            status_rx,
            sequence,
            pacer: Pacer::new(
                config.rate.max_messages_per_second,
                config.rate.burst,
                config.rate.window,
            ),
            response_timeout: config.inactivity_timeout,
            io_task,
        })
    }

    /// Next PDU sequence number.
    pub fn next_sequence(&self) -> u32 {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        // 0 and 0xFFFFFFFF are reserved.
        if seq == 0 || seq == u32::MAX {
            self.sequence.store(1, Ordering::Relaxed);
            self.sequence.fetch_add(1, Ordering::Relaxed)
        } else {
            seq
        }
    }

    /// Check whether the session still reports bound.
    pub fn is_bound(&self) -> bool {
        *self.status_rx.borrow() == ClientStatus::Bound
    }

    /// Submit one message part. The session's send-speed limit paces the PDU
    /// before it reaches the wire.
    pub async fn submit(&self, mut submit: SubmitSm) -> Result<SubmitOutcome, SmppError> {
        self.pacer.acquire().await;

        submit.sequence_number = self.next_sequence();
        let seq = submit.sequence_number;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.io_tx
            .send(IoRequest {
                frame: Frame::SubmitSm(submit),
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SmppError::SessionClosed)?;

        let frame = tokio::time::timeout(self.response_timeout, reply_rx)
            .await
            .map_err(|_| SmppError::ResponseTimeout)?
            .map_err(|_| SmppError::SessionClosed)?;

        match frame {
            Frame::SubmitSmResp(resp) => {
                debug_assert_eq!(resp.sequence_number, seq);
                let message_id = if resp.command_status.is_ok() && !resp.message_id.is_empty() {
                    Some(resp.message_id)
                } else {
                    None
                };
                Ok(SubmitOutcome {
                    status: resp.command_status,
                    message_id,
                })
            }
            Frame::GenericNack(nack) => Ok(SubmitOutcome {
                status: nack.command_status,
                message_id: None,
            }),
            other => Err(SmppError::Protocol(format!(
                "unexpected response to submit_sm: {other:?}"
            ))),
        }
    }

    /// Send unbind and wait for the response within the grace period.
    pub async fn unbind(&self, grace: Duration) -> Result<(), SmppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.io_tx
            .send(IoRequest {
                frame: Frame::Unbind(Unbind::new(self.next_sequence())),
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SmppError::SessionClosed)?;

        match tokio::time::timeout(grace, reply_rx).await {
            Ok(Ok(Frame::UnbindResp(_))) => Ok(()),
            Ok(Ok(other)) => Err(SmppError::Protocol(format!(
                "unexpected response to unbind: {other:?}"
            ))),
            Ok(Err(_)) => Err(SmppError::SessionClosed),
            Err(_) => Err(SmppError::ResponseTimeout),
        }
    }
}

impl Drop for SmppClient {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

async fn io_loop(
    mut conn: Connection,
    mut io_rx: mpsc::Receiver<IoRequest>,
    status_tx: watch::Sender<ClientStatus>,
    dlr_tx: mpsc::Sender<DeliverSm>,
    sequence: Arc<AtomicU32>,
    enquire_interval: Duration,
) {
    let mut pending: HashMap<u32, oneshot::Sender<Frame>> = HashMap::new();
    let mut enquire = tokio::time::interval(enquire_interval.max(Duration::from_secs(1)));
    enquire.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    enquire.tick().await; // skip the immediate first tick

    loop {
        tokio::select! {
            request = io_rx.recv() => {
                let Some(IoRequest { frame, reply }) = request else {
                    debug!("client handle dropped, closing session");
                    break;
                };

                let seq = frame.sequence_number();
                if let Some(reply) = reply {
                    pending.insert(seq, reply);
                }

                if let Err(e) = conn.write_frame(&frame).await {
                    warn!(error = %e, "write failed, closing session");
                    break;
                }
            }

            frame = conn.read_frame() => {
                match frame {
                    Ok(Some(Frame::EnquireLink(el))) => {
                        let resp = Frame::EnquireLinkResp(EnquireLinkResponse::new(el.sequence_number));
                        if conn.write_frame(&resp).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Frame::DeliverSm(deliver))) => {
                        let resp = Frame::DeliverSmResp(DeliverSmResponse::new(deliver.sequence_number));
                        if conn.write_frame(&resp).await.is_err() {
                            break;
                        }
                        // Forwarded without blocking the session; a full
                        // correlator channel drops the receipt.
                        if let Err(e) = dlr_tx.try_send(*deliver) {
                            warn!(error = %e, "DLR channel full, dropping receipt");
                        }
                    }
                    Ok(Some(Frame::Unbind(unbind))) => {
                        let resp = Frame::UnbindResp(super::pdu::UnbindResponse::new(unbind.sequence_number));
                        let _ = conn.write_frame(&resp).await;
                        info!("SMSC requested unbind, closing session");
                        break;
                    }
                    Ok(Some(frame)) if frame.is_response() => {
                        if let Some(reply) = pending.remove(&frame.sequence_number()) {
                            let _ = reply.send(frame);
                        }
                        // Unmatched responses (our own enquire_link_resp) are dropped.
                    }
                    Ok(Some(frame)) => {
                        debug!(pdu = ?frame, "ignoring unexpected PDU");
                    }
                    Ok(None) => {
                        info!("SMSC closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "read failed, closing session");
                        break;
                    }
                }
            }

            _ = enquire.tick() => {
                let seq = sequence.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::EnquireLink(EnquireLink::new(seq));
                if let Err(e) = conn.write_frame(&frame).await {
                    warn!(error = %e, "keep-alive write failed, closing session");
                    break;
                }
            }
        }
    }

    let _ = status_tx.send(ClientStatus::Closed);
    // Drain pending waiters so submitters see SessionClosed, not a hang.
    pending.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pacer_allows_burst_then_paces() {
        let pacer = Pacer::new(10, 2, Duration::from_secs(1));

        let start = Instant::now();
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        // Third acquire must wait for a refill (~100ms at 10/s).
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pacer_refills_to_burst_cap() {
        let pacer = Pacer::new(1000, 1, Duration::from_secs(1));
        pacer.acquire().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Even after sleeping, only one token may accumulate.
        let state = pacer.state.lock().await;
        assert!(state.tokens <= 1.0);
    }
}
