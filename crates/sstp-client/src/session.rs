//! Session loop: the two relay pumps and the action executor.
//!
//! One task owns everything. A `select!` multiplexes three inputs (the
//! TLS stream, the pty master, and the single armed timer) so state
//! transitions and the CHAP capture are naturally serialized and writes
//! to either stream never interleave.
//!
//! Each TLS read is treated as one SSTP frame, mirroring the record
//! alignment SSTP servers produce. A frame whose header length disagrees
//! with the bytes received is dropped, not fatal: the first PPP frame
//! some servers send announces a wrong length.

use sstp_common::error::{FramingError, SessionError, TimerKind};
use sstp_common::frame::Frame;
use sstp_common::machine::{Action, ClientState, Event, Machine};
use sstp_common::ppp::{self, ChapEvent};
use sstp_common::proto::MessageType;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pppd::PppSupervisor;
use crate::tls::TlsTransport;

/// One SSTP session over an upgraded TLS stream.
pub struct Session {
    transport: Box<dyn TlsTransport>,
    machine: Machine,
    config: Config,
}

/// Byte accounting reported when the session closes.
#[derive(Debug, Default)]
struct Counters {
    rx_bytes: u64,
    tx_bytes: u64,
}

impl Session {
    /// Build a session over a transport that has already completed the
    /// HTTP upgrade.
    pub fn new(transport: Box<dyn TlsTransport>, config: Config) -> Self {
        let peer_cert = transport
            .peer_cert_der()
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let machine = Machine::new(config.password.clone(), peer_cert);
        Self {
            transport,
            machine,
            config,
        }
    }

    /// Drive the session to completion. Returns once the state machine
    /// reaches `Disconnected`, the server closes the stream, or a fatal
    /// error forces teardown.
    pub async fn run(self) -> Result<(), SessionError> {
        let Session {
            mut transport,
            mut machine,
            config,
        } = self;

        let mut pppd: Option<PppSupervisor> = None;
        let mut timer: Option<(TimerKind, Instant)> = None;
        let mut counters = Counters::default();
        let started = std::time::Instant::now();

        let startup = machine.start();
        let mut result = execute(
            startup,
            &mut transport,
            &mut pppd,
            &mut timer,
            &config,
            &mut counters,
        )
        .await;

        if result.is_ok() {
            result = drive(
                &mut transport,
                &mut machine,
                &mut pppd,
                &mut timer,
                &config,
                &mut counters,
            )
            .await;
        }

        teardown(&mut transport, &mut machine, &mut pppd, &mut counters).await;
        info!(
            "session closed: {} bytes sent, {} bytes received in {:.1?}",
            counters.tx_bytes,
            counters.rx_bytes,
            started.elapsed()
        );
        result
    }
}

/// The multiplexed pump loop.
async fn drive(
    transport: &mut Box<dyn TlsTransport>,
    machine: &mut Machine,
    pppd: &mut Option<PppSupervisor>,
    timer: &mut Option<(TimerKind, Instant)>,
    config: &Config,
    counters: &mut Counters,
) -> Result<(), SessionError> {
    let max_record = transport.max_record_size();
    let mut net_buf = vec![0u8; max_record];
    let mut pty_buf = vec![0u8; max_record];

    while machine.state() != ClientState::Disconnected {
        let deadline = timer.map(|(_, at)| at);

        tokio::select! {
            received = transport.recv(&mut net_buf) => {
                let n = received?;
                if n == 0 {
                    info!("server closed the stream");
                    return Ok(());
                }
                counters.rx_bytes += n as u64;
                downlink(&net_buf[..n], transport, machine, pppd, timer, config, counters).await?;
            }

            read = async { pppd.as_ref().expect("guarded by precondition").read(&mut pty_buf).await },
                    if pppd.is_some() => {
                let n = match read {
                    Ok(0) => return Err(SessionError::Child("pppd closed the pty".into())),
                    Ok(n) => n,
                    Err(err) => return Err(SessionError::Child(format!("pty read failed: {err}"))),
                };
                uplink(&pty_buf[..n], transport, machine, counters).await?;
            }

            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            }, if deadline.is_some() => {
                let (kind, _) = timer.take().expect("timer fired while armed");
                let actions = machine.handle(Event::TimerExpired(kind))?;
                execute(actions, transport, pppd, timer, config, counters).await?;
            }
        }
    }

    Ok(())
}

/// One frame from the server: dispatch control messages, relay data
/// frames to pppd after peeking for the CHAP success.
async fn downlink(
    bytes: &[u8],
    transport: &mut Box<dyn TlsTransport>,
    machine: &mut Machine,
    pppd: &mut Option<PppSupervisor>,
    timer: &mut Option<(TimerKind, Instant)>,
    config: &Config,
    counters: &mut Counters,
) -> Result<(), SessionError> {
    let frame = match Frame::from_bytes(bytes) {
        Ok(frame) => frame,
        Err(FramingError::LengthMismatch {
            announced,
            received,
        }) => {
            warn!("frame announced {announced} bytes but delivered {received}, dropped");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    match frame {
        Frame::Control(control) => {
            let actions = machine.handle(Event::Control(control))?;
            execute(actions, transport, pppd, timer, config, counters).await
        }
        Frame::Data(payload) => {
            if let Some(ChapEvent::Success) = ppp::inspect(&payload) {
                info!("PPP authentication succeeded");
                let actions = machine.handle(Event::PppAuthSuccess)?;
                execute(actions, transport, pppd, timer, config, counters).await?;
            }
            match pppd {
                Some(supervisor) => supervisor
                    .write_all(&payload)
                    .await
                    .map_err(|err| SessionError::Child(format!("pty write failed: {err}")))?,
                None => warn!("data frame before pppd is running, dropped"),
            }
            Ok(())
        }
    }
}

/// One PPP frame from pppd: capture a CHAP response if one goes by,
/// then wrap and send.
async fn uplink(
    frame: &[u8],
    transport: &mut Box<dyn TlsTransport>,
    machine: &mut Machine,
    counters: &mut Counters,
) -> Result<(), SessionError> {
    if let Some(ChapEvent::Response(response)) = ppp::inspect(frame) {
        // The relay never alters the frame; the machine only keeps a copy.
        machine.handle(Event::ChapResponse(response))?;
    }

    let bytes = Frame::data(frame).to_bytes();
    transport.send(&bytes).await?;
    counters.tx_bytes += bytes.len() as u64;
    debug!("--> {} bytes (data)", bytes.len());
    Ok(())
}

/// Carry out the machine's side effects, in order.
async fn execute(
    actions: Vec<Action>,
    transport: &mut Box<dyn TlsTransport>,
    pppd: &mut Option<PppSupervisor>,
    timer: &mut Option<(TimerKind, Instant)>,
    config: &Config,
    counters: &mut Counters,
) -> Result<(), SessionError> {
    for action in actions {
        match action {
            Action::SendControl(frame) => {
                let bytes = frame.to_bytes();
                transport.send(&bytes).await?;
                counters.tx_bytes += bytes.len() as u64;
                debug!("--> {} bytes (control)", bytes.len());
            }
            Action::SpawnPppd => {
                *pppd = Some(PppSupervisor::spawn(config)?);
            }
            Action::ArmTimer(kind, duration) => {
                *timer = Some((kind, Instant::now() + duration));
            }
            Action::DisarmTimer => {
                *timer = None;
            }
        }
    }
    Ok(())
}

/// Idempotent teardown: stop the relay child, settle the disconnect
/// exchange, close the transport.
async fn teardown(
    transport: &mut Box<dyn TlsTransport>,
    machine: &mut Machine,
    pppd: &mut Option<PppSupervisor>,
    counters: &mut Counters,
) {
    if machine.needs_disconnect() {
        let bytes = Frame::control(MessageType::CallDisconnect, Vec::new()).to_bytes();
        match transport.send(&bytes).await {
            Ok(_) => {
                counters.tx_bytes += bytes.len() as u64;
                machine.mark_disconnect_sent();
                debug!("--> {} bytes (CALL_DISCONNECT)", bytes.len());
            }
            Err(err) => warn!("could not send CALL_DISCONNECT: {err}"),
        }
    }

    if let Some(mut supervisor) = pppd.take() {
        supervisor.terminate().await;
    }

    if let Err(err) = transport.shutdown().await {
        debug!("transport shutdown: {err}");
    }
}
