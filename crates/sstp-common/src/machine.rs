//! SSTP client state machine.
//!
//! The machine consumes semantic events (decoded control frames, CHAP
//! observations from the relay, timer expiries) and returns the actions
//! the session loop must carry out. It performs no I/O itself: timers
//! are armed and disarmed through actions rather than signals, and the
//! PPP peeking lives in the relay, which reports outcomes as events.
//!
//! States and transitions:
//!
//! ```text
//! Disconnected ──start──▶ ConnectRequestSent ──binding req──▶ ConnectAckReceived
//!       ▲                        │ ▲                                  │
//!       │                        │ └──── CALL_CONNECT_NAK (retry) ────│
//!       │                        │                          CHAP success
//!       └── disconnect/abort/timeout/violation ──┐                    │
//!                                                └──────── CallConnected
//! ```

use crate::crypto::{self, CompoundMac, HashAlgorithm};
use crate::error::{CryptoError, ProtocolError, SessionError, TimerKind};
use crate::frame::attribute::{Attribute, BINDING_FIELD_LEN};
use crate::frame::{ControlFrame, Frame};
use crate::ppp::ChapResponse;
use crate::proto::{
    AttributeId, ENCAPSULATED_PROTOCOL_PPP, HELLO_TIMER_SECS, MAX_CONNECT_ATTEMPTS, MessageType,
    NEGOTIATION_TIMER_SECS,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    ConnectRequestSent,
    ConnectAckReceived,
    CallConnected,
}

impl ClientState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::ConnectRequestSent => "CONNECT_REQUEST_SENT",
            Self::ConnectAckReceived => "CONNECT_ACK_RECEIVED",
            Self::CallConnected => "CALL_CONNECTED",
        }
    }
}

/// Input to the machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A decoded control frame from the downlink.
    Control(ControlFrame),
    /// The relay observed an MS-CHAPv2 response on the uplink.
    ChapResponse(ChapResponse),
    /// The relay observed a CHAP success on the downlink.
    PppAuthSuccess,
    /// The armed one-shot timer fired.
    TimerExpired(TimerKind),
}

/// Side effects for the session loop to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a control frame to the TLS transport.
    SendControl(Frame),
    /// Start the PPP daemon and begin relaying.
    SpawnPppd,
    /// Arm the one-shot timer (at most one is ever armed).
    ArmTimer(TimerKind, Duration),
    /// Disarm whatever timer is armed.
    DisarmTimer,
}

/// The session context plus transition logic.
///
/// One instance per session, owned by the session loop. All mutation
/// happens through [`Machine::start`] and [`Machine::handle`].
pub struct Machine {
    state: ClientState,
    attempts_left: u8,
    password: String,
    peer_cert_der: Vec<u8>,
    hash_algorithm: Option<HashAlgorithm>,
    nonce: [u8; BINDING_FIELD_LEN],
    cert_hash: [u8; BINDING_FIELD_LEN],
    binding: Option<CompoundMac>,
    chap_response: Option<ChapResponse>,
    disconnect_exchanged: bool,
}

impl Machine {
    /// Build a machine for one session. The peer certificate must be the
    /// DER export of the certificate the TLS transport actually
    /// negotiated, since the binding hash covers it.
    pub fn new(password: impl Into<String>, peer_cert_der: Vec<u8>) -> Self {
        Self {
            state: ClientState::Disconnected,
            attempts_left: MAX_CONNECT_ATTEMPTS,
            password: password.into(),
            peer_cert_der,
            hash_algorithm: None,
            nonce: [0u8; BINDING_FIELD_LEN],
            cert_hash: [0u8; BINDING_FIELD_LEN],
            binding: None,
            chap_response: None,
            disconnect_exchanged: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The derived CMK/CMAC pair, available once CALL_CONNECTED went out.
    pub fn binding(&self) -> Option<&CompoundMac> {
        self.binding.as_ref()
    }

    /// Whether teardown still owes the server a CALL_DISCONNECT. False
    /// once either side of the disconnect exchange has gone out.
    pub fn needs_disconnect(&self) -> bool {
        !self.disconnect_exchanged
    }

    /// Mark the disconnect as sent so a repeated teardown stays silent.
    pub fn mark_disconnect_sent(&mut self) {
        self.disconnect_exchanged = true;
    }

    /// Kick off negotiation: emit the CALL_CONNECT_REQUEST and arm the
    /// negotiation timer.
    pub fn start(&mut self) -> Vec<Action> {
        self.attempts_left -= 1;
        self.set_state(ClientState::ConnectRequestSent);
        vec![
            Action::SendControl(Frame::control(
                MessageType::CallConnectRequest,
                vec![Attribute::encapsulated_protocol(ENCAPSULATED_PROTOCOL_PPP)],
            )),
            Action::ArmTimer(
                TimerKind::Negotiation,
                Duration::from_secs(NEGOTIATION_TIMER_SECS),
            ),
        ]
    }

    /// Feed one event through the transition table.
    ///
    /// An `Err` return means the session must tear down; the machine is
    /// already in `Disconnected` when that happens.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Action>, SessionError> {
        match event {
            Event::Control(control) => self.handle_control(control),
            Event::ChapResponse(response) => {
                debug!("captured MS-CHAPv2 response from uplink");
                self.chap_response = Some(response);
                Ok(Vec::new())
            }
            Event::PppAuthSuccess => self.handle_chap_success(),
            Event::TimerExpired(kind) => {
                warn!("{kind} timer expired in state {}", self.state.name());
                self.set_state(ClientState::Disconnected);
                Err(SessionError::TimerExpired(kind))
            }
        }
    }

    fn handle_control(&mut self, control: ControlFrame) -> Result<Vec<Action>, SessionError> {
        let message = match MessageType::from_u16(control.message_type) {
            Ok(message) => message,
            Err(err) => {
                self.set_state(ClientState::Disconnected);
                return Err(err.into());
            }
        };

        debug!(
            "control message {} with {} attribute(s) in state {}",
            message.name(),
            control.attributes.len(),
            self.state.name()
        );

        match message {
            // A client never accepts these two, whatever the state.
            MessageType::CallConnectRequest | MessageType::CallDisconnectAck => {
                self.set_state(ClientState::Disconnected);
                Err(ProtocolError::UnexpectedMessage(message.name()).into())
            }

            MessageType::CallDisconnect => {
                info!("server requested disconnect");
                self.disconnect_exchanged = true;
                self.set_state(ClientState::Disconnected);
                Ok(vec![Action::SendControl(Frame::control(
                    MessageType::CallDisconnectAck,
                    Vec::new(),
                ))])
            }

            MessageType::CallAbort => {
                self.log_status_attributes(&control.attributes);
                self.set_state(ClientState::Disconnected);
                Err(SessionError::CallAborted)
            }

            MessageType::CallConnectAck if self.state == ClientState::ConnectRequestSent => {
                self.handle_connect_ack(control)
            }

            MessageType::CallConnectNak if self.state == ClientState::ConnectRequestSent => {
                self.log_status_attributes(&control.attributes);
                if self.attempts_left == 0 {
                    self.set_state(ClientState::Disconnected);
                    return Err(ProtocolError::RetriesExhausted.into());
                }
                info!(
                    "connect request refused, retrying ({}/{})",
                    MAX_CONNECT_ATTEMPTS - self.attempts_left,
                    MAX_CONNECT_ATTEMPTS
                );
                Ok(self.start())
            }

            MessageType::EchoRequest if self.state == ClientState::CallConnected => {
                Ok(vec![Action::SendControl(Frame::control(
                    MessageType::EchoResponse,
                    Vec::new(),
                ))])
            }

            MessageType::EchoResponse if self.state == ClientState::CallConnected => {
                debug!("echo response received, hello timer disarmed");
                Ok(vec![Action::DisarmTimer])
            }

            other => {
                let state = self.state.name();
                self.set_state(ClientState::Disconnected);
                Err(ProtocolError::WrongStateForMessage {
                    message: other.name(),
                    state,
                }
                .into())
            }
        }
    }

    /// CALL_CONNECT_ACK: walk the attributes, accept the crypto binding
    /// request, then have the loop start pppd.
    fn handle_connect_ack(&mut self, control: ControlFrame) -> Result<Vec<Action>, SessionError> {
        let mut actions = Vec::new();

        for attribute in &control.attributes {
            match attribute.id {
                AttributeId::NoError => {}
                AttributeId::StatusInfo => self.log_status_attribute(attribute),
                AttributeId::CryptoBindingReq => {
                    let req = match attribute.as_crypto_binding_req() {
                        Ok(req) => req,
                        Err(err) => {
                            self.set_state(ClientState::Disconnected);
                            return Err(err.into());
                        }
                    };
                    actions.extend(self.accept_binding_request(req.hash_bitmask, req.nonce)?);
                }
                AttributeId::CryptoBinding | AttributeId::EncapsulatedProtocolId => {
                    self.set_state(ClientState::Disconnected);
                    return Err(ProtocolError::UnexpectedAttribute(attribute.id.name()).into());
                }
            }
        }

        if self.state != ClientState::ConnectAckReceived {
            self.set_state(ClientState::Disconnected);
            return Err(
                ProtocolError::UnexpectedMessage("CALL_CONNECT_ACK without a binding request")
                    .into(),
            );
        }

        actions.push(Action::SpawnPppd);
        Ok(actions)
    }

    /// The CRYPTO_BINDING_REQ proper: select the hash, keep the nonce,
    /// hash the server certificate, stop the negotiation timer.
    fn accept_binding_request(
        &mut self,
        hash_bitmask: u8,
        nonce: [u8; BINDING_FIELD_LEN],
    ) -> Result<Vec<Action>, SessionError> {
        if self.state != ClientState::ConnectRequestSent {
            let state = self.state.name();
            self.set_state(ClientState::Disconnected);
            return Err(ProtocolError::WrongStateForMessage {
                message: "CRYPTO_BINDING_REQ",
                state,
            }
            .into());
        }

        let algorithm = match HashAlgorithm::negotiate(hash_bitmask) {
            Ok(algorithm) => algorithm,
            Err(err) => {
                self.set_state(ClientState::Disconnected);
                return Err(err.into());
            }
        };

        if self.peer_cert_der.is_empty() {
            self.set_state(ClientState::Disconnected);
            return Err(CryptoError::CertExportFailed.into());
        }

        info!(
            "crypto binding requested, hash {} (bitmask {hash_bitmask:#04x})",
            algorithm.name()
        );

        self.hash_algorithm = Some(algorithm);
        self.nonce = nonce;
        self.cert_hash = crypto::cert_hash(algorithm, &self.peer_cert_der);
        self.set_state(ClientState::ConnectAckReceived);

        Ok(vec![Action::DisarmTimer])
    }

    /// CHAP success on the downlink: finalize the binding, send
    /// CALL_CONNECTED, then probe the server with one echo.
    fn handle_chap_success(&mut self) -> Result<Vec<Action>, SessionError> {
        if self.state != ClientState::ConnectAckReceived {
            let state = self.state.name();
            self.set_state(ClientState::Disconnected);
            return Err(ProtocolError::WrongStateForMessage {
                message: "PPP_CHAP_SUCCESS",
                state,
            }
            .into());
        }

        let algorithm = self
            .hash_algorithm
            .expect("hash algorithm is set on entry to CONNECT_ACK_RECEIVED");

        let Some(chap_response) = self.chap_response.as_ref() else {
            self.set_state(ClientState::Disconnected);
            return Err(CryptoError::MissingChapResponse.into());
        };

        let nt_response = chap_response.nt_response();
        let binding = match crypto::compound_mac(
            algorithm,
            &self.password,
            &nt_response,
            &self.nonce,
            &self.cert_hash,
        ) {
            Ok(binding) => binding,
            Err(err) => {
                self.set_state(ClientState::Disconnected);
                return Err(err.into());
            }
        };
        debug!("compound MAC {}", hex::encode(binding.cmac));

        let connected = Frame::control(
            MessageType::CallConnected,
            vec![Attribute::crypto_binding(
                algorithm as u8,
                &self.nonce,
                &self.cert_hash,
                &binding.cmac,
            )],
        );
        self.binding = Some(binding);
        self.set_state(ClientState::CallConnected);

        Ok(vec![
            Action::SendControl(connected),
            Action::ArmTimer(TimerKind::Hello, Duration::from_secs(HELLO_TIMER_SECS)),
            Action::SendControl(Frame::control(MessageType::EchoRequest, Vec::new())),
        ])
    }

    fn log_status_attributes(&self, attributes: &[Attribute]) {
        for attribute in attributes {
            if attribute.id == AttributeId::StatusInfo {
                self.log_status_attribute(attribute);
            }
        }
    }

    fn log_status_attribute(&self, attribute: &Attribute) {
        match attribute.as_status_info() {
            Ok(info) => {
                warn!(
                    "server status: attribute {:#04x}, status {:?} ({:#06x})",
                    info.attrib_id,
                    info.status(),
                    info.status
                );
                // The offending attribute value is at most 64 bytes.
                if self.state == ClientState::ConnectRequestSent && !info.value.is_empty() {
                    warn!(
                        "offending attribute value: {}",
                        hex::encode(&info.value[..info.value.len().min(64)])
                    );
                }
            }
            Err(err) => warn!("unparseable STATUS_INFO attribute: {err}"),
        }
    }

    fn set_state(&mut self, state: ClientState) {
        if self.state != state {
            info!("client state: {} -> {}", self.state.name(), state.name());
            self.state = state;
        }
    }
}
