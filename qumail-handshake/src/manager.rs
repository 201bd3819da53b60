//! The handshake drivers.
//!
//! One driver call per session per role. A driver claims the session id,
//! subscribes to the channel before transmitting anything, then loops:
//! receive, filter, feed the core machine, transmit its replies — until the
//! machine lands on an outcome. The subscription and the registry claim are
//! both released when the call returns, whichever way it returns.
//!
//! There are no internal timeouts: a session whose peer never answers stays
//! pending until the caller drops the future (the session is then abandoned
//! and the id becomes reusable).

use rand::thread_rng;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use qumail_core::protocol::{PHOTON_MULTIPLIER, RAW_KEY_TARGET_BITS, SAMPLE_FRACTION};
use qumail_core::{FinalKey, Initiator, Payload, ProtocolVariant, Responder, Step};

use crate::channel::MessageChannel;
use crate::error::HandshakeError;
use crate::message::Envelope;
use crate::registry::SessionRegistry;

/// Tunables for an initiated handshake.
///
/// The responder needs no options: the variant arrives in the opening
/// message and the final key length is fixed protocol-wide.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeOptions {
    /// Which protocol variant to run.
    pub variant: ProtocolVariant,
    /// Target raw key length in bits, before the 10x transmission
    /// oversampling.
    pub raw_key_target_bits: usize,
    /// Fraction of the sifted key disclosed for error checking.
    pub sample_fraction: f64,
}

impl HandshakeOptions {
    /// Defaults for a variant: 512 target bits, half disclosed.
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            raw_key_target_bits: RAW_KEY_TARGET_BITS,
            sample_fraction: SAMPLE_FRACTION,
        }
    }

    /// Override the raw key target.
    pub fn with_raw_key_target_bits(mut self, bits: usize) -> Self {
        self.raw_key_target_bits = bits;
        self
    }

    /// Override the disclosed fraction.
    pub fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    fn num_symbols(&self) -> usize {
        self.raw_key_target_bits * PHOTON_MULTIPLIER
    }
}

/// Run a session as the initiator and await the final key.
///
/// Fails fast with `ChannelUnavailable` before generating any private
/// material if the channel is down.
///
/// # Errors
///
/// See [`HandshakeError`]; a `SecurityRejection` means tampering (or noise
/// above threshold) was detected and no key exists.
pub async fn start_as_initiator<C, F>(
    channel: &C,
    registry: &SessionRegistry,
    mut on_progress: F,
    self_id: &str,
    peer_id: &str,
    options: HandshakeOptions,
    session_id: &str,
) -> Result<FinalKey, HandshakeError>
where
    C: MessageChannel + ?Sized,
    F: FnMut(&str) + Send,
{
    if !channel.is_connected() {
        return Err(HandshakeError::ChannelUnavailable);
    }
    let _claim = registry.claim(session_id)?;
    let mut rx = channel.subscribe();

    let mut machine = Initiator::new(options.variant, options.num_symbols(), options.sample_fraction)
        .map_err(HandshakeError::InvalidCall)?;

    on_progress("Preparing quantum states...");
    let opening = machine.start(&mut thread_rng()).map_err(HandshakeError::InvalidCall)?;

    on_progress("Transmitting quantum states...");
    channel.send(Envelope::new(peer_id, self_id, session_id, opening))?;

    loop {
        let envelope = recv_for(&mut rx, session_id, peer_id, self_id).await?;

        match &envelope.payload {
            Payload::ResponderBases { .. } => on_progress("Received peer bases. Sifting..."),
            Payload::HandshakeComplete { .. } => {
                on_progress("Verdict received. Deriving final key...")
            }
            _ => {}
        }

        match machine.on_payload(envelope.payload, &mut thread_rng())? {
            Step::Continue => {}
            Step::Ignored => debug!(%session_id, "payload ignored in current state"),
            Step::Send(replies) => {
                on_progress("Sifting complete. Announcing bases and error sample...");
                for payload in replies {
                    channel.send(Envelope::new(peer_id, self_id, session_id, payload))?;
                }
            }
            Step::Established { key, reply } => {
                for payload in reply {
                    channel.send(Envelope::new(peer_id, self_id, session_id, payload))?;
                }
                on_progress("Secure key established successfully!");
                return Ok(key);
            }
            Step::Rejected { qber, threshold, reply } => {
                for payload in reply {
                    channel.send(Envelope::new(peer_id, self_id, session_id, payload))?;
                }
                on_progress("SECURITY ALERT: high error rate detected!");
                return Err(HandshakeError::SecurityRejection { qber, threshold });
            }
        }
    }
}

/// Run a session as the responder, from a received opening envelope, and
/// await the final key.
///
/// The caller's dispatcher hands over the `qkd_initiate` envelope it pulled
/// off the channel; everything after that is driven here. If the session id
/// is already live the initiate is a duplicate and is refused — the caller
/// should log and drop it.
///
/// # Errors
///
/// See [`HandshakeError`].
pub async fn start_as_responder<C, F>(
    initiate: Envelope,
    channel: &C,
    registry: &SessionRegistry,
    mut on_progress: F,
    self_id: &str,
) -> Result<FinalKey, HandshakeError>
where
    C: MessageChannel + ?Sized,
    F: FnMut(&str) + Send,
{
    if !channel.is_connected() {
        return Err(HandshakeError::ChannelUnavailable);
    }

    let peer_id = initiate.from;
    let session_id = initiate.session_id;
    let Payload::Initiate { protocol, symbols } = initiate.payload else {
        return Err(HandshakeError::InvalidCall(qumail_core::ProtocolError::InvalidTransition));
    };

    eprintln!("[responder] entered, claiming {session_id}");
    let _claim = registry.claim(&session_id);
    eprintln!("[responder] claim result ok={}", _claim.is_ok());
    let mut rx = channel.subscribe();

    on_progress("Quantum states received. Measuring...");
    eprintln!("[responder] measuring {} symbols", symbols.len());
    let (mut machine, announce) = Responder::accept(&symbols, protocol, &mut thread_rng())?;

    on_progress("Measurement complete. Announcing bases...");
    eprintln!("[responder] sending announce to {peer_id}");
    channel.send(Envelope::new(&peer_id, self_id, &session_id, announce))?;
    eprintln!("[responder] announce sent");

    loop {
        let envelope = recv_for(&mut rx, &session_id, &peer_id, self_id).await?;

        match &envelope.payload {
            Payload::InitiatorBases { .. } => on_progress("Received peer bases. Sifting..."),
            Payload::InitiatorSample { .. } => {
                on_progress("Received error sample. Verifying...")
            }
            Payload::PaChoice { .. } => on_progress("Seed received. Deriving final key..."),
            _ => {}
        }

        match machine.on_payload(envelope.payload)? {
            Step::Continue => {}
            Step::Ignored => debug!(%session_id, "payload ignored in current state"),
            Step::Send(replies) => {
                for payload in replies {
                    channel.send(Envelope::new(&peer_id, self_id, &session_id, payload))?;
                }
            }
            Step::Established { key, reply } => {
                for payload in reply {
                    channel.send(Envelope::new(&peer_id, self_id, &session_id, payload))?;
                }
                on_progress("Secure key established successfully!");
                return Ok(key);
            }
            Step::Rejected { qber, threshold, reply } => {
                for payload in reply {
                    channel.send(Envelope::new(&peer_id, self_id, &session_id, payload))?;
                }
                on_progress("SECURITY ALERT: high error rate detected!");
                return Err(HandshakeError::SecurityRejection { qber, threshold });
            }
        }
    }
}

/// Receive the next envelope addressed to this session.
///
/// Envelopes for other sessions, from other peers, or to other recipients
/// are expected on a shared channel and are discarded without comment
/// beyond a debug line.
async fn recv_for(
    rx: &mut broadcast::Receiver<Envelope>,
    session_id: &str,
    peer_id: &str,
    self_id: &str,
) -> Result<Envelope, HandshakeError> {
    loop {
        eprintln!("[recv_for] self={self_id} peer={peer_id} awaiting...");
        match rx.recv().await {
            Ok(envelope) => {
                eprintln!("[recv_for] self={self_id} got event={} from={} to={}", envelope.payload.event(), envelope.from, envelope.to);
                if envelope.session_id != session_id
                    || envelope.from != peer_id
                    || envelope.to != self_id
                {
                    debug!(
                        %session_id,
                        from = %envelope.from,
                        event = envelope.payload.event(),
                        "discarding envelope for another session"
                    );
                    continue;
                }
                return Ok(envelope);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(%session_id, missed, "inbound subscription lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(HandshakeError::ChannelClosed);
            }
        }
    }
}
