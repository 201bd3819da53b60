//! The handshake state machines.
//!
//! One machine per role per session. Each state is a tagged union carrying
//! exactly the data valid in that state; a payload-dispatch method drives
//! transitions and reports what to transmit next. The machines are sans-io:
//! they never touch a socket, a clock, or a task — the async layer feeds
//! them inbound payloads and carries their replies.
//!
//! Initiator: `Idle → AwaitingBobBases → AwaitingConfirmation → Done | Failed`.
//! Responder: `AwaitingAliceBases → AwaitingSample → Verified → Confirmed | Rejected`.
//!
//! Any malformed peer input is a terminal error: the machine moves to its
//! failure state and the session must be torn down. A well-formed payload
//! that is not expected in the current state is stray traffic and is
//! ignored without a state change.

use rand::Rng;
use zeroize::Zeroizing;

use crate::amplify::{amplify, random_seed};
use crate::error::ProtocolError;
use crate::estimate::{check_errors, sample, Sample};
use crate::key::FinalKey;
use crate::measure::measure;
use crate::message::{Payload, VerdictStatus};
use crate::protocol::{ProtocolVariant, FINAL_KEY_BITS};
use crate::sift::{project, sift_indices};
use crate::statevec::{generate_initiator_material, generate_responder_bases, BasisChoice, StateVector};

/// What a machine wants done after absorbing a payload.
#[derive(Debug)]
pub enum Step {
    /// State advanced; nothing to transmit yet.
    Continue,
    /// Transmit these payloads to the peer, in order.
    Send(Vec<Payload>),
    /// Terminal success: the final key, plus any closing payloads to
    /// transmit before the session is torn down.
    Established {
        /// The derived final key.
        key: FinalKey,
        /// Closing payloads to transmit, in order.
        reply: Vec<Payload>,
    },
    /// Terminal security failure: the measured QBER exceeded the threshold.
    /// The key is discarded; the session must be reported failed.
    Rejected {
        /// The measured error rate.
        qber: f64,
        /// The variant's acceptance threshold.
        threshold: f64,
        /// Closing payloads to transmit (the failure verdict), in order.
        reply: Vec<Payload>,
    },
    /// Payload not expected in the current state; ignored without effect.
    Ignored,
}

/// Observable initiator state, for progress reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorStage {
    /// Created, nothing transmitted.
    Idle,
    /// Symbol stream transmitted; waiting for the responder's bases.
    AwaitingBobBases,
    /// Bases and sample transmitted; waiting for the verdict.
    AwaitingConfirmation,
    /// Key established.
    Done,
    /// Session aborted or rejected.
    Failed,
}

enum InitiatorState {
    Idle { num_symbols: usize },
    AwaitingBobBases { material: StateVector },
    AwaitingConfirmation { sifted: Zeroizing<Vec<u8>>, disclosed: Sample },
    Done,
    Failed,
}

/// The initiator ("Alice") state machine for one session.
pub struct Initiator {
    variant: ProtocolVariant,
    sample_fraction: f64,
    state: InitiatorState,
}

impl Initiator {
    /// Create an initiator that will transmit `num_symbols` states.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero symbol count or a sample fraction
    /// outside `[0, 1]`.
    pub fn new(
        variant: ProtocolVariant,
        num_symbols: usize,
        sample_fraction: f64,
    ) -> Result<Self, ProtocolError> {
        if num_symbols == 0 {
            return Err(ProtocolError::InvalidSymbolCount);
        }
        if !(0.0..=1.0).contains(&sample_fraction) {
            return Err(ProtocolError::InvalidSampleFraction);
        }
        Ok(Self {
            variant,
            sample_fraction,
            state: InitiatorState::Idle { num_symbols },
        })
    }

    /// Observable stage.
    pub fn stage(&self) -> InitiatorStage {
        match self.state {
            InitiatorState::Idle { .. } => InitiatorStage::Idle,
            InitiatorState::AwaitingBobBases { .. } => InitiatorStage::AwaitingBobBases,
            InitiatorState::AwaitingConfirmation { .. } => InitiatorStage::AwaitingConfirmation,
            InitiatorState::Done => InitiatorStage::Done,
            InitiatorState::Failed => InitiatorStage::Failed,
        }
    }

    /// The session's protocol variant.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Generate the private material and produce the opening payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the handshake already started.
    pub fn start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Payload, ProtocolError> {
        let num_symbols = match self.state {
            InitiatorState::Idle { num_symbols } => num_symbols,
            _ => return Err(ProtocolError::InvalidTransition),
        };

        let material = generate_initiator_material(num_symbols, self.variant, rng)?;
        let symbols = material.symbols;
        self.state = InitiatorState::AwaitingBobBases { material: material.private };

        Ok(Payload::Initiate { protocol: self.variant, symbols })
    }

    /// Absorb one inbound payload.
    ///
    /// # Errors
    ///
    /// A malformed payload aborts the session; the machine is left in
    /// `Failed` and must not be fed again.
    pub fn on_payload<R: Rng + ?Sized>(
        &mut self,
        payload: Payload,
        rng: &mut R,
    ) -> Result<Step, ProtocolError> {
        // Take the state out; error paths deliberately leave `Failed` behind.
        let state = std::mem::replace(&mut self.state, InitiatorState::Failed);

        match (state, payload) {
            (
                InitiatorState::AwaitingBobBases { material },
                Payload::ResponderBases { bases, orientations },
            ) => {
                let indices = sift_indices(
                    material.bases(),
                    &bases,
                    material.orientations(),
                    orientations.as_deref(),
                    self.variant,
                )?;
                let sifted = Zeroizing::new(project(material.bits(), &indices)?);
                let disclosed = sample(&sifted, self.sample_fraction, rng)?;

                let announce = material.basis_choice();
                let reply = vec![
                    Payload::InitiatorBases {
                        bases: announce.bases,
                        orientations: announce.orientations,
                    },
                    Payload::InitiatorSample { sample: disclosed.entries.clone() },
                ];

                self.state = InitiatorState::AwaitingConfirmation { sifted, disclosed };
                Ok(Step::Send(reply))
            }

            (
                InitiatorState::AwaitingConfirmation { sifted, disclosed },
                Payload::HandshakeComplete { status: VerdictStatus::Success, .. },
            ) => {
                // The disclosed positions are exactly known here: strip the
                // sample the machine itself sent, then amplify.
                let check = check_errors(&sifted, &disclosed)?;
                let seed = random_seed(rng);
                let key = amplify(&check.remaining, &seed, FINAL_KEY_BITS)?;

                self.state = InitiatorState::Done;
                Ok(Step::Established { key, reply: vec![Payload::PaChoice { seed }] })
            }

            (
                InitiatorState::AwaitingConfirmation { .. },
                Payload::HandshakeComplete { status: VerdictStatus::Failed, qber },
            ) => {
                // Already in Failed; nothing to clean up.
                Ok(Step::Rejected {
                    qber,
                    threshold: self.variant.qber_threshold(),
                    reply: vec![],
                })
            }

            (state, _) => {
                self.state = state;
                Ok(Step::Ignored)
            }
        }
    }
}

/// Observable responder state, for progress reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderStage {
    /// Measured and announced bases; waiting for the initiator's bases.
    AwaitingAliceBases,
    /// Sifted; waiting for the error-check sample.
    AwaitingSample,
    /// Verdict sent; waiting for the amplification seed.
    Verified,
    /// Key established.
    Confirmed,
    /// Session rejected.
    Rejected,
}

enum ResponderState {
    AwaitingAliceBases { choice: BasisChoice, measured: Zeroizing<Vec<u8>> },
    AwaitingSample { sifted: Zeroizing<Vec<u8>> },
    Verified { raw_key: Zeroizing<Vec<u8>> },
    Confirmed,
    Rejected,
}

/// The responder ("Bob") state machine for one session.
pub struct Responder {
    variant: ProtocolVariant,
    state: ResponderState,
}

impl Responder {
    /// Accept an opening symbol stream: measure it under fresh random
    /// bases and produce the basis announcement to transmit back.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or out-of-alphabet stream.
    pub fn accept<R: Rng + ?Sized>(
        symbols: &[u8],
        variant: ProtocolVariant,
        rng: &mut R,
    ) -> Result<(Self, Payload), ProtocolError> {
        if symbols.is_empty() {
            return Err(ProtocolError::InvalidSymbolCount);
        }

        let choice = generate_responder_bases(symbols.len(), variant, rng)?;
        let measured = Zeroizing::new(measure(symbols, &choice, variant, rng)?);

        let announce = Payload::ResponderBases {
            bases: choice.bases.clone(),
            orientations: choice.orientations.clone(),
        };

        let responder = Self {
            variant,
            state: ResponderState::AwaitingAliceBases { choice, measured },
        };
        Ok((responder, announce))
    }

    /// Observable stage.
    pub fn stage(&self) -> ResponderStage {
        match self.state {
            ResponderState::AwaitingAliceBases { .. } => ResponderStage::AwaitingAliceBases,
            ResponderState::AwaitingSample { .. } => ResponderStage::AwaitingSample,
            ResponderState::Verified { .. } => ResponderStage::Verified,
            ResponderState::Confirmed => ResponderStage::Confirmed,
            ResponderState::Rejected => ResponderStage::Rejected,
        }
    }

    /// The session's protocol variant.
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Absorb one inbound payload.
    ///
    /// # Errors
    ///
    /// A malformed payload aborts the session; the machine is left in
    /// `Rejected` and must not be fed again.
    pub fn on_payload(&mut self, payload: Payload) -> Result<Step, ProtocolError> {
        let state = std::mem::replace(&mut self.state, ResponderState::Rejected);

        match (state, payload) {
            (
                ResponderState::AwaitingAliceBases { choice, measured },
                Payload::InitiatorBases { bases, orientations },
            ) => {
                // Derived from the same two public announcements the
                // initiator used, so both sides hold the same index set.
                let indices = sift_indices(
                    &choice.bases,
                    &bases,
                    choice.orientations.as_deref(),
                    orientations.as_deref(),
                    self.variant,
                )?;
                let sifted = Zeroizing::new(project(&measured, &indices)?);

                self.state = ResponderState::AwaitingSample { sifted };
                Ok(Step::Continue)
            }

            (ResponderState::AwaitingSample { sifted }, Payload::InitiatorSample { sample }) => {
                let check = check_errors(&sifted, &Sample { entries: sample })?;
                let threshold = self.variant.qber_threshold();

                if check.qber > threshold {
                    // Already in Rejected. The key material is discarded;
                    // only the verdict leaves this machine.
                    return Ok(Step::Rejected {
                        qber: check.qber,
                        threshold,
                        reply: vec![Payload::HandshakeComplete {
                            status: VerdictStatus::Failed,
                            qber: check.qber,
                        }],
                    });
                }

                let verdict = Payload::HandshakeComplete {
                    status: VerdictStatus::Success,
                    qber: check.qber,
                };
                self.state = ResponderState::Verified { raw_key: check.remaining };
                Ok(Step::Send(vec![verdict]))
            }

            (ResponderState::Verified { raw_key }, Payload::PaChoice { seed }) => {
                let key = amplify(&raw_key, &seed, FINAL_KEY_BITS)?;
                self.state = ResponderState::Confirmed;
                Ok(Step::Established { key, reply: vec![] })
            }

            (state, _) => {
                self.state = state;
                Ok(Step::Ignored)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Drive both machines through a clean exchange, returning both keys.
    fn run_clean(
        variant: ProtocolVariant,
        num_symbols: usize,
        seed: u64,
    ) -> (Initiator, Responder, FinalKey, FinalKey) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut alice = Initiator::new(variant, num_symbols, 0.5).unwrap();

        let Payload::Initiate { protocol, symbols } = alice.start(&mut rng).unwrap() else {
            panic!("expected initiate payload");
        };
        let (mut bob, bob_bases) = Responder::accept(&symbols, protocol, &mut rng).unwrap();

        let Step::Send(msgs) = alice.on_payload(bob_bases, &mut rng).unwrap() else {
            panic!("expected bases + sample");
        };
        assert_eq!(msgs.len(), 2);

        let mut msgs = msgs.into_iter();
        assert!(matches!(bob.on_payload(msgs.next().unwrap()).unwrap(), Step::Continue));

        let Step::Send(verdicts) = bob.on_payload(msgs.next().unwrap()).unwrap() else {
            panic!("expected success verdict");
        };
        assert_eq!(verdicts.len(), 1);

        let Step::Established { key: alice_key, reply } =
            alice.on_payload(verdicts.into_iter().next().unwrap(), &mut rng).unwrap()
        else {
            panic!("initiator should establish");
        };
        assert_eq!(reply.len(), 1);

        let Step::Established { key: bob_key, reply: closing } =
            bob.on_payload(reply.into_iter().next().unwrap()).unwrap()
        else {
            panic!("responder should establish");
        };
        assert!(closing.is_empty());

        (alice, bob, alice_key, bob_key)
    }

    #[test]
    fn test_clean_exchange_two_state() {
        // The concrete reference scenario: 8 target bits, 80 symbols.
        let (alice, bob, alice_key, bob_key) = run_clean(ProtocolVariant::TwoState, 80, 7);
        assert_eq!(alice.stage(), InitiatorStage::Done);
        assert_eq!(bob.stage(), ResponderStage::Confirmed);
        assert_eq!(alice_key, bob_key);
        assert_eq!(alice_key.bit_len(), 256);
    }

    #[test]
    fn test_clean_exchange_multi_factor() {
        let (_, _, alice_key, bob_key) = run_clean(ProtocolVariant::MultiFactor, 640, 8);
        assert_eq!(alice_key, bob_key);
    }

    #[test]
    fn test_distinct_sessions_distinct_keys() {
        let (_, _, key_a, _) = run_clean(ProtocolVariant::TwoState, 160, 100);
        let (_, _, key_b, _) = run_clean(ProtocolVariant::TwoState, 160, 101);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_tampered_sample_is_rejected_on_both_sides() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut alice = Initiator::new(ProtocolVariant::TwoState, 80, 0.5).unwrap();

        let Payload::Initiate { protocol, symbols } = alice.start(&mut rng).unwrap() else {
            panic!();
        };
        let (mut bob, bob_bases) = Responder::accept(&symbols, protocol, &mut rng).unwrap();
        let Step::Send(msgs) = alice.on_payload(bob_bases, &mut rng).unwrap() else {
            panic!();
        };

        let mut msgs = msgs.into_iter();
        bob.on_payload(msgs.next().unwrap()).unwrap();

        // A 20% bit-flip fault on the disclosed sample, above the 15% threshold.
        let Payload::InitiatorSample { mut sample } = msgs.next().unwrap() else {
            panic!();
        };
        let flips = (sample.len() as f64 * 0.2).ceil() as usize;
        for entry in sample.iter_mut().take(flips) {
            entry.value ^= 1;
        }

        let (qber, threshold, reply) =
            match bob.on_payload(Payload::InitiatorSample { sample }).unwrap() {
                Step::Rejected { qber, threshold, reply } => (qber, threshold, reply),
                other => panic!("expected rejection, got {:?}", other),
            };
        assert!(qber > 0.15, "qber {} should exceed threshold", qber);
        assert_eq!(threshold, 0.15);
        assert_eq!(bob.stage(), ResponderStage::Rejected);

        // The failure verdict propagates the rejection to the initiator.
        match alice.on_payload(reply.into_iter().next().unwrap(), &mut rng).unwrap() {
            Step::Rejected { qber: reported, .. } => assert!(reported > 0.15),
            other => panic!("initiator should reject on failure verdict, got {:?}", other),
        }
        assert_eq!(alice.stage(), InitiatorStage::Failed);
    }

    #[test]
    fn test_intercept_resend_is_detected() {
        // Eve measures the stream in her own random bases and re-encodes what
        // she saw. Expected QBER at matched positions is 25%.
        let mut rng = StdRng::seed_from_u64(21);
        let mut alice = Initiator::new(ProtocolVariant::TwoState, 2000, 0.5).unwrap();

        let Payload::Initiate { protocol, symbols } = alice.start(&mut rng).unwrap() else {
            panic!();
        };

        let eve_choice =
            crate::statevec::generate_responder_bases(symbols.len(), protocol, &mut rng).unwrap();
        let eve_bits = measure(&symbols, &eve_choice, protocol, &mut rng).unwrap();
        let resent: Vec<u8> = eve_bits
            .iter()
            .zip(&eve_choice.bases)
            .map(|(&bit, &basis)| {
                crate::symbol::encode(
                    &crate::symbol::PolarizedState { bit, basis, orientation: None },
                    protocol,
                )
                .unwrap()
            })
            .collect();

        let (mut bob, bob_bases) = Responder::accept(&resent, protocol, &mut rng).unwrap();
        let Step::Send(msgs) = alice.on_payload(bob_bases, &mut rng).unwrap() else {
            panic!();
        };
        let mut msgs = msgs.into_iter();
        bob.on_payload(msgs.next().unwrap()).unwrap();

        match bob.on_payload(msgs.next().unwrap()).unwrap() {
            Step::Rejected { qber, .. } => {
                assert!(qber > 0.15, "qber {} too low for intercept-resend", qber)
            }
            other => panic!("interception must be detected, got {:?}", other),
        }
    }

    #[test]
    fn test_injected_noise_below_threshold_passes() {
        // Flip exactly 5% of the measured bits before sifting; the estimated
        // QBER should land near 5%, well under the 15% threshold.
        let mut rng = StdRng::seed_from_u64(22);
        let material =
            generate_initiator_material(4000, ProtocolVariant::TwoState, &mut rng).unwrap();
        let choice =
            generate_responder_bases(4000, ProtocolVariant::TwoState, &mut rng).unwrap();
        let mut measured =
            measure(&material.symbols, &choice, ProtocolVariant::TwoState, &mut rng).unwrap();
        for bit in measured.iter_mut().step_by(20) {
            *bit ^= 1;
        }

        let indices = sift_indices(
            material.private.bases(),
            &choice.bases,
            None,
            None,
            ProtocolVariant::TwoState,
        )
        .unwrap();
        let alice_sifted = project(material.private.bits(), &indices).unwrap();
        let bob_sifted = project(&measured, &indices).unwrap();

        let disclosed = sample(&alice_sifted, 0.5, &mut rng).unwrap();
        let check = check_errors(&bob_sifted, &disclosed).unwrap();
        assert!((check.qber - 0.05).abs() < 0.03, "qber {} far from 5%", check.qber);
        assert!(check.qber < 0.15);
    }

    #[test]
    fn test_noiseless_agreement_at_sifted_positions() {
        let mut rng = StdRng::seed_from_u64(23);
        let material =
            generate_initiator_material(1000, ProtocolVariant::TwoState, &mut rng).unwrap();
        let choice =
            generate_responder_bases(1000, ProtocolVariant::TwoState, &mut rng).unwrap();
        let measured =
            measure(&material.symbols, &choice, ProtocolVariant::TwoState, &mut rng).unwrap();

        let indices = sift_indices(
            material.private.bases(),
            &choice.bases,
            None,
            None,
            ProtocolVariant::TwoState,
        )
        .unwrap();
        let alice_sifted = project(material.private.bits(), &indices).unwrap();
        let bob_sifted = project(&measured, &indices).unwrap();
        assert_eq!(alice_sifted, bob_sifted, "clean channel must agree everywhere");
    }

    #[test]
    fn test_stray_payloads_are_ignored() {
        let mut rng = StdRng::seed_from_u64(24);
        let mut alice = Initiator::new(ProtocolVariant::TwoState, 80, 0.5).unwrap();
        alice.start(&mut rng).unwrap();

        // A verdict before any bases is stray traffic, not an error.
        let step = alice
            .on_payload(
                Payload::HandshakeComplete { status: VerdictStatus::Success, qber: 0.0 },
                &mut rng,
            )
            .unwrap();
        assert!(matches!(step, Step::Ignored));
        assert_eq!(alice.stage(), InitiatorStage::AwaitingBobBases);
    }

    #[test]
    fn test_malformed_bases_abort() {
        let mut rng = StdRng::seed_from_u64(25);
        let mut alice = Initiator::new(ProtocolVariant::TwoState, 80, 0.5).unwrap();
        alice.start(&mut rng).unwrap();

        let result = alice.on_payload(
            Payload::ResponderBases { bases: vec![0, 1, 0], orientations: None },
            &mut rng,
        );
        assert_eq!(result.err(), Some(ProtocolError::LengthMismatch));
        assert_eq!(alice.stage(), InitiatorStage::Failed);
    }

    #[test]
    fn test_double_start_rejected() {
        let mut rng = StdRng::seed_from_u64(26);
        let mut alice = Initiator::new(ProtocolVariant::TwoState, 80, 0.5).unwrap();
        alice.start(&mut rng).unwrap();
        assert_eq!(alice.start(&mut rng).err(), Some(ProtocolError::InvalidTransition));
    }

    #[test]
    fn test_empty_stream_rejected() {
        let mut rng = StdRng::seed_from_u64(27);
        assert_eq!(
            Responder::accept(&[], ProtocolVariant::TwoState, &mut rng).err(),
            Some(ProtocolError::InvalidSymbolCount)
        );
    }
}
