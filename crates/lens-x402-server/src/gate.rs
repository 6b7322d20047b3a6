//! The payment gate: challenge, verify, settle, release.
//!
//! A request walks `Unchallenged → Challenged` (no payment) or
//! `Unchallenged → Submitted → Verified → Settled → Granted`, leaving for
//! `Denied` when verification or settlement refuses the payment. Content is
//! released only from `Granted`. An unreachable facilitator never grants,
//! unless the demo bypass is switched on explicitly.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use x402::codec::{decode_payment, encode_receipt};
use x402::facilitator_client::{FacilitatorClient, FacilitatorError};
use x402::response::VerifyResponse;
use x402::{
    AuthorizationPayload, PaymentRequiredBody, PaymentRequirements, SettlementReceipt,
    VerifyOutcome, X402_VERSION,
};
use x402_facilitator::state::AppState;

use crate::error::GateError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unchallenged,
    Challenged,
    Submitted,
    Verified,
    Settled,
    Granted,
    Denied,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Unchallenged => "unchallenged",
            GateState::Challenged => "challenged",
            GateState::Submitted => "submitted",
            GateState::Verified => "verified",
            GateState::Settled => "settled",
            GateState::Granted => "granted",
            GateState::Denied => "denied",
        }
    }

    /// Legal successor states. Anything else is a bug in the gate.
    fn can_advance_to(self, next: GateState) -> bool {
        matches!(
            (self, next),
            (GateState::Unchallenged, GateState::Challenged)
                | (GateState::Unchallenged, GateState::Submitted)
                | (GateState::Submitted, GateState::Verified)
                | (GateState::Submitted, GateState::Denied)
                | (GateState::Verified, GateState::Settled)
                | (GateState::Verified, GateState::Denied)
                | (GateState::Settled, GateState::Granted)
        )
    }
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement answer from either backend.
#[derive(Debug)]
pub enum Settlement {
    Settled {
        receipt: SettlementReceipt,
        /// The facilitator's own `X-PAYMENT-RESPONSE`, passed on verbatim.
        header: Option<String>,
    },
    Refused(Vec<String>),
}

pub enum FacilitatorBackend {
    Remote(FacilitatorClient),
    Embedded(Arc<AppState>),
}

impl FacilitatorBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            FacilitatorBackend::Remote(_) => "remote",
            FacilitatorBackend::Embedded(_) => "embedded",
        }
    }

    pub async fn verify(
        &self,
        encoded: &str,
        requirement: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError> {
        match self {
            FacilitatorBackend::Remote(client) => client.verify(encoded, Some(requirement)).await,
            FacilitatorBackend::Embedded(state) => {
                Ok(match state.facilitator.verify_encoded(encoded, Some(requirement)) {
                    VerifyOutcome::Accepted { payer } => VerifyResponse {
                        success: true,
                        errors: None,
                        payer: Some(payer),
                    },
                    VerifyOutcome::Rejected { reasons } => VerifyResponse {
                        success: false,
                        errors: Some(reasons.iter().map(ToString::to_string).collect()),
                        payer: None,
                    },
                })
            }
        }
    }

    pub async fn settle(
        &self,
        payload: &AuthorizationPayload,
        encoded: &str,
        network: &str,
    ) -> Result<Settlement, FacilitatorError> {
        match self {
            FacilitatorBackend::Remote(client) => {
                let reply = client.settle(encoded).await?;
                if !reply.body.success {
                    return Ok(Settlement::Refused(reply.body.errors.unwrap_or_default()));
                }
                let receipt = reply
                    .payment_response
                    .as_deref()
                    .and_then(|h| x402::codec::decode_receipt(h).ok())
                    .unwrap_or_else(|| SettlementReceipt {
                        success: true,
                        transaction: reply.body.transaction.clone(),
                        network: network.to_string(),
                        payer: Some(payload.from),
                    });
                Ok(Settlement::Settled {
                    receipt,
                    header: reply.payment_response,
                })
            }
            FacilitatorBackend::Embedded(state) => match state.facilitator.settle(payload).await {
                Ok(receipt) => Ok(Settlement::Settled {
                    receipt,
                    header: None,
                }),
                Err(e) => Ok(Settlement::Refused(e.error_codes())),
            },
        }
    }
}

/// What the caller may release.
#[derive(Debug)]
pub enum Grant {
    Paid {
        payer: Address,
        /// Value for `X-PAYMENT-RESPONSE`.
        receipt_header: String,
    },
    /// Facilitator down and the demo bypass is on. No receipt exists.
    Bypassed,
}

pub struct Gate {
    backend: Arc<FacilitatorBackend>,
    network: String,
    demo_bypass_unreachable: bool,
}

/// One request's walk through the state machine.
struct Run {
    state: GateState,
    resource: String,
}

impl Run {
    fn advance(&mut self, next: GateState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal gate transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(resource = %self.resource, from = %self.state, to = %next, "gate transition");
        self.state = next;
    }

    fn finish(mut self, next: GateState, err: Option<&GateError>) {
        self.advance(next);
        metrics::GATE_OUTCOMES
            .with_label_values(&[self.state.as_str()])
            .inc();
        if let Some(err) = err {
            metrics::GATE_DENIALS.with_label_values(&[err.label()]).inc();
        }
        tracing::info!(
            resource = %self.resource,
            state = %self.state,
            error = err.map(GateError::label).unwrap_or("none"),
            "gate request finished"
        );
    }
}

fn upstream(err: FacilitatorError) -> GateError {
    match err {
        FacilitatorError::Unreachable(cause) => GateError::FacilitatorUnreachable(cause),
        FacilitatorError::Timeout(cause) => GateError::FacilitatorTimeout(cause),
        FacilitatorError::Unauthorized => {
            GateError::Facilitator("facilitator rejected HMAC credentials".into())
        }
        FacilitatorError::Protocol(cause) => GateError::Facilitator(cause),
    }
}

fn observe(call: &str, started: Instant, ok: bool) {
    metrics::FACILITATOR_CALLS
        .with_label_values(&[call, if ok { "ok" } else { "error" }])
        .observe(started.elapsed().as_secs_f64());
}

impl Gate {
    pub fn new(backend: FacilitatorBackend, network: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(backend),
            network: network.into(),
            demo_bypass_unreachable: false,
        }
    }

    /// Serve content when the facilitator is unreachable. Demo use only.
    pub fn with_demo_bypass(mut self, enabled: bool) -> Self {
        self.demo_bypass_unreachable = enabled;
        self
    }

    pub fn backend(&self) -> &FacilitatorBackend {
        &self.backend
    }

    /// Run the gate for one request.
    ///
    /// `Ok` means the content may be released; every `Err` maps to the HTTP
    /// response the client receives.
    pub async fn admit(
        &self,
        requirement: &PaymentRequirements,
        payment_header: Option<&str>,
    ) -> Result<Grant, GateError> {
        let mut run = Run {
            state: GateState::Unchallenged,
            resource: requirement.resource.clone(),
        };

        let Some(header) = payment_header else {
            let err = GateError::PaymentRequired(Box::new(PaymentRequiredBody {
                x402_version: X402_VERSION,
                accepts: vec![requirement.clone()],
                error: None,
            }));
            run.finish(GateState::Challenged, None);
            return Err(err);
        };
        run.advance(GateState::Submitted);

        let payload = match decode_payment(header) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable X-PAYMENT header");
                return Err(self.deny(run, GateError::InvalidPaymentHeader));
            }
        };
        tracing::info!(
            payer = %payload.from,
            nonce = %payload.short_nonce(),
            resource = %requirement.resource,
            "payment attempt"
        );

        let started = Instant::now();
        let verified = self.backend.verify(header, requirement).await;
        observe("verify", started, verified.is_ok());
        match verified {
            Ok(resp) if resp.success => run.advance(GateState::Verified),
            Ok(resp) => {
                let details = resp.errors.unwrap_or_default();
                tracing::warn!(payer = %payload.from, reasons = ?details, "payment verification failed");
                return Err(self.deny(run, GateError::VerificationFailed(details)));
            }
            Err(e) => return self.unavailable(run, "verify", e),
        }

        // Settlement runs on its own task: a client disconnect must not
        // abandon a transfer whose nonce is already consumed.
        let backend = Arc::clone(&self.backend);
        let network = self.network.clone();
        let encoded = header.to_string();
        let settle_payload = payload.clone();
        let started = Instant::now();
        let settled = tokio::spawn(async move {
            backend.settle(&settle_payload, &encoded, &network).await
        })
        .await
        .map_err(|e| GateError::Internal(format!("settlement task failed: {e}")));
        let settled = match settled {
            Ok(result) => result,
            Err(err) => return Err(self.deny(run, err)),
        };
        observe("settle", started, settled.is_ok());

        match settled {
            Ok(Settlement::Settled { receipt, header }) => {
                let receipt_header = match header.map_or_else(|| encode_receipt(&receipt), Ok) {
                    Ok(h) => h,
                    Err(e) => {
                        let err = GateError::Internal(format!("receipt encoding: {e}"));
                        return Err(self.deny(run, err));
                    }
                };
                run.advance(GateState::Settled);
                tracing::info!(
                    payer = %payload.from,
                    tx = receipt.transaction.as_deref().unwrap_or("simulated"),
                    "payment settled, releasing content"
                );
                run.finish(GateState::Granted, None);
                Ok(Grant::Paid {
                    payer: payload.from,
                    receipt_header,
                })
            }
            Ok(Settlement::Refused(details)) => {
                tracing::warn!(payer = %payload.from, reasons = ?details, "payment settlement failed");
                Err(self.deny(run, GateError::SettlementFailed(details)))
            }
            Err(e) => self.unavailable(run, "settle", e),
        }
    }

    fn deny(&self, run: Run, err: GateError) -> GateError {
        run.finish(GateState::Denied, Some(&err));
        err
    }

    fn unavailable(
        &self,
        mut run: Run,
        stage: &'static str,
        err: FacilitatorError,
    ) -> Result<Grant, GateError> {
        let err = upstream(err);
        if self.demo_bypass_unreachable && matches!(err, GateError::FacilitatorUnreachable(_)) {
            tracing::warn!(
                stage,
                resource = %run.resource,
                error = %err,
                "DEMO BYPASS: facilitator unreachable, serving content without payment"
            );
            metrics::DEMO_BYPASSES.with_label_values(&[stage]).inc();
            if run.state == GateState::Submitted {
                run.advance(GateState::Verified);
            }
            run.advance(GateState::Settled);
            run.finish(GateState::Granted, None);
            return Ok(Grant::Bypassed);
        }
        Err(self.deny(run, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use GateState::*;
        assert!(Unchallenged.can_advance_to(Challenged));
        assert!(Submitted.can_advance_to(Denied));
        assert!(Verified.can_advance_to(Denied));
        assert!(Settled.can_advance_to(Granted));
        assert!(!Unchallenged.can_advance_to(Granted));
        assert!(!Submitted.can_advance_to(Settled));
        assert!(!Denied.can_advance_to(Granted));
        assert!(!Challenged.can_advance_to(Submitted));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(GateState::Granted.to_string(), "granted");
        assert_eq!(GateState::Denied.as_str(), "denied");
    }

    #[test]
    fn test_timeout_is_not_unreachable() {
        let err = upstream(FacilitatorError::Timeout("settle".into()));
        assert!(matches!(err, GateError::FacilitatorTimeout(_)));
    }

    #[tokio::test]
    async fn test_dropped_request_still_settles_once() {
        use alloy::primitives::U256;
        use alloy::signers::local::PrivateKeySigner;
        use std::time::Duration;
        use x402::codec::encode_payment;
        use x402::{Facilitator, RequirementBuilder, SimulatedLedger, DEFAULT_ASSET};
        use x402_client::ExactSchemeClient;
        use x402_facilitator::state::LedgerBackend;

        let state = Arc::new(AppState {
            facilitator: Facilitator::new(LedgerBackend::Simulated(
                SimulatedLedger::new().with_latency(Duration::from_millis(300)),
            )),
            hmac_secret: None,
            metrics_token: None,
            public_metrics: false,
        });
        let gate = Gate::new(FacilitatorBackend::Embedded(Arc::clone(&state)), "polygon-amoy");
        let requirement = RequirementBuilder::new()
            .build(
                "http://localhost/api/content/abc123",
                Address::repeat_byte(0x42),
                DEFAULT_ASSET,
                U256::from(100_000u64),
            )
            .unwrap();
        let payload = ExactSchemeClient::new(PrivateKeySigner::random())
            .authorize(&requirement)
            .unwrap();
        let header = encode_payment(&payload).unwrap();

        // The caller gives up while the transfer is in flight.
        let cut = tokio::time::timeout(
            Duration::from_millis(50),
            gate.admit(&requirement, Some(&header)),
        )
        .await;
        assert!(cut.is_err());
        assert!(state.facilitator.is_nonce_consumed(&payload.nonce));

        tokio::time::sleep(Duration::from_millis(600)).await;
        let LedgerBackend::Simulated(ledger) = state.facilitator.ledger() else {
            panic!("simulated backend expected");
        };
        assert_eq!(ledger.transfers(), 1);

        // Resubmitting the same header is a replay, not a second transfer.
        let err = gate.admit(&requirement, Some(&header)).await.unwrap_err();
        match err {
            GateError::VerificationFailed(details) => {
                assert!(details.contains(&"nonce_replay".to_string()), "{details:?}")
            }
            other => panic!("expected replay denial, got {other:?}"),
        }
        assert_eq!(ledger.transfers(), 1);
    }
}
