//! # Permits
//!
//! A permit is a signed, time-boxed, single-use grant to move value into a
//! pool on a participant's behalf. The [`PermitAuthorizer`] owns the set of
//! consumed `(participant, nonce)` pairs; the signature scheme itself sits
//! behind the [`PermitVerifier`] capability.
//!
//! ## Consumption order
//!
//! 1. `now > expires_at` → [`AuthorizationError::Expired`]
//! 2. nonce already consumed → [`AuthorizationError::ReplayedNonce`]
//! 3. verifier rejects → [`AuthorizationError::InvalidSignature`]
//! 4. nonce recorded, then `Ok`
//!
//! A recorded nonce is never released, whatever happens to the deposit that
//! presented it.
//!
//! ## Signed payload
//!
//! ```text
//! sha256( "pledgy-permit-v1"
//!       || u32_le(len(participant)) || participant
//!       || u64_le(amount) || u64_le(nonce) || u64_le(expires_at) )
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{AuthorizationError, LedgerError};
use crate::types::{Amount, ParticipantId, Timestamp};

/// Domain separator for the permit digest.
pub const PERMIT_DOMAIN: &[u8] = b"pledgy-permit-v1";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PermitAuthorization {
    pub participant: ParticipantId,
    pub amount: Amount,
    /// Unique per participant.
    pub nonce: u64,
    pub expires_at: Timestamp,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

impl PermitAuthorization {
    /// Issue a permit signed with `key`.
    pub fn sign(
        key: &SigningKey,
        participant: ParticipantId,
        amount: Amount,
        nonce: u64,
        expires_at: Timestamp,
    ) -> Self {
        let digest = permit_digest(&participant, amount, nonce, expires_at);
        let signature = key.sign(&digest).to_bytes().to_vec();
        Self {
            participant,
            amount,
            nonce,
            expires_at,
            signature,
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        permit_digest(&self.participant, self.amount, self.nonce, self.expires_at)
    }
}

pub fn permit_digest(
    participant: &ParticipantId,
    amount: Amount,
    nonce: u64,
    expires_at: Timestamp,
) -> [u8; 32] {
    let participant = participant.as_str().as_bytes();
    let mut hasher = Sha256::new();
    hasher.update(PERMIT_DOMAIN);
    hasher.update((participant.len() as u32).to_le_bytes());
    hasher.update(participant);
    hasher.update(amount.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(expires_at.to_le_bytes());
    hasher.finalize().into()
}

/// Signature capability consulted before a permit is accepted.
pub trait PermitVerifier: Send + Sync {
    /// Whether the signature authenticates
    /// `(participant, amount, nonce, expires_at)`.
    fn verify(&self, permit: &PermitAuthorization) -> bool;
}

/// Verifies permits signed by a single Ed25519 issuer key.
#[derive(Debug, Clone)]
pub struct Ed25519PermitVerifier {
    issuer: VerifyingKey,
}

impl Ed25519PermitVerifier {
    pub fn new(issuer: VerifyingKey) -> Self {
        Self { issuer }
    }

    /// Parse a hex-encoded 32-byte public key.
    pub fn from_hex(encoded: &str) -> Result<Self, LedgerError> {
        let bytes: [u8; 32] = hex::decode(encoded.trim())
            .map_err(|e| LedgerError::InvalidInput(format!("issuer key is not hex: {e}")))?
            .try_into()
            .map_err(|_| LedgerError::InvalidInput("issuer key must be 32 bytes".into()))?;
        let issuer = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| LedgerError::InvalidInput(format!("invalid issuer key: {e}")))?;
        Ok(Self { issuer })
    }
}

impl PermitVerifier for Ed25519PermitVerifier {
    fn verify(&self, permit: &PermitAuthorization) -> bool {
        let Ok(signature) = Signature::from_slice(&permit.signature) else {
            return false;
        };
        self.issuer.verify(&permit.digest(), &signature).is_ok()
    }
}

/// A permit whose expiry and signature were checked outside the ledger lock.
///
/// Carries the verifier that accepted it; [`PermitAuthorizer::consume_verified`]
/// refuses permits checked by any verifier other than its own. The nonce is
/// still unconsumed.
#[derive(Clone)]
pub(crate) struct VerifiedPermit {
    permit: PermitAuthorization,
    verified_by: Arc<dyn PermitVerifier>,
}

impl VerifiedPermit {
    pub(crate) fn authorization(&self) -> &PermitAuthorization {
        &self.permit
    }
}

impl fmt::Debug for VerifiedPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedPermit")
            .field("permit", &self.permit)
            .finish_non_exhaustive()
    }
}

/// Expiry and signature checks. Touches no ledger state.
pub(crate) fn verify_permit(
    verifier: &Arc<dyn PermitVerifier>,
    permit: PermitAuthorization,
    now: Timestamp,
) -> Result<VerifiedPermit, AuthorizationError> {
    check_expiry(&permit, now)?;
    if !verifier.verify(&permit) {
        warn!(participant = %permit.participant, nonce = permit.nonce, "permit signature rejected");
        return Err(AuthorizationError::InvalidSignature);
    }
    Ok(VerifiedPermit {
        permit,
        verified_by: Arc::clone(verifier),
    })
}

fn same_verifier(a: &Arc<dyn PermitVerifier>, b: &Arc<dyn PermitVerifier>) -> bool {
    // Data pointers only; vtable addresses are not unique.
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn check_expiry(permit: &PermitAuthorization, now: Timestamp) -> Result<(), AuthorizationError> {
    if now > permit.expires_at {
        warn!(participant = %permit.participant, nonce = permit.nonce, "permit expired");
        return Err(AuthorizationError::Expired);
    }
    Ok(())
}

/// Permit as presented to the deposit path.
#[derive(Clone, Debug)]
pub(crate) enum PermitProof {
    Unverified(PermitAuthorization),
    Verified(VerifiedPermit),
}

impl PermitProof {
    pub(crate) fn authorization(&self) -> &PermitAuthorization {
        match self {
            PermitProof::Unverified(permit) => permit,
            PermitProof::Verified(verified) => verified.authorization(),
        }
    }
}

pub struct PermitAuthorizer {
    verifier: Arc<dyn PermitVerifier>,
    consumed: HashSet<(ParticipantId, u64)>,
}

impl PermitAuthorizer {
    pub fn new(verifier: Arc<dyn PermitVerifier>) -> Self {
        Self {
            verifier,
            consumed: HashSet::new(),
        }
    }

    pub(crate) fn verifier(&self) -> Arc<dyn PermitVerifier> {
        Arc::clone(&self.verifier)
    }

    /// Validate and irrevocably consume a permit.
    pub fn consume(
        &mut self,
        permit: &PermitAuthorization,
        now: Timestamp,
    ) -> Result<(), AuthorizationError> {
        check_expiry(permit, now)?;
        self.check_replay(permit)?;
        if !self.verifier.verify(permit) {
            warn!(participant = %permit.participant, nonce = permit.nonce, "permit signature rejected");
            return Err(AuthorizationError::InvalidSignature);
        }
        self.record(permit);
        Ok(())
    }

    /// Consume a permit whose signature was already verified by this
    /// authorizer's verifier.
    pub(crate) fn consume_verified(
        &mut self,
        verified: &VerifiedPermit,
        now: Timestamp,
    ) -> Result<(), AuthorizationError> {
        let permit = verified.authorization();
        check_expiry(permit, now)?;
        self.check_replay(permit)?;
        if !same_verifier(&verified.verified_by, &self.verifier) {
            warn!(participant = %permit.participant, nonce = permit.nonce, "permit verified by a foreign verifier");
            return Err(AuthorizationError::InvalidSignature);
        }
        self.record(permit);
        Ok(())
    }

    pub(crate) fn consume_proof(
        &mut self,
        proof: &PermitProof,
        now: Timestamp,
    ) -> Result<(), AuthorizationError> {
        match proof {
            PermitProof::Unverified(permit) => self.consume(permit, now),
            PermitProof::Verified(verified) => self.consume_verified(verified, now),
        }
    }

    pub fn is_consumed(&self, participant: &ParticipantId, nonce: u64) -> bool {
        self.consumed.contains(&(participant.clone(), nonce))
    }

    /// Consumed nonces of one participant, ascending.
    pub fn consumed_nonces(&self, participant: &ParticipantId) -> BTreeSet<u64> {
        self.consumed
            .iter()
            .filter(|(owner, _)| owner == participant)
            .map(|(_, nonce)| *nonce)
            .collect()
    }

    fn check_replay(&self, permit: &PermitAuthorization) -> Result<(), AuthorizationError> {
        if self.is_consumed(&permit.participant, permit.nonce) {
            warn!(participant = %permit.participant, nonce = permit.nonce, "permit replay rejected");
            return Err(AuthorizationError::ReplayedNonce);
        }
        Ok(())
    }

    fn record(&mut self, permit: &PermitAuthorization) {
        self.consumed
            .insert((permit.participant.clone(), permit.nonce));
    }
}
