//! EIP-712 typed-data signing and signature recovery for EIP-3009 authorizations.
//!
//! Provides functions for:
//! - Building the asset's EIP-712 domain ([`authorization_domain`], [`requirement_domain`])
//! - Computing signing hashes ([`signing_hash`])
//! - Recovering signers with EIP-2 malleability protection ([`recover_signer`])
//! - Generating cryptographically secure random nonces ([`random_nonce`])
//! - Encoding and decoding hex signatures

use std::borrow::Cow;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::payment::PaymentRequirements;
use crate::TransferWithAuthorization;
use crate::{ChainConfig, X402Error};

/// Length of an r ‖ s ‖ v signature.
pub const SIGNATURE_LEN: usize = 65;

/// Domain the verifier checks against: name and version from the chain
/// config, verifying contract from the payload.
pub fn authorization_domain(config: &ChainConfig, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain {
        name: Some(Cow::Owned(config.eip712_domain_name.clone())),
        version: Some(Cow::Owned(config.eip712_domain_version.clone())),
        chain_id: Some(U256::from(config.chain_id)),
        verifying_contract: Some(verifying_contract),
        salt: None,
    }
}

/// Domain the client signs in: name and version as advertised by the
/// requirement's `extra`, verifying contract = the requirement's asset.
pub fn requirement_domain(requirement: &PaymentRequirements, chain_id: u64) -> Eip712Domain {
    Eip712Domain {
        name: Some(Cow::Owned(requirement.extra.name.clone())),
        version: Some(Cow::Owned(requirement.extra.version.clone())),
        chain_id: Some(U256::from(chain_id)),
        verifying_contract: Some(requirement.asset),
        salt: None,
    }
}

pub fn signing_hash(auth: &TransferWithAuthorization, domain: &Eip712Domain) -> B256 {
    auth.eip712_signing_hash(domain)
}

/// secp256k1 curve order N / 2: signatures with s > this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xDFE92F46681B20A0,
    0x5D576E7357A4501D,
    0xFFFFFFFFFFFFFFFF,
    0x7FFFFFFFFFFFFFFF,
]);

/// Why a signature could not be attributed to a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureFault {
    /// Bytes do not form a signature at all (wrong length).
    Malformed(String),
    /// 65 bytes that do not recover to a signer: bad recovery byte, high-s,
    /// or a point off the curve.
    Unrecoverable(String),
}

/// Recover the address that signed `auth` in `domain`.
/// Rejects high-s signatures (EIP-2) and any recovery byte other than 27 or 28,
/// the only values the asset contract's `ecrecover` accepts.
pub fn recover_signer(
    auth: &TransferWithAuthorization,
    signature_bytes: &[u8],
    domain: &Eip712Domain,
) -> Result<Address, SignatureFault> {
    if signature_bytes.len() != SIGNATURE_LEN {
        return Err(SignatureFault::Malformed(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature_bytes.len()
        )));
    }

    // from_raw also normalizes EIP-155 style v values, which the contract rejects.
    let v = signature_bytes[SIGNATURE_LEN - 1];
    if v != 27 && v != 28 {
        return Err(SignatureFault::Unrecoverable(format!(
            "recovery byte must be 27 or 28, got {v}"
        )));
    }
    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| SignatureFault::Unrecoverable(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(SignatureFault::Unrecoverable(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(auth, domain);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| SignatureFault::Unrecoverable(format!("recovery failed: {e}")))
}

/// Generate a random 32-byte nonce (keccak256 of 32 random bytes).
pub fn random_nonce() -> B256 {
    use alloy::primitives::keccak256;
    let mut bytes = [0u8; 32];
    rand::fill(&mut bytes);
    keccak256(bytes)
}

/// Encode a Signature as 0x-prefixed hex (v = 27 or 28 in the last byte).
pub fn encode_signature_hex(sig: &Signature) -> String {
    format!("0x{}", alloy::hex::encode(sig.as_bytes()))
}

/// Decode a 0x-prefixed (or bare) hex signature into raw bytes.
pub fn decode_signature_hex(s: &str) -> Result<Vec<u8>, X402Error> {
    let trimmed = s.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    alloy::hex::decode(hex).map_err(|e| X402Error::SignatureError(format!("not hex: {e}")))
}
