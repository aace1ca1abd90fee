//! Redemption codes and claim identifier parsing.
//!
//! A code is three dash-separated groups of four uppercase alphanumerics,
//! e.g. `K7QM-3XPA-H2ZD`. Generated codes draw from a 32-symbol alphabet
//! without the look-alikes `0`, `O`, `1` and `I`, giving 2^60 possible
//! codes; a collision is possible but rare enough that the admission
//! service simply regenerates on one.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ClaimId;
use crate::error::GatewayError;

const GROUPS: usize = 3;
const GROUP_LEN: usize = 4;
const CODE_LEN: usize = GROUPS * GROUP_LEN + GROUPS - 1;
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A human-presentable code identifying one claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionCode(String);

impl RedemptionCode {
    /// Parses a code typed or scanned by a person.
    ///
    /// Surrounding whitespace is ignored and lowercase letters are
    /// accepted. Returns `None` unless the result has the `XXXX-XXXX-XXXX`
    /// shape.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.len() != CODE_LEN {
            return None;
        }
        let groups: Vec<&str> = normalized.split('-').collect();
        let well_formed = groups.len() == GROUPS
            && groups.iter().all(|group| {
                group.len() == GROUP_LEN
                    && group
                        .bytes()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            });
        well_formed.then_some(Self(normalized))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the code, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Builds the verification URL a business scans for this code.
    #[must_use]
    pub fn verification_url(&self, base_url: &str) -> String {
        format!("{}/verify/claim/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for RedemptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh redemption codes.
pub trait CodeGenerator: Send + Sync + std::fmt::Debug {
    /// Produces a new code. Uniqueness is checked by the ledger, not here.
    fn generate(&self) -> RedemptionCode;
}

/// Draws codes uniformly from the unambiguous alphabet using the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> RedemptionCode {
        let mut rng = rand::thread_rng();
        let mut code = String::with_capacity(CODE_LEN);
        for group in 0..GROUPS {
            if group > 0 {
                code.push('-');
            }
            for _ in 0..GROUP_LEN {
                let idx = rng.gen_range(0..ALPHABET.len());
                code.push(char::from(ALPHABET.get(idx).copied().unwrap_or(b'X')));
            }
        }
        RedemptionCode(code)
    }
}

/// What a business handed us to look up a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimIdentifier {
    /// Internal claim UUID.
    Id(ClaimId),
    /// Redemption code shown to the customer.
    Code(RedemptionCode),
}

impl ClaimIdentifier {
    /// Resolves free-form input into a claim identifier.
    ///
    /// Accepts a claim UUID, a bare redemption code, or scanned QR
    /// content: a verification URL ending in `/verify/claim/{code}` or
    /// `/verify/{code}`, or any URL with a `claim_id={code}` query pair.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the input is blank or
    /// contains neither a UUID nor a well-formed code.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "claim identifier is required".to_string(),
            ));
        }

        let candidate = extract_from_url(raw).unwrap_or(raw);

        if let Ok(uuid) = candidate.parse::<uuid::Uuid>() {
            return Ok(Self::Id(ClaimId::from_uuid(uuid)));
        }
        RedemptionCode::parse(candidate)
            .map(Self::Code)
            .ok_or_else(|| {
                GatewayError::InvalidRequest(format!("unrecognized claim identifier: {raw}"))
            })
    }
}

/// Pulls the code segment out of a verification URL, if `raw` is one.
fn extract_from_url(raw: &str) -> Option<&str> {
    if let Some((_, rest)) = raw.split_once("claim_id=") {
        return rest.split('&').next();
    }
    let (_, rest) = raw
        .split_once("/verify/claim/")
        .or_else(|| raw.split_once("/verify/"))?;
    rest.split(['?', '#', '/']).next()
}
