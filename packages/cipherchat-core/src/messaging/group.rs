//! Group fan-out: one independent ciphertext per member.
//!
//! Each member's copy is encrypted under that member's pairwise key with
//! its own random IV. No IV is shared between members.

use std::collections::BTreeMap;

use super::codec::{self, EncryptedPayload};
use crate::crypto::SymmetricKey;
use crate::error::{Error, Result};

/// Per-member result of a group encryption
#[derive(Debug, Default)]
pub struct GroupCiphertexts {
    /// Ciphertext for each member that was encrypted
    pub payloads: BTreeMap<String, EncryptedPayload>,
    /// Members that were skipped, with the reason
    pub failures: BTreeMap<String, Error>,
}

/// Encrypt `plaintext` once for every member
///
/// Members whose key equals another member's key are skipped: two members
/// should never share a pairwise key, and a collision points at a
/// duplicated public key in the directory.
pub fn encrypt_for_group(
    member_keys: &BTreeMap<String, SymmetricKey>,
    plaintext: &[u8],
) -> Result<GroupCiphertexts> {
    let mut result = GroupCiphertexts::default();

    for (member, key) in member_keys {
        let collides = member_keys
            .iter()
            .any(|(other, other_key)| other != member && key.ct_eq(other_key));

        if collides {
            tracing::warn!(
                member = %member,
                "Group member shares a session key with another member"
            );
            result.failures.insert(
                member.clone(),
                Error::PlatformCryptoError("session key shared with another group member".into()),
            );
            continue;
        }

        result.payloads.insert(member.clone(), codec::encrypt(key, plaintext)?);
    }

    Ok(result)
}
