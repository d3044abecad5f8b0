use ring::digest;
use std::io::Cursor;

use crate::config::RelyingPartyConfig;
use crate::errors::PasskeyError;

/// Flags for AuthenticatorData as defined in WebAuthn Level 2
pub(crate) mod auth_data_flags {
    /// User Present (UP) - Bit 0
    pub(crate) const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub(crate) const UV: u8 = 1 << 2;
    /// Backup Eligibility (BE) - Bit 3
    pub(crate) const BE: u8 = 1 << 3;
    /// Backup State (BS) - Bit 4
    pub(crate) const BS: u8 = 1 << 4;
    /// Attested Credential Data Present - Bit 6
    pub(crate) const AT: u8 = 1 << 6;
    /// Extension Data Present - Bit 7
    pub(crate) const ED: u8 = 1 << 7;
}

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

#[derive(Debug)]
pub(crate) struct AttestedCredentialData {
    pub(crate) aaguid: [u8; AAGUID_LEN],
    pub(crate) credential_id: Vec<u8>,
    /// COSE_Key bytes exactly as they appear in the authenticator data
    pub(crate) cose_key: Vec<u8>,
}

impl AttestedCredentialData {
    pub(crate) fn aaguid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.aaguid).hyphenated().to_string()
    }
}

/// Parsed authenticator data.
///
/// Layout (minimum 37 bytes):
/// - RP ID hash (32 bytes)
/// - flags (1 byte)
/// - signature counter (4 bytes, big-endian)
/// - attested credential data, when `AT` is set
/// - CBOR extensions, when `ED` is set
#[derive(Debug)]
pub(crate) struct AuthenticatorData {
    pub(crate) rp_id_hash: Vec<u8>,
    pub(crate) flags: u8,
    pub(crate) counter: u32,
    pub(crate) attested: Option<AttestedCredentialData>,
    pub(crate) raw: Vec<u8>,
}

impl AuthenticatorData {
    pub(crate) fn parse(data: &[u8]) -> Result<Self, PasskeyError> {
        if data.len() < HEADER_LEN {
            return Err(PasskeyError::AuthenticatorData(format!(
                "Authenticator data too short: {} bytes",
                data.len()
            )));
        }

        let flags = data[RP_ID_HASH_LEN];
        let counter = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let mut pos = HEADER_LEN;
        let attested = if flags & auth_data_flags::AT != 0 {
            let (attested, consumed) = parse_attested_credential_data(&data[pos..])?;
            pos += consumed;
            Some(attested)
        } else {
            None
        };

        if flags & auth_data_flags::ED == 0 && pos != data.len() {
            return Err(PasskeyError::AuthenticatorData(format!(
                "{} unexpected trailing bytes",
                data.len() - pos
            )));
        }

        Ok(Self {
            rp_id_hash: data[..RP_ID_HASH_LEN].to_vec(),
            flags,
            counter,
            attested,
            raw: data.to_vec(),
        })
    }

    pub(crate) fn is_user_present(&self) -> bool {
        (self.flags & auth_data_flags::UP) != 0
    }

    pub(crate) fn is_user_verified(&self) -> bool {
        (self.flags & auth_data_flags::UV) != 0
    }

    pub(crate) fn is_backup_eligible(&self) -> bool {
        (self.flags & auth_data_flags::BE) != 0
    }

    pub(crate) fn is_backed_up(&self) -> bool {
        (self.flags & auth_data_flags::BS) != 0
    }

    /// Checks RP binding and the user presence and verification flags.
    pub(crate) fn verify(&self, config: &RelyingPartyConfig) -> Result<(), PasskeyError> {
        let expected_hash = digest::digest(&digest::SHA256, config.rp_id().as_bytes());
        if self.rp_id_hash != expected_hash.as_ref() {
            tracing::warn!("RP ID hash mismatch for rp_id {}", config.rp_id());
            return Err(PasskeyError::RpIdMismatch);
        }

        if !self.is_user_present() {
            return Err(PasskeyError::AuthenticatorData(
                "User not present".to_string(),
            ));
        }

        if config.requires_user_verification() && !self.is_user_verified() {
            return Err(PasskeyError::AuthenticatorData(format!(
                "User verification required but flag not set. Flags: {:02x}",
                self.flags
            )));
        }

        tracing::debug!(
            "Authenticator data: UP={}, UV={}, BE={}, BS={}, counter={}",
            self.is_user_present(),
            self.is_user_verified(),
            self.is_backup_eligible(),
            self.is_backed_up(),
            self.counter
        );

        Ok(())
    }
}

/// Parses attested credential data, returning it with the number of bytes consumed.
fn parse_attested_credential_data(
    data: &[u8],
) -> Result<(AttestedCredentialData, usize), PasskeyError> {
    if data.len() < AAGUID_LEN + 2 {
        return Err(PasskeyError::AuthenticatorData(
            "Attested credential data too short".to_string(),
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&data[..AAGUID_LEN]);

    let id_len = u16::from_be_bytes([data[AAGUID_LEN], data[AAGUID_LEN + 1]]) as usize;
    let id_start = AAGUID_LEN + 2;
    let key_start = id_start + id_len;
    if data.len() <= key_start {
        return Err(PasskeyError::AuthenticatorData(format!(
            "Credential id length {id_len} exceeds authenticator data"
        )));
    }
    let credential_id = data[id_start..key_start].to_vec();

    // The COSE key is not length-prefixed; decode it to find where it ends
    let mut cursor = Cursor::new(&data[key_start..]);
    let _: ciborium::value::Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| PasskeyError::AuthenticatorData(format!("Invalid COSE key: {e}")))?;
    let key_len = cursor.position() as usize;
    let cose_key = data[key_start..key_start + key_len].to_vec();

    Ok((
        AttestedCredentialData {
            aaguid,
            credential_id,
            cose_key,
        },
        key_start + key_len,
    ))
}
