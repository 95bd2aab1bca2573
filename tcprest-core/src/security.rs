//! The security envelope: optional trailing CHK checksum and the class
//! whitelist (`spec.md` §4.3.6). Configs are immutable snapshots shared by
//! `Arc` between threads, matching §3's "Security config (immutable
//! snapshot per server/client)".

use crate::error::SecurityError;
use crate::signature::is_valid_class_identifier;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    Crc32,
    HmacSha256,
}

/// CHK hex length per §4.3.6: CRC32 is 8 hex chars, HMAC-SHA256 is 64.
impl ChecksumKind {
    fn hex_len(self) -> Option<usize> {
        match self {
            ChecksumKind::None => None,
            ChecksumKind::Crc32 => Some(8),
            ChecksumKind::HmacSha256 => Some(64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub checksum_kind: ChecksumKind,
    pub hmac_secret: Option<Vec<u8>>,
    pub whitelist_enabled: bool,
    pub allowed_classes: HashSet<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            checksum_kind: ChecksumKind::None,
            hmac_secret: None,
            whitelist_enabled: false,
            allowed_classes: HashSet::new(),
        }
    }
}

impl SecurityConfig {
    pub fn with_crc32() -> Self {
        SecurityConfig {
            checksum_kind: ChecksumKind::Crc32,
            ..Default::default()
        }
    }

    pub fn with_hmac(secret: impl Into<Vec<u8>>) -> Self {
        SecurityConfig {
            checksum_kind: ChecksumKind::HmacSha256,
            hmac_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    pub fn with_whitelist(mut self, classes: impl IntoIterator<Item = String>) -> Self {
        self.whitelist_enabled = true;
        self.allowed_classes = classes.into_iter().collect();
        self
    }

    /// Entry `pkg.Name` matches exactly; an entry ending in `.*` matches any
    /// class whose full name starts with `pkg.` (`spec.md` §4.3.6).
    pub fn is_whitelisted(&self, class_name: &str) -> bool {
        if !self.whitelist_enabled {
            return true;
        }
        self.allowed_classes.iter().any(|entry| {
            if let Some(prefix) = entry.strip_suffix(".*") {
                class_name.starts_with(prefix) && class_name[prefix.len()..].starts_with('.')
            } else {
                entry == class_name
            }
        })
    }

    pub fn enforce_whitelist(&self, class_name: &str) -> Result<(), SecurityError> {
        if self.is_whitelisted(class_name) {
            Ok(())
        } else {
            Err(SecurityError::NotWhitelisted(class_name.to_string()))
        }
    }

    pub fn validate_identifiers(
        &self,
        class_name: &str,
        method_name: &str,
    ) -> Result<(), SecurityError> {
        if !is_valid_class_identifier(class_name) {
            return Err(SecurityError::InvalidClassIdentifier(
                class_name.to_string(),
            ));
        }
        if !crate::signature::is_valid_method_identifier(method_name) {
            return Err(SecurityError::InvalidMethodIdentifier(
                method_name.to_string(),
            ));
        }
        Ok(())
    }

    /// Computes the `CHK:<hex>` segment (without the leading `|`) over
    /// `message`, the line content preceding `|CHK` on both ends (§4.3.6).
    pub fn compute_checksum(&self, message: &str) -> Option<String> {
        match self.checksum_kind {
            ChecksumKind::None => None,
            ChecksumKind::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(message.as_bytes());
                Some(format!("{:08x}", hasher.finalize()))
            }
            ChecksumKind::HmacSha256 => {
                let secret = self.hmac_secret.as_deref().unwrap_or(&[]);
                let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
                mac.update(message.as_bytes());
                Some(hex::encode(mac.finalize().into_bytes()))
            }
        }
    }

    /// Verifies a `CHK:<hex>` segment received alongside `message`. Per
    /// §4.3.3 step 2: if the server requires a checksum and none was sent,
    /// that is a [`SecurityError::ChecksumMissing`]; a malformed hex length
    /// or a mismatched digest is [`SecurityError::ChecksumMismatch`] /
    /// [`SecurityError::MalformedChecksum`].
    pub fn verify_checksum(&self, message: &str, chk_hex: Option<&str>) -> Result<(), SecurityError> {
        match (self.checksum_kind, chk_hex) {
            (ChecksumKind::None, _) => Ok(()),
            (kind, None) => {
                let _ = kind;
                Err(SecurityError::ChecksumMissing)
            }
            (kind, Some(hex_val)) => {
                let expected_len = kind.hex_len().expect("checksum kind requires hex_len");
                if hex_val.len() != expected_len || !hex_val.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(SecurityError::MalformedChecksum(hex_val.to_string()));
                }
                let computed = self
                    .compute_checksum(message)
                    .expect("checksum kind is not None");
                if constant_time_eq(computed.as_bytes(), hex_val.as_bytes()) {
                    Ok(())
                } else {
                    Err(SecurityError::ChecksumMismatch)
                }
            }
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Plain equality would also be functionally correct here but a checksum
/// meant to detect tampering should not leak timing information either.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
