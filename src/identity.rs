//! Volume identity: the 64-bit legacy UUID stored in the finder info, and
//! the 128-bit UUID the kernel derives from it.

use log::debug;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::time::SystemTime;
use uuid::Uuid;

/// Name space for UUIDs derived from a legacy HFS UUID,
/// `B3E20F39-F292-11D6-97A4-00306543ECAC`.
pub const FS_UUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0xB3, 0xE2, 0x0F, 0x39, 0xF2, 0x92, 0x11, 0xD6, 0x97, 0xA4, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC,
]);

/// Number of hex digits in a textual legacy UUID.
pub const LEGACY_UUID_HEX_DIGITS: usize = 16;

/// The two finder info words identifying an HFS volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LegacyUuid {
    pub high: u32,
    pub low: u32,
}

impl LegacyUuid {
    pub const fn new(high: u32, low: u32) -> Self {
        Self { high, low }
    }

    /// A zero in either half means no UUID has been assigned.
    pub fn is_unset(&self) -> bool {
        self.high == 0 || self.low == 0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.high.to_be_bytes());
        bytes[4..].copy_from_slice(&self.low.to_be_bytes());
        bytes
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self {
            high: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            low: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Parses the 16 digit hex form. Only the first 16 bytes are looked at,
    /// and anything that is not a hex digit counts as `0`.
    pub fn from_hex_str(text: &str) -> Self {
        let value = text
            .bytes()
            .take(LEGACY_UUID_HEX_DIGITS)
            .map(|c| (c as char).to_digit(16).unwrap_or(0) as u64)
            .fold(0u64, |acc, digit| (acc << 4) | digit);
        Self {
            high: (value >> 32) as u32,
            low: value as u32,
        }
    }

    /// The 128-bit UUID the kernel reports for a volume carrying this
    /// legacy UUID, or the nil UUID when it is unset.
    pub fn to_full_uuid(&self) -> Uuid {
        derive_full_uuid(*self)
    }
}

impl fmt::Display for LegacyUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}", self.high, self.low)
    }
}

/// Name-based (MD5, version 3) UUID over the big-endian legacy UUID.
pub fn derive_full_uuid(legacy: LegacyUuid) -> Uuid {
    if legacy.is_unset() {
        return Uuid::nil();
    }
    Uuid::new_v3(&FS_UUID_NAMESPACE, &legacy.to_be_bytes())
}

/// Full UUID from the textual legacy form.
pub fn derive_full_uuid_from_hex(text: &str) -> Uuid {
    derive_full_uuid(LegacyUuid::from_hex_str(text))
}

/// Uppercase, hyphenated rendering used on the command line.
pub fn format_uuid(uuid: &Uuid) -> String {
    format!("{:X}", uuid.hyphenated())
}

/// Samples of system state mixed into a new legacy UUID. Unreadable
/// sources are skipped.
const ENTROPY_FILES: &[&str] = &[
    "/proc/uptime",
    "/proc/stat",
    "/etc/machine-id",
    "/proc/sys/kernel/hostname",
    "/proc/sys/kernel/osrelease",
    "/proc/sys/kernel/version",
    "/proc/loadavg",
    "/proc/vmstat",
];

fn sample_digest(round: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for path in ENTROPY_FILES {
        if let Ok(contents) = fs::read(path) {
            hasher.update(&contents);
        }
    }
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
        .unwrap_or_default();
    hasher.update(now.as_bytes());
    hasher.update(round.to_be_bytes());
    hasher.finalize().to_vec()
}

/// Takes the first digest whose leading 8 bytes give two nonzero halves.
fn first_usable(mut digest: impl FnMut(u64) -> Vec<u8>) -> LegacyUuid {
    let mut round = 0u64;
    loop {
        let bytes = digest(round);
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let candidate = LegacyUuid::from_be_bytes(head);
        if !candidate.is_unset() {
            return candidate;
        }
        debug!("digest round {round} produced a zero half, retrying");
        round += 1;
    }
}

/// Creates a fresh legacy UUID from a hash of the current system state.
pub fn generate_legacy_uuid() -> LegacyUuid {
    first_usable(sample_digest)
}
