use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256};

use super::verification::VerificationState;

/// Globally unique record identifier, assigned by the creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Issues `asset-<unix millis>` identifiers.
///
/// Timestamps are forced strictly increasing, so two records created within the
/// same millisecond (or after a clock step backwards) still get distinct ids.
#[derive(Debug, Default)]
pub struct RecordIdGenerator {
    last: AtomicU64,
}

impl RecordIdGenerator {
    pub const PREFIX: &'static str = "asset-";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RecordId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        RecordId(format!("{}{}", Self::PREFIX, now.max(previous + 1)))
    }
}

/// Opaque ledger reference to an encrypted attribute.
///
/// Only the decryption capability can resolve it to a cleartext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CiphertextHandle(pub B256);

impl CiphertextHandle {
    pub fn is_zero(&self) -> bool {
        self.0 == B256::ZERO
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Asset category. Closed set, stored on-chain as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Electronics,
    Jewelry,
    Art,
    Documents,
    Other,
}

/// Bidirectional code/label table. `Other` doubles as the fallback bucket.
const CATEGORIES: [(Category, u32, &str); 5] = [
    (Category::Electronics, 0, "electronics"),
    (Category::Jewelry, 1, "jewelry"),
    (Category::Art, 2, "art"),
    (Category::Documents, 3, "documents"),
    (Category::Other, 4, "other"),
];

impl Category {
    pub const FALLBACK: Category = Category::Other;

    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORIES.iter().map(|(category, _, _)| *category)
    }

    pub fn code(self) -> u32 {
        self.entry().1
    }

    pub fn label(self) -> &'static str {
        self.entry().2
    }

    /// Decode an on-chain code. Unknown codes land in [`Category::FALLBACK`].
    pub fn from_code(code: u32) -> Self {
        CATEGORIES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map_or(Self::FALLBACK, |(category, _, _)| *category)
    }

    /// Parse a user-facing label (case-insensitive). Unknown labels land in
    /// [`Category::FALLBACK`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        CATEGORIES
            .iter()
            .find(|(_, _, l)| l.eq_ignore_ascii_case(label))
            .map_or(Self::FALLBACK, |(category, _, _)| *category)
    }

    fn entry(self) -> &'static (Category, u32, &'static str) {
        // The table is exhaustive over the enum
        CATEGORIES
            .iter()
            .find(|(category, _, _)| *category == self)
            .unwrap_or(&CATEGORIES[4])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Publicly visible tracking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicStatus {
    Active,
    InTransit,
    Alert,
}

impl PublicStatus {
    /// Status newly created records default to.
    pub const DEFAULT: PublicStatus = PublicStatus::Active;

    /// Display label for codes outside the closed set.
    pub const UNKNOWN_LABEL: &'static str = "Unknown";

    pub fn code(self) -> u32 {
        match self {
            Self::Active => 0,
            Self::InTransit => 1,
            Self::Alert => 2,
        }
    }

    /// Decode an on-chain code. Out-of-range codes have no status; they are
    /// never coerced into a valid one.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Active),
            1 => Some(Self::InTransit),
            2 => Some(Self::Alert),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::InTransit => "In Transit",
            Self::Alert => "Alert",
        }
    }
}

impl fmt::Display for PublicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised status {0:?} (expected 0-2, active, in-transit or alert)")]
pub struct ParseStatusError(String);

impl FromStr for PublicStatus {
    type Err = ParseStatusError;

    /// Accepts either the numeric code or the label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u32>() {
            return Self::from_code(code).ok_or_else(|| ParseStatusError(s.to_string()));
        }
        let normalized: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Ok(Self::Active),
            "intransit" => Ok(Self::InTransit),
            "alert" => Ok(Self::Alert),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Lenient integer parse for the confidential attribute.
///
/// Takes an optional leading `+` and the leading run of decimal digits, ignoring
/// any trailing characters. Anything without leading digits, negative input and
/// values wider than 32 bits coerce to 0: the homomorphic input is a `u32`.
pub fn parse_attribute_value(raw: &str) -> u32 {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..digits_end].parse::<u32>().unwrap_or(0)
}

/// Typed projection of one ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub category: Category,
    /// `None` when the ledger holds a code outside the closed set.
    pub status: Option<PublicStatus>,
    /// Raw status code as stored on-chain.
    pub status_code: u32,
    pub creator: Address,
    /// Ledger timestamp (seconds).
    pub created_at: u64,
    pub ciphertext_handle: CiphertextHandle,
    pub verification: VerificationState,
}

impl Record {
    pub fn clear_value(&self) -> Option<u32> {
        self.verification.clear_value()
    }

    pub fn is_verified(&self) -> bool {
        self.verification.is_verified()
    }

    pub fn status_label(&self) -> &'static str {
        self.status
            .map_or(PublicStatus::UNKNOWN_LABEL, PublicStatus::label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_codes_round_trip_through_table() {
        for category in Category::all() {
            assert_eq!(Category::from_code(category.code()), category);
            assert_eq!(Category::from_label(category.label()), category);
        }
    }

    #[test]
    fn electronics_is_code_zero() {
        assert_eq!(Category::Electronics.code(), 0);
        assert_eq!(Category::from_label("electronics"), Category::Electronics);
        assert_eq!(Category::from_label("  Electronics "), Category::Electronics);
    }

    #[test]
    fn out_of_range_category_falls_back() {
        assert_eq!(Category::from_code(5), Category::Other);
        assert_eq!(Category::from_code(u32::MAX), Category::Other);
        assert_eq!(Category::from_label("vehicles"), Category::Other);
    }

    #[test]
    fn out_of_range_status_is_unknown() {
        assert_eq!(PublicStatus::from_code(1), Some(PublicStatus::InTransit));
        assert_eq!(PublicStatus::from_code(3), None);
    }

    #[test]
    fn status_parses_codes_and_labels() {
        assert_eq!("0".parse::<PublicStatus>().unwrap(), PublicStatus::Active);
        assert_eq!(
            "in transit".parse::<PublicStatus>().unwrap(),
            PublicStatus::InTransit
        );
        assert_eq!(
            "In-Transit".parse::<PublicStatus>().unwrap(),
            PublicStatus::InTransit
        );
        assert_eq!("ALERT".parse::<PublicStatus>().unwrap(), PublicStatus::Alert);
        assert!("7".parse::<PublicStatus>().is_err());
        assert!("lost".parse::<PublicStatus>().is_err());
    }

    #[test]
    fn attribute_value_parsing() {
        assert_eq!(parse_attribute_value("42"), 42);
        assert_eq!(parse_attribute_value("  +17"), 17);
        assert_eq!(parse_attribute_value("12.5"), 12);
        assert_eq!(parse_attribute_value("40lat"), 40);
        assert_eq!(parse_attribute_value("north"), 0);
        assert_eq!(parse_attribute_value(""), 0);
        assert_eq!(parse_attribute_value("-3"), 0);
        assert_eq!(parse_attribute_value("99999999999"), 0);
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let ids = RecordIdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();

        assert!(a.as_str().starts_with(RecordIdGenerator::PREFIX));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn unknown_status_label() {
        let record = Record {
            id: RecordId::from("asset-1"),
            name: "crate".into(),
            category: Category::Art,
            status: PublicStatus::from_code(9),
            status_code: 9,
            creator: Address::ZERO,
            created_at: 0,
            ciphertext_handle: CiphertextHandle::default(),
            verification: VerificationState::Unverified,
        };
        assert_eq!(record.status_label(), "Unknown");
        assert_eq!(record.clear_value(), None);
    }
}
