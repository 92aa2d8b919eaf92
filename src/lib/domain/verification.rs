use std::fmt;

/// Lifecycle of a record's confidential attribute.
///
/// ```text
///   Unverified ──begin──▶ Pending ──succeed──▶ Verified (terminal)
///                           │  ▲
///                         fail │ begin
///                           ▼  │
///                          Failed
/// ```
///
/// The revealed value lives inside `Verified`, so a record carries a clear value
/// if and only if it is verified. Every transition out of `Verified` is a no-op:
/// once the ledger has committed a cleartext, nothing local can undo it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VerificationState {
    #[default]
    Unverified,
    /// Off-chain decryption or proof submission in flight.
    Pending,
    /// Cleartext committed on-chain together with its decryption proof.
    Verified { value: u32 },
    /// Last attempt failed; a new `begin` re-enters `Pending`.
    Failed { reason: String },
}

impl VerificationState {
    /// Enter `Pending`. Retrying from `Failed` and re-entering from `Pending`
    /// (a second concurrent caller) are both allowed.
    pub fn begin(&self) -> Self {
        match self {
            Self::Verified { .. } => self.clone(),
            _ => Self::Pending,
        }
    }

    /// Adopt a committed cleartext. An already verified state keeps its first value.
    pub fn succeed(&self, value: u32) -> Self {
        match self {
            Self::Verified { .. } => self.clone(),
            _ => Self::Verified { value },
        }
    }

    pub fn fail(&self, reason: impl Into<String>) -> Self {
        match self {
            Self::Verified { .. } => self.clone(),
            _ => Self::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn clear_value(&self) -> Option<u32> {
        match self {
            Self::Verified { value } => Some(*value),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unverified => "Unverified",
            Self::Pending => "Pending",
            Self::Verified { .. } => "Verified",
            Self::Failed { .. } => "Failed",
        }
    }

    /// Combine the ledger's view with a locally tracked state.
    ///
    /// Ledger-confirmed verification always wins; otherwise the local
    /// `Pending`/`Failed` marker (if any) is kept.
    pub fn reconcile(ledger_value: Option<u32>, local: Option<&Self>) -> Self {
        match (ledger_value, local) {
            (Some(value), Some(local)) => local.succeed(value),
            (Some(value), None) => Self::Verified { value },
            (None, Some(Self::Verified { .. })) | (None, None) => Self::Unverified,
            (None, Some(local)) => local.clone(),
        }
    }
}

impl fmt::Display for VerificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified { value } => write!(f, "Verified ({value})"),
            Self::Failed { reason } => write!(f, "Failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}
