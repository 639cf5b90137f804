//! Per-run identity used to name and later find provisioned resources.
//!
//! A session combines the shared short prefix (for example `gcloud-tests`)
//! with a random suffix taken from the first eight hex digits of a v4 UUID.
//! The suffix carries 32 bits of entropy, so the chance that two of `n`
//! concurrently running sessions collide is roughly `n² / 2³³`. Runs are not
//! otherwise coordinated.

use std::fmt;

use uuid::Uuid;

/// Number of hex digits kept from the UUID for the session suffix.
pub const SUFFIX_LEN: usize = 8;

/// Identity of one execution of the suite.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    short_prefix: String,
    suffix: String,
}

impl Session {
    /// Starts a new session with a freshly generated random suffix.
    #[must_use]
    pub fn generate(short_prefix: impl Into<String>) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        let suffix: String = simple.chars().take(SUFFIX_LEN).collect();
        Self::with_suffix(short_prefix, suffix)
    }

    /// Rebuilds a session from a known suffix, for example to clean up
    /// after a run that crashed before its own teardown.
    #[must_use]
    pub fn with_suffix(short_prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            short_prefix: short_prefix.into().trim().to_owned(),
            suffix: suffix.into().trim().to_owned(),
        }
    }

    /// Shared prefix embedded in every resource any session creates.
    #[must_use]
    pub fn short_prefix(&self) -> &str {
        &self.short_prefix
    }

    /// Random per-run suffix.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `{short_prefix}-{suffix}`; used as the deployed function id and as
    /// the tag that identifies this run's resources.
    #[must_use]
    pub fn full_prefix(&self) -> String {
        format!("{}-{}", self.short_prefix, self.suffix)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.short_prefix, self.suffix)
    }
}
