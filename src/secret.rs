use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Characters allowed in a webhook secret token.
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Token lengths are drawn uniformly from this range.
pub const MIN_LEN: usize = 128;
pub const MAX_LEN: usize = 256;

/// Random source used to generate the secret token.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SecretRng {
    /// Thread-local CSPRNG seeded from the OS.
    #[default]
    Os,
    /// `StdRng` seeded from the current time. Only resists casual guessing.
    TimeSeeded,
}

impl std::str::FromStr for SecretRng {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "os" => Ok(SecretRng::Os),
            "time-seeded" | "time" => Ok(SecretRng::TimeSeeded),
            other => anyhow::bail!("unknown secret random source: {}", other),
        }
    }
}

impl std::fmt::Display for SecretRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretRng::Os => write!(f, "os"),
            SecretRng::TimeSeeded => write!(f, "time-seeded"),
        }
    }
}

/// Shared secret sent to the Bot API at registration and expected on every
/// inbound webhook call.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Generate a fresh token from the configured random source.
    pub fn generate(source: SecretRng) -> Self {
        match source {
            SecretRng::Os => Self::generate_with(&mut rand::rng()),
            SecretRng::TimeSeeded => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or_default();
                Self::generate_with(&mut StdRng::seed_from_u64(nanos))
            }
        }
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let len = rng.random_range(MIN_LEN..MAX_LEN);
        let token = (0..len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison, constant-time over equal-length inputs.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretToken([REDACTED; {} chars])", self.0.len())
    }
}
