//! Secret name generation
//!
//! Names have the form `<prefix>-<service account>-<suffix>` where the suffix is
//! eight characters from `[a-z0-9]`. The suffix only avoids collisions between
//! repeated issuances for the same binding; it is not a secret.

use crate::constants::{SECRET_NAME_SUFFIX_ALPHABET, SECRET_NAME_SUFFIX_LEN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Instance-scoped random source for Secret name suffixes
#[derive(Debug)]
pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl NameGenerator {
    /// Generator seeded from the operating system
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, for tests
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(&self, prefix: &str, service_account: &str) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let suffix: String = (0..SECRET_NAME_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..SECRET_NAME_SUFFIX_ALPHABET.len());
                char::from(SECRET_NAME_SUFFIX_ALPHABET[idx])
            })
            .collect();
        format!("{prefix}-{service_account}-{suffix}")
    }
}
