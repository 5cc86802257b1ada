use sha2::{Digest, Sha256};

use crate::types::{CashFlowSample, Money};

const INPUT_HASH_DOMAIN: &[u8] = b"dscr-input-hash-v1";

/// Content hash of exactly the samples and principal that fed a DSCR
/// evaluation.
///
/// Samples are hashed in canonical order (timestamp, then amount) and
/// amounts are normalised, so `1000` and `1000.00` hash alike and the
/// caller's ordering is irrelevant. Any change to an amount, a timestamp,
/// the sample count or the principal changes the digest.
pub fn input_hash(samples: &[CashFlowSample], principal: Money) -> String {
    let mut canonical: Vec<&CashFlowSample> = samples.iter().collect();
    canonical.sort_by(|a, b| {
        a.occurred_on
            .cmp(&b.occurred_on)
            .then(a.amount.cmp(&b.amount))
    });

    let mut hasher = Sha256::new();
    hasher.update(INPUT_HASH_DOMAIN);
    hasher.update((canonical.len() as u64).to_le_bytes());
    for sample in canonical {
        hasher.update(sample.occurred_on.timestamp().to_le_bytes());
        hasher.update(sample.occurred_on.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(sample.amount.normalize().to_string().as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"principal=");
    hasher.update(principal.normalize().to_string().as_bytes());
    hex::encode(hasher.finalize())
}
