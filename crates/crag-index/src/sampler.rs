//! Category-proportional corpus sampling

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::info;

use crag_core::{Error, Record, Result, SamplingConfig};

/// Reduce `records` to `min(sample_size, records.len())` records whose
/// per-category proportions match the corpus within rounding.
///
/// Quotas are the floor of each category's proportional share; leftover
/// slots go to the largest fractional remainders. Members of a category are
/// drawn with an RNG seeded from `config.seed`, so the same corpus and config
/// always produce the same sample. Kept records stay in corpus order.
pub fn stratified_sample(records: &[Record], config: &SamplingConfig) -> Result<Vec<Record>> {
    if config.sample_size == 0 {
        return Err(Error::Data("Sample size must be positive".to_string()));
    }
    if records.is_empty() {
        return Err(Error::Data("Corpus is empty, nothing to sample".to_string()));
    }
    if records.iter().all(|r| r.category.trim().is_empty()) {
        return Err(Error::Configuration(
            "Stratification key (category) is absent from every record".to_string(),
        ));
    }

    let total = records.len();
    let target = config.sample_size.min(total);

    let mut strata: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        strata.entry(record.category.as_str()).or_default().push(i);
    }

    let mut quotas: BTreeMap<&str, usize> = strata
        .iter()
        .map(|(category, members)| (*category, target * members.len() / total))
        .collect();

    let assigned: usize = quotas.values().sum();
    let mut by_remainder: Vec<(&str, usize, usize)> = strata
        .iter()
        .map(|(category, members)| {
            (*category, target * members.len() % total, members.len())
        })
        .collect();
    by_remainder.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));

    for (category, _, _) in by_remainder.into_iter().take(target - assigned) {
        if let Some(quota) = quotas.get_mut(category) {
            *quota += 1;
        }
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut kept = Vec::with_capacity(target);
    for (category, members) in strata.iter_mut() {
        let quota = quotas.get(category).copied().unwrap_or(0);
        members.shuffle(&mut rng);
        kept.extend(members.iter().take(quota).copied());
        info!(category = %category, available = members.len(), sampled = quota, "stratum");
    }
    kept.sort_unstable();

    info!(total, sampled = kept.len(), "stratified sample drawn");
    Ok(kept.into_iter().map(|i| records[i].clone()).collect())
}
