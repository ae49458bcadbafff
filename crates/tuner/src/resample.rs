//! Stratified bootstrap resampling of the training subset

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::deterministic::{LcgRng, BOOTSTRAP_STREAM};
use crate::errors::TuningError;
use crate::strata::{Strata, StrataSpec};

/// Bootstrap settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Number of resamples (B)
    pub bootstraps: usize,
    pub strata: String,
    pub strata_bins: usize,
}

/// One bootstrap resample. Indices refer to rows of the training subset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resample {
    pub id: String,
    /// Drawn with replacement; same length as the training subset
    pub analysis: Vec<usize>,
    /// Rows never drawn, ascending
    pub assessment: Vec<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResampleCollection {
    pub seed: u64,
    pub resamples: Vec<Resample>,
}

impl ResampleCollection {
    pub fn len(&self) -> usize {
        self.resamples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resamples.is_empty()
    }
}

/// Draw `config.bootstraps` stratified bootstrap resamples of `train`.
///
/// Resample `b` draws from its own RNG stream, so resamples are generated in
/// parallel and do not depend on one another.
pub fn bootstraps(
    train: &Dataset,
    config: &BootstrapConfig,
    seed: u64,
) -> Result<ResampleCollection, TuningError> {
    if config.bootstraps == 0 {
        return Err(TuningError::InvalidConfig(
            "bootstraps must be at least 1".to_string(),
        ));
    }

    let strata = Strata::assign(
        train,
        &StrataSpec {
            field: config.strata.clone(),
            bins: config.strata_bins,
        },
    )?;
    let width = config.bootstraps.to_string().len().max(2);

    let resamples = (0..config.bootstraps)
        .into_par_iter()
        .map(|b| draw(train.len(), &strata, seed, b, width))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResampleCollection { seed, resamples })
}

fn draw(
    n: usize,
    strata: &Strata,
    seed: u64,
    b: usize,
    width: usize,
) -> Result<Resample, TuningError> {
    let mut rng = LcgRng::for_stream(seed, BOOTSTRAP_STREAM + b as u64);
    let mut analysis = Vec::with_capacity(n);
    let mut drawn = vec![false; n];

    for rows in strata.levels.values() {
        for _ in 0..rows.len() {
            let row = rows[rng.next_range(rows.len())];
            drawn[row] = true;
            analysis.push(row);
        }
    }

    let assessment: Vec<usize> = (0..n).filter(|&r| !drawn[r]).collect();
    if assessment.is_empty() {
        return Err(TuningError::DegenerateResample { resample: b });
    }

    Ok(Resample {
        id: format!("Bootstrap{:0width$}", b + 1, width = width),
        analysis,
        assessment,
    })
}
