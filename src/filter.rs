use crate::metrics::BitrateObservation;
use std::collections::HashSet;

/// Result of the outlier discard pass.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Surviving observations, in original sample order.
    pub kept: Vec<BitrateObservation>,
    pub discarded: usize,
    /// Set when the input was too small to discard anything.
    pub low_confidence: bool,
}

/// Drops the `discard_threshold` fraction of observations nearest each
/// extreme (highest and lowest measured values) before statistics are
/// computed, guarding the mean against single-segment network glitches.
///
/// Deterministic: observations are ranked by measured value with ties broken
/// by sample index. When discarding would leave no observations, nothing is
/// discarded and the result is flagged low-confidence instead.
pub fn filter(observations: Vec<BitrateObservation>, discard_threshold: f64) -> FilterOutcome {
    let total = observations.len();
    let per_end = (discard_threshold * total as f64).floor() as usize;

    if per_end == 0 {
        return FilterOutcome {
            kept: observations,
            discarded: 0,
            low_confidence: false,
        };
    }
    if total <= per_end * 2 {
        debug!(total, per_end, "too few observations to discard outliers, keeping all");
        return FilterOutcome {
            kept: observations,
            discarded: 0,
            low_confidence: true,
        };
    }

    let mut order: Vec<usize> = (0..total).collect();
    order.sort_by(|&a, &b| {
        observations[a]
            .measured_bps
            .partial_cmp(&observations[b].measured_bps)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(observations[a].sample_index.cmp(&observations[b].sample_index))
    });

    let dropped: HashSet<usize> = order[..per_end]
        .iter()
        .chain(order[total - per_end..].iter())
        .copied()
        .collect();

    let kept = observations
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !dropped.contains(index))
        .map(|(_, observation)| observation)
        .collect();

    FilterOutcome {
        kept,
        discarded: per_end * 2,
        low_confidence: false,
    }
}
