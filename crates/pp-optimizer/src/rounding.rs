//! Snapping standard designs onto user-requested multiples.

use pp_types::{RoundSpec, SearchError, COVER_EXTENSION, MISMATCHES};

use crate::interp::{CostSurface, StandardInterpolator};
use crate::loss::LossFunction;
use crate::standard::probe_count;

/// Projects `(mismatches, cover_extension)` onto multiples of a [`RoundSpec`].
#[derive(Debug, Clone, Copy)]
pub struct GridProjector {
    round: RoundSpec,
}

/// Multiple of `step` nearest to `value` within `[lo, hi]`; ties go to the
/// smaller multiple.
pub fn nearest_multiple(value: f64, step: u32, lo: f64, hi: f64) -> Option<i64> {
    let s = f64::from(step);
    let k_lo = (lo / s).ceil() as i64;
    let k_hi = (hi / s).floor() as i64;
    if k_lo > k_hi {
        return None;
    }
    let k = ((value / s) - 0.5).ceil() as i64;
    Some(k.clamp(k_lo, k_hi) * i64::from(step))
}

impl GridProjector {
    pub fn new(round: RoundSpec) -> Self {
        Self { round }
    }

    /// Nearest supported point whose coordinates are both multiples.
    ///
    /// Mismatch multiples are tried nearest first; the first one at which some
    /// cover extension multiple is supported wins.
    pub fn project(
        &self,
        interp: &StandardInterpolator,
        point: [i64; 2],
    ) -> Result<[i64; 2], SearchError> {
        let step = i64::from(self.round.mismatches);
        let (m_lo, m_hi) = interp.mismatch_range();
        let k_lo = (m_lo / step as f64).ceil() as i64;
        let k_hi = (m_hi / step as f64).floor() as i64;

        let mut candidates: Vec<i64> = (k_lo..=k_hi).map(|k| k * step).collect();
        candidates.sort_by_key(|m| ((m - point[0]).abs(), *m));

        for mismatches in &candidates {
            let Some((lo, hi)) = interp.cover_extension_range(*mismatches as f64) else {
                continue;
            };
            if let Some(cover_extension) =
                nearest_multiple(point[1] as f64, self.round.cover_extension, lo, hi)
            {
                return Ok([*mismatches, cover_extension]);
            }
        }

        let (parameter, multiple) = if candidates.is_empty() {
            (MISMATCHES, self.round.mismatches)
        } else {
            (COVER_EXTENSION, self.round.cover_extension)
        };
        Err(SearchError::NoRoundedValue {
            dataset: interp.dataset().to_string(),
            parameter: parameter.to_string(),
            multiple,
        })
    }

    /// Bump rounded designs up by one multiple at a time until the total cost
    /// fits `target`.
    ///
    /// Each step takes the bump with the most probes saved per unit of added
    /// weighted loss. Ties go to the earlier dataset and to mismatches.
    pub fn repair(
        &self,
        surfaces: &[(&StandardInterpolator, f64)],
        loss: &LossFunction,
        points: &mut [[i64; 2]],
        target: u64,
    ) -> Result<(), SearchError> {
        let cost_at = |interp: &StandardInterpolator, p: [i64; 2]| -> Result<u64, SearchError> {
            Ok(probe_count(interp.estimate(&[p[0] as f64, p[1] as f64])?))
        };

        let mut costs = surfaces
            .iter()
            .zip(points.iter())
            .map(|((interp, _), p)| cost_at(interp, *p))
            .collect::<Result<Vec<_>, _>>()?;
        let mut total: u64 = costs.iter().sum();

        let steps = [
            [i64::from(self.round.mismatches), 0],
            [0, i64::from(self.round.cover_extension)],
        ];

        while total > target {
            let mut best: Option<(usize, [i64; 2], u64, f64)> = None;
            for (d, (interp, weight)) in surfaces.iter().enumerate() {
                let current = points[d];
                let current_loss = loss.weighted(&[current[0] as f64, current[1] as f64], *weight);
                for step in &steps {
                    let next = [current[0] + step[0], current[1] + step[1]];
                    let x = [next[0] as f64, next[1] as f64];
                    if !interp.contains(&x) {
                        continue;
                    }
                    let cost = cost_at(interp, next)?;
                    if cost >= costs[d] {
                        continue;
                    }
                    let added = (loss.weighted(&x, *weight) - current_loss).max(1e-12);
                    let score = (costs[d] - cost) as f64 / added;
                    if best.map_or(true, |(_, _, _, s)| score > s) {
                        best = Some((d, next, cost, score));
                    }
                }
            }

            let Some((d, next, cost, _)) = best else {
                return Err(SearchError::Infeasible {
                    target,
                    min_achievable: total as f64,
                });
            };
            tracing::debug!(dataset = surfaces[d].0.dataset(), ?next, cost, "repaired rounded design");
            total = total - costs[d] + cost;
            costs[d] = cost;
            points[d] = next;
        }
        Ok(())
    }
}
