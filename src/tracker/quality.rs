//! Truth-label cooking and specific energy loss

use crate::detector::ClusterLabels;

/// Label of a track from the labels of its clusters
///
/// The candidate is the most frequent leading label (lowest value on ties).
/// It is sign-flagged as fake when fewer than `(1 - fake_fraction)` of the
/// clusters carry it among their contributors, or when the seed label
/// disagrees. Returns `(label, fake)`, or `None` when no cluster is labelled.
pub fn cook_label<'a>(
    labels: impl IntoIterator<Item = &'a ClusterLabels>,
    seed_label: Option<i64>,
    fake_fraction: f64,
) -> Option<(i64, bool)> {
    let labels: Vec<&ClusterLabels> = labels.into_iter().collect();
    let mut leading: Vec<i64> = labels.iter().filter_map(|l| l.first().copied()).collect();
    if leading.is_empty() {
        return None;
    }
    leading.sort_unstable();

    // Longest run in the sorted list; the first run wins ties
    let mut best = (leading[0], 0usize);
    let mut run = (leading[0], 0usize);
    for &label in &leading {
        if label == run.0 {
            run.1 += 1;
        } else {
            run = (label, 1);
        }
        if run.1 > best.1 {
            best = run;
        }
    }
    let label = best.0;

    let sharing = labels.iter().filter(|l| l.contains(&label)).count();
    let required = (1.0 - fake_fraction) * labels.len() as f64;
    let seed_disagrees = seed_label.is_some_and(|s| s.abs() != label.abs());
    let fake = (sharing as f64) < required || seed_disagrees;

    Some((if fake { -label.abs() } else { label }, fake))
}

/// Path length through a layer relative to normal incidence
#[inline]
pub fn path_length_factor(snp: f64, tgl: f64) -> f64 {
    let cos2 = ((1.0 - snp) * (1.0 + snp)).max(f64::MIN_POSITIVE);
    ((1.0 + tgl * tgl) / cos2).sqrt()
}

/// Truncated mean of charge samples
///
/// After sorting, the lowest `low` fraction and the highest `high` fraction
/// are dropped. Returns 0 without samples.
pub fn truncated_mean(samples: &[f64], low: f64, high: f64) -> f64 {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let first = (n as f64 * low).floor() as usize;
    let last = n - (n as f64 * high).floor() as usize;
    let kept = if first < last {
        &sorted[first..last]
    } else {
        &sorted[..]
    };
    kept.iter().sum::<f64>() / kept.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_clean_label() {
        let labels: Vec<ClusterLabels> = vec![smallvec![5], smallvec![5], smallvec![5, 9]];
        assert_eq!(cook_label(&labels, Some(5), 0.2), Some((5, false)));
    }

    #[test]
    fn test_fake_by_fraction() {
        let labels: Vec<ClusterLabels> = vec![
            smallvec![5],
            smallvec![5],
            smallvec![5],
            smallvec![7],
            smallvec![8],
        ];
        // 3 of 5 share label 5, below the required 4
        assert_eq!(cook_label(&labels, None, 0.2), Some((-5, true)));
        // A looser fraction accepts it
        assert_eq!(cook_label(&labels, None, 0.5), Some((5, false)));
    }

    #[test]
    fn test_secondary_contributor_counts() {
        let labels: Vec<ClusterLabels> = vec![
            smallvec![5],
            smallvec![5],
            smallvec![5],
            smallvec![7, 5],
            smallvec![5],
        ];
        assert_eq!(cook_label(&labels, None, 0.1), Some((5, false)));
    }

    #[test]
    fn test_seed_disagreement_flags_fake() {
        let labels: Vec<ClusterLabels> = vec![smallvec![5], smallvec![5]];
        assert_eq!(cook_label(&labels, Some(6), 0.2), Some((-5, true)));
    }

    #[test]
    fn test_unlabelled() {
        let labels: Vec<ClusterLabels> = vec![smallvec![], smallvec![]];
        assert_eq!(cook_label(&labels, Some(3), 0.2), None);
    }

    #[test]
    fn test_truncated_mean() {
        let samples = [10.0, 1.0, 2.0, 3.0, 4.0];
        // Drop the top 40% (two samples): mean of 1, 2, 3
        assert!((truncated_mean(&samples, 0.0, 0.4) - 2.0).abs() < 1e-12);
        assert!((truncated_mean(&samples, 0.0, 0.0) - 4.0).abs() < 1e-12);
        // Drop the bottom 40%: mean of 3, 4, 10
        assert!((truncated_mean(&samples, 0.4, 0.0) - 17.0 / 3.0).abs() < 1e-12);
        assert_eq!(truncated_mean(&[], 0.0, 0.4), 0.0);
        // Nothing survives the cut: fall back to all samples
        assert!((truncated_mean(&[2.0, 4.0], 0.5, 0.5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_path_length_factor() {
        assert!((path_length_factor(0.0, 0.0) - 1.0).abs() < 1e-15);
        assert!((path_length_factor(0.6, 0.0) - 1.25).abs() < 1e-12);
        assert!((path_length_factor(0.0, 0.75) - 1.25).abs() < 1e-12);
    }
}
