//! Closed-form ranking statistics.
//!
//! Everything here returns `None` when the statistic is undefined for the input
//! (length mismatch, fewer than two points, zero variance) rather than
//! substituting a placeholder value. Inputs are assumed finite.

/// 1-based ranks with ties sharing their average (fractional) rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0usize;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j (0-based) share ranks i+1..=j
        let avg = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg;
        }
        i = j;
    }
    ranks
}

pub fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation, clamped to [-1, 1].
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x == 0.0 || den_y == 0.0 {
        return None;
    }
    Some((num / (den_x * den_y).sqrt()).clamp(-1.0, 1.0))
}

/// Spearman's rho: Pearson correlation of average ranks.
pub fn spearman_rho(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 || is_constant(x) || is_constant(y) {
        return None;
    }
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Kendall's tau-b, `(C - D) / sqrt((n0 - n1)(n0 - n2))`.
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n != y.len() || n < 2 || is_constant(x) || is_constant(y) {
        return None;
    }

    let mut concordant = 0u64;
    let mut discordant = 0u64;
    let mut ties_x = 0u64;
    let mut ties_y = 0u64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1;
            } else if dy == 0.0 {
                ties_y += 1;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    // n0 - n1 counts pairs untied in x: C + D + (tied only in y); symmetric for y.
    let untied_x = (concordant + discordant + ties_y) as f64;
    let untied_y = (concordant + discordant + ties_x) as f64;
    let denom = (untied_x * untied_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(((concordant as f64 - discordant as f64) / denom).clamp(-1.0, 1.0))
}

pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    if predicted.len() != actual.len() || predicted.is_empty() {
        return None;
    }
    let total: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum();
    Some(total / predicted.len() as f64)
}

/// Coefficient of determination of `actual` under the identity predictor
/// `predicted`: `1 - SS_res / SS_tot`. Undefined when `actual` is constant.
pub fn r_squared(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    if predicted.len() != actual.len() || actual.is_empty() {
        return None;
    }
    let mean_actual = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

/// Index of the first maximum (`want_max`) or first minimum.
fn first_extreme(values: &[f64], want_max: bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, &v) in values.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) if want_max => v > values[b],
            Some(b) => v < values[b],
        };
        if better {
            best = Some(idx);
        }
    }
    best
}

fn extreme_hit(scores: &[f64], truth: &[f64], want_max: bool) -> Option<bool> {
    if scores.len() != truth.len() || scores.len() < 2 {
        return None;
    }
    let picked = first_extreme(scores, want_max)?;
    let target = first_extreme(truth, want_max)?;
    Some(truth[picked] == truth[target])
}

/// Whether the first top-scored item also holds the maximum ground truth.
pub fn top1_hit(scores: &[f64], truth: &[f64]) -> Option<bool> {
    extreme_hit(scores, truth, true)
}

/// Whether the first bottom-scored item also holds the minimum ground truth.
pub fn bottom1_hit(scores: &[f64], truth: &[f64]) -> Option<bool> {
    extreme_hit(scores, truth, false)
}

/// Rescale into [0, 1] by min and max. A constant input maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let low = values.iter().copied().fold(f64::INFINITY, f64::min);
    let high = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if high > low { high - low } else { 1.0 };
    values.iter().map(|v| (v - low) / span).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12
    }

    #[test]
    fn average_ranks_share_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(average_ranks(&[1.0, 1.0, 1.0]), vec![2.0, 2.0, 2.0]);
        assert!(average_ranks(&[]).is_empty());
    }

    #[test]
    fn spearman_identity_and_negation() {
        let x = [0.3, 0.1, 0.9, 0.4, 0.4];
        let neg: Vec<f64> = x.iter().map(|v| -v).collect();
        assert!(approx(spearman_rho(&x, &x).unwrap(), 1.0));
        assert!(approx(spearman_rho(&x, &neg).unwrap(), -1.0));
    }

    #[test]
    fn spearman_matches_textbook_example() {
        // d = [0, -1, 1, 0, 0] -> rho = 1 - 6 * 2 / (5 * 24) = 0.9
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 3.0, 2.0, 4.0, 5.0];
        assert!(approx(spearman_rho(&x, &y).unwrap(), 0.9));
    }

    #[test]
    fn correlations_undefined_for_degenerate_input() {
        assert_eq!(spearman_rho(&[1.0], &[1.0]), None);
        assert_eq!(spearman_rho(&[1.0, 1.0, 1.0], &[0.0, 0.5, 1.0]), None);
        assert_eq!(kendall_tau_b(&[0.2, 0.4], &[0.7, 0.7]), None);
        assert_eq!(kendall_tau_b(&[0.2, 0.4], &[0.7]), None);
    }

    #[test]
    fn kendall_tau_b_corrects_for_ties() {
        // pairs: (0,1) C, (0,2) C, (1,2) tied in y only -> 2 / sqrt(3 * 2)
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 2.0];
        let expected = 2.0 / 6.0_f64.sqrt();
        assert!(approx(kendall_tau_b(&x, &y).unwrap(), expected));
        assert_eq!(kendall_tau_b(&x, &x), Some(1.0));
        assert_eq!(kendall_tau_b(&x, &[3.0, 2.0, 1.0]), Some(-1.0));
    }

    #[test]
    fn r_squared_is_identity_not_fitted() {
        let y = [1.0, 0.5, 0.0];
        assert_eq!(r_squared(&y, &y), Some(1.0));
        // a perfectly correlated but shifted predictor still loses R^2
        let shifted = [0.9, 0.4, -0.1];
        let r2 = r_squared(&shifted, &y).unwrap();
        assert!(approx(r2, 1.0 - 0.03 / 0.5));
        assert_eq!(r_squared(&[0.1, 0.2], &[0.5, 0.5]), None);
    }

    #[test]
    fn extremes_use_first_occurrence() {
        // two records tie on the top score; the first one has the lower truth
        let scores = [0.8, 0.8, 0.1];
        let truth = [0.5, 1.0, 0.0];
        assert_eq!(top1_hit(&scores, &truth), Some(false));
        assert_eq!(bottom1_hit(&scores, &truth), Some(true));
        // truth ties count as success by value
        assert_eq!(top1_hit(&[0.9, 0.1], &[1.0, 1.0]), Some(true));
        assert_eq!(top1_hit(&[0.9], &[1.0]), None);
    }

    #[test]
    fn min_max_normalize_handles_constant_input() {
        assert_eq!(min_max_normalize(&[-2.0, 0.0, 2.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(min_max_normalize(&[3.0, 3.0]), vec![0.0, 0.0]);
    }
}
