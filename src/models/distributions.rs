//! Count and continuous distributions shared by the sport models.

use serde::{Deserialize, Serialize};

/// Standard normal CDF approximation (Abramowitz-Stegun 7.1.26)
pub fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * z);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * y)
}

/// P(X <= x) for X ~ N(mu, sigma²)
pub fn normal_cdf_at(x: f64, mu: f64, sigma: f64) -> f64 {
    normal_cdf((x - mu) / sigma)
}

/// Elo-style logistic win probability of A over B
pub fn logistic_win_prob(rating_a: f64, rating_b: f64, scale: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / scale))
}

/// Poisson pmf for 0..=max_k via the recurrence p(k) = p(k-1)·λ/k
pub fn poisson_pmf(lambda: f64, max_k: usize) -> Vec<f64> {
    let mut pmf = Vec::with_capacity(max_k + 1);
    let mut p = (-lambda).exp();
    pmf.push(p);
    for k in 1..=max_k {
        p *= lambda / k as f64;
        pmf.push(p);
    }
    pmf
}

/// Negative binomial pmf for 0..=max_x with the given mean and dispersion `k`.
///
/// Variance is `mean + mean²/k`; as k grows this tends to Poisson(mean).
pub fn neg_bin_pmf(mean: f64, k: f64, max_x: usize) -> Vec<f64> {
    let mean = mean.max(1e-9);
    let p = k / (k + mean);
    let q = 1.0 - p;
    let mut pmf = Vec::with_capacity(max_x + 1);
    let mut current = p.powf(k);
    pmf.push(current);
    for x in 1..=max_x {
        let xf = x as f64;
        current *= q * (xf + k - 1.0) / xf;
        pmf.push(current);
    }
    pmf
}

/// Dixon-Coles low-score dependence factor for scoreline (h, a)
pub fn dixon_coles_tau(h: usize, a: usize, lambda_home: f64, lambda_away: f64, rho: f64) -> f64 {
    match (h, a) {
        (0, 0) => 1.0 - lambda_home * lambda_away * rho,
        (0, 1) => 1.0 + lambda_home * rho,
        (1, 0) => 1.0 + lambda_away * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

/// Distribution of X + Y for independent count pmfs
pub fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, pa) in a.iter().enumerate() {
        for (j, pb) in b.iter().enumerate() {
            out[i + j] += pa * pb;
        }
    }
    out
}

/// Rescale a pmf to sum to 1; `None` if its mass is degenerate
pub fn normalized(mut pmf: Vec<f64>) -> Option<Vec<f64>> {
    let total: f64 = pmf.iter().sum();
    if !(total.is_finite() && total > 1e-12) || pmf.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return None;
    }
    for p in pmf.iter_mut() {
        *p /= total;
    }
    Some(pmf)
}

/// Over/push/under split of a line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSplit {
    pub over: f64,
    pub push: f64,
    pub under: f64,
}

impl LineSplit {
    pub fn total(&self) -> f64 {
        self.over + self.push + self.under
    }
}

fn is_integer_line(line: f64) -> bool {
    (line - line.round()).abs() < 1e-9
}

/// Split a count pmf (values 0..len) around `line`; integer lines can push
pub fn count_line_split(pmf: &[f64], line: f64) -> LineSplit {
    let mut split = LineSplit {
        over: 0.0,
        push: 0.0,
        under: 0.0,
    };
    let integer = is_integer_line(line);
    for (x, p) in pmf.iter().enumerate() {
        let xf = x as f64;
        if integer && (xf - line).abs() < 1e-9 {
            split.push += p;
        } else if xf > line {
            split.over += p;
        } else {
            split.under += p;
        }
    }
    split
}

/// Split a normal score distribution around `line`.
///
/// Scores are discrete, so integer lines get a continuity-corrected push band
/// `[line - 0.5, line + 0.5]`.
pub fn normal_line_split(mu: f64, sigma: f64, line: f64) -> LineSplit {
    if is_integer_line(line) {
        let upper = normal_cdf_at(line + 0.5, mu, sigma);
        let lower = normal_cdf_at(line - 0.5, mu, sigma);
        LineSplit {
            over: 1.0 - upper,
            push: (upper - lower).max(0.0),
            under: lower,
        }
    } else {
        let below = normal_cdf_at(line, mu, sigma);
        LineSplit {
            over: 1.0 - below,
            push: 0.0,
            under: below,
        }
    }
}

/// Joint scoreline distribution, `cells[h][a]`
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreGrid {
    pub cells: Vec<Vec<f64>>,
    /// Probability mass captured before renormalization
    pub captured_mass: f64,
}

impl ScoreGrid {
    /// Independent Poisson scoreline grid with optional Dixon-Coles correction.
    ///
    /// The grid side grows from `min_goals` until it captures `tail_mass` or hits
    /// `max_goals`, then the cells are renormalized.
    pub fn poisson(
        lambda_home: f64,
        lambda_away: f64,
        rho: Option<f64>,
        min_goals: usize,
        max_goals: usize,
        tail_mass: f64,
    ) -> Option<ScoreGrid> {
        if !(lambda_home.is_finite() && lambda_away.is_finite()) || lambda_home <= 0.0 || lambda_away <= 0.0 {
            return None;
        }
        let mut size = min_goals.max(1).min(max_goals.max(1));
        loop {
            let ph = poisson_pmf(lambda_home, size);
            let pa = poisson_pmf(lambda_away, size);
            let mut cells = vec![vec![0.0; size + 1]; size + 1];
            let mut mass = 0.0;
            for (h, row) in cells.iter_mut().enumerate() {
                for (a, cell) in row.iter_mut().enumerate() {
                    let tau = rho
                        .map(|r| dixon_coles_tau(h, a, lambda_home, lambda_away, r))
                        .unwrap_or(1.0)
                        .max(0.0);
                    *cell = ph[h] * pa[a] * tau;
                    mass += *cell;
                }
            }
            if mass >= tail_mass || size >= max_goals {
                if !(mass.is_finite() && mass > 1e-12) {
                    return None;
                }
                for row in cells.iter_mut() {
                    for cell in row.iter_mut() {
                        *cell /= mass;
                    }
                }
                return Some(ScoreGrid {
                    cells,
                    captured_mass: mass,
                });
            }
            size += 1;
        }
    }

    pub fn max_goals(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    /// (home win, draw, away win)
    pub fn result_probs(&self) -> (f64, f64, f64) {
        let (mut home, mut draw, mut away) = (0.0, 0.0, 0.0);
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                match h.cmp(&a) {
                    std::cmp::Ordering::Greater => home += p,
                    std::cmp::Ordering::Equal => draw += p,
                    std::cmp::Ordering::Less => away += p,
                }
            }
        }
        (home, draw, away)
    }

    /// pmf of home + away goals
    pub fn total_pmf(&self) -> Vec<f64> {
        let n = self.cells.len();
        let mut pmf = vec![0.0; 2 * n.saturating_sub(1) + 1];
        for (h, row) in self.cells.iter().enumerate() {
            for (a, p) in row.iter().enumerate() {
                pmf[h + a] += p;
            }
        }
        pmf
    }

    pub fn home_pmf(&self) -> Vec<f64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn away_pmf(&self) -> Vec<f64> {
        let n = self.cells.len();
        (0..n)
            .map(|a| self.cells.iter().map(|row| row[a]).sum())
            .collect()
    }

    /// P(both sides score at least once)
    pub fn both_score(&self) -> f64 {
        self.cells
            .iter()
            .skip(1)
            .map(|row| row.iter().skip(1).sum::<f64>())
            .sum()
    }
}
