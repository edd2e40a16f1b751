//! The five growth curves

use super::{GrowthModel, ModelKind, ModelState};

/// Ordinary least squares line through `points`: `(slope, intercept)`
fn regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx.abs() < 1e-300 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    (slope.is_finite() && intercept.is_finite()).then_some((slope, intercept))
}

fn x_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)))
}

fn y_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)))
}

/// Earliest abscissa, 0 without data
fn earliest(data: &[(f64, f64)]) -> f64 {
    let (lo, _) = x_bounds(data);
    if lo.is_finite() { lo } else { 0.0 }
}

/// Upper asymptote guess: 20% above the largest observation
fn saturation_guess(data: &[(f64, f64)]) -> f64 {
    let (_, hi) = y_bounds(data);
    if hi.is_finite() && hi > 0.0 { 1.2 * hi } else { 1.0 }
}

/// `m (x - x0) + c`
#[derive(Debug, Clone)]
pub struct LinearGrowth {
    state: ModelState,
}

impl LinearGrowth {
    const PARAMETERS: &'static [&'static str] = &["m", "c", "x0"];

    pub fn new() -> Self {
        Self { state: ModelState::new(Self::PARAMETERS.len()) }
    }

    /// Relative growth `1 + r (x - x0)`; `x0` is left for the caller to anchor
    pub fn with_annual_growth_rate(rate: f64) -> Self {
        let mut model = Self::new();
        model.state.fix(0, rate);
        model.state.fix(1, 1.0);
        model
    }
}

impl Default for LinearGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthModel for LinearGrowth {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn reference_parameters(&self) -> &'static [&'static str] {
        &["x0"]
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        p[0] * (x - p[2]) + p[1]
    }

    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64> {
        let x0 = self.fixed_parameter("x0").unwrap_or_else(|| earliest(data));
        match regression(data) {
            Some((slope, intercept)) => vec![slope, intercept + slope * x0, x0],
            None => vec![0.0, data.first().map_or(0.0, |p| p.1), x0],
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn box_clone(&self) -> Box<dyn GrowthModel> {
        Box::new(self.clone())
    }
}

/// `A exp(k (x - x0))`
#[derive(Debug, Clone)]
pub struct ExponentialGrowth {
    state: ModelState,
}

impl ExponentialGrowth {
    const PARAMETERS: &'static [&'static str] = &["A", "k", "x0"];

    pub fn new() -> Self {
        Self { state: ModelState::new(Self::PARAMETERS.len()) }
    }
}

impl Default for ExponentialGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthModel for ExponentialGrowth {
    fn kind(&self) -> ModelKind {
        ModelKind::Exponential
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn reference_parameters(&self) -> &'static [&'static str] {
        &["x0"]
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        p[0] * (p[1] * (x - p[2])).exp()
    }

    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64> {
        let x0 = self.fixed_parameter("x0").unwrap_or_else(|| earliest(data));
        let logs: Vec<(f64, f64)> = data
            .iter()
            .filter(|p| p.1 > 0.0)
            .map(|p| (p.0 - x0, p.1.ln()))
            .collect();
        match regression(&logs) {
            Some((k, ln_a)) if logs.len() == data.len() => vec![ln_a.exp(), k, x0],
            _ => vec![data.first().map_or(1.0, |p| p.1), 0.0, x0],
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn box_clone(&self) -> Box<dyn GrowthModel> {
        Box::new(self.clone())
    }
}

/// `L / (1 + exp(-k (x - x0)))`
#[derive(Debug, Clone)]
pub struct LogisticGrowth {
    state: ModelState,
}

impl LogisticGrowth {
    const PARAMETERS: &'static [&'static str] = &["L", "k", "x0"];

    pub fn new() -> Self {
        Self { state: ModelState::new(Self::PARAMETERS.len()) }
    }
}

impl Default for LogisticGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthModel for LogisticGrowth {
    fn kind(&self) -> ModelKind {
        ModelKind::Logistic
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        p[0] / (1.0 + (-p[1] * (x - p[2])).exp())
    }

    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64> {
        let l = self.fixed_parameter("L").unwrap_or_else(|| saturation_guess(data));
        let (lo, hi) = x_bounds(data);
        let fallback = vec![l, 4.0 / (hi - lo).max(1.0), 0.5 * (lo + hi)];

        // ln(y / (L - y)) = k x - k x0
        let logits: Vec<(f64, f64)> = data
            .iter()
            .filter(|p| p.1 > 0.0 && p.1 < l)
            .map(|p| (p.0, (p.1 / (l - p.1)).ln()))
            .collect();
        match regression(&logits) {
            Some((k, b)) if k.abs() > 1e-12 => vec![l, k, -b / k],
            _ if lo.is_finite() => fallback,
            _ => vec![l, 1.0, 0.0],
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn box_clone(&self) -> Box<dyn GrowthModel> {
        Box::new(self.clone())
    }
}

/// Richards curve `A + (K - A) / (C + Q exp(-B (x - x0)))^(1 / nu)`
#[derive(Debug, Clone)]
pub struct GeneralizedLogisticGrowth {
    state: ModelState,
}

impl GeneralizedLogisticGrowth {
    const PARAMETERS: &'static [&'static str] = &["A", "K", "C", "Q", "B", "nu", "x0"];

    pub fn new() -> Self {
        Self { state: ModelState::new(Self::PARAMETERS.len()) }
    }
}

impl Default for GeneralizedLogisticGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthModel for GeneralizedLogisticGrowth {
    fn kind(&self) -> ModelKind {
        ModelKind::GeneralizedLogistic
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn reference_parameters(&self) -> &'static [&'static str] {
        &["x0"]
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let (a, k, c, q, b, nu, x0) = (p[0], p[1], p[2], p[3], p[4], p[5], p[6]);
        a + (k - a) / (c + q * (-b * (x - x0)).exp()).powf(1.0 / nu)
    }

    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64> {
        let x0 = self.fixed_parameter("x0").unwrap_or_else(|| earliest(data));
        let (y_lo, _) = y_bounds(data);
        let a = self
            .fixed_parameter("A")
            .unwrap_or(if y_lo.is_finite() && y_lo < 0.0 { 1.2 * y_lo } else { 0.0 });
        let k = self.fixed_parameter("K").unwrap_or_else(|| saturation_guess(data));

        // With C = Q-scale = nu = 1: ln((y - A) / (K - y)) = B (x - x0) - ln Q
        let logits: Vec<(f64, f64)> = data
            .iter()
            .filter(|p| p.1 > a && p.1 < k)
            .map(|p| (p.0 - x0, ((p.1 - a) / (k - p.1)).ln()))
            .collect();
        let (b, q) = match regression(&logits) {
            Some((slope, intercept)) if slope.abs() > 1e-12 => (slope, (-intercept).exp()),
            _ => (0.1, 1.0),
        };
        vec![a, k, 1.0, q, b, 1.0, x0]
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn box_clone(&self) -> Box<dyn GrowthModel> {
        Box::new(self.clone())
    }
}

/// `A exp(-b exp(-k (x - x0)))`
#[derive(Debug, Clone)]
pub struct GompertzGrowth {
    state: ModelState,
}

impl GompertzGrowth {
    const PARAMETERS: &'static [&'static str] = &["A", "b", "k", "x0"];

    pub fn new() -> Self {
        Self { state: ModelState::new(Self::PARAMETERS.len()) }
    }
}

impl Default for GompertzGrowth {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthModel for GompertzGrowth {
    fn kind(&self) -> ModelKind {
        ModelKind::Gompertz
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn reference_parameters(&self) -> &'static [&'static str] {
        &["x0"]
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        p[0] * (-p[1] * (-p[2] * (x - p[3])).exp()).exp()
    }

    fn initial_guess(&self, data: &[(f64, f64)]) -> Vec<f64> {
        let x0 = self.fixed_parameter("x0").unwrap_or_else(|| earliest(data));
        let a = self.fixed_parameter("A").unwrap_or_else(|| saturation_guess(data));

        // ln(-ln(y / A)) = ln b - k (x - x0)
        let points: Vec<(f64, f64)> = data
            .iter()
            .filter(|p| p.1 > 0.0 && p.1 < a)
            .map(|p| (p.0 - x0, (-(p.1 / a).ln()).ln()))
            .collect();
        match regression(&points) {
            Some((slope, ln_b)) => vec![a, ln_b.exp(), -slope, x0],
            None => vec![a, 1.0, 0.1, x0],
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn box_clone(&self) -> Box<dyn GrowthModel> {
        Box::new(self.clone())
    }
}
