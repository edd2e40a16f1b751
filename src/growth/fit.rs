//! Levenberg-Marquardt least squares for growth model parameters
//!
//! Fixed parameters are held constant and unfixed reference parameters are
//! pinned to the earliest observation; everything else is optimised. The
//! model is only written to once a fit converges. The Jacobian is taken by central
//! differences and each step solves the damped normal equations
//! `(JᵀJ + λ diag(JᵀJ)) δ = Jᵀr`.

use std::collections::BTreeMap;

use crate::config::FitConfig;
use crate::error::{FitError, Result};
use super::GrowthModel;

const MAX_DAMPING: f64 = 1e16;

pub(super) fn fit_model<M: GrowthModel + ?Sized>(
    model: &mut M,
    p0: &BTreeMap<String, f64>,
    config: &FitConfig,
) -> Result<()> {
    let names = model.parameter_names();
    if let Some(unknown) = p0.keys().find(|k| !names.contains(&k.as_str())) {
        return Err(FitError::UnknownParameter(unknown.clone()).into());
    }

    let data = model.data_points().to_vec();
    let references = model.reference_parameters();
    let fixed: Vec<Option<f64>> = names.iter().map(|n| model.fixed_parameter(n)).collect();

    let pinned: Vec<usize> = (0..names.len())
        .filter(|&i| fixed[i].is_none() && references.contains(&names[i]))
        .collect();
    let free: Vec<usize> = (0..names.len())
        .filter(|&i| fixed[i].is_none() && !references.contains(&names[i]))
        .collect();

    if data.len() < free.len() {
        return Err(FitError::InsufficientData { required: free.len(), available: data.len() }.into());
    }
    let Some(first) = data.iter().map(|p| p.0).reduce(f64::min) else {
        log::debug!("{}: no data points, nothing to fit", model.kind());
        return Ok(());
    };

    let guess = model.initial_guess(&data);
    let mut params: Vec<f64> = (0..names.len())
        .map(|i| match fixed[i] {
            Some(value) => value,
            None if pinned.contains(&i) => first,
            None => p0.get(names[i]).copied().unwrap_or(guess[i]),
        })
        .collect();

    if free.is_empty() {
        log::debug!("{}: all parameters fixed, nothing to fit", model.kind());
        for &index in &pinned {
            model.state_mut().estimate(index, params[index]);
        }
        return Ok(());
    }

    let evaluate = |p: &[f64]| -> Vec<f64> { data.iter().map(|(x, y)| y - model.evaluate(*x, p)).collect() };

    let mut residuals = evaluate(&params);
    let mut cost = sum_of_squares(&residuals);
    if !cost.is_finite() {
        return Err(FitError::NonFinite.into());
    }

    let mut damping = config.initial_damping;
    let mut converged = cost <= config.cost_tolerance;
    let mut iterations = 0;

    while !converged && iterations < config.max_iterations {
        iterations += 1;

        let jacobian = numerical_jacobian(&evaluate, &params, &free);
        let (normal, gradient) = normal_equations(&jacobian, &residuals);

        if gradient.iter().fold(0.0f64, |m, g| m.max(g.abs())) <= config.gradient_tolerance {
            converged = true;
            break;
        }

        let mut damped = normal.clone();
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] += damping * normal[i][i].max(1e-12);
        }

        let step = match solve(damped, gradient) {
            Some(step) => step,
            None => {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break;
                }
                continue;
            }
        };

        let mut trial = params.clone();
        for (j, &index) in free.iter().enumerate() {
            trial[index] += step[j];
        }
        let trial_residuals = evaluate(&trial);
        let trial_cost = sum_of_squares(&trial_residuals);

        let step_norm = norm(&step);
        let param_norm = norm(&free.iter().map(|&i| params[i]).collect::<Vec<_>>());

        if trial_cost.is_finite() && trial_cost < cost {
            let decrease = cost - trial_cost;
            params = trial;
            residuals = trial_residuals;
            cost = trial_cost;
            damping = (damping * 0.3).max(1e-15);

            converged = cost <= config.cost_tolerance
                || decrease <= config.cost_tolerance * cost
                || step_norm <= config.step_tolerance * (param_norm + config.step_tolerance);
        } else {
            // no improvement possible from here
            if step_norm <= config.step_tolerance * (param_norm + config.step_tolerance) {
                converged = true;
                break;
            }
            damping *= 10.0;
            if damping > MAX_DAMPING {
                break;
            }
        }
    }

    if !converged {
        return Err(FitError::NonConvergence { iterations, cost }.into());
    }

    for &index in pinned.iter().chain(&free) {
        model.state_mut().estimate(index, params[index]);
    }
    log::info!(
        "Fitted {} to {} points in {} iterations (residual sum of squares {:e})",
        model.kind(),
        data.len(),
        iterations,
        cost
    );
    Ok(())
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn norm(values: &[f64]) -> f64 {
    sum_of_squares(values).sqrt()
}

/// Derivatives of the model (not the residuals) with respect to free parameters
fn numerical_jacobian<F>(residuals: &F, params: &[f64], free: &[usize]) -> Vec<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let columns: Vec<Vec<f64>> = free
        .iter()
        .map(|&index| {
            let h = 1e-6 * params[index].abs().max(1.0);
            let mut forward = params.to_vec();
            let mut backward = params.to_vec();
            forward[index] += h;
            backward[index] -= h;
            let rf = residuals(&forward);
            let rb = residuals(&backward);
            // r = y - f, so df/dp = -(dr/dp)
            rf.iter().zip(rb.iter()).map(|(a, b)| -(a - b) / (2.0 * h)).collect()
        })
        .collect();

    let rows = columns.first().map_or(0, Vec::len);
    (0..rows).map(|i| columns.iter().map(|c| c[i]).collect()).collect()
}

/// `(JᵀJ, Jᵀr)`
fn normal_equations(jacobian: &[Vec<f64>], residuals: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = jacobian.first().map_or(0, Vec::len);
    let mut normal = vec![vec![0.0; n]; n];
    let mut gradient = vec![0.0; n];
    for (row, r) in jacobian.iter().zip(residuals) {
        for i in 0..n {
            gradient[i] += row[i] * r;
            for j in 0..n {
                normal[i][j] += row[i] * row[j];
            }
        }
    }
    (normal, gradient)
}

/// Gaussian elimination with partial pivoting; `None` if singular
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TechDataError;
    use crate::growth::{
        ExponentialGrowth, GeneralizedLogisticGrowth, GompertzGrowth, LinearGrowth, LogisticGrowth,
    };
    use approx::assert_relative_eq;

    fn sample<M: GrowthModel>(model: &M, params: &[f64], years: std::ops::RangeInclusive<i32>) -> Vec<(f64, f64)> {
        years.map(|y| (y as f64, model.evaluate(y as f64, params))).collect()
    }

    fn guess(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_solve_small_system() {
        let x = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12, "x0 = {}", x[0]);
        assert!((x[1] - 1.4).abs() < 1e-12, "x1 = {}", x[1]);
        assert!(solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_linear_fit_recovers_slope_and_intercept() {
        let mut model = LinearGrowth::new();
        let data = sample(&model, &[3.0, 100.0, 2020.0], 2020..=2030);
        model.add_data(&data);
        model.fit(&BTreeMap::new()).unwrap();

        assert_eq!(model.parameter("x0"), Some(2020.0));
        assert_relative_eq!(model.parameter("m").unwrap(), 3.0, max_relative = 1e-6);
        assert_relative_eq!(model.parameter("c").unwrap(), 100.0, max_relative = 1e-6);
    }

    #[test]
    fn test_exponential_fit() {
        let mut model = ExponentialGrowth::new();
        let data = sample(&model, &[50.0, -0.04, 2020.0], 2020..=2040);
        model.add_data(&data);
        model.fit(&BTreeMap::new()).unwrap();

        assert_relative_eq!(model.parameter("A").unwrap(), 50.0, max_relative = 1e-6);
        assert_relative_eq!(model.parameter("k").unwrap(), -0.04, max_relative = 1e-6);
    }

    #[test]
    fn test_logistic_fit() {
        let mut model = LogisticGrowth::new();
        let data = sample(&model, &[200.0, 0.3, 2030.0], 2015..=2045);
        model.add_data(&data);
        model.fit(&guess(&[("L", 190.0), ("k", 0.25), ("x0", 2029.0)])).unwrap();

        assert_relative_eq!(model.parameter("L").unwrap(), 200.0, max_relative = 1e-5);
        assert_relative_eq!(model.parameter("k").unwrap(), 0.3, max_relative = 1e-5);
        assert_relative_eq!(model.parameter("x0").unwrap(), 2030.0, max_relative = 1e-6);
    }

    #[test]
    fn test_gompertz_fit() {
        let mut model = GompertzGrowth::new();
        let data = sample(&model, &[80.0, 3.0, 0.15, 2020.0], 2020..=2050);
        model.add_data(&data);
        model.fit(&guess(&[("A", 75.0), ("b", 2.5), ("k", 0.12)])).unwrap();

        assert_relative_eq!(model.parameter("A").unwrap(), 80.0, max_relative = 1e-5);
        assert_relative_eq!(model.parameter("b").unwrap(), 3.0, max_relative = 1e-5);
        assert_relative_eq!(model.parameter("k").unwrap(), 0.15, max_relative = 1e-5);
    }

    #[test]
    fn test_generalized_logistic_fit_with_fixed_shape() {
        let truth = [5.0, 105.0, 1.0, 20.0, 0.25, 1.0, 2020.0];
        let mut model = GeneralizedLogisticGrowth::new()
            .with_parameter("C", 1.0)
            .unwrap()
            .with_parameter("nu", 1.0)
            .unwrap();
        let data = sample(&model, &truth, 2020..=2050);
        model.add_data(&data);
        model
            .fit(&guess(&[("A", 4.0), ("K", 100.0), ("Q", 18.0), ("B", 0.22)]))
            .unwrap();

        assert_relative_eq!(model.parameter("A").unwrap(), 5.0, max_relative = 1e-4);
        assert_relative_eq!(model.parameter("K").unwrap(), 105.0, max_relative = 1e-5);
        assert_relative_eq!(model.parameter("Q").unwrap(), 20.0, max_relative = 1e-4);
        assert_relative_eq!(model.parameter("B").unwrap(), 0.25, max_relative = 1e-5);
        assert_eq!(model.parameter("x0"), Some(2020.0));
    }

    #[test]
    fn test_supplied_parameters_stay_fixed() {
        let mut model = LinearGrowth::new().with_parameter("m", 2.0).unwrap();
        model.add_data(&[(2020.0, 10.0), (2021.0, 13.0), (2022.0, 14.0)]);
        model.fit(&BTreeMap::new()).unwrap();
        assert_eq!(model.parameter("m"), Some(2.0));
        // least-squares intercept is the mean of y - m (x - x0) = [10, 11, 10]
        assert_relative_eq!(model.parameter("c").unwrap(), 31.0 / 3.0, max_relative = 1e-6);
    }

    #[test]
    fn test_insufficient_data() {
        let mut model = LogisticGrowth::new();
        model.add_data(&[(2020.0, 1.0), (2030.0, 2.0)]);
        match model.fit(&BTreeMap::new()) {
            Err(TechDataError::Fit(FitError::InsufficientData { required, available })) => {
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
        assert!(model.free_parameters().len() == 3);
    }

    #[test]
    fn test_refit_uses_all_accumulated_data() {
        let mut model = LinearGrowth::new();
        model.add_data(&[(2020.0, 10.0), (2021.0, 12.0)]);
        model.fit(&BTreeMap::new()).unwrap();
        assert_relative_eq!(model.parameter("m").unwrap(), 2.0, max_relative = 1e-6);

        model.add_data(&[(2022.0, 30.0), (2023.0, 40.0)]);
        model.fit(&BTreeMap::new()).unwrap();
        // ordinary least squares over all four points
        assert_relative_eq!(model.parameter("m").unwrap(), 10.8, max_relative = 1e-6);
        assert_relative_eq!(model.parameter("c").unwrap(), 6.8, max_relative = 1e-6);
        assert_eq!(model.free_parameters(), vec!["m", "c", "x0"]);
    }

    #[test]
    fn test_failed_fit_leaves_model_untouched() {
        let mut model = LinearGrowth::new();
        model.add_data(&[(2030.0, 1.0)]);
        let err = model.fit(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            TechDataError::Fit(FitError::InsufficientData { required: 2, available: 1 })
        ));
        assert_eq!(model.parameter("x0"), None);
        assert_eq!(model.free_parameters(), vec!["m", "c", "x0"]);

        // a later fit with more data still pins x0 to the earliest year
        model.add_data(&[(2020.0, 0.0)]);
        model.fit(&BTreeMap::new()).unwrap();
        assert_eq!(model.parameter("x0"), Some(2020.0));
        assert_relative_eq!(model.parameter("m").unwrap(), 0.1, max_relative = 1e-6);
    }

    #[test]
    fn test_unknown_initial_guess_name() {
        let mut model = LinearGrowth::new();
        model.add_data(&[(2020.0, 1.0), (2021.0, 2.0)]);
        let err = model.fit(&guess(&[("slope", 1.0)])).unwrap_err();
        assert!(matches!(err, TechDataError::Fit(FitError::UnknownParameter(_))));
    }

    #[test]
    fn test_non_finite_data() {
        let mut model = LinearGrowth::new();
        model.add_data(&[(2020.0, f64::NAN), (2021.0, 2.0)]);
        let err = model.fit(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, TechDataError::Fit(FitError::NonFinite)));
    }

    #[test]
    fn test_iteration_limit() {
        let mut model = LogisticGrowth::new();
        let data = sample(&model, &[200.0, 0.3, 2030.0], 2015..=2045);
        model.add_data(&data);
        let config = FitConfig { max_iterations: 1, ..FitConfig::default() };
        let err = model
            .fit_with(&guess(&[("L", 100.0), ("k", 0.05), ("x0", 2010.0)]), &config)
            .unwrap_err();
        assert!(matches!(err, TechDataError::Fit(FitError::NonConvergence { iterations: 1, .. })));
        assert!(!model.is_specified());
    }
}
