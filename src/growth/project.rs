//! Projection of a technology's parameters with a growth model

use crate::collection::TechnologyCollection;
use crate::error::{Result, TechDataError};
use crate::technology::Technology;
use super::{GrowthModel, ModelRegistry, ModelSpec, Year};

/// Project `affected` parameters of `technology` to each of `years`
///
/// Each affected parameter is scaled by `f(year) / f(base_year)`, where the
/// base year is the technology's year. Parameters not named in `affected`
/// are carried over unchanged. The result holds the original technology
/// followed by one snapshot per year, in the order given.
pub fn project_with_model(
    technology: &Technology,
    model: ModelSpec,
    affected: &[&str],
    years: &[Year],
) -> Result<TechnologyCollection> {
    project_with_registry(technology, model, affected, years, &ModelRegistry::default())
}

pub fn project_with_registry(
    technology: &Technology,
    model: ModelSpec,
    affected: &[&str],
    years: &[Year],
    registry: &ModelRegistry,
) -> Result<TechnologyCollection> {
    let years: Vec<i32> = years.iter().map(Year::resolve).collect::<Result<_>>()?;

    let mut model: Box<dyn GrowthModel> = match model {
        ModelSpec::Named { name, kwargs } => registry.instantiate(&name, &kwargs)?,
        ModelSpec::Instance(instance) => instance,
    };

    let base_year = technology.year();
    model.anchor(base_year as f64);
    if !model.free_parameters().is_empty() && !model.data_points().is_empty() {
        model.fit_with(&Default::default(), registry.fit_config())?;
    }

    let base_value = model.project(base_year as f64)?;
    if base_value == 0.0 || !base_value.is_finite() {
        return Err(TechDataError::State(format!(
            "{} evaluates to {} at base year {}, cannot scale parameters",
            model.kind(),
            base_value,
            base_year
        )));
    }

    let mut snapshots = Vec::with_capacity(years.len() + 1);
    snapshots.push(technology.clone());

    for year in years {
        let factor = model.project(year as f64)? / base_value;
        let mut parameters = technology.parameters().clone();
        for name in affected {
            match parameters.get(*name) {
                Some(parameter) => {
                    let projected = parameter.scale(factor).with_provenance(format!(
                        "Projected from {} to {} with {}",
                        base_year,
                        year,
                        model.kind()
                    ));
                    parameters.insert(name.to_string(), projected);
                }
                None => log::debug!("{} has no parameter '{}' to project, skipping", technology, name),
            }
        }
        snapshots.push(technology.at_year(year).with_parameters(parameters));
    }

    log::info!(
        "Projected {} parameter(s) of {} to {} year(s) with {}",
        affected.len(),
        technology,
        snapshots.len() - 1,
        model.kind()
    );
    Ok(TechnologyCollection::new(snapshots))
}
