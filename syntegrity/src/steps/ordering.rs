//! Dependency validation and topological ordering.

use crate::core::StepConfig;
use crate::errors::EngineError;
use std::collections::{BTreeMap, HashMap};

/// Checks that every declared dependency is a key of `steps`.
///
/// # Errors
///
/// Returns `MissingDependency` for the first unknown dependency found.
pub fn validate_dependencies(steps: &BTreeMap<String, StepConfig>) -> Result<(), EngineError> {
    for (name, config) in steps {
        if let Some(missing) = config
            .depends_on
            .iter()
            .find(|dep| !steps.contains_key(dep.as_str()))
        {
            return Err(EngineError::MissingDependency {
                step: name.clone(),
                dependency: missing.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Orders steps so every dependency precedes its dependents.
///
/// Dependencies must already be validated; unknown names are skipped.
///
/// # Errors
///
/// Returns `CircularDependency` naming the step where the cycle closed.
pub fn execution_order(steps: &BTreeMap<String, StepConfig>) -> Result<Vec<String>, EngineError> {
    fn visit<'a>(
        name: &'a str,
        steps: &'a BTreeMap<String, StepConfig>,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(EngineError::CircularDependency {
                    step: name.to_string(),
                })
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        if let Some(config) = steps.get(name) {
            for dep in &config.depends_on {
                if steps.contains_key(dep.as_str()) {
                    visit(dep, steps, marks, order)?;
                }
            }
        }
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    let mut marks = HashMap::with_capacity(steps.len());
    let mut order = Vec::with_capacity(steps.len());
    for name in steps.keys() {
        visit(name, steps, &mut marks, &mut order)?;
    }
    Ok(order)
}
