//! Dependency ordering of populations
//!
//! Kahn's algorithm with ties broken by declaration order: at each step
//! the earliest-declared population whose requirements are all placed
//! goes next. Requirements naming no population of the query are
//! treated as satisfied (the model rejects them at build time).

use std::fmt;

use thiserror::Error;

use super::population::Population;

/// Populations that could not be ordered because they depend on each
/// other in a loop
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CycleError {
    /// Sources left unplaced, in declaration order
    pub sources: Vec<String>,
}

impl CycleError {
    pub fn new(sources: Vec<String>) -> Self {
        Self { sources }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Population cycle among: {}", self.sources.join(", "))
    }
}

/// Indices of `populations` in execution order
pub fn topological_order(populations: &[Population]) -> Result<Vec<usize>, CycleError> {
    let known = |name: &str| populations.iter().any(|p| p.name == name);

    let mut placed = vec![false; populations.len()];
    let mut order = Vec::with_capacity(populations.len());

    while order.len() < populations.len() {
        let next = populations.iter().enumerate().position(|(i, p)| {
            !placed[i]
                && p.require.iter().all(|dep| {
                    !known(dep)
                        || populations
                            .iter()
                            .enumerate()
                            .any(|(j, q)| placed[j] && q.name == *dep)
                })
        });

        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let sources = populations
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed[*i])
                    .map(|(_, p)| p.name.clone())
                    .collect();
                return Err(CycleError::new(sources));
            }
        }
    }

    Ok(order)
}
