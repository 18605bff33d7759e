//! Static backend weight table.
//!
//! The table is the only state that outlives a request. Base weights sum to
//! 1.0 across the full backend set; when only a subset of backends answers,
//! their weights are renormalized so the subset again sums to 1.0.

use std::collections::HashSet;
use thiserror::Error;

/// Base weights of the reference three-backend ensemble.
pub const DEFAULT_BACKEND_WEIGHTS: [(&str, f64); 3] = [
    ("gpt-4o", 0.45),
    ("claude-3-5-sonnet", 0.40),
    ("gemini-1.5-flash", 0.15),
];

/// Allowed drift of the base weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Errors from building a weight table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Weight table is empty")]
    Empty,

    #[error("Invalid weight {weight} for backend '{backend_id}'")]
    InvalidWeight { backend_id: String, weight: f64 },

    #[error("Duplicate backend id '{0}' in weight table")]
    Duplicate(String),

    #[error("Backend weights sum to {0}, expected 1.0")]
    BadSum(f64),
}

/// Ordered `backend_id -> base_weight` table.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendWeights {
    entries: Vec<(String, f64)>,
}

impl BackendWeights {
    /// Build a validated table. Entry order is kept and breaks ties when
    /// picking the primary backend.
    pub fn new<I, S>(entries: I) -> Result<Self, WeightError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let entries: Vec<(String, f64)> = entries
            .into_iter()
            .map(|(id, weight)| (id.into(), weight))
            .collect();

        if entries.is_empty() {
            return Err(WeightError::Empty);
        }

        let mut seen = HashSet::new();
        for (id, weight) in &entries {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(WeightError::InvalidWeight {
                    backend_id: id.clone(),
                    weight: *weight,
                });
            }
            if !seen.insert(id.as_str()) {
                return Err(WeightError::Duplicate(id.clone()));
            }
        }

        let sum: f64 = entries.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(WeightError::BadSum(sum));
        }

        Ok(Self { entries })
    }

    /// Base weight for a backend, if it is in the table.
    pub fn weight_of(&self, backend_id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(id, _)| id == backend_id)
            .map(|(_, w)| *w)
    }

    /// Renormalize the base weights of `backend_ids` so they sum to 1.0.
    ///
    /// Output order matches input order. Backends missing from the table get
    /// weight 0. If every listed backend is unknown (or weighs 0), the subset
    /// is weighted equally.
    pub fn renormalize<S: AsRef<str>>(&self, backend_ids: &[S]) -> Vec<f64> {
        if backend_ids.is_empty() {
            return Vec::new();
        }

        let base: Vec<f64> = backend_ids
            .iter()
            .map(|id| {
                self.weight_of(id.as_ref()).unwrap_or_else(|| {
                    tracing::warn!(backend = id.as_ref(), "Backend missing from weight table, weighting as 0");
                    0.0
                })
            })
            .collect();

        let total: f64 = base.iter().sum();
        if total <= 0.0 {
            let equal = 1.0 / backend_ids.len() as f64;
            return vec![equal; backend_ids.len()];
        }

        base.into_iter().map(|w| w / total).collect()
    }

    /// Highest-weighted backend; the earliest entry wins ties.
    pub fn primary(&self) -> Option<&str> {
        self.primary_among(self.entries.iter().map(|(id, _)| id.as_str()))
    }

    /// Highest-weighted backend among `candidates`, in candidate order on ties.
    pub fn primary_among<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f64)> = None;
        for id in candidates {
            let weight = self.weight_of(id).unwrap_or(0.0);
            match best {
                Some((_, best_weight)) if weight <= best_weight => {}
                _ => best = Some((id, weight)),
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(id, w)| (id.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BackendWeights {
    fn default() -> Self {
        Self {
            entries: DEFAULT_BACKEND_WEIGHTS
                .iter()
                .map(|(id, w)| (id.to_string(), *w))
                .collect(),
        }
    }
}
