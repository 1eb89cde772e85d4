//! City graph generators.
//!
//! Two generators share the same degree model: each node draws its
//! out-degree from a Poisson distribution and links to that many distinct
//! other nodes.
//! - **Uniform**: targets drawn uniformly among all other nodes
//! - **Clustered**: nodes get random 2D locations and nearby targets are
//!   favored, which gives spatially correlated connectivity
//!
//! A draw larger than the number of other nodes saturates: the node links
//! to every other node and is recorded in [`Topology::saturated`].

use crate::error::CoreError;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default side of the square clustered locations are drawn from.
pub const DEFAULT_EXTENT: f64 = 1000.0;

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance.
    pub fn distance(&self, other: &Location) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Poisson out-degree distribution.
#[derive(Debug, Clone)]
pub struct PoissonDegree {
    mean: f64,

    /// `None` when the mean is zero (every draw is 0)
    distribution: Option<Poisson<f64>>,
}

impl PoissonDegree {
    /// Creates the distribution. The mean must be finite and non-negative.
    pub fn new(mean: f64) -> Result<Self, CoreError> {
        if !mean.is_finite() || mean < 0.0 {
            return Err(CoreError::invalid(format!("degree mean must be finite and >= 0, got {}", mean)));
        }
        let distribution = if mean == 0.0 {
            None
        } else {
            Some(Poisson::new(mean).map_err(|e| CoreError::invalid(e.to_string()))?)
        };
        Ok(Self { mean, distribution })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Draws one out-degree.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match &self.distribution {
            Some(poisson) => poisson.sample(rng) as usize,
            None => 0,
        }
    }
}

/// A generated directed graph over nodes `0..node_count`.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    node_count: usize,

    /// Directed (source, target) pairs, grouped by source
    edges: Vec<(usize, usize)>,

    /// Node locations, for generators that place nodes
    locations: Option<Vec<Location>>,

    /// Nodes whose degree draw exceeded the available targets
    saturated: Vec<usize>,
}

impl Topology {
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn locations(&self) -> Option<&[Location]> {
        self.locations.as_deref()
    }

    pub fn saturated(&self) -> &[usize] {
        &self.saturated
    }

    /// Out-degree of every node.
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.node_count];
        for &(source, _) in &self.edges {
            degrees[source] += 1;
        }
        degrees
    }

    /// Mean out-degree (0 for an empty graph).
    pub fn mean_out_degree(&self) -> f64 {
        if self.node_count == 0 {
            return 0.0;
        }
        self.edges.len() as f64 / self.node_count as f64
    }

    /// Mean Euclidean length of the edges under `locations`.
    ///
    /// `None` if there are no edges or `locations` does not cover every node.
    pub fn mean_edge_length(&self, locations: &[Location]) -> Option<f64> {
        if self.edges.is_empty() || locations.len() != self.node_count {
            return None;
        }
        let total: f64 = self
            .edges
            .iter()
            .map(|&(source, target)| locations[source].distance(&locations[target]))
            .sum();
        Some(total / self.edges.len() as f64)
    }
}

/// Builds a topology over `node_count` nodes.
pub trait GraphGenerator {
    fn generate<R: Rng + ?Sized>(&self, node_count: usize, rng: &mut R) -> Result<Topology, CoreError>;
}

/// Clamps a degree draw to the available targets, recording saturation.
fn realized_degree(node: usize, drawn: usize, available: usize, saturated: &mut Vec<usize>) -> usize {
    if drawn > available {
        debug!(node, drawn, available, "Degree draw saturated, linking to all other nodes");
        saturated.push(node);
        available
    } else {
        drawn
    }
}

/// Uniform random graph with Poisson out-degrees.
#[derive(Debug, Clone)]
pub struct UniformGenerator {
    degree: PoissonDegree,
}

impl UniformGenerator {
    pub fn new(degree: PoissonDegree) -> Self {
        Self { degree }
    }
}

impl GraphGenerator for UniformGenerator {
    fn generate<R: Rng + ?Sized>(&self, node_count: usize, rng: &mut R) -> Result<Topology, CoreError> {
        let available = node_count.saturating_sub(1);
        let mut edges = Vec::new();
        let mut saturated = Vec::new();

        for node in 0..node_count {
            let drawn = self.degree.sample(rng);
            let degree = realized_degree(node, drawn, available, &mut saturated);

            // Indices over the other nodes, shifted past `node` to skip the self loop
            for index in rand::seq::index::sample(rng, available, degree) {
                let target = if index >= node { index + 1 } else { index };
                edges.push((node, target));
            }
        }

        Ok(Topology {
            node_count,
            edges,
            locations: None,
            saturated,
        })
    }
}

/// Spatially clustered graph with Poisson out-degrees.
///
/// Targets are sampled without replacement with weight `1 / max(d, 1)²`
/// (Efraimidis-Spirakis keys `ln(u) / w`, highest keys win).
#[derive(Debug, Clone)]
pub struct ClusteredGenerator {
    degree: PoissonDegree,

    /// Side of the square locations are drawn from
    extent: f64,
}

impl ClusteredGenerator {
    /// Creates a generator placing nodes in `[0, DEFAULT_EXTENT]²`.
    pub fn new(degree: PoissonDegree) -> Self {
        Self {
            degree,
            extent: DEFAULT_EXTENT,
        }
    }

    /// Uses a `[0, extent]²` square instead of the default.
    pub fn with_extent(mut self, extent: f64) -> Result<Self, CoreError> {
        if !extent.is_finite() || extent <= 0.0 {
            return Err(CoreError::invalid(format!("extent must be finite and > 0, got {}", extent)));
        }
        self.extent = extent;
        Ok(self)
    }

    /// Draws `node_count` uniform locations.
    pub fn random_locations<R: Rng + ?Sized>(&self, node_count: usize, rng: &mut R) -> Vec<Location> {
        (0..node_count)
            .map(|_| Location::new(rng.gen_range(0.0..self.extent), rng.gen_range(0.0..self.extent)))
            .collect()
    }

    /// Builds the graph over an existing set of locations.
    pub fn generate_with_locations<R: Rng + ?Sized>(&self, locations: Vec<Location>, rng: &mut R) -> Topology {
        let node_count = locations.len();
        let available = node_count.saturating_sub(1);
        let mut edges = Vec::new();
        let mut saturated = Vec::new();

        for node in 0..node_count {
            let drawn = self.degree.sample(rng);
            let degree = realized_degree(node, drawn, available, &mut saturated);
            if degree == 0 {
                continue;
            }

            let origin = locations[node];
            let mut keyed: Vec<(f64, usize)> = (0..node_count)
                .filter(|&other| other != node)
                .map(|other| {
                    let d = origin.distance(&locations[other]).max(1.0);
                    let weight = 1.0 / (d * d);
                    (rng.gen::<f64>().ln() / weight, other)
                })
                .collect();
            keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

            edges.extend(keyed.into_iter().take(degree).map(|(_, target)| (node, target)));
        }

        Topology {
            node_count,
            edges,
            locations: Some(locations),
            saturated,
        }
    }
}

impl GraphGenerator for ClusteredGenerator {
    fn generate<R: Rng + ?Sized>(&self, node_count: usize, rng: &mut R) -> Result<Topology, CoreError> {
        let locations = self.random_locations(node_count, rng);
        Ok(self.generate_with_locations(locations, rng))
    }
}
