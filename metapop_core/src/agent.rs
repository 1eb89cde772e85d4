//! Agent sum type stored in the distributed graph.

use crate::city::City;
use crate::disease::Disease;
use metapop_env::LayerId;
use serde::{Deserialize, Serialize};

/// Migration edges between cities.
pub const CITY_TO_CITY: LayerId = LayerId(0);

/// Binding edge from a disease to its city.
pub const DISEASE_TO_CITY: LayerId = LayerId(1);

/// Agent group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    City,
    Disease,
}

/// Every agent of the SIR model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SirAgent {
    City(City),
    Disease(Disease),
}

impl SirAgent {
    /// Returns the agent group. Never changes over an agent's life.
    pub fn kind(&self) -> AgentKind {
        match self {
            SirAgent::City(_) => AgentKind::City,
            SirAgent::Disease(_) => AgentKind::Disease,
        }
    }

    pub fn is_city(&self) -> bool {
        matches!(self, SirAgent::City(_))
    }

    pub fn as_city(&self) -> Option<&City> {
        match self {
            SirAgent::City(city) => Some(city),
            SirAgent::Disease(_) => None,
        }
    }

    pub fn as_city_mut(&mut self) -> Option<&mut City> {
        match self {
            SirAgent::City(city) => Some(city),
            SirAgent::Disease(_) => None,
        }
    }

    pub fn as_disease(&self) -> Option<&Disease> {
        match self {
            SirAgent::Disease(disease) => Some(disease),
            SirAgent::City(_) => None,
        }
    }
}

impl From<City> for SirAgent {
    fn from(city: City) -> Self {
        SirAgent::City(city)
    }
}

impl From<Disease> for SirAgent {
    fn from(disease: Disease) -> Self {
        SirAgent::Disease(disease)
    }
}
