//! What a virtual sensor is and what its graph looks like

use serde::{Deserialize, Serialize};
use ssp_core::{Graph, Query, RDF_TYPE, ResourceIdentity, Result, SspError, Term};

pub const SSN: &str = "http://purl.oclc.org/NET/ssnx/ssn#";

/// Name of the query variable whose first binding becomes the sensor value.
pub const VALUE_VARIABLE: &str = "val";

/// A computed resource: its value is the first `?val` binding of `query`
/// evaluated over everything currently cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualSensorDefinition {
    /// Fragment of the sensor's identity, `<base>/vs#<name>`.
    pub name: String,
    pub sensor_type: String,
    pub feature_of_interest: String,
    pub observed_property: String,
    pub query: String,
}

impl VirtualSensorDefinition {
    /// Reject unusable names, non-IRI references and queries that do not parse.
    pub fn validate(&self) -> Result<Query> {
        let name_ok = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !name_ok {
            return Err(SspError::InvalidIdentity(format!("virtual sensor name {:?}", self.name)));
        }
        for iri in [&self.sensor_type, &self.feature_of_interest, &self.observed_property] {
            ResourceIdentity::parse(iri.as_str())?;
        }
        Query::parse(&self.query)
    }

    /// SSN description of the sensor with one observation carrying `value`.
    pub fn observation_graph(&self, sensor: &ResourceIdentity, value: Term) -> Graph {
        let sensor_iri = Term::iri(sensor.as_str());
        let property = Term::iri(&self.observed_property);
        let feature = Term::iri(&self.feature_of_interest);
        let observation = Term::blank(format!("{}-observation", self.name));
        let result = Term::blank(format!("{}-result", self.name));
        let ssn = |local: &str| Term::iri(format!("{}{}", SSN, local));
        let rdf_type = Term::iri(RDF_TYPE);

        let mut graph = Graph::new();
        graph.insert(sensor_iri.clone(), rdf_type.clone(), Term::iri(&self.sensor_type));
        graph.insert(sensor_iri.clone(), ssn("observes"), property.clone());
        graph.insert(sensor_iri.clone(), ssn("madeObservation"), observation.clone());

        graph.insert(observation.clone(), rdf_type.clone(), ssn("Observation"));
        graph.insert(observation.clone(), ssn("featureOfInterest"), feature.clone());
        graph.insert(observation.clone(), ssn("observedProperty"), property.clone());
        graph.insert(observation, ssn("observationResult"), result.clone());

        graph.insert(result.clone(), rdf_type, ssn("SensorOutput"));
        graph.insert(result.clone(), ssn("isProducedBy"), sensor_iri);
        graph.insert(result, ssn("hasValue"), value.clone());

        // Shortcut statement so queries can read the value off the feature directly.
        graph.insert(feature, property, value);
        graph
    }
}
