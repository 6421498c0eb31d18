use serde::{Deserialize, Serialize};

/// One named parameter (credential, host, model id...) an engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequirement {
    pub name: String,
    pub description: String,
}

impl EngineRequirement {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Discovery projection of a registered engine, served by `GET /engines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub description: String,
    pub required_params: Vec<EngineRequirement>,
}
