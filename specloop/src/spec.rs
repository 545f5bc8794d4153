//! Parsed specification types.
//!
//! The markdown-to-structure parser is an external collaborator; this crate
//! consumes its structured output (`spec.json` in the spec directory) and the
//! three fixed-name artifact files it was derived from.

use serde::{Deserialize, Serialize};

use crate::tasks::Task;

/// A numbered requirement with its acceptance criteria.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

/// A design property the implementation must uphold.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    pub id: String,
    pub statement: String,
}

/// Structured output of the external spec parser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedSpec {
    pub feature_name: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl ParsedSpec {
    pub fn requirement(&self, id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|req| req.id == id)
    }

    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|prop| prop.id == id)
    }
}

/// The three fixed spec artifacts a correction may target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecArtifact {
    Requirements,
    Design,
    Tasks,
}

impl SpecArtifact {
    pub const ALL: [SpecArtifact; 3] = [
        SpecArtifact::Requirements,
        SpecArtifact::Design,
        SpecArtifact::Tasks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SpecArtifact::Requirements => "requirements",
            SpecArtifact::Design => "design",
            SpecArtifact::Tasks => "tasks",
        }
    }

    /// Fixed file name inside the spec directory.
    pub fn file_name(self) -> &'static str {
        match self {
            SpecArtifact::Requirements => "requirements.md",
            SpecArtifact::Design => "design.md",
            SpecArtifact::Tasks => "tasks.md",
        }
    }
}
