//! # Scenario
//! Evaluation items as the scenario layer hands them to the adapter.
//!
//! An [Instance] is an input with an ordered list of [Reference]s. A reference tagged with [CORRECT_TAG] is a
//! ground-truth answer. Instances are marked with a [Split] so the adapter can tell in-context training material from
//! the items under evaluation.

use serde::{Deserialize, Serialize};

/// Tag marking a reference as a ground-truth answer.
pub const CORRECT_TAG: &str = "correct";

/// Which partition of the scenario an instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Pool of in-context examples.
    Train,
    Valid,
    #[default]
    Test,
}

/// A candidate output of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub output: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Reference {
    pub fn new(output: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            output: output.into(),
            tags,
        }
    }

    /// A reference tagged with [CORRECT_TAG].
    pub fn correct(output: impl Into<String>) -> Self {
        Self::new(output, vec![CORRECT_TAG.to_string()])
    }

    /// A reference without tags.
    pub fn incorrect(output: impl Into<String>) -> Self {
        Self::new(output, Vec::new())
    }

    #[inline]
    pub fn is_correct(&self) -> bool {
        self.tags.iter().any(|tag| tag == CORRECT_TAG)
    }
}

/// An evaluation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub input: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub split: Split,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Instance {
    /// Create an instance in the [Split::Test] split.
    pub fn new(input: impl Into<String>, references: Vec<Reference>) -> Self {
        Self {
            input: input.into(),
            references,
            split: Split::default(),
            id: None,
        }
    }

    pub fn with_split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The first reference tagged as correct, if any.
    pub fn first_correct_reference(&self) -> Option<&Reference> {
        self.references.iter().find(|reference| reference.is_correct())
    }
}

#[cfg(test)]
mod test_scenario {
    use super::{Instance, Reference, Split};

    #[test]
    fn test_first_correct_reference() {
        let instance = Instance::new(
            "2 + 2 =",
            vec![Reference::incorrect("3"), Reference::correct("4"), Reference::correct("four")],
        );
        assert_eq!("4", instance.first_correct_reference().unwrap().output);
        assert!(Instance::new("?", vec![Reference::incorrect("x")]).first_correct_reference().is_none());
    }

    #[test]
    fn test_deserialize_defaults() {
        let instance: Instance = serde_json::from_str(
            r#"{"input": "say yes", "references": [{"output": "yes", "tags": ["correct"]}]}"#,
        ).unwrap();
        assert_eq!(Split::Test, instance.split);
        assert!(instance.references[0].is_correct());
        assert_eq!(None, instance.id);

        let instance: Instance = serde_json::from_str(r#"{"input": "x", "split": "train"}"#).unwrap();
        assert_eq!(Split::Train, instance.split);
        assert!(instance.references.is_empty());
    }
}
