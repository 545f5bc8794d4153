//! Structural validation of spec artifact content.
//!
//! Replacement documents are whole artifacts, so validation is shape-level:
//! every artifact must be non-empty structured text, and strict mode adds a
//! minimal per-artifact schema. Returns stable error strings (empty on
//! success), never panics.

use std::sync::LazyLock;

use regex::Regex;

use crate::spec::SpecArtifact;

static ANY_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").expect("heading pattern"));

static NUMBERED_REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^#{2,4}\s*Requirement\s+\d+").expect("requirement section pattern")
});

static ACCEPTANCE_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^#{2,5}\s*Acceptance Criteria").expect("acceptance section pattern")
});

static MAJOR_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,2}\s+\S").expect("major heading pattern"));

static TASK_CHECKBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*-\s*\[(?: |x|X)\]\s*\d+(?:\.\d+)*").expect("task checkbox pattern")
});

/// Validate artifact content. Strict mode adds the per-artifact schema.
pub fn validate_artifact(artifact: SpecArtifact, content: &str, strict: bool) -> Vec<String> {
    let mut errors = Vec::new();

    if content.trim().is_empty() {
        errors.push(format!("{} content must not be empty", artifact.as_str()));
        return errors;
    }
    if !ANY_HEADING.is_match(content) {
        errors.push(format!(
            "{} content must contain at least one heading",
            artifact.as_str()
        ));
    }
    if !strict {
        return errors;
    }

    match artifact {
        SpecArtifact::Requirements => {
            if !NUMBERED_REQUIREMENT.is_match(content) {
                errors.push(
                    "requirements must contain at least one numbered requirement section"
                        .to_string(),
                );
            }
            if !ACCEPTANCE_SECTION.is_match(content) {
                errors.push("requirements must contain an acceptance criteria section".to_string());
            }
        }
        SpecArtifact::Design => {
            if !MAJOR_HEADING.is_match(content) {
                errors.push("design must contain at least one major heading".to_string());
            }
        }
        SpecArtifact::Tasks => {
            if !TASK_CHECKBOX.is_match(content) {
                errors.push(
                    "tasks must contain at least one checkbox-marked numbered line".to_string(),
                );
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_REQUIREMENTS: &str = "# Requirements\n\n\
        ## Requirement 1: Ordering\n\nTasks run in document order.\n\n\
        #### Acceptance Criteria\n\n- Order matches the document.\n";

    #[test]
    fn empty_content_is_rejected() {
        let errors = validate_artifact(SpecArtifact::Design, "  \n ", true);
        assert_eq!(errors, vec!["design content must not be empty".to_string()]);
    }

    #[test]
    fn requirements_schema_needs_numbered_section_and_acceptance() {
        assert!(validate_artifact(SpecArtifact::Requirements, GOOD_REQUIREMENTS, true).is_empty());

        let errors = validate_artifact(
            SpecArtifact::Requirements,
            "# Requirements\n\nSome prose.\n",
            true,
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("numbered requirement"));
        assert!(errors[1].contains("acceptance criteria"));
    }

    #[test]
    fn design_schema_needs_major_heading() {
        assert!(validate_artifact(SpecArtifact::Design, "## Overview\n\nText.\n", true).is_empty());
        let errors = validate_artifact(SpecArtifact::Design, "### Minor only\n\nText.\n", true);
        assert_eq!(errors, vec!["design must contain at least one major heading".to_string()]);
    }

    #[test]
    fn tasks_schema_needs_checkbox_numbered_line() {
        let good = "# Tasks\n\n- [ ] 1. Do the thing\n  - [x] 1.1. Done already\n";
        assert!(validate_artifact(SpecArtifact::Tasks, good, true).is_empty());

        let errors = validate_artifact(SpecArtifact::Tasks, "# Tasks\n\n- plain bullet\n", true);
        assert_eq!(
            errors,
            vec!["tasks must contain at least one checkbox-marked numbered line".to_string()]
        );
    }

    #[test]
    fn lenient_mode_only_checks_shape() {
        let loose = "# Anything\n\nUnstructured but headed.\n";
        assert!(validate_artifact(SpecArtifact::Requirements, loose, false).is_empty());
        assert!(!validate_artifact(SpecArtifact::Requirements, loose, true).is_empty());
    }
}
