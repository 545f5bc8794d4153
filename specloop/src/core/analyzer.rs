//! Failure classification.
//!
//! Pure and stateless: an [`ErrorContext`] in, an [`ErrorAnalysis`] out.
//! Classification is data-driven: each row of [`PATTERN_TABLE`] adds its
//! weight to one category when its pattern matches the combined
//! message+trace text; independent rows stack. The highest accumulated
//! score wins. Ties break to the category listed earliest in
//! [`KIND_PRIORITY`] (fixed declaration order, so classification is
//! reproducible). Classification never fails; an unmatched context degrades
//! to `unknown_error`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{ErrorAnalysis, ErrorContext, ErrorKind};
use crate::spec::SpecArtifact;

const ROOT_CAUSE_MAX_CHARS: usize = 200;

/// Score added to `test_failure` when a failed-test name is present and the
/// message uses test vocabulary. Resolves ambiguity such as a timeout that
/// occurred inside a test run.
const TEST_CONTEXT_BOOST: u32 = 50;

/// Tie-break order for equally scored categories.
const KIND_PRIORITY: [ErrorKind; 6] = [
    ErrorKind::TestFailure,
    ErrorKind::CompilationError,
    ErrorKind::RuntimeError,
    ErrorKind::MissingDependency,
    ErrorKind::InvalidSpec,
    ErrorKind::TimeoutError,
];

struct PatternRow {
    kind: ErrorKind,
    weight: u32,
    pattern: &'static str,
}

const fn row(kind: ErrorKind, weight: u32, pattern: &'static str) -> PatternRow {
    PatternRow {
        kind,
        weight,
        pattern,
    }
}

/// Weighted phrase patterns, matched against message+trace.
const PATTERN_TABLE: &[PatternRow] = &[
    row(ErrorKind::TestFailure, 30, r"(?i)\btests? failed\b"),
    row(ErrorKind::TestFailure, 30, r"(?i)assertion (failed|error)"),
    row(ErrorKind::TestFailure, 25, r"(?i)\bexpected\b.*\b(but|got|found|received)\b"),
    row(ErrorKind::TestFailure, 25, r"(?i)counterexample"),
    row(ErrorKind::TestFailure, 20, r"(?i)\b\d+ (passed|failed)\b"),
    row(ErrorKind::CompilationError, 40, r"error\[E\d{4}\]"),
    row(ErrorKind::CompilationError, 30, r"(?i)\bcompil(e|ation) (error|failed)\b"),
    row(ErrorKind::CompilationError, 30, r"(?i)syntax error"),
    row(ErrorKind::CompilationError, 25, r"(?i)mismatched types"),
    row(ErrorKind::CompilationError, 25, r"(?i)unresolved import"),
    row(ErrorKind::CompilationError, 20, r"(?i)cannot find (type|value|function|macro)"),
    row(ErrorKind::RuntimeError, 30, r"\bTypeError\b"),
    row(ErrorKind::RuntimeError, 30, r"\bReferenceError\b"),
    row(ErrorKind::RuntimeError, 30, r"(?i)cannot read propert(y|ies)"),
    row(ErrorKind::RuntimeError, 30, r"(?i)panicked at"),
    row(ErrorKind::RuntimeError, 25, r"(?i)null pointer|NullPointerException"),
    row(ErrorKind::RuntimeError, 25, r"(?i)index out of (bounds|range)"),
    row(ErrorKind::RuntimeError, 25, r"(?i)stack overflow"),
    row(ErrorKind::RuntimeError, 25, r"(?i)segmentation fault"),
    row(ErrorKind::RuntimeError, 20, r"(?i)is not a function"),
    row(ErrorKind::RuntimeError, 20, r"(?i)of undefined\b"),
    row(ErrorKind::MissingDependency, 40, r"(?i)cannot find module"),
    row(ErrorKind::MissingDependency, 40, r"(?i)ModuleNotFoundError"),
    row(ErrorKind::MissingDependency, 30, r"(?i)can't find crate"),
    row(ErrorKind::MissingDependency, 30, r"(?i)missing dependenc(y|ies)"),
    row(ErrorKind::MissingDependency, 25, r"(?i)no matching (package|version)"),
    row(ErrorKind::MissingDependency, 25, r"(?i)package .* not (found|installed)"),
    row(ErrorKind::InvalidSpec, 40, r"(?i)invalid spec"),
    row(ErrorKind::InvalidSpec, 30, r"(?i)malformed (spec|requirement|task)"),
    row(ErrorKind::InvalidSpec, 30, r"(?i)unknown requirement"),
    row(ErrorKind::InvalidSpec, 25, r"(?i)requirement .* not found"),
    row(ErrorKind::TimeoutError, 40, r"(?i)\btimed out\b"),
    row(ErrorKind::TimeoutError, 35, r"(?i)deadline exceeded"),
    row(ErrorKind::TimeoutError, 35, r"ETIMEDOUT"),
    row(ErrorKind::TimeoutError, 25, r"(?i)exceeded.{0,40}time ?limit"),
];

static COMPILED_TABLE: LazyLock<Vec<(ErrorKind, u32, Regex)>> = LazyLock::new(|| {
    PATTERN_TABLE
        .iter()
        .map(|entry| {
            let regex = Regex::new(entry.pattern).expect("pattern table entry should be valid");
            (entry.kind, entry.weight, regex)
        })
        .collect()
});

static TEST_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(test|spec|assert|expect|should)\b").expect("test vocabulary pattern")
});

static SOURCE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w./-]+\.[A-Za-z]{1,4}:\d+(?::\d+)?)").expect("source location pattern")
});

static REQUIREMENT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)requirement\s+([A-Za-z0-9._-]+)").expect("requirement ref pattern")
});

static PROPERTY_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)property\s+([A-Za-z0-9._-]+)").expect("property ref pattern")
});

/// Classify a failure context.
pub fn analyze(context: &ErrorContext) -> ErrorAnalysis {
    let haystack = format!("{}\n{}", context.message, context.trace);
    let kind = classify(context, &haystack);

    ErrorAnalysis {
        kind,
        root_cause: extract_root_cause(kind, context),
        target: target_artifact(kind, context),
        confidence: confidence(kind, context),
        requirement_ref: capture(&REQUIREMENT_REF, &haystack),
        property_ref: capture(&PROPERTY_REF, &haystack),
        source_location: capture(&SOURCE_LOCATION, &haystack),
        suggestion: suggestion(kind),
    }
}

fn classify(context: &ErrorContext, haystack: &str) -> ErrorKind {
    let mut scores = [0u32; KIND_PRIORITY.len()];
    for (kind, weight, regex) in COMPILED_TABLE.iter() {
        if regex.is_match(haystack) {
            scores[priority_index(*kind)] += weight;
        }
    }
    if context.failed_test.is_some() && TEST_VOCABULARY.is_match(&context.message) {
        scores[priority_index(ErrorKind::TestFailure)] += TEST_CONTEXT_BOOST;
    }

    // Strict comparison keeps the earliest category on ties.
    let mut best = ErrorKind::UnknownError;
    let mut best_score = 0u32;
    for (index, kind) in KIND_PRIORITY.iter().enumerate() {
        if scores[index] > best_score {
            best = *kind;
            best_score = scores[index];
        }
    }
    best
}

fn priority_index(kind: ErrorKind) -> usize {
    KIND_PRIORITY
        .iter()
        .position(|candidate| *candidate == kind)
        .expect("every scored kind appears in KIND_PRIORITY")
}

/// Fixed category-to-artifact table.
fn target_artifact(kind: ErrorKind, context: &ErrorContext) -> SpecArtifact {
    match kind {
        ErrorKind::TestFailure | ErrorKind::CompilationError => SpecArtifact::Design,
        ErrorKind::RuntimeError | ErrorKind::TimeoutError | ErrorKind::UnknownError => {
            SpecArtifact::Tasks
        }
        ErrorKind::MissingDependency => SpecArtifact::Requirements,
        ErrorKind::InvalidSpec => {
            if context.message.to_lowercase().contains("requirement") {
                SpecArtifact::Requirements
            } else {
                SpecArtifact::Design
            }
        }
    }
}

/// Additive advisory confidence, capped at 100.
fn confidence(kind: ErrorKind, context: &ErrorContext) -> u8 {
    let mut score = 30u32;
    if context.failed_test.is_some() {
        score += 20;
    }
    if context.message.len() > 20 {
        score += 10;
    }
    if !context.trace.is_empty() {
        score += 10;
    }
    if kind != ErrorKind::UnknownError {
        score += 20;
    }
    score.min(100) as u8
}

/// Category-specific text mining into a single truncated sentence.
fn extract_root_cause(kind: ErrorKind, context: &ErrorContext) -> String {
    let cause = match kind {
        ErrorKind::TestFailure => test_failure_cause(context),
        ErrorKind::CompilationError => compiler_diagnostic_line(context),
        ErrorKind::MissingDependency => missing_dependency_cause(context),
        ErrorKind::TimeoutError => timeout_cause(context),
        ErrorKind::RuntimeError | ErrorKind::InvalidSpec => first_line(&context.message),
        ErrorKind::UnknownError => {
            let line = first_line(&context.message);
            if line.is_empty() {
                "unclassified failure".to_string()
            } else {
                line
            }
        }
    };
    truncate_chars(&cause, ROOT_CAUSE_MAX_CHARS)
}

fn test_failure_cause(context: &ErrorContext) -> String {
    static ASSERTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?im)^.*(assert|expected|counterexample).*$").expect("assertion pattern")
    });
    let detail = ASSERTION_LINE
        .find(&format!("{}\n{}", context.message, context.trace))
        .map(|found| found.as_str().trim().to_string())
        .unwrap_or_else(|| first_line(&context.message));
    match &context.failed_test {
        Some(name) => format!("test '{}' failed: {}", name, detail),
        None => detail,
    }
}

fn compiler_diagnostic_line(context: &ErrorContext) -> String {
    static DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^.*error(\[E\d{4}\])?:.*$").expect("diagnostic pattern")
    });
    DIAGNOSTIC
        .find(&format!("{}\n{}", context.message, context.trace))
        .map(|found| found.as_str().trim().to_string())
        .unwrap_or_else(|| first_line(&context.message))
}

fn missing_dependency_cause(context: &ErrorContext) -> String {
    static NAME: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(?:module|crate|package|dependency)\s+['"`]?([\w@/.-]+)"#)
            .expect("dependency name pattern")
    });
    match capture(&NAME, &context.message) {
        Some(name) => format!("missing dependency '{}'", name.trim_end_matches(['\'', '"'])),
        None => first_line(&context.message),
    }
}

fn timeout_cause(context: &ErrorContext) -> String {
    static DURATION: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(\d+)\s*(ms|s|secs?|seconds?|m|mins?|minutes?)\b")
            .expect("duration pattern")
    });
    match DURATION.find(&context.message) {
        Some(found) => format!("execution timed out after {}", found.as_str()),
        None => "execution timed out".to_string(),
    }
}

fn suggestion(kind: ErrorKind) -> Option<String> {
    let text = match kind {
        ErrorKind::TestFailure => "revise the design property the failing test exercises",
        ErrorKind::CompilationError => "align the design's interfaces with the emitted diagnostics",
        ErrorKind::RuntimeError => "tighten the task's steps around the failing operation",
        ErrorKind::MissingDependency => "declare the dependency in the requirements",
        ErrorKind::InvalidSpec => "repair the malformed spec section",
        ErrorKind::TimeoutError => "split the task or relax its expected scope",
        ErrorKind::UnknownError => return None,
    };
    Some(text.to_string())
}

fn capture(regex: &Regex, haystack: &str) -> Option<String> {
    regex
        .captures(haystack)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|group| group.as_str().to_string())
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::error_context;

    /// Compiler diagnostics always classify as compilation errors with
    /// confidence of at least 50.
    #[test]
    fn compiler_diagnostic_classifies_with_confidence() {
        let context = error_context("1.1", "error[E0308]: mismatched types");
        let analysis = analyze(&context);
        assert_eq!(analysis.kind, ErrorKind::CompilationError);
        assert!(analysis.confidence >= 50);
        assert_eq!(analysis.target, SpecArtifact::Design);
        assert!(analysis.root_cause.contains("E0308"));
    }

    /// The spec scenario: a property-access failure on task "2.3".
    #[test]
    fn runtime_error_targets_tasks() {
        let context = error_context("2.3", "TypeError: Cannot read property 'x' of undefined");
        let analysis = analyze(&context);
        assert_eq!(analysis.kind, ErrorKind::RuntimeError);
        assert_eq!(analysis.target, SpecArtifact::Tasks);
        assert!(analysis.confidence >= 50);
    }

    #[test]
    fn unmatched_context_degrades_to_unknown() {
        let context = error_context("1", "something odd happened");
        let analysis = analyze(&context);
        assert_eq!(analysis.kind, ErrorKind::UnknownError);
        assert_eq!(analysis.target, SpecArtifact::Tasks);
        assert!(analysis.suggestion.is_none());
    }

    /// A failed-test name plus test vocabulary outweighs a timeout pattern.
    #[test]
    fn failed_test_boost_resolves_timeout_ambiguity() {
        let mut context = error_context("1", "test checkout_flow timed out");
        context.failed_test = Some("checkout_flow".to_string());
        let analysis = analyze(&context);
        assert_eq!(analysis.kind, ErrorKind::TestFailure);

        // Without the failed-test name, the same message is a timeout.
        let plain = error_context("1", "operation timed out after 30s");
        assert_eq!(analyze(&plain).kind, ErrorKind::TimeoutError);
    }

    #[test]
    fn missing_dependency_targets_requirements() {
        let context = error_context("1", "Cannot find module 'left-pad'");
        let analysis = analyze(&context);
        assert_eq!(analysis.kind, ErrorKind::MissingDependency);
        assert_eq!(analysis.target, SpecArtifact::Requirements);
        assert!(analysis.root_cause.contains("left-pad"));
    }

    #[test]
    fn invalid_spec_target_depends_on_message() {
        let req = error_context("1", "invalid spec: unknown requirement 7 referenced");
        assert_eq!(analyze(&req).target, SpecArtifact::Requirements);

        let design = error_context("1", "invalid spec: malformed task list");
        assert_eq!(analyze(&design).target, SpecArtifact::Design);
    }

    #[test]
    fn root_cause_is_truncated_to_200_chars() {
        let long = format!("error[E0308]: {}", "x".repeat(400));
        let context = error_context("1", &long);
        let analysis = analyze(&context);
        assert_eq!(analysis.root_cause.chars().count(), 200);
    }

    #[test]
    fn confidence_is_additive_and_capped() {
        let mut context = error_context("1", "assertion failed: expected 2 but got 3");
        context.trace = "at tests/flow.rs:42".to_string();
        context.failed_test = Some("flow_works".to_string());
        let analysis = analyze(&context);
        // 30 base + 20 failed test + 10 long message + 10 trace + 20 known kind.
        assert_eq!(analysis.confidence, 90);
        assert_eq!(
            analysis.source_location.as_deref(),
            Some("tests/flow.rs:42")
        );
    }

    #[test]
    fn context_bag_mines_requirement_reference() {
        let context = error_context("1", "invalid spec: requirement R3 not found");
        let analysis = analyze(&context);
        assert_eq!(analysis.requirement_ref.as_deref(), Some("R3"));
    }
}
