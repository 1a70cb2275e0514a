//! Content classification heuristics.
//!
//! `ContentDetector::analyze` is a pure function from content to a
//! [`Classification`]: no side effects, no I/O, total over any string input.
//! Each category accumulates a score from an ordered signature table; the
//! data-interchange category additionally gets a strong bonus when the
//! content round-trips through structured parsing. Ties and empty input
//! default to markup.
//!
//! `fallback_kind` is the cut-down ordered chain used when no detector is
//! injected; it can misfile ambiguous content as a component script, which
//! is deliberate — a wrong-but-rendered artifact beats a rejected one.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use renderbox_sandbox::ArtifactKind;

/// Declared artifact type, or a request for auto-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Auto,
    Declared(ArtifactKind),
}

impl std::str::FromStr for TypeHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(TypeHint::Auto),
            "markup" => Ok(TypeHint::Declared(ArtifactKind::Markup)),
            "component" => Ok(TypeHint::Declared(ArtifactKind::Component)),
            "markdown" => Ok(TypeHint::Declared(ArtifactKind::Markdown)),
            "code" => Ok(TypeHint::Declared(ArtifactKind::Code)),
            "json" => Ok(TypeHint::Declared(ArtifactKind::Json)),
            other => Err(format!("unknown artifact type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Safe,
    Warning,
    Dangerous,
}

/// Security assessment of a piece of content.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub level: SecurityLevel,
    /// Dangerous findings (executable or injection constructs).
    pub issues: Vec<String>,
    /// Lesser findings (embeds, network, storage, external links).
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Tiny,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SizeInfo {
    pub bytes: usize,
    pub category: SizeCategory,
}

/// Result of analyzing a piece of content.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub kind: ArtifactKind,
    pub complexity: Complexity,
    pub features: Vec<&'static str>,
    pub security: SecurityReport,
    pub size: SizeInfo,
    pub optimizations: Vec<&'static str>,
    /// Pattern-match confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Stateless classification handle, injected into renderers.
#[derive(Debug, Clone, Default)]
pub struct ContentDetector;

impl ContentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify content. Total: never fails on any string input.
    pub fn analyze(&self, content: &str) -> Classification {
        let size = size_info(content);

        if content.trim().is_empty() {
            return Classification {
                kind: ArtifactKind::Markup,
                complexity: Complexity::Low,
                features: Vec::new(),
                security: SecurityReport {
                    level: SecurityLevel::Safe,
                    issues: Vec::new(),
                    warnings: Vec::new(),
                },
                size,
                optimizations: Vec::new(),
                confidence: 0.0,
            };
        }

        let json_roundtrip = parses_as_json(content);
        let (kind, matched, total) = best_category(content, json_roundtrip);

        let complexity = complexity_of(content);
        let features = features_of(content);
        let security = security_of(content);
        let optimizations = optimizations_for(size.category, complexity, &features);
        let confidence = confidence_of(content, kind, matched, total, json_roundtrip);

        Classification {
            kind,
            complexity,
            features,
            security,
            size,
            optimizations,
            confidence,
        }
    }
}

/// Ordered fallback used when no detector is available.
///
/// Fixed markup prologue, then a language-import signature, then
/// heading/emphasis markers, then a `def`+colon signature; everything else
/// is treated as a component script.
pub fn fallback_kind(content: &str) -> ArtifactKind {
    let trimmed = content.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return ArtifactKind::Markup;
    }
    static REACT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"import\s+React|from\s+['"]react['"]"#).expect("valid regex")
    });
    if REACT_IMPORT.is_match(content) {
        return ArtifactKind::Component;
    }
    static MARKDOWN_MARKS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s|\*\*[^*]+\*\*").expect("valid regex"));
    if MARKDOWN_MARKS.is_match(content) {
        return ArtifactKind::Markdown;
    }
    static DEF_COLON: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*:").expect("valid regex"));
    if DEF_COLON.is_match(content) {
        return ArtifactKind::Code;
    }
    ArtifactKind::Component
}

// ---------------------------------------------------------------------------
// Category scoring
// ---------------------------------------------------------------------------

struct SignatureTable {
    kind: ArtifactKind,
    signatures: Vec<(Regex, f64)>,
}

fn table(kind: ArtifactKind, raw: &[(&str, f64)]) -> SignatureTable {
    SignatureTable {
        kind,
        signatures: raw
            .iter()
            .map(|(pattern, weight)| (Regex::new(pattern).expect("valid regex"), *weight))
            .collect(),
    }
}

static TABLES: LazyLock<Vec<SignatureTable>> = LazyLock::new(|| {
    vec![
        table(
            ArtifactKind::Markup,
            &[
                (r"(?i)<!doctype\s+html", 3.0),
                (r"(?i)<html[\s>]", 2.5),
                (r"(?i)<(head|body)[\s>]", 2.0),
                (r"(?i)<(div|span|p|a|ul|ol|li|table|h[1-6])[\s>]", 1.0),
                (r"</[a-zA-Z][a-zA-Z0-9]*>", 1.0),
                (r"(?i)<(meta|link|br|hr|img)\s*/?", 0.5),
            ],
        ),
        table(
            ArtifactKind::Component,
            &[
                (r#"import\s+React|from\s+['"]react['"]"#, 3.0),
                (r"export\s+default\s", 2.0),
                (r"\buse(State|Effect|Reducer|Memo|Callback)\s*\(", 2.5),
                (r"<[A-Z][A-Za-z0-9]*[\s/>]", 1.5),
                (r"className=", 1.0),
                (r"=>\s*[({]", 0.5),
                (r"\bconst\s+\w+\s*=", 0.5),
            ],
        ),
        table(
            ArtifactKind::Markdown,
            &[
                (r"(?m)^#{1,6}\s+\S", 2.5),
                (r"\*\*[^*\n]+\*\*", 1.5),
                (r"(?m)^\s*[-*+]\s+\S", 1.0),
                (r"\[[^\]\n]+\]\([^)\n]+\)", 1.5),
                (r"(?m)^```", 2.0),
                (r"(?m)^>\s+\S", 1.0),
            ],
        ),
        table(
            ArtifactKind::Code,
            &[
                (r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*:", 3.0),
                (r"(?m)^\s*(import|from)\s+\w[\w.]*", 1.5),
                (r"(?m)^\s*class\s+\w+.*:", 1.5),
                (r#"(?m)^\s*if\s+__name__\s*==\s*['"]__main__['"]"#, 2.5),
                (r"\bprint\s*\(", 1.0),
                (r"(?m)^\s*(for|while)\s+.*:\s*$", 1.0),
            ],
        ),
        table(
            ArtifactKind::Json,
            &[
                (r"^\s*[\[{]", 1.5),
                (r#""\w+"\s*:"#, 1.0),
                (r"[\]}]\s*$", 0.5),
            ],
        ),
    ]
});

/// Strong bonus applied when content round-trips through structured parsing.
const JSON_ROUNDTRIP_BONUS: f64 = 8.0;

fn parses_as_json(content: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(content).is_ok()
}

/// Returns the winning category plus its matched/total signature counts.
fn best_category(content: &str, json_roundtrip: bool) -> (ArtifactKind, usize, usize) {
    let mut best: Option<(f64, ArtifactKind, usize, usize)> = None;

    for table in TABLES.iter() {
        let mut score = 0.0;
        let mut matched = 0;
        for (regex, weight) in &table.signatures {
            if regex.is_match(content) {
                score += weight;
                matched += 1;
            }
        }
        if table.kind == ArtifactKind::Json && json_roundtrip {
            score += JSON_ROUNDTRIP_BONUS;
        }
        let replace = match &best {
            // Strictly greater keeps the first (markup-first) entry on ties.
            Some((best_score, ..)) => score > *best_score,
            None => true,
        };
        if replace {
            best = Some((score, table.kind, matched, table.signatures.len()));
        }
    }

    match best {
        Some((score, kind, matched, total)) if score > 0.0 => (kind, matched, total),
        _ => (ArtifactKind::Markup, 0, 1),
    }
}

fn confidence_of(
    content: &str,
    kind: ArtifactKind,
    matched: usize,
    total: usize,
    json_roundtrip: bool,
) -> f64 {
    if json_roundtrip && kind == ArtifactKind::Json {
        // Structured parsing succeeded; near-certain.
        return 0.95;
    }
    let ratio = if total == 0 {
        0.0
    } else {
        matched as f64 / total as f64
    };
    let length_bonus = (content.len() as f64 / 2000.0).min(0.15);
    (ratio * 0.85 + length_bonus).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

fn count_matches(regex: &Regex, content: &str) -> usize {
    regex.find_iter(content).count()
}

fn complexity_of(content: &str) -> Complexity {
    static ELEMENTS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").expect("valid regex"));
    static SCRIPTS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<script[\s>]").expect("valid regex"));
    static FUNCTIONS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bfunction\s+\w+|(?m)^\s*def\s+\w+|=>").expect("valid regex"));
    static IMPORTS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\s*(import|from)\s").expect("valid regex"));

    let score = content.len() as f64 / 800.0
        + count_matches(&ELEMENTS, content) as f64 * 0.3
        + count_matches(&SCRIPTS, content) as f64 * 2.0
        + count_matches(&FUNCTIONS, content) as f64 * 0.8
        + count_matches(&IMPORTS, content) as f64 * 0.6;

    if score < 4.0 {
        Complexity::Low
    } else if score < 12.0 {
        Complexity::Medium
    } else {
        Complexity::High
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

static FEATURES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let feature = |name, pattern: &str| (name, Regex::new(pattern).expect("valid regex"));
    vec![
        feature("media", r"(?i)<(img|video|audio)[\s>]"),
        feature("vector-graphics", r"(?i)<svg[\s>]"),
        feature("forms", r"(?i)<(form|input|select|textarea)[\s>]"),
        feature("interactive-controls", r"(?i)<button[\s>]|onClick=|addEventListener\s*\("),
        feature("reactive-state", r"\buse(State|Reducer|Effect)\s*\(|\bsetState\s*\("),
        feature("async-calls", r"\basync\b|\bawait\b|\.then\s*\("),
        feature("network-calls", r"\bfetch\s*\(|XMLHttpRequest|axios\."),
        feature("persistent-storage", r"localStorage|sessionStorage|indexedDB"),
        feature("responsive-styling", r"@media\s"),
        feature("animation", r"@keyframes|animation\s*:|transition\s*:"),
        feature("layout-system", r"display\s*:\s*(flex|grid)"),
        feature("external-links", r"https?://"),
    ]
});

fn features_of(content: &str) -> Vec<&'static str> {
    FEATURES
        .iter()
        .filter(|(_, regex)| regex.is_match(content))
        .map(|(name, _)| *name)
        .collect()
}

// ---------------------------------------------------------------------------
// Security
// ---------------------------------------------------------------------------

static DANGEROUS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let issue = |name, pattern: &str| (name, Regex::new(pattern).expect("valid regex"));
    vec![
        issue("inline script element", r"(?i)<script[\s>]"),
        issue("dynamic code evaluation", r"\beval\s*\(|new\s+Function\s*\("),
        issue("inline event handler attribute", r"(?i)\son[a-z]+\s*="),
        issue(
            "unsafe markup injection",
            r"\.innerHTML\s*=|document\.write\s*\(|dangerouslySetInnerHTML",
        ),
    ]
});

static SUSPECT: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let warn = |name, pattern: &str| (name, Regex::new(pattern).expect("valid regex"));
    vec![
        warn("embedded frame or object", r"(?i)<(iframe|object|embed)[\s>]"),
        warn("network access", r"\bfetch\s*\(|XMLHttpRequest|axios\."),
        warn("persistent storage access", r"localStorage|sessionStorage|indexedDB"),
    ]
});

fn security_of(content: &str) -> SecurityReport {
    let issues: Vec<String> = DANGEROUS
        .iter()
        .filter(|(_, regex)| regex.is_match(content))
        .map(|(name, _)| (*name).to_string())
        .collect();

    let mut warnings: Vec<String> = SUSPECT
        .iter()
        .filter(|(_, regex)| regex.is_match(content))
        .map(|(name, _)| (*name).to_string())
        .collect();

    static EXTERNAL_LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"https?://").expect("valid regex"));
    let external_only = EXTERNAL_LINK.is_match(content);
    if external_only {
        warnings.push("external links".to_string());
    }

    // Dangerous takes precedence over warning; external links alone are
    // informational and do not raise the level.
    let level = if !issues.is_empty() {
        SecurityLevel::Dangerous
    } else if warnings.len() > usize::from(external_only) {
        SecurityLevel::Warning
    } else {
        SecurityLevel::Safe
    };

    SecurityReport {
        level,
        issues,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Size and optimizations
// ---------------------------------------------------------------------------

fn size_info(content: &str) -> SizeInfo {
    let bytes = content.len();
    let category = if bytes < 1024 {
        SizeCategory::Tiny
    } else if bytes < 10 * 1024 {
        SizeCategory::Small
    } else if bytes < 100 * 1024 {
        SizeCategory::Medium
    } else {
        SizeCategory::Large
    };
    SizeInfo { bytes, category }
}

fn optimizations_for(
    size: SizeCategory,
    complexity: Complexity,
    features: &[&'static str],
) -> Vec<&'static str> {
    let mut recommended = Vec::new();
    if matches!(size, SizeCategory::Medium | SizeCategory::Large) {
        recommended.push("defer-offscreen-content");
    }
    if features.contains(&"media") {
        recommended.push("lazy-load-media");
    }
    if features.contains(&"animation") {
        recommended.push("reduce-motion-fallback");
    }
    if complexity == Complexity::High {
        recommended.push("split-artifact");
    }
    recommended
}
