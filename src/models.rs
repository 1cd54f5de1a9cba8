//! Core data models for debtledger
//!
//! These models are shared by every stage of the engine: the normalizer
//! produces [`Finding`]s, the merge engine reconciles them into the state
//! document, and scoring and planning read them back.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

/// Generate a deterministic finding ID.
///
/// The ID is a 16-character hex string derived from hashing:
/// - language (each language has its own ledger)
/// - detector name (mechanical detector or review dimension)
/// - normalized file path
/// - normalized anchor (symbol name, sorted cycle members, ...)
///
/// Line numbers are deliberately absent so that code moving around inside
/// a file keeps the same identity.
pub fn deterministic_finding_id(language: &str, detector: &str, file: &str, anchor: &str) -> String {
    let input = format!(
        "{}\n{}\n{}\n{}",
        language.trim().to_lowercase(),
        detector.trim(),
        normalize_path(file),
        normalize_anchor(anchor)
    );
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Canonical form of a source path: forward slashes, no leading `./`,
/// no trailing slash, no duplicate separators.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let parts: Vec<&str> = unified
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Collapse whitespace so reformatting never changes an anchor.
pub fn normalize_anchor(anchor: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    ws.replace_all(anchor.trim(), " ").into_owned()
}

/// Whether `path` lies within `scope`. A scope of `.` covers the whole project.
pub fn path_in_scope(path: &str, scope: &str) -> bool {
    let scope = normalize_path(scope);
    if scope == "." {
        return true;
    }
    let path = normalize_path(path);
    path == scope || path.starts_with(&format!("{}/", scope))
}

/// Ordinal effort/severity class. T1 is trivial, T4 is a major refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    T1,
    T2,
    T3,
    T4,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::T1, Tier::T2, Tier::T3, Tier::T4];

    /// Scoring weight (T1×1 ... T4×4)
    pub fn weight(self) -> f64 {
        u8::from(self) as f64
    }

    /// Parse a tier hint: `3`, `"3"`, `"T3"` or `"t3"`.
    pub fn parse(hint: &serde_json::Value) -> Option<Tier> {
        match hint {
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
            serde_json::Value::String(s) => {
                let s = s.trim();
                let digits = s.strip_prefix(['T', 't']).unwrap_or(s);
                digits.parse::<u8>().ok()
            }
            _ => None,
        }
        .and_then(|v| Tier::try_from(v).ok())
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::T1),
            2 => Ok(Tier::T2),
            3 => Ok(Tier::T3),
            4 => Ok(Tier::T4),
            other => Err(format!("tier must be between 1 and 4, got {}", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        match tier {
            Tier::T1 => 1,
            Tier::T2 => 2,
            Tier::T3 => 3,
            Tier::T4 => 4,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", u8::from(*self))
    }
}

/// Resolution state of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Fixed,
    Wontfix,
    FalsePositive,
    Ignored,
}

impl Status {
    /// User-set statuses the merge engine never touches.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Wontfix | Status::FalsePositive | Status::Ignored)
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "open" => Some(Status::Open),
            "fixed" => Some(Status::Fixed),
            "wontfix" => Some(Status::Wontfix),
            "false_positive" => Some(Status::FalsePositive),
            "ignored" | "ignore" => Some(Status::Ignored),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Open => write!(f, "open"),
            Status::Fixed => write!(f, "fixed"),
            Status::Wontfix => write!(f, "wontfix"),
            Status::FalsePositive => write!(f, "false_positive"),
            Status::Ignored => write!(f, "ignored"),
        }
    }
}

/// Whether a path counts toward the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Scored,
    Excluded,
}

/// Fine-grained path classification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ZoneCategory {
    #[default]
    Production,
    Script,
    Test,
    Config,
    Generated,
    Vendor,
}

impl ZoneCategory {
    pub fn zone(self) -> Zone {
        match self {
            ZoneCategory::Production | ZoneCategory::Script => Zone::Scored,
            _ => Zone::Excluded,
        }
    }

    pub fn parse(s: &str) -> Option<ZoneCategory> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Some(ZoneCategory::Production),
            "script" => Some(ZoneCategory::Script),
            "test" => Some(ZoneCategory::Test),
            "config" => Some(ZoneCategory::Config),
            "generated" => Some(ZoneCategory::Generated),
            "vendor" => Some(ZoneCategory::Vendor),
            _ => None,
        }
    }
}

impl std::fmt::Display for ZoneCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ZoneCategory::Production => "production",
            ZoneCategory::Script => "script",
            ZoneCategory::Test => "test",
            ZoneCategory::Config => "config",
            ZoneCategory::Generated => "generated",
            ZoneCategory::Vendor => "vendor",
        };
        write!(f, "{}", s)
    }
}

/// Detector confidence in a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Confidence> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }

    /// Multiplier applied to planner impact
    pub fn weight(self) -> f64 {
        match self {
            Confidence::High => 1.0,
            Confidence::Medium => 0.7,
            Confidence::Low => 0.3,
        }
    }
}

/// Where a finding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FindingOrigin {
    #[default]
    Mechanical,
    /// Imported from a subjective review; `detector` holds the dimension.
    Review,
}

/// How a finding left the open state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    /// Detector stopped reporting it in an in-scope scan
    Auto,
    /// Explicit resolve command
    Manual,
    /// Planner done marker
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub kind: ResolutionKind,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub attestation: Option<String>,
    /// Whether the attestation satisfied the verification policy
    #[serde(default)]
    pub attested: bool,
    /// Scan that observed the resolution (auto only)
    #[serde(default)]
    pub scan_id: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

/// Hold placed by the suspect guard instead of auto-resolving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectHold {
    pub scan_id: String,
    /// Scope of the scan that placed the hold
    #[serde(default)]
    pub scan_path: String,
    pub prior_count: usize,
    pub threshold: usize,
    pub held_at: DateTime<Utc>,
}

/// A single tracked issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub language: String,
    pub detector: String,
    #[serde(default)]
    pub origin: FindingOrigin,
    pub file: String,
    #[serde(default)]
    pub anchor: String,
    /// Informational only, never part of identity
    #[serde(default)]
    pub line: Option<u32>,
    pub tier: Tier,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub detail: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub suspect: Option<SuspectHold>,
    #[serde(default)]
    pub zone: Zone,
    #[serde(default)]
    pub zone_category: ZoneCategory,
    pub scan_path: String,
    pub first_seen: String,
    pub last_seen: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub reopen_count: u32,
    #[serde(default)]
    pub cluster: Option<String>,
}

impl Finding {
    /// Open, suspect-held findings included
    pub fn is_open(&self) -> bool {
        self.status == Status::Open
    }

    pub fn is_suspect(&self) -> bool {
        self.status == Status::Open && self.suspect.is_some()
    }

    pub fn is_mechanical(&self) -> bool {
        self.origin == FindingOrigin::Mechanical
    }

    pub fn is_scored(&self) -> bool {
        self.zone == Zone::Scored
    }
}

/// One scan invocation. Ephemeral: only its findings survive, via merge.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub id: String,
    pub language: String,
    pub scan_path: String,
    pub started_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
}

impl ScanRun {
    pub fn new(language: impl Into<String>, scan_path: &str, findings: Vec<Finding>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            language: language.into(),
            scan_path: normalize_path(scan_path),
            started_at: Utc::now(),
            findings,
        }
    }
}
