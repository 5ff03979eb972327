//! Data Models Module
//!
//! This module defines the core data structures used by dmarc-triage to
//! represent report metadata, the published policy, per-source records, and
//! the aggregated result consumed by renderers. It also provides
//! implementations for converting from strings and default values.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy announced by the domain owner in the `<policy_published>` block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PolicyPublished {
    pub policy: PolicyType,
    pub subdomain_policy: PolicyType,
    pub pct: String,
    pub adkim: AlignmentMode,
    pub aspf: AlignmentMode,
}

impl Default for PolicyPublished {
    fn default() -> Self {
        PolicyPublished {
            policy: PolicyType::None,
            subdomain_policy: PolicyType::None,
            pct: "100".to_string(),
            adkim: AlignmentMode::Relaxed,
            aspf: AlignmentMode::Relaxed,
        }
    }
}

/// Reporting period of one report. Built only when both timestamps are
/// present and numeric; a half-parsed range is never exposed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DateRange {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportMetadata {
    pub org_name: String,
    pub domain: String,
    pub email: String,
    pub date_range: Option<DateRange>,
    pub policy: PolicyPublished,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        ReportMetadata {
            org_name: "Unknown".to_string(),
            domain: "Unknown".to_string(),
            email: String::new(),
            date_range: None,
            policy: PolicyPublished::default(),
        }
    }
}

/// One `<record>` element: a sending source and how its mail fared.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordEntry {
    pub source_ip: String,
    pub count: u64,
    pub disposition: Disposition,
    pub spf: AuthVerdict,
    pub dkim: AuthVerdict,
    pub header_from: String,
}

impl Default for RecordEntry {
    fn default() -> Self {
        RecordEntry {
            source_ip: "Unknown".to_string(),
            count: 1,
            disposition: Disposition::None,
            spf: AuthVerdict::Fail,
            dkim: AuthVerdict::Fail,
            header_from: String::new(),
        }
    }
}

impl RecordEntry {
    /// Assigns the record to exactly one outcome class. First match wins:
    /// fully authenticated mail that was not acted on is good, one passing
    /// mechanism without enforcement is a warning, everything else is an
    /// error. A non-none disposition always classifies as an error, even
    /// when one mechanism passed.
    pub fn classify(&self) -> Classification {
        if self.disposition != Disposition::None {
            return Classification::Error;
        }
        match (self.spf, self.dkim) {
            (AuthVerdict::Pass, AuthVerdict::Pass) => Classification::Good,
            (AuthVerdict::Pass, _) | (_, AuthVerdict::Pass) => Classification::Warning,
            _ => Classification::Error,
        }
    }
}

/// Disposition evaluated by the receiver for a record. Distinct from the
/// published policy, which is what the domain owner asked for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    None,
    Quarantine,
    Reject,
}

/// Evaluated SPF or DKIM outcome for a record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthVerdict {
    Pass,
    #[default]
    Fail,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    #[default]
    Relaxed,
    Strict,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    #[default]
    None,
    Quarantine,
    Reject,
}

/// Outcome class of a single record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Good,
    Warning,
    Error,
}

/// A record together with its computed class. The class is computed once
/// during aggregation; renderers read it instead of re-deriving it.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub record: RecordEntry,
    pub classification: Classification,
}

/// One outcome bucket: its records in report order plus summary counters.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct Bucket {
    pub records: Vec<RecordEntry>,
    pub ip_count: usize,
    pub message_total: u64,
}

impl Bucket {
    pub(crate) fn push(&mut self, record: RecordEntry) {
        self.ip_count += 1;
        self.message_total += record.count;
        self.records.push(record);
    }
}

/// Aggregated outcome of analyzing one report.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AggregateResult {
    pub metadata: ReportMetadata,
    pub records: Vec<ClassifiedRecord>,
    pub good: Bucket,
    pub warning: Bucket,
    pub error: Bucket,
    pub policy_risk: bool,
    pub no_send_attempts: bool,
    pub errors: Vec<String>,
}

impl AggregateResult {
    /// Terminal failure state: no records, one error message, and whatever
    /// metadata was gathered before the failure.
    pub(crate) fn failed(metadata: ReportMetadata, message: String) -> Self {
        AggregateResult {
            metadata,
            records: Vec::new(),
            good: Bucket::default(),
            warning: Bucket::default(),
            error: Bucket::default(),
            policy_risk: false,
            no_send_attempts: false,
            errors: vec![message],
        }
    }

    pub fn total_messages(&self) -> u64 {
        self.records.iter().map(|r| r.record.count).sum()
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::None => write!(f, "none"),
            Disposition::Quarantine => write!(f, "quarantine"),
            Disposition::Reject => write!(f, "reject"),
        }
    }
}

impl fmt::Display for AuthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthVerdict::Pass => write!(f, "pass"),
            AuthVerdict::Fail => write!(f, "fail"),
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentMode::Relaxed => write!(f, "relaxed"),
            AlignmentMode::Strict => write!(f, "strict"),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::None => write!(f, "none"),
            PolicyType::Quarantine => write!(f, "quarantine"),
            PolicyType::Reject => write!(f, "reject"),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Good => write!(f, "good"),
            Classification::Warning => write!(f, "warning"),
            Classification::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Disposition {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Disposition::None),
            "quarantine" => Ok(Disposition::Quarantine),
            "reject" => Ok(Disposition::Reject),
            _ => Err(format!("Invalid disposition: {}", s)),
        }
    }
}

impl FromStr for AuthVerdict {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(AuthVerdict::Pass),
            "fail" => Ok(AuthVerdict::Fail),
            _ => Err(format!("Invalid authentication verdict: {}", s)),
        }
    }
}

impl FromStr for AlignmentMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "relaxed" => Ok(AlignmentMode::Relaxed),
            "s" | "strict" => Ok(AlignmentMode::Strict),
            _ => Err(format!("Invalid alignment mode: {}", s)),
        }
    }
}

impl FromStr for PolicyType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PolicyType::None),
            "quarantine" => Ok(PolicyType::Quarantine),
            "reject" => Ok(PolicyType::Reject),
            _ => Err(format!("Invalid policy type: {}", s)),
        }
    }
}
