//! Report Analysis Module
//!
//! The pipeline behind `analyze_report`: decode the raw bytes, parse the
//! document, classify every record once, and aggregate the records into
//! outcome buckets. The two terminal failure states (an undecodable document
//! and a report without a `<policy_published>` element) short-circuit the
//! remaining stages and are returned as error messages inside the result,
//! never as panics or stray `Err` values.

use crate::error::DmarcError;
use crate::models::{
    AggregateResult, Bucket, Classification, ClassifiedRecord, PolicyType, RecordEntry,
    ReportMetadata,
};
use crate::xml_parser::parse_report;

/// Analyzes one DMARC aggregate report.
///
/// Each call is an independent pass over an independently owned document;
/// there is no shared state between invocations. Structural and schema
/// problems land in `AggregateResult::errors` together with whatever
/// metadata was gathered before the failure.
pub fn analyze_report(content: &[u8]) -> AggregateResult {
    let xml = match std::str::from_utf8(content) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("report rejected: undecodable bytes");
            return AggregateResult::failed(
                ReportMetadata::default(),
                DmarcError::Encoding(e).to_string(),
            );
        }
    };

    let parsed = match parse_report(xml) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("report rejected: {}", e);
            return AggregateResult::failed(ReportMetadata::default(), e.to_string());
        }
    };

    if !parsed.policy_seen {
        return AggregateResult::failed(
            parsed.metadata,
            DmarcError::MissingPolicy.to_string(),
        );
    }

    aggregate(parsed.metadata, parsed.records)
}

/// Partitions records into outcome buckets, preserving relative order, and
/// computes the report-level flags. Every record is classified exactly once;
/// the cached class in `records` is what renderers consume.
pub fn aggregate(metadata: ReportMetadata, entries: Vec<RecordEntry>) -> AggregateResult {
    let mut good = Bucket::default();
    let mut warning = Bucket::default();
    let mut error = Bucket::default();
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let classification = entry.classify();
        match classification {
            Classification::Good => good.push(entry.clone()),
            Classification::Warning => warning.push(entry.clone()),
            Classification::Error => error.push(entry.clone()),
        }
        records.push(ClassifiedRecord {
            record: entry,
            classification,
        });
    }

    let policy_risk = metadata.policy.policy == PolicyType::None;
    let no_send_attempts = records.is_empty();
    log::debug!(
        "aggregated {} records: {} good, {} warning, {} error",
        records.len(),
        good.ip_count,
        warning.ip_count,
        error.ip_count
    );

    AggregateResult {
        metadata,
        records,
        good,
        warning,
        error,
        policy_risk,
        no_send_attempts,
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthVerdict, Disposition};

    fn entry(ip: &str, count: u64, disposition: Disposition, spf: AuthVerdict, dkim: AuthVerdict) -> RecordEntry {
        RecordEntry {
            source_ip: ip.to_string(),
            count,
            disposition,
            spf,
            dkim,
            header_from: String::new(),
        }
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        use AuthVerdict::{Fail, Pass};
        let entries = vec![
            entry("1.1.1.1", 4, Disposition::None, Pass, Pass),
            entry("2.2.2.2", 7, Disposition::None, Pass, Fail),
            entry("3.3.3.3", 1, Disposition::Reject, Fail, Fail),
            entry("4.4.4.4", 9, Disposition::None, Fail, Pass),
            entry("5.5.5.5", 2, Disposition::None, Fail, Fail),
        ];
        let result = aggregate(ReportMetadata::default(), entries);

        assert_eq!(
            result.good.ip_count + result.warning.ip_count + result.error.ip_count,
            result.records.len()
        );
        assert_eq!(
            result.good.message_total + result.warning.message_total + result.error.message_total,
            result.total_messages()
        );
        assert_eq!(result.good.ip_count, 1);
        assert_eq!(result.warning.ip_count, 2);
        assert_eq!(result.error.ip_count, 2);
        assert!(result.errors.is_empty());
        assert!(!result.no_send_attempts);
    }

    #[test]
    fn test_buckets_preserve_relative_order() {
        use AuthVerdict::{Fail, Pass};
        let entries = vec![
            entry("10.0.0.1", 1, Disposition::None, Pass, Fail),
            entry("10.0.0.2", 1, Disposition::None, Pass, Pass),
            entry("10.0.0.3", 1, Disposition::None, Fail, Pass),
        ];
        let result = aggregate(ReportMetadata::default(), entries);

        let combined: Vec<&str> = result.records.iter().map(|r| r.record.source_ip.as_str()).collect();
        assert_eq!(combined, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        let warnings: Vec<&str> = result.warning.records.iter().map(|r| r.source_ip.as_str()).collect();
        assert_eq!(warnings, ["10.0.0.1", "10.0.0.3"]);
    }

    #[test]
    fn test_policy_risk_flag() {
        let mut metadata = ReportMetadata::default();
        metadata.policy.policy = PolicyType::None;
        let result = aggregate(metadata, vec![]);
        assert!(result.policy_risk);

        let mut metadata = ReportMetadata::default();
        metadata.policy.policy = PolicyType::Quarantine;
        let result = aggregate(metadata, vec![]);
        assert!(!result.policy_risk);
    }

    #[test]
    fn test_no_send_attempts_is_not_an_error() {
        let result = aggregate(ReportMetadata::default(), vec![]);
        assert!(result.no_send_attempts);
        assert!(result.errors.is_empty());
        assert_eq!(result.good.ip_count, 0);
        assert_eq!(result.warning.ip_count, 0);
        assert_eq!(result.error.ip_count, 0);
    }

    #[test]
    fn test_undecodable_bytes_are_a_structural_error() {
        let result = analyze_report(&[0xff, 0xfe, 0x00, 0x41]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.records.is_empty());
        assert_eq!(result.metadata, ReportMetadata::default());
        assert!(!result.no_send_attempts);
    }

    #[test]
    fn test_malformed_xml_is_a_structural_error() {
        let result = analyze_report(b"<feedback><record></feedbak>");
        assert_eq!(result.errors.len(), 1);
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_missing_policy_keeps_metadata() {
        let xml = br#"
        <feedback>
            <report_metadata><org_name>reporter.example</org_name></report_metadata>
            <record><row><source_ip>1.2.3.4</source_ip><count>5</count></row></record>
        </feedback>
        "#;
        let result = analyze_report(xml);
        assert_eq!(result.errors, vec!["missing policy_published element".to_string()]);
        assert!(result.records.is_empty());
        assert_eq!(result.metadata.org_name, "reporter.example");
    }
}
