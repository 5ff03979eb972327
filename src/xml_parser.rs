//! XML Parser Module
//!
//! This module parses a DMARC aggregate report document into report metadata
//! and per-source records. Field lookups are total: a missing or unparseable
//! field resolves to its documented default and is never an error. It
//! enforces a recursion depth limit and completely disables the processing of
//! DOCTYPE declarations (and hence external/internal entities) by removing
//! any DOCTYPE block from the input. If a DOCTYPE block contains two or more
//! entity definitions, the XML is rejected.

use crate::error::{DmarcError, Result};
use crate::models::{
    AlignmentMode, AuthVerdict, DateRange, Disposition, PolicyPublished, PolicyType,
    RecordEntry, ReportMetadata,
};
use chrono::{TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

const MAX_DEPTH: u32 = 20;

/// Outcome of parsing one report document.
///
/// `policy_seen` records whether a `<policy_published>` element was present;
/// a report without one carries no usable policy and must not be classified.
#[derive(Debug)]
pub struct ParsedReport {
    pub metadata: ReportMetadata,
    pub records: Vec<RecordEntry>,
    pub policy_seen: bool,
}

/// Parses the report XML and returns the extracted metadata and records.
///
/// # Errors
///
/// Returns an error if the XML cannot be parsed, if the recursion depth
/// limit is exceeded, if the document contains no elements at all, or if the
/// DOCTYPE block (if present) defines two or more entity definitions.
pub fn parse_report(xml_content: &str) -> Result<ParsedReport> {
    let cleaned_xml = strip_doctype(xml_content)?;

    let mut reader = Reader::from_str(&cleaned_xml);
    reader.config_mut().trim_text(true);

    let mut org_name: Option<String> = None;
    let mut email: Option<String> = None;
    let mut begin_raw: Option<String> = None;
    let mut end_raw: Option<String> = None;
    let mut domain: Option<String> = None;
    let mut policy = PolicyPublished::default();
    let mut policy_seen = false;

    let mut records = Vec::new();
    let mut current_record: Option<RecordEntry> = None;
    let mut saw_element = false;
    let mut depth: u32 = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                saw_element = true;
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(DmarcError::Format(
                        "XML recursion depth limit exceeded".to_string(),
                    ));
                }
                // Arms that call read_text or a sub-parser consume the
                // matching end tag themselves; the End arm below never sees
                // it, so the depth is given back here.
                let consumed = match e.name().as_ref() {
                    b"record" => {
                        current_record = Some(RecordEntry::default());
                        false
                    }
                    b"policy_published" => {
                        let (published_domain, published) =
                            parse_policy_published(&mut reader)?;
                        if domain.is_none() {
                            domain = published_domain;
                        }
                        policy = published;
                        policy_seen = true;
                        true
                    }
                    b"policy_evaluated" => {
                        if let Some(record) = current_record.as_mut() {
                            let (disposition, spf, dkim) =
                                parse_policy_evaluated(&mut reader)?;
                            record.disposition = disposition;
                            record.spf = spf;
                            record.dkim = dkim;
                            true
                        } else {
                            false
                        }
                    }
                    b"identifiers" => {
                        if let Some(record) = current_record.as_mut() {
                            record.header_from = parse_identifiers(&mut reader)?;
                            true
                        } else {
                            false
                        }
                    }
                    b"source_ip" => {
                        if let Some(record) = current_record.as_mut() {
                            record.source_ip =
                                reader.read_text(e.name())?.trim().to_string();
                            true
                        } else {
                            false
                        }
                    }
                    b"count" => {
                        if let Some(record) = current_record.as_mut() {
                            record.count =
                                reader.read_text(e.name())?.trim().parse().unwrap_or(1);
                            true
                        } else {
                            false
                        }
                    }
                    b"org_name" if current_record.is_none() => {
                        org_name = Some(reader.read_text(e.name())?.trim().to_string());
                        true
                    }
                    b"email" if current_record.is_none() => {
                        email = Some(reader.read_text(e.name())?.trim().to_string());
                        true
                    }
                    b"begin" if current_record.is_none() => {
                        begin_raw = Some(reader.read_text(e.name())?.trim().to_string());
                        true
                    }
                    b"end" if current_record.is_none() => {
                        end_raw = Some(reader.read_text(e.name())?.trim().to_string());
                        true
                    }
                    _ => false,
                };
                if consumed {
                    depth = depth.saturating_sub(1);
                }
            }
            // Self-closing elements carry no content; only the ones whose
            // bare presence matters need handling, the rest are absent
            // fields that keep their defaults.
            Ok(Event::Empty(ref e)) => {
                saw_element = true;
                match e.name().as_ref() {
                    b"policy_published" => policy_seen = true,
                    b"record" => records.push(RecordEntry::default()),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"record" {
                    if let Some(record) = current_record.take() {
                        records.push(record);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DmarcError::Xml(e)),
            _ => (),
        }
    }

    if !saw_element {
        return Err(DmarcError::Format("no XML content found".to_string()));
    }

    let metadata = ReportMetadata {
        org_name: org_name.unwrap_or_else(|| "Unknown".to_string()),
        domain: domain.unwrap_or_else(|| "Unknown".to_string()),
        email: email.unwrap_or_default(),
        date_range: resolve_date_range(begin_raw.as_deref(), end_raw.as_deref()),
        policy,
    };

    Ok(ParsedReport {
        metadata,
        records,
        policy_seen,
    })
}

/// Removes any DOCTYPE block so entity definitions are never processed.
/// A DOCTYPE declaring two or more entities is rejected outright.
fn strip_doctype(xml_content: &str) -> Result<String> {
    if let Some(start) = xml_content.find("<!DOCTYPE") {
        if let Some(end) = xml_content[start..].find("]>") {
            let doctype = &xml_content[start..start + end + 2];
            if doctype.matches("<!ENTITY").count() >= 2 {
                return Err(DmarcError::Format(
                    "recursive entity definitions detected".to_string(),
                ));
            }
            let before = &xml_content[..start];
            let after = &xml_content[start + end + 2..];
            return Ok(format!("{}{}", before, after));
        }
    }
    Ok(xml_content.to_string())
}

/// The begin/end pair fails together: unless both timestamps are present,
/// numeric, and representable, neither is kept.
fn resolve_date_range(begin: Option<&str>, end: Option<&str>) -> Option<DateRange> {
    let begin = Utc.timestamp_opt(begin?.parse::<i64>().ok()?, 0).single()?;
    let end = Utc.timestamp_opt(end?.parse::<i64>().ok()?, 0).single()?;
    Some(DateRange { begin, end })
}

/// Parses the `<policy_published>` element.
fn parse_policy_published(
    reader: &mut Reader<&[u8]>,
) -> Result<(Option<String>, PolicyPublished)> {
    let mut domain = None;
    let mut published = PolicyPublished::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"domain" => {
                    domain = Some(reader.read_text(e.name())?.trim().to_string());
                }
                b"p" => {
                    published.policy = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<PolicyType>()
                        .unwrap_or_default();
                }
                b"sp" => {
                    published.subdomain_policy = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<PolicyType>()
                        .unwrap_or_default();
                }
                b"pct" => {
                    let text = reader.read_text(e.name())?.trim().to_string();
                    if !text.is_empty() {
                        published.pct = text;
                    }
                }
                b"adkim" => {
                    published.adkim = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<AlignmentMode>()
                        .unwrap_or_default();
                }
                b"aspf" => {
                    published.aspf = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<AlignmentMode>()
                        .unwrap_or_default();
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"policy_published" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(DmarcError::Xml(e)),
            _ => {}
        }
    }
    Ok((domain, published))
}

/// Parses the `<policy_evaluated>` element of a record.
fn parse_policy_evaluated(
    reader: &mut Reader<&[u8]>,
) -> Result<(Disposition, AuthVerdict, AuthVerdict)> {
    let mut disposition = Disposition::None;
    let mut spf = AuthVerdict::Fail;
    let mut dkim = AuthVerdict::Fail;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"disposition" => {
                    disposition = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<Disposition>()
                        .unwrap_or_default();
                }
                b"spf" => {
                    spf = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<AuthVerdict>()
                        .unwrap_or_default();
                }
                b"dkim" => {
                    dkim = reader
                        .read_text(e.name())?
                        .trim()
                        .parse::<AuthVerdict>()
                        .unwrap_or_default();
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"policy_evaluated" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(DmarcError::Xml(e)),
            _ => {}
        }
    }
    Ok((disposition, spf, dkim))
}

/// Parses the `<identifiers>` element of a record, keeping the From-domain.
fn parse_identifiers(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut header_from = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"header_from" => {
                header_from = reader.read_text(e.name())?.trim().to_string();
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"identifiers" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(DmarcError::Xml(e)),
            _ => {}
        }
    }
    Ok(header_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(body: &str) -> String {
        format!("<feedback>{}</feedback>", body)
    }

    #[test]
    fn test_metadata_extraction() {
        let xml = report(
            r#"
            <report_metadata>
                <org_name>google.com</org_name>
                <email>noreply-dmarc-support@google.com</email>
                <date_range><begin>1706400000</begin><end>1706486399</end></date_range>
            </report_metadata>
            <policy_published>
                <domain>example.org</domain>
                <p>quarantine</p>
                <sp>reject</sp>
                <pct>50</pct>
                <adkim>s</adkim>
                <aspf>r</aspf>
            </policy_published>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        assert!(parsed.policy_seen);
        assert_eq!(parsed.metadata.org_name, "google.com");
        assert_eq!(parsed.metadata.domain, "example.org");
        assert_eq!(parsed.metadata.email, "noreply-dmarc-support@google.com");
        assert_eq!(parsed.metadata.policy.policy, PolicyType::Quarantine);
        assert_eq!(parsed.metadata.policy.subdomain_policy, PolicyType::Reject);
        assert_eq!(parsed.metadata.policy.pct, "50");
        assert_eq!(parsed.metadata.policy.adkim, AlignmentMode::Strict);
        assert_eq!(parsed.metadata.policy.aspf, AlignmentMode::Relaxed);
        let range = parsed.metadata.date_range.expect("range should be present");
        assert_eq!(range.begin.timestamp(), 1706400000);
        assert_eq!(range.end.timestamp(), 1706486399);
    }

    #[test]
    fn test_metadata_defaults() {
        let xml = report("<policy_published></policy_published>");
        let parsed = parse_report(&xml).unwrap();
        assert_eq!(parsed.metadata.org_name, "Unknown");
        assert_eq!(parsed.metadata.domain, "Unknown");
        assert!(parsed.metadata.email.is_empty());
        assert!(parsed.metadata.date_range.is_none());
        assert_eq!(parsed.metadata.policy, PolicyPublished::default());
    }

    #[test]
    fn test_missing_policy_published_is_flagged() {
        let xml = report(
            r#"
            <report_metadata><org_name>reporter.example</org_name></report_metadata>
            <record>
                <row><source_ip>1.2.3.4</source_ip><count>2</count></row>
            </record>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        assert!(!parsed.policy_seen);
        assert_eq!(parsed.metadata.org_name, "reporter.example");
    }

    #[test]
    fn test_date_range_fails_as_a_pair() {
        let only_begin = report(
            r#"
            <report_metadata><date_range><begin>1706400000</begin></date_range></report_metadata>
            <policy_published></policy_published>
            "#,
        );
        assert!(parse_report(&only_begin).unwrap().metadata.date_range.is_none());

        let non_numeric = report(
            r#"
            <report_metadata>
                <date_range><begin>1706400000</begin><end>soon</end></date_range>
            </report_metadata>
            <policy_published></policy_published>
            "#,
        );
        assert!(parse_report(&non_numeric).unwrap().metadata.date_range.is_none());
    }

    #[test]
    fn test_record_field_defaults() {
        let xml = report(
            r#"
            <policy_published></policy_published>
            <record>
                <row><count>not-a-number</count></row>
            </record>
            <record>
                <row><source_ip>5.6.7.8</source_ip></row>
            </record>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].source_ip, "Unknown");
        assert_eq!(parsed.records[0].count, 1);
        assert_eq!(parsed.records[0].spf, AuthVerdict::Fail);
        assert_eq!(parsed.records[0].dkim, AuthVerdict::Fail);
        assert_eq!(parsed.records[0].disposition, Disposition::None);
        assert_eq!(parsed.records[1].source_ip, "5.6.7.8");
        assert_eq!(parsed.records[1].count, 1);
    }

    #[test]
    fn test_records_keep_document_order() {
        let xml = report(
            r#"
            <policy_published></policy_published>
            <record><row><source_ip>10.0.0.1</source_ip></row></record>
            <record><row><source_ip>10.0.0.2</source_ip></row></record>
            <record><row><source_ip>10.0.0.3</source_ip></row></record>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        let ips: Vec<&str> = parsed.records.iter().map(|r| r.source_ip.as_str()).collect();
        assert_eq!(ips, ["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_full_record_extraction() {
        let xml = report(
            r#"
            <policy_published><domain>example.org</domain><p>none</p></policy_published>
            <record>
                <row>
                    <source_ip>203.0.113.7</source_ip>
                    <count>42</count>
                    <policy_evaluated>
                        <disposition>quarantine</disposition>
                        <dkim>fail</dkim>
                        <spf>pass</spf>
                    </policy_evaluated>
                </row>
                <identifiers><header_from>example.org</header_from></identifiers>
                <auth_results>
                    <dkim><domain>other.example</domain><selector>s1</selector><result>pass</result></dkim>
                    <spf><domain>other.example</domain><result>fail</result></spf>
                </auth_results>
            </record>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.source_ip, "203.0.113.7");
        assert_eq!(record.count, 42);
        assert_eq!(record.disposition, Disposition::Quarantine);
        assert_eq!(record.spf, AuthVerdict::Pass);
        assert_eq!(record.dkim, AuthVerdict::Fail);
        assert_eq!(record.header_from, "example.org");
    }

    #[test]
    fn test_unknown_enum_values_fall_back_to_defaults() {
        let xml = report(
            r#"
            <policy_published><p>block-everything</p><adkim>x</adkim></policy_published>
            <record>
                <row>
                    <source_ip>1.2.3.4</source_ip>
                    <policy_evaluated>
                        <disposition>hold</disposition>
                        <spf>neutral</spf>
                        <dkim>temperror</dkim>
                    </policy_evaluated>
                </row>
            </record>
            "#,
        );
        let parsed = parse_report(&xml).unwrap();
        assert_eq!(parsed.metadata.policy.policy, PolicyType::None);
        assert_eq!(parsed.metadata.policy.adkim, AlignmentMode::Relaxed);
        assert_eq!(parsed.records[0].disposition, Disposition::None);
        assert_eq!(parsed.records[0].spf, AuthVerdict::Fail);
        assert_eq!(parsed.records[0].dkim, AuthVerdict::Fail);
    }

    #[test]
    fn test_empty_document_is_rejected() {
        assert!(parse_report("").is_err());
        assert!(parse_report("   \n  ").is_err());
        assert!(parse_report("plain text, no markup").is_err());
    }

    #[test]
    fn test_doctype_with_multiple_entities_is_rejected() {
        let xml = r#"
        <!DOCTYPE lolz [
            <!ENTITY lol "lol">
            <!ENTITY lol2 "&lol;&lol;">
        ]>
        <feedback><policy_published></policy_published></feedback>
        "#;
        assert!(parse_report(xml).is_err());
    }

    #[test]
    fn test_single_entity_doctype_is_stripped() {
        let xml = r#"
        <!DOCTYPE foo [
            <!ENTITY xxe SYSTEM "file:///etc/passwd">
        ]>
        <feedback>
            <policy_published><domain>example.org</domain></policy_published>
            <record><row><source_ip>1.2.3.4</source_ip></row></record>
        </feedback>
        "#;
        let parsed = parse_report(xml).unwrap();
        assert_eq!(parsed.records[0].source_ip, "1.2.3.4");
    }
}
