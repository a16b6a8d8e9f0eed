//! Expansion of selected scans and templates into report requests.

use std::str::FromStr;

use thiserror::Error;

use crate::config::ReportTemplate;
use crate::orchestrator::ReportRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("nothing selected: {0}")]
    EmptySelection(&'static str),

    #[error("invalid scan selection '{0}', expected REF=TITLE")]
    InvalidScan(String),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}

/// A scan picked for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSelection {
    pub scan_ref: String,
    pub title: String,
}

impl FromStr for ScanSelection {
    type Err = RequestError;

    /// Parses `REF=TITLE`. Only the first `=` separates the two.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scan_ref, title) = s
            .split_once('=')
            .ok_or_else(|| RequestError::InvalidScan(s.to_string()))?;
        let (scan_ref, title) = (scan_ref.trim(), title.trim());
        if scan_ref.is_empty() || title.is_empty() {
            return Err(RequestError::InvalidScan(s.to_string()));
        }
        Ok(Self {
            scan_ref: scan_ref.to_string(),
            title: title.to_string(),
        })
    }
}

/// One scan-based request per scan and scan template, scan-major.
///
/// Every request for a scan is titled after the scan.
pub fn scan_report_requests(
    scans: &[ScanSelection],
    templates: &[ReportTemplate],
) -> Result<Vec<ReportRequest>, RequestError> {
    if scans.is_empty() {
        return Err(RequestError::EmptySelection("no scans selected"));
    }
    if templates.is_empty() {
        return Err(RequestError::EmptySelection("no scan templates configured"));
    }

    Ok(scans
        .iter()
        .flat_map(|scan| {
            templates.iter().map(move |template| {
                ReportRequest::scan(
                    scan.scan_ref.clone(),
                    template.template_id.clone(),
                    template.output_format.clone(),
                    scan.title.clone(),
                )
            })
        })
        .collect())
}

/// One host-based request per template, titled with its description.
pub fn host_report_requests(templates: &[ReportTemplate]) -> Result<Vec<ReportRequest>, RequestError> {
    if templates.is_empty() {
        return Err(RequestError::EmptySelection("no host templates selected"));
    }

    Ok(templates
        .iter()
        .map(|template| {
            let title = if template.description.trim().is_empty() {
                format!("Template {}", template.template_id)
            } else {
                template.description.trim().to_string()
            };
            ReportRequest::host(
                template.template_id.clone(),
                template.output_format.clone(),
                title,
            )
        })
        .collect())
}

/// The templates among `available` whose ids are in `ids`, in the order of `ids`.
///
/// An empty `ids` selects every available template.
pub fn select_templates(
    available: &[ReportTemplate],
    ids: &[String],
) -> Result<Vec<ReportTemplate>, RequestError> {
    if ids.is_empty() {
        return Ok(available.to_vec());
    }

    ids.iter()
        .map(|id| {
            available
                .iter()
                .find(|t| &t.template_id == id)
                .cloned()
                .ok_or_else(|| RequestError::UnknownTemplate(id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ReportKind;

    fn template(id: &str, format: &str, description: &str) -> ReportTemplate {
        ReportTemplate {
            template_id: id.to_string(),
            output_format: format.to_string(),
            description: description.to_string(),
        }
    }

    fn scan(scan_ref: &str, title: &str) -> ScanSelection {
        ScanSelection {
            scan_ref: scan_ref.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_parse_scan_selection() {
        let parsed: ScanSelection = "scan/1714.123=DMZ weekly".parse().unwrap();
        assert_eq!(parsed, scan("scan/1714.123", "DMZ weekly"));

        let parsed: ScanSelection = "scan/1=a=b".parse().unwrap();
        assert_eq!(parsed.title, "a=b");

        assert!("scan/1".parse::<ScanSelection>().is_err());
        assert!("=title".parse::<ScanSelection>().is_err());
        assert!("scan/1=".parse::<ScanSelection>().is_err());
    }

    #[test]
    fn test_scan_requests_scan_major() {
        let scans = vec![scan("scan/1", "First"), scan("scan/2", "Second")];
        let templates = vec![template("10", "pdf", "Executive"), template("11", "csv", "Detail")];

        let requests = scan_report_requests(&scans, &templates).unwrap();
        assert_eq!(requests.len(), 4);

        let order: Vec<(Option<&str>, &str)> = requests
            .iter()
            .map(|r| (r.source_ref(), r.template_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some("scan/1"), "10"),
                (Some("scan/1"), "11"),
                (Some("scan/2"), "10"),
                (Some("scan/2"), "11"),
            ]
        );
        assert_eq!(requests[3].title, "Second");
        assert_eq!(requests[1].output_format, "csv");
    }

    #[test]
    fn test_scan_requests_empty() {
        let templates = vec![template("10", "pdf", "")];
        assert!(matches!(
            scan_report_requests(&[], &templates),
            Err(RequestError::EmptySelection(_))
        ));
        assert!(matches!(
            scan_report_requests(&[scan("scan/1", "First")], &[]),
            Err(RequestError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_host_requests() {
        let templates = vec![template("80", "pdf", "All hosts"), template("81", "csv", " ")];
        let requests = host_report_requests(&templates).unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].kind, ReportKind::Host);
        assert_eq!(requests[0].title, "All hosts");
        assert_eq!(requests[1].title, "Template 81");
        assert!(host_report_requests(&[]).is_err());
    }

    #[test]
    fn test_select_templates() {
        let available = vec![template("80", "pdf", "A"), template("81", "csv", "B")];

        assert_eq!(select_templates(&available, &[]).unwrap().len(), 2);

        let selected = select_templates(&available, &["81".to_string()]).unwrap();
        assert_eq!(selected, vec![template("81", "csv", "B")]);

        assert_eq!(
            select_templates(&available, &["99".to_string()]),
            Err(RequestError::UnknownTemplate("99".to_string()))
        );
    }
}
