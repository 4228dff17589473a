use crate::scraper::ScrapeReport;
use crate::types::{ListingRecord, ListingStatus};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListingStats {
    pub total: usize,
    pub detailed: usize,
    pub detail_failed: usize,
    pub furnished: usize,
    pub with_wifi: usize,
    pub with_sauna: usize,
    pub with_contact: usize,
}

impl ListingStats {
    pub fn from_records(records: &[ListingRecord]) -> ListingStats {
        ListingStats {
            total: records.len(),
            detailed: records
                .iter()
                .filter(|r| r.status == ListingStatus::Detailed)
                .count(),
            detail_failed: records
                .iter()
                .filter(|r| r.status == ListingStatus::DetailFailed)
                .count(),
            furnished: records.iter().filter(|r| r.furnished).count(),
            with_wifi: records.iter().filter(|r| r.wifi).count(),
            with_sauna: records.iter().filter(|r| r.sauna).count(),
            with_contact: records.iter().filter(|r| r.line_id.is_some()).count(),
        }
    }
}

impl std::fmt::Display for ListingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Listings:          {}", self.total)?;
        writeln!(f, "  With details:      {}", self.detailed)?;
        writeln!(f, "  Detail failures:   {}", self.detail_failed)?;
        writeln!(f, "  Furnished:         {}", self.furnished)?;
        writeln!(f, "  WiFi:              {}", self.with_wifi)?;
        writeln!(f, "  Sauna:             {}", self.with_sauna)?;
        writeln!(f, "  LINE contact:      {}", self.with_contact)
    }
}

/// One line per failed page or detail, for the end-of-run summary.
pub fn failure_lines(report: &ScrapeReport) -> Vec<String> {
    report
        .failed_pages
        .iter()
        .map(|f| format!("page   {}: {}", f.target, f.error))
        .chain(
            report
                .failed_details
                .iter()
                .map(|f| format!("detail {}: {}", f.target, f.error)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::Failure;

    #[test]
    fn test_stats_from_records() {
        let records = vec![
            ListingRecord {
                furnished: true,
                wifi: true,
                status: ListingStatus::Detailed,
                line_id: Some("@a".into()),
                ..ListingRecord::new("https://www.hipflat.co.th/ja/listings/a")
            },
            ListingRecord {
                sauna: true,
                status: ListingStatus::DetailFailed,
                ..ListingRecord::new("https://www.hipflat.co.th/ja/listings/b")
            },
            ListingRecord::new("https://www.hipflat.co.th/ja/listings/c"),
        ];

        let stats = ListingStats::from_records(&records);
        assert_eq!(
            stats,
            ListingStats {
                total: 3,
                detailed: 1,
                detail_failed: 1,
                furnished: 1,
                with_wifi: 1,
                with_sauna: 1,
                with_contact: 1,
            }
        );
        assert!(stats.to_string().contains("Listings:          3"));
    }

    #[test]
    fn test_failure_lines() {
        let report = ScrapeReport {
            failed_pages: vec![Failure {
                target: "https://x/list".into(),
                error: "HTTP 500".into(),
            }],
            failed_details: vec![Failure {
                target: "https://x/d1".into(),
                error: "timeout".into(),
            }],
            ..Default::default()
        };

        let lines = failure_lines(&report);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("page"));
        assert!(lines[1].contains("https://x/d1"));
    }
}
