//! Tabular reports mailed at the end of a run.
//!
//! A [`Workbook`] is a list of named sheets rendered as one CSV file, each
//! sheet introduced by its name on a line of its own.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use priceadj_core::{
    format_dmy, format_ymd_unpadded, franchisee_session_status, FranchiseeSessionStatus,
};

use crate::error::PipelineError;
use crate::notifier::{Attachment, Mail};
use crate::store::{RecordStore, SessionFilter};
use crate::work_item::{CompletedItem, Phase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Sheet {
    /// Name line, header record, then one record per row.
    fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::CRLF)
            .from_writer(Vec::new());

        writer.write_record([self.name.as_str()])?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

impl Workbook {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Every sheet in order, separated by a blank line.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Csv`] if a sheet cannot be written.
    pub fn to_csv(&self) -> Result<Vec<u8>, PipelineError> {
        let mut out = Vec::new();
        for (index, sheet) in self.sheets.iter().enumerate() {
            if index > 0 {
                out.extend_from_slice(b"\r\n");
            }
            out.extend(sheet.to_csv()?);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

const RUN_REPORT_HEADERS: [&str; 11] = [
    "Entity ID",
    "Customer ID",
    "Customer Name",
    "Franchisee ID",
    "Franchisee Name",
    "Service ID",
    "Service Name",
    "Service Price",
    "Adjustment",
    "New Price",
    "Status",
];

/// One sheet per processed session, one row per service of each processed
/// customer. `None` when nothing was processed.
#[must_use]
pub fn build_run_report(completed: &[CompletedItem]) -> Option<Workbook> {
    let mut sessions: BTreeMap<i64, Sheet> = BTreeMap::new();

    for done in completed.iter().filter(|c| c.item.phase == Phase::Process) {
        let item = &done.item;
        let sheet = sessions.entry(item.session_id).or_insert_with(|| Sheet {
            name: format!("{} Price Increase", format_dmy(item.effective_date)),
            headers: RUN_REPORT_HEADERS.to_vec(),
            rows: Vec::new(),
        });

        for service in &item.services {
            let row = &service.row;
            sheet.rows.push(vec![
                item.customer_entity_id.clone(),
                item.customer_id.to_string(),
                item.customer_name.clone(),
                item.franchisee_id.to_string(),
                item.franchisee_name.clone(),
                row.service_id.to_string(),
                row.service_name.clone(),
                row.current_price.to_string(),
                row.adjustment.to_string(),
                row.new_price().to_string(),
                row.report_status().label().to_string(),
            ]);
        }
    }

    if sessions.is_empty() {
        return None;
    }

    Some(Workbook {
        sheets: sessions.into_values().collect(),
    })
}

/// # Errors
///
/// Returns [`PipelineError::Csv`] if the workbook cannot be rendered.
pub fn run_report_mail(
    workbook: &Workbook,
    today: NaiveDate,
    recipients: &[String],
) -> Result<Mail, PipelineError> {
    let date = format_dmy(today);
    Ok(Mail {
        recipients: recipients.to_vec(),
        bcc: Vec::new(),
        subject: format!("Final Price Increase Report for {date}"),
        body: format!(
            "Please see the attached spreadsheet for customers and franchisees affected by \
             this Price Increase Period (effective date {date})"
        ),
        attachments: vec![Attachment::csv(
            format!("price_increase_report_{}.csv", format_ymd_unpadded(today)),
            workbook.to_csv()?,
        )],
    })
}

// ---------------------------------------------------------------------------
// Franchisee activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FranchiseeStatusRow {
    pub franchisee_id: i64,
    pub franchisee_name: String,
    pub status: FranchiseeSessionStatus,
    pub label: String,
}

/// Status of every reportable franchisee in a session, most advanced first.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if franchisees or records cannot be read.
pub async fn franchisee_statuses(
    store: &dyn RecordStore,
    session_id: i64,
    excluded_ids: &[i64],
) -> Result<Vec<FranchiseeStatusRow>, PipelineError> {
    let records: HashMap<i64, _> = store
        .list_franchisee_records(session_id, true)
        .await?
        .into_iter()
        .map(|r| (r.franchisee_id, r))
        .collect();

    let mut rows: Vec<FranchiseeStatusRow> = store
        .list_franchisees()
        .await?
        .into_iter()
        .filter(|f| f.is_reportable(excluded_ids))
        .map(|f| {
            let status = franchisee_session_status(records.get(&f.id));
            FranchiseeStatusRow {
                franchisee_id: f.id,
                franchisee_name: f.company_name,
                status,
                label: status.label(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.status
            .order()
            .cmp(&b.status.order())
            .then_with(|| a.franchisee_name.cmp(&b.franchisee_name))
    });

    Ok(rows)
}

/// Activity of every franchisee across sessions still accepting input.
/// `None` when no session is in its input window.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if sessions or records cannot be read.
pub async fn build_weekly_report(
    store: &dyn RecordStore,
    today: NaiveDate,
    excluded_ids: &[i64],
) -> Result<Option<Workbook>, PipelineError> {
    let sessions = store
        .list_sessions(&SessionFilter {
            accepting_input_on: Some(today),
            exclude_completed: true,
            ..SessionFilter::default()
        })
        .await?;

    if sessions.is_empty() {
        return Ok(None);
    }

    let mut workbook = Workbook::default();
    for session in sessions {
        let effective = session.effective_date();
        let rows = franchisee_statuses(store, session.id, excluded_ids).await?;
        workbook.sheets.push(Sheet {
            name: format!(
                "EDate {}.{}.{}",
                effective.day(),
                effective.month(),
                effective.year()
            ),
            headers: vec!["Franchisee ID", "Franchisee Name", "Session Status"],
            rows: rows
                .into_iter()
                .map(|r| vec![r.franchisee_id.to_string(), r.franchisee_name, r.label])
                .collect(),
        });
    }

    Ok(Some(workbook))
}

/// # Errors
///
/// Returns [`PipelineError::Csv`] if the workbook cannot be rendered.
pub fn weekly_report_mail(
    workbook: &Workbook,
    today: NaiveDate,
    recipients: &[String],
) -> Result<Mail, PipelineError> {
    Ok(Mail {
        recipients: recipients.to_vec(),
        bcc: Vec::new(),
        subject: "Weekly Price Increase Activity Report".to_string(),
        body: "Please see the attached spreadsheet for franchisees' activities within this \
               Price Increase Period as of today."
            .to_string(),
        attachments: vec![Attachment::csv(
            format!(
                "weekly_price_increase_activity_report_{}.csv",
                format_ymd_unpadded(today)
            ),
            workbook.to_csv()?,
        )],
    })
}

#[must_use]
pub fn is_weekly_report_day(today: NaiveDate) -> bool {
    today.weekday() == Weekday::Mon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(workbook: &Workbook) -> String {
        String::from_utf8(workbook.to_csv().unwrap()).unwrap()
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let wb = Workbook {
            sheets: vec![Sheet {
                name: "Quotes".to_string(),
                headers: vec!["Name", "Note"],
                rows: vec![vec!["Smith, J".to_string(), "say \"hi\"".to_string()]],
            }],
        };
        assert_eq!(
            rendered(&wb),
            "Quotes\r\nName,Note\r\n\"Smith, J\",\"say \"\"hi\"\"\"\r\n"
        );
    }

    #[test]
    fn workbook_renders_sections() {
        let wb = Workbook {
            sheets: vec![
                Sheet {
                    name: "One".to_string(),
                    headers: vec!["A", "B"],
                    rows: vec![vec!["1".to_string(), "x,y".to_string()]],
                },
                Sheet {
                    name: "Two".to_string(),
                    headers: vec!["A"],
                    rows: vec![],
                },
            ],
        };
        assert_eq!(rendered(&wb), "One\r\nA,B\r\n1,\"x,y\"\r\n\r\nTwo\r\nA\r\n");
        assert!(Workbook::default().to_csv().unwrap().is_empty());
    }

    #[test]
    fn mail_names_follow_unpadded_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let mail =
            run_report_mail(&Workbook::default(), today, &["ops@example.com".to_string()])
                .unwrap();
        assert_eq!(mail.subject, "Final Price Increase Report for 1/7/2024");
        assert_eq!(mail.attachments[0].file_name, "price_increase_report_2024-7-1.csv");

        let weekly = weekly_report_mail(&Workbook::default(), today, &[]).unwrap();
        assert_eq!(
            weekly.attachments[0].file_name,
            "weekly_price_increase_activity_report_2024-7-1.csv"
        );
    }

    #[test]
    fn monday_is_report_day() {
        assert!(is_weekly_report_day(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()));
        assert!(!is_weekly_report_day(NaiveDate::from_ymd_opt(2024, 7, 2).unwrap()));
    }
}
