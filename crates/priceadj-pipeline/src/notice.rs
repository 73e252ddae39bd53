//! Customer price adjustment notices.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use priceadj_core::{format_aud, format_dmy, Address, CustomerRecord, NoticeTemplate};

use crate::error::PipelineError;
use crate::notifier::{CustomerNotice, Notifier};
use crate::store::RecordStore;
use crate::work_item::{CandidateService, RevalidatedItem};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&\{(\w+)\}").expect("valid placeholder regex"));

/// Replace every known `&{name}` placeholder in one pass. Names match
/// ignoring case; unknown placeholders are left as written.
fn substitute(body: &str, values: &[(&str, String)]) -> String {
    PLACEHOLDER
        .replace_all(body, |caps: &Captures<'_>| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.clone())
        })
        .into_owned()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn service_table<'a>(services: impl Iterator<Item = &'a CandidateService>) -> String {
    let mut html = String::from(
        "<table width=\"500\" border=\"1\"><thead><tr><th>SERVICE</th>\
         <th>AMOUNT OF INCREASE(Exc. GST)</th></tr></thead><tbody>",
    );
    for service in services {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(&service.row.service_name),
            format_aud(service.row.adjustment)
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// Render the notice for an item, or `None` when no service is actionable.
///
/// # Errors
///
/// Returns [`PipelineError::NoValidAddress`] if the customer has no address.
pub fn build_notice(
    customer: &CustomerRecord,
    item: &RevalidatedItem,
    template: &NoticeTemplate,
    today: NaiveDate,
) -> Result<Option<CustomerNotice>, PipelineError> {
    if !item.has_actionable() {
        return Ok(None);
    }

    let address = customer
        .billing_address()
        .ok_or(PipelineError::NoValidAddress {
            customer_id: customer.id,
        })?;

    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    let Address {
        addr1,
        addr2,
        city,
        state,
        zip,
        ..
    } = address;

    let substitutions = [
        ("serviceTable", service_table(item.actionable())),
        ("headerDate", format_dmy(today)),
        ("addrUnit", field(addr1)),
        ("addrStreet", field(addr2)),
        ("addrCity", field(city)),
        ("addrState", field(state)),
        ("addrPostcode", field(zip)),
        ("dateEffective", format_dmy(item.effective_date)),
    ];

    let body = substitute(&template.body, &substitutions);

    Ok(Some(CustomerNotice {
        customer_id: customer.id,
        recipients: customer.notice_recipients(),
        subject: template.subject.clone(),
        body,
    }))
}

/// Load the customer, render and send their notice. Returns whether a notice
/// went out.
///
/// # Errors
///
/// Returns an error if the customer cannot be loaded, the notice cannot be
/// rendered or delivery fails.
pub async fn send_customer_notice(
    store: &dyn RecordStore,
    notifier: &dyn Notifier,
    template: &NoticeTemplate,
    item: &RevalidatedItem,
    today: NaiveDate,
) -> Result<bool, PipelineError> {
    if !item.has_actionable() {
        return Ok(false);
    }

    let customer = store.load_customer(item.customer_id).await?;
    let Some(notice) = build_notice(&customer, item, template, today)? else {
        return Ok(false);
    };

    if notice.recipients.is_empty() {
        tracing::warn!(
            customer_id = item.customer_id,
            "pipeline: customer has no notice recipients"
        );
        return Ok(false);
    }

    notifier.send_customer_notice(&notice).await?;
    tracing::info!(
        customer_id = item.customer_id,
        recipients = notice.recipients.len(),
        "pipeline: notice sent"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_item::Phase;
    use priceadj_core::{Frequency, ServiceAdjustmentRow};
    use rust_decimal::Decimal;

    fn row(service_id: i64, name: &str, adjustment: i64, confirmed: bool) -> CandidateService {
        CandidateService {
            row: ServiceAdjustmentRow {
                service_id,
                service_type_id: 22,
                service_name: name.to_string(),
                current_price: Decimal::new(4000, 2),
                adjustment: Decimal::new(adjustment, 0),
                confirmed,
                customer_id: 7,
                customer_entity_id: "C-7".to_string(),
                customer_name: "Acme".to_string(),
                franchisee_id: 3,
                franchisee_name: "Sydney North".to_string(),
                national_account: false,
            },
            frequency: Frequency(vec![1]),
        }
    }

    fn item(services: Vec<CandidateService>) -> RevalidatedItem {
        RevalidatedItem {
            phase: Phase::Notify,
            session_id: 1,
            effective_date: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
            customer_id: 7,
            customer_name: "Acme".to_string(),
            customer_entity_id: "C-7".to_string(),
            franchisee_id: 3,
            franchisee_name: "Sydney North".to_string(),
            services,
        }
    }

    fn customer(addresses: Vec<Address>) -> CustomerRecord {
        CustomerRecord {
            id: 7,
            entity_id: "C-7".to_string(),
            company_name: "Acme".to_string(),
            franchisee_id: Some(3),
            email: Some("owner@acme.test".to_string()),
            service_email: None,
            accounts_cc_email: Some("ap@acme.test".to_string()),
            addresses,
            last_price_increase: None,
            national_account: false,
            signed: true,
        }
    }

    fn template() -> NoticeTemplate {
        NoticeTemplate {
            subject: "Price adjustment".to_string(),
            body: "&{HEADERDATE}|&{addrUnit}|&{addrStreet}|&{addrCity}|&{addrState}|&{addrPostcode}|&{dateEffective}|&{serviceTable}"
                .to_string(),
        }
    }

    fn address() -> Address {
        Address {
            addr1: Some("Unit 4".to_string()),
            addr2: Some("1 George St".to_string()),
            city: Some("Sydney".to_string()),
            state: Some("NSW".to_string()),
            zip: Some("2000".to_string()),
            default_billing: true,
            ..Address::default()
        }
    }

    #[test]
    fn placeholders_are_substituted_case_insensitively() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let notice = build_notice(
            &customer(vec![address()]),
            &item(vec![row(1, "Daily Clean", 5, true)]),
            &template(),
            today,
        )
        .unwrap()
        .unwrap();

        assert!(notice.body.starts_with(
            "1/7/2024|Unit 4|1 George St|Sydney|NSW|2000|15/7/2024|<table"
        ));
        assert!(notice.body.contains("<td>Daily Clean</td><td>$5.00</td>"));
        assert_eq!(notice.recipients, vec!["owner@acme.test", "ap@acme.test"]);
    }

    #[test]
    fn only_actionable_rows_are_listed() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let notice = build_notice(
            &customer(vec![address()]),
            &item(vec![
                row(1, "Daily Clean", 5, true),
                row(2, "Window Wash", 3, false),
                row(3, "Bins", 0, true),
            ]),
            &template(),
            today,
        )
        .unwrap()
        .unwrap();
        assert!(!notice.body.contains("Window Wash"));
        assert!(!notice.body.contains("Bins"));
    }

    #[test]
    fn nothing_actionable_means_no_notice() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let notice = build_notice(
            &customer(vec![]),
            &item(vec![row(1, "Daily Clean", 0, true)]),
            &template(),
            today,
        )
        .unwrap();
        assert!(notice.is_none());
    }

    #[test]
    fn missing_address_is_an_error() {
        let today = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let err = build_notice(
            &customer(vec![]),
            &item(vec![row(1, "Daily Clean", 5, true)]),
            &template(),
            today,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::NoValidAddress { customer_id: 7 }));
    }

    #[test]
    fn substitution_does_not_expand_dollar_signs() {
        let values = [("v", "$1.00".to_string())];
        assert_eq!(substitute("x &{v} y", &values), "x $1.00 y");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let values = [("dateEffective", "15/7/2024".to_string())];
        assert_eq!(
            substitute("&{DATEEFFECTIVE} &{other} &{dateeffective}", &values),
            "15/7/2024 &{other} 15/7/2024"
        );
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let values = [
            ("a", "&{b}".to_string()),
            ("b", "nested".to_string()),
        ];
        assert_eq!(substitute("&{a}|&{b}", &values), "&{b}|nested");
    }
}
