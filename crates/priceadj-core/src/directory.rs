use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Customer notice text. Placeholders of the form `&{name}` are substituted
/// when the notice is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeTemplate {
    pub subject: String,
    pub body: String,
}

/// Who receives what, and who is left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// From-address for every outbound message.
    pub sender: String,
    pub report_recipients: Vec<String>,
    /// Receive run failures and internal API errors.
    pub maintainers: Vec<String>,
    pub opt_out_recipients: Vec<String>,
    #[serde(default)]
    pub opt_out_bcc: Vec<String>,
    #[serde(default)]
    pub excluded_franchisee_ids: Vec<i64>,
    #[serde(default = "default_excluded_customer_prefixes")]
    pub excluded_customer_prefixes: Vec<String>,
    #[serde(default = "default_excluded_customer_patterns")]
    pub excluded_customer_patterns: Vec<String>,
    pub notice_template: NoticeTemplate,
}

fn default_excluded_customer_prefixes() -> Vec<String> {
    ["SC ", "NP ", "AP "].map(str::to_string).to_vec()
}

fn default_excluded_customer_patterns() -> Vec<String> {
    ["Shine Lawyer", "Sendle", "Dashback"]
        .map(str::to_string)
        .to_vec()
}

impl Directory {
    /// Case-insensitive check against the excluded prefixes and name patterns.
    #[must_use]
    pub fn is_excluded_customer(&self, company_name: &str) -> bool {
        let name = company_name.to_lowercase();
        self.excluded_customer_prefixes
            .iter()
            .any(|prefix| name.starts_with(&prefix.to_lowercase()))
            || self
                .excluded_customer_patterns
                .iter()
                .any(|pattern| name.contains(&pattern.to_lowercase()))
    }
}

/// Load and validate the directory from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_directory(path: &Path) -> Result<Directory, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::DirectoryFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_directory(&content)
}

/// Parse and validate directory YAML.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_directory(content: &str) -> Result<Directory, ConfigError> {
    let directory: Directory =
        serde_yaml::from_str(content).map_err(ConfigError::DirectoryFileParse)?;
    validate_directory(&directory)?;
    Ok(directory)
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

fn validate_directory(directory: &Directory) -> Result<(), ConfigError> {
    let check_list = |name: &str, list: &[String], required: bool| -> Result<(), ConfigError> {
        if required && list.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{name} must list at least one address"
            )));
        }
        for address in list {
            if !email_pattern().is_match(address) {
                return Err(ConfigError::Validation(format!(
                    "{name} contains a malformed address: '{address}'"
                )));
            }
        }
        Ok(())
    };

    check_list("sender", std::slice::from_ref(&directory.sender), true)?;
    check_list("report_recipients", &directory.report_recipients, true)?;
    check_list("maintainers", &directory.maintainers, true)?;
    check_list("opt_out_recipients", &directory.opt_out_recipients, true)?;
    check_list("opt_out_bcc", &directory.opt_out_bcc, false)?;

    let mut seen = HashSet::new();
    for id in &directory.excluded_franchisee_ids {
        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!(
                "duplicate excluded franchisee id: {id}"
            )));
        }
    }

    if directory.notice_template.subject.trim().is_empty()
        || directory.notice_template.body.trim().is_empty()
    {
        return Err(ConfigError::Validation(
            "notice_template subject and body must be non-empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r"
sender: accounts@example.com.au
report_recipients:
  - ops@example.com.au
maintainers:
  - dev@example.com.au
opt_out_recipients:
  - franchise@example.com.au
excluded_franchisee_ids: [0, 42]
notice_template:
  subject: Upcoming price adjustment
  body: 'Effective &{dateEffective}: &{serviceTable}'
";

    #[test]
    fn parses_valid_directory_with_defaults() {
        let dir = parse_directory(VALID).unwrap();
        assert_eq!(dir.sender, "accounts@example.com.au");
        assert!(dir.opt_out_bcc.is_empty());
        assert_eq!(dir.excluded_franchisee_ids, vec![0, 42]);
        assert_eq!(dir.excluded_customer_prefixes.len(), 3);
        assert_eq!(dir.excluded_customer_patterns.len(), 3);
    }

    #[test]
    fn rejects_empty_report_recipients() {
        let yaml = VALID.replace(
            "report_recipients:\n  - ops@example.com.au",
            "report_recipients: []",
        );
        let err = parse_directory(&yaml).unwrap_err();
        assert!(err.to_string().contains("report_recipients"));
    }

    #[test]
    fn rejects_malformed_address() {
        let yaml = VALID.replace("dev@example.com.au", "not-an-address");
        let err = parse_directory(&yaml).unwrap_err();
        assert!(err.to_string().contains("malformed address"));
    }

    #[test]
    fn rejects_duplicate_excluded_ids() {
        let yaml = VALID.replace("[0, 42]", "[42, 42]");
        let err = parse_directory(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate excluded franchisee id"));
    }

    #[test]
    fn excluded_customers_match_prefix_and_pattern_case_insensitively() {
        let dir = parse_directory(VALID).unwrap();
        assert!(dir.is_excluded_customer("SC Holdings"));
        assert!(dir.is_excluded_customer("np widgets"));
        assert!(dir.is_excluded_customer("Sendle Pty Ltd"));
        assert!(dir.is_excluded_customer("The shine lawyers group"));
        assert!(!dir.is_excluded_customer("Scaffold Co"));
        assert!(!dir.is_excluded_customer("Acme Pty Ltd"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_directory(Path::new("/nonexistent/directory.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::DirectoryFileIo { .. }));
    }
}
