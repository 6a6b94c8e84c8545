/// CSV import and export
///
/// Imports validate every row, collect per-row errors, and commit all valid
/// rows in a single transaction. Exports use the same header layout as the
/// matching import, so an export can be re-imported.
///
/// # Layouts
///
/// | Resource | Header |
/// |---|---|
/// | Accounts | `name,industry,phone,website,owner_email` |
/// | Contacts | `first_name,last_name,email,phone,role_title,company` |
/// | Opportunities | `name,account,stage,value,close_date,owner_email` |
///
/// Row numbers in reports are 1-based and count data rows only.
///
/// # Example
///
/// ```no_run
/// use rolodex_shared::csv_io::import_accounts;
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let report = import_accounts(&pool, "name,industry\nAcme,Widgets\n,Missing name\n").await?;
/// assert_eq!(report.created, 1);
/// assert_eq!(report.errors[0].row, 2);
/// # Ok(())
/// # }
/// ```

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::policy::RowScope;
use crate::models::account::{Account, AccountData};
use crate::models::contact::{Contact, ContactData};
use crate::models::opportunity::{Opportunity, OpportunityData};
use crate::models::user::User;

pub const ACCOUNT_HEADER: [&str; 5] = ["name", "industry", "phone", "website", "owner_email"];
pub const CONTACT_HEADER: [&str; 6] = ["first_name", "last_name", "email", "phone", "role_title", "company"];
pub const OPPORTUNITY_HEADER: [&str; 6] = ["name", "account", "stage", "value", "close_date", "owner_email"];

/// Error type for CSV processing that aborts the whole batch
#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV encoding error: {0}")]
    Encoding(String),
}

/// A rejected data row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based data row number
    pub row: usize,
    pub message: String,
}

/// Outcome of an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    fn reject(&mut self, row: usize, message: impl Into<String>) {
        self.errors.push(RowError {
            row,
            message: message.into(),
        });
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountRow {
    name: Option<String>,
    industry: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    owner_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContactRow {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    role_title: Option<String>,
    company: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpportunityRow {
    name: Option<String>,
    account: Option<String>,
    stage: Option<String>,
    value: Option<String>,
    close_date: Option<String>,
    owner_email: Option<String>,
}

/// Treats blank cells as absent
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn reader(data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

/// Imports accounts
///
/// `name` is required and must be unique, both against stored accounts and
/// within the file. An `owner_email` that matches no user is ignored.
pub async fn import_accounts(pool: &SqlitePool, data: &str) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport::default();
    let mut seen = HashSet::new();
    let mut tx = pool.begin().await?;

    for (index, record) in reader(data).deserialize::<AccountRow>().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                report.reject(row, format!("Unreadable row: {}", e));
                continue;
            }
        };

        let Some(name) = clean(record.name) else {
            report.reject(row, "name is required");
            continue;
        };
        if !seen.insert(name.clone()) {
            report.reject(row, format!("Duplicate account name in file: {}", name));
            continue;
        }
        if Account::find_by_name(&mut *tx, &name).await?.is_some() {
            report.reject(row, format!("Account already exists: {}", name));
            continue;
        }

        let owner_id = match clean(record.owner_email) {
            Some(email) => User::find_by_email(&mut *tx, &email).await?.map(|u| u.id),
            None => None,
        };

        let created = Account::create(
            &mut *tx,
            AccountData {
                name: name.clone(),
                industry: clean(record.industry),
                phone: clean(record.phone),
                website: clean(record.website),
                owner_id,
            },
        )
        .await;

        match created {
            Ok(_) => report.created += 1,
            Err(e) if is_unique_violation(&e) => {
                report.reject(row, format!("Account already exists: {}", name));
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit().await?;
    tracing::info!(created = report.created, rejected = report.errors.len(), "Imported accounts");
    Ok(report)
}

/// Imports contacts
///
/// `first_name` is required and `company` must exactly match an account name.
pub async fn import_contacts(pool: &SqlitePool, data: &str) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    for (index, record) in reader(data).deserialize::<ContactRow>().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                report.reject(row, format!("Unreadable row: {}", e));
                continue;
            }
        };

        let Some(first_name) = clean(record.first_name) else {
            report.reject(row, "first_name is required");
            continue;
        };
        let Some(company) = clean(record.company) else {
            report.reject(row, "company is required");
            continue;
        };
        let Some(account) = Account::find_by_name(&mut *tx, &company).await? else {
            report.reject(row, format!("Unknown company: {}", company));
            continue;
        };

        Contact::create(
            &mut *tx,
            ContactData {
                first_name,
                last_name: clean(record.last_name),
                email: clean(record.email),
                phone: clean(record.phone),
                role_title: clean(record.role_title),
                account_id: account.id,
            },
        )
        .await?;
        report.created += 1;
    }

    tx.commit().await?;
    tracing::info!(created = report.created, rejected = report.errors.len(), "Imported contacts");
    Ok(report)
}

/// Imports opportunities on behalf of `importer`
///
/// `name` is required and `account` must match an account name. The owner
/// is the user named by `owner_email`, or the importer when that is blank or
/// unknown. Rows whose owner falls outside `scope` are rejected.
pub async fn import_opportunities(
    pool: &SqlitePool,
    data: &str,
    importer: i64,
    scope: RowScope,
) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport::default();
    let mut tx = pool.begin().await?;

    for (index, record) in reader(data).deserialize::<OpportunityRow>().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                report.reject(row, format!("Unreadable row: {}", e));
                continue;
            }
        };

        let Some(name) = clean(record.name) else {
            report.reject(row, "name is required");
            continue;
        };
        let Some(account_name) = clean(record.account) else {
            report.reject(row, "account is required");
            continue;
        };
        let Some(account) = Account::find_by_name(&mut *tx, &account_name).await? else {
            report.reject(row, format!("Unknown account: {}", account_name));
            continue;
        };

        let value = match clean(record.value).map(|v| v.parse::<i64>()) {
            None => None,
            Some(Ok(value)) if value >= 0 => Some(value),
            Some(Ok(_)) => {
                report.reject(row, "value must not be negative");
                continue;
            }
            Some(Err(_)) => {
                report.reject(row, "value must be a whole number");
                continue;
            }
        };
        let close_date = match clean(record.close_date).map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d")) {
            None => None,
            Some(Ok(date)) => Some(date),
            Some(Err(_)) => {
                report.reject(row, "close_date must be YYYY-MM-DD");
                continue;
            }
        };

        let owner_id = match clean(record.owner_email) {
            Some(email) => User::find_by_email(&mut *tx, &email)
                .await?
                .map(|u| u.id)
                .unwrap_or(importer),
            None => importer,
        };
        if !scope.permits(Some(owner_id)) {
            report.reject(row, "You may not assign opportunities to another owner");
            continue;
        }

        Opportunity::create(
            &mut *tx,
            OpportunityData {
                name,
                stage: clean(record.stage),
                value,
                close_date,
                account_id: account.id,
                owner_id: Some(owner_id),
            },
        )
        .await?;
        report.created += 1;
    }

    tx.commit().await?;
    tracing::info!(
        importer,
        created = report.created,
        rejected = report.errors.len(),
        "Imported opportunities"
    );
    Ok(report)
}

/// Renders rows as CSV under a fixed header
///
/// The header is written even when there are no rows.
pub fn write_csv<T: Serialize>(header: &[&str], rows: &[T]) -> Result<String, CsvError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Encoding(e.to_string()))
}
