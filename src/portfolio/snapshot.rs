// Public portfolio sections

use crate::db::{Record, RecordStore, SelectQuery, Table};
use crate::types::AppResult;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

/// Tables shown on the public site, in page order.
pub const PUBLIC_SECTIONS: [Table; 7] = [
    Table::Profile,
    Table::About,
    Table::Projects,
    Table::Skills,
    Table::Experience,
    Table::Education,
    Table::Certificates,
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSnapshot {
    pub profile: Option<Record>,
    pub about: Option<Record>,
    pub projects: Vec<Record>,
    pub skills: Vec<Record>,
    pub experience: Vec<Record>,
    pub education: Vec<Record>,
    pub certificates: Vec<Record>,
    /// Sections that failed to load and were left empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Table>,
}

/// A snapshot with its assets resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
    #[serde(flatten)]
    pub snapshot: PortfolioSnapshot,
    /// Seconds until the earliest signed URL should be re-fetched
    pub refresh_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub section: Table,
    pub records: Vec<Record>,
    pub refresh_after_secs: Option<u64>,
}

/// Load one section in its display order with JSON-string columns decoded.
pub async fn load_section(store: &dyn RecordStore, table: Table) -> AppResult<Vec<Record>> {
    let mut rows = store.select(table, &SelectQuery::for_table(table)).await?;
    for row in &mut rows {
        row.decode_json_strings(table.json_string_columns());
    }
    Ok(rows)
}

impl PortfolioSnapshot {
    /// Load every public section. A failing section is logged and left empty.
    pub async fn load(store: &dyn RecordStore) -> Self {
        let results = join_all(PUBLIC_SECTIONS.iter().map(|table| load_section(store, *table))).await;

        let mut snapshot = Self::default();
        for (table, result) in PUBLIC_SECTIONS.into_iter().zip(results) {
            match result {
                Ok(rows) => snapshot.set_section(table, rows),
                Err(e) => {
                    warn!(%table, error = %e, "Section failed to load, leaving it empty");
                    snapshot.unavailable.push(table);
                }
            }
        }

        info!(
            projects = snapshot.projects.len(),
            skills = snapshot.skills.len(),
            certificates = snapshot.certificates.len(),
            unavailable = snapshot.unavailable.len(),
            "Portfolio loaded"
        );
        snapshot
    }

    fn set_section(&mut self, table: Table, rows: Vec<Record>) {
        match table {
            Table::Profile => self.profile = rows.into_iter().next(),
            Table::About => self.about = rows.into_iter().next(),
            Table::Projects => self.projects = rows,
            Table::Skills => self.skills = rows,
            Table::Experience => self.experience = rows,
            Table::Education => self.education = rows,
            Table::Certificates => self.certificates = rows,
            Table::ContactMessages => {}
        }
    }

    /// Every section as a mutable batch of records.
    pub fn sections_mut(&mut self) -> Vec<(Table, &mut [Record])> {
        vec![
            (Table::Profile, self.profile.as_mut().map(std::slice::from_mut).unwrap_or_default()),
            (Table::About, self.about.as_mut().map(std::slice::from_mut).unwrap_or_default()),
            (Table::Projects, self.projects.as_mut_slice()),
            (Table::Skills, self.skills.as_mut_slice()),
            (Table::Experience, self.experience.as_mut_slice()),
            (Table::Education, self.education.as_mut_slice()),
            (Table::Certificates, self.certificates.as_mut_slice()),
        ]
    }
}
