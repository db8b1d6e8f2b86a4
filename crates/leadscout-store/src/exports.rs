use chrono::{DateTime, Utc};
use leadscout_core::{Lead, LeadScoutError, LeadScoutResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// File format of a rendered export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values with a header row.
    #[default]
    Csv,
    /// Pretty-printed JSON array of leads.
    Json,
}

impl ExportFormat {
    /// File extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Content type served on download.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

/// Metadata for one rendered export file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Unique export identifier.
    pub id: Uuid,
    /// Job the export was rendered from.
    pub job_id: Uuid,
    /// Rendered format.
    pub format: ExportFormat,
    /// Where the file lives on disk.
    pub path: PathBuf,
    /// Rendered size.
    pub size_bytes: u64,
    /// When the export was rendered.
    pub created_at: DateTime<Utc>,
    /// When the file becomes eligible for the retention sweep.
    pub expires_at: DateTime<Utc>,
}

/// Renders job results to downloadable files with a retention window.
///
/// Files live under one directory; metadata is in memory, so exports do
/// not survive a restart. The sweeper calls [`ExportStore::purge_expired`]
/// to delete files past their TTL.
pub struct ExportStore {
    dir: PathBuf,
    ttl: chrono::Duration,
    records: RwLock<HashMap<Uuid, ExportRecord>>,
}

impl ExportStore {
    /// Create the export directory if needed and open a store over it.
    pub async fn new(dir: PathBuf, ttl: std::time::Duration) -> LeadScoutResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(30));
        Ok(Self {
            dir,
            ttl,
            records: RwLock::new(HashMap::new()),
        })
    }

    fn export_path(&self, id: Uuid, format: ExportFormat) -> PathBuf {
        self.dir.join(format!("{id}.{}", format.extension()))
    }

    /// Render `leads` to a file and record it.
    pub async fn create(
        &self,
        job_id: Uuid,
        format: ExportFormat,
        leads: &[Lead],
    ) -> LeadScoutResult<ExportRecord> {
        let id = Uuid::new_v4();
        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec_pretty(leads)?,
            ExportFormat::Csv => render_csv(leads).into_bytes(),
        };
        let path = self.export_path(id, format);
        tokio::fs::write(&path, &bytes).await?;
        let now = Utc::now();
        let record = ExportRecord {
            id,
            job_id,
            format,
            path,
            size_bytes: bytes.len() as u64,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.records.write().insert(id, record.clone());
        info!(
            export_id = %id,
            job_id = %job_id,
            format = format.extension(),
            size_bytes = record.size_bytes,
            "export rendered"
        );
        Ok(record)
    }

    /// Metadata for an export, expired or not.
    pub fn get(&self, id: Uuid) -> Option<ExportRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Read an export's bytes for download. Expired exports are gone.
    pub async fn open(&self, id: Uuid) -> LeadScoutResult<(ExportRecord, Vec<u8>)> {
        let record = self
            .get(id)
            .ok_or_else(|| LeadScoutError::NotFound(format!("export {id}")))?;
        if record.expires_at <= Utc::now() {
            return Err(LeadScoutError::Export(format!("export {id} has expired")));
        }
        let bytes = tokio::fs::read(&record.path).await?;
        Ok((record, bytes))
    }

    /// Delete exports past their TTL. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<ExportRecord> = {
            let mut records = self.records.write();
            let ids: Vec<Uuid> = records
                .values()
                .filter(|r| r.expires_at <= now)
                .map(|r| r.id)
                .collect();
            ids.iter().filter_map(|id| records.remove(id)).collect()
        };
        for record in &expired {
            if let Err(err) = tokio::fs::remove_file(&record.path).await {
                warn!(export_id = %record.id, error = %err, "expired export file not removed");
            }
        }
        expired.len()
    }

    /// Delete every export belonging to `job_id`, for job retention sweeps.
    pub async fn remove_for_job(&self, job_id: Uuid) -> usize {
        let removed: Vec<ExportRecord> = {
            let mut records = self.records.write();
            let ids: Vec<Uuid> = records
                .values()
                .filter(|r| r.job_id == job_id)
                .map(|r| r.id)
                .collect();
            ids.iter().filter_map(|id| records.remove(id)).collect()
        };
        for record in &removed {
            if let Err(err) = tokio::fs::remove_file(&record.path).await {
                warn!(export_id = %record.id, error = %err, "export file not removed");
            }
        }
        removed.len()
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn push_row(out: &mut String, cells: &[String]) {
    let line = cells
        .iter()
        .map(|c| csv_escape(c))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Fixed columns, then the sorted union of field names across all leads.
fn render_csv(leads: &[Lead]) -> String {
    let mut field_names: BTreeSet<&str> = BTreeSet::new();
    for lead in leads {
        for name in lead.fields.keys() {
            field_names.insert(name);
        }
    }

    let mut out = String::new();
    let mut header: Vec<String> = vec![
        "business_name".into(),
        "location".into(),
        "confidence_score".into(),
        "provenance".into(),
    ];
    header.extend(field_names.iter().map(|n| (*n).to_string()));
    push_row(&mut out, &header);

    for lead in leads {
        let mut row: Vec<String> = vec![
            lead.business_name.clone(),
            lead.location.clone(),
            lead.confidence_score.to_string(),
            lead.provenance
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        ];
        for name in &field_names {
            row.push(lead.field_value(name).unwrap_or("").to_string());
        }
        push_row(&mut out, &row);
    }
    out
}
