//! Relational target store backed by SQLite.
//!
//! The reference schema ships as versioned migrations recorded in
//! `schema_migrations`. Rows are written one autocommitted statement at a time.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use medchat_migrate_core::row::{
    AllergyRow, AttachmentRow, AuditLogRow, ConversationRow, MedicalHistoryRow, MedicalInfoRow,
    MedicationRow, MessageRow, PrescriptionRow, SymptomRow, UserRow,
};
use medchat_migrate_core::{EntityKind, InsertError, ReleaseError, TargetId, TargetRow, TargetStore};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
  id TEXT PRIMARY KEY,
  email TEXT NOT NULL UNIQUE,
  password_hash TEXT NOT NULL,
  first_name TEXT NOT NULL,
  last_name TEXT NOT NULL,
  role TEXT NOT NULL CHECK (role IN ('patient', 'doctor', 'admin')),
  phone TEXT,
  date_of_birth TEXT,
  gender TEXT,
  specialization TEXT,
  license_number TEXT,
  is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
  last_login TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medical_info (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL UNIQUE,
  blood_type TEXT,
  height_cm REAL CHECK (height_cm IS NULL OR height_cm >= 0),
  weight_kg REAL CHECK (weight_kg IS NULL OR weight_kg >= 0),
  emergency_contact_name TEXT,
  emergency_contact_phone TEXT,
  emergency_contact_relationship TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS allergies (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  name TEXT NOT NULL,
  severity TEXT,
  reaction TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS medications (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  name TEXT NOT NULL,
  dosage TEXT,
  frequency TEXT,
  start_date TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS medical_history (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  condition TEXT NOT NULL,
  diagnosed_at TEXT,
  notes TEXT,
  FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS conversations (
  id TEXT PRIMARY KEY,
  patient_id TEXT NOT NULL,
  doctor_id TEXT,
  title TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('active', 'closed', 'archived')),
  priority TEXT NOT NULL CHECK (priority IN ('low', 'normal', 'high', 'urgent')),
  ai_summary TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  FOREIGN KEY (patient_id) REFERENCES users(id),
  FOREIGN KEY (doctor_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS messages (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  sender_id TEXT,
  role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'doctor', 'system')),
  content TEXT NOT NULL,
  created_at TEXT NOT NULL,
  FOREIGN KEY (conversation_id) REFERENCES conversations(id),
  FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS symptoms (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  name TEXT NOT NULL,
  severity TEXT,
  duration TEXT,
  reported_at TEXT NOT NULL,
  FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE TABLE IF NOT EXISTS attachments (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  file_name TEXT NOT NULL,
  url TEXT NOT NULL,
  mime_type TEXT NOT NULL,
  size_bytes INTEGER CHECK (size_bytes IS NULL OR size_bytes >= 0),
  uploaded_at TEXT NOT NULL,
  FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE TABLE IF NOT EXISTS prescriptions (
  id TEXT PRIMARY KEY,
  conversation_id TEXT NOT NULL,
  patient_id TEXT NOT NULL,
  doctor_id TEXT,
  medication TEXT NOT NULL,
  dosage TEXT NOT NULL,
  frequency TEXT,
  duration TEXT,
  instructions TEXT,
  prescribed_at TEXT NOT NULL,
  FOREIGN KEY (conversation_id) REFERENCES conversations(id),
  FOREIGN KEY (patient_id) REFERENCES users(id),
  FOREIGN KEY (doctor_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS audit_logs (
  id TEXT PRIMARY KEY,
  user_id TEXT,
  action TEXT NOT NULL,
  resource TEXT,
  resource_id TEXT,
  details_json TEXT,
  ip_address TEXT,
  user_agent TEXT,
  created_at TEXT NOT NULL,
  FOREIGN KEY (user_id) REFERENCES users(id)
);
";

const MIGRATION_002_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_allergies_user ON allergies(user_id);
CREATE INDEX IF NOT EXISTS idx_medications_user ON medications(user_id);
CREATE INDEX IF NOT EXISTS idx_medical_history_user ON medical_history(user_id);
CREATE INDEX IF NOT EXISTS idx_conversations_patient ON conversations(patient_id);
CREATE INDEX IF NOT EXISTS idx_conversations_doctor ON conversations(doctor_id);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_symptoms_conversation ON symptoms(conversation_id);
CREATE INDEX IF NOT EXISTS idx_attachments_conversation ON attachments(conversation_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_conversation ON prescriptions(conversation_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_user_time ON audit_logs(user_id, created_at);
";

pub struct SqliteTarget {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.quick_check_ok && self.foreign_key_violations.is_empty()
    }
}

impl SqliteTarget {
    /// Open the target database and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        tracing::info!(path = %path.display(), "opened target database");
        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest bundled schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the recorded version is newer
    /// than this build understands.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected at most {LATEST_SCHEMA_VERSION}"
            ));
        }

        if version < 1 {
            apply_migration(&mut self.conn, 1, MIGRATION_001_SQL)?;
            version = 1;
        }
        if version < 2 {
            apply_migration(&mut self.conn, 2, MIGRATION_002_SQL)?;
        }

        tracing::info!(version = LATEST_SCHEMA_VERSION, "target schema is current");
        Ok(())
    }

    /// Confirm that every table the migration writes to exists.
    ///
    /// # Errors
    /// Returns an error naming the missing tables, or when the catalog cannot be read.
    pub fn verify_schema(&self) -> Result<()> {
        let mut missing = Vec::new();
        for kind in EntityKind::ALL {
            if !table_exists(&self.conn, kind.table())? {
                missing.push(kind.table());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("target schema is missing tables: {}", missing.join(", ")))
        }
    }

    /// Number of rows in the table that stores `kind`.
    ///
    /// # Errors
    /// Returns an error when the table cannot be queried.
    pub fn count_rows(&self, kind: EntityKind) -> Result<u64> {
        let table = kind.table();
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get::<_, i64>(0))
            .with_context(|| format!("failed to count rows in {table}"))?;
        u64::try_from(count).with_context(|| format!("negative row count in {table}"))
    }

    /// Run quick-check and foreign-key-check over the written data.
    ///
    /// # Errors
    /// Returns an error when any integrity query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation { table: row.get(0)?, rowid: row.get(1)?, parent: row.get(2)? })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
        })
    }

    fn insert_user(&self, row: &UserRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users(id, email, password_hash, first_name, last_name, role, phone,
                               date_of_birth, gender, specialization, license_number, is_active,
                               last_login, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                row.id.to_string(),
                row.email,
                row.password_hash,
                row.first_name,
                row.last_name,
                row.role.as_str(),
                row.phone,
                optional_rfc3339(row.date_of_birth)?,
                row.gender,
                row.specialization,
                row.license_number,
                row.is_active,
                optional_rfc3339(row.last_login)?,
                rfc3339(row.created_at)?,
                rfc3339(row.updated_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_medical_info(&self, row: &MedicalInfoRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO medical_info(id, user_id, blood_type, height_cm, weight_kg,
                                      emergency_contact_name, emergency_contact_phone,
                                      emergency_contact_relationship)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id.to_string(),
                row.user_id.to_string(),
                row.blood_type,
                row.height_cm,
                row.weight_kg,
                row.emergency_contact_name,
                row.emergency_contact_phone,
                row.emergency_contact_relationship,
            ],
        )?;
        Ok(())
    }

    fn insert_allergy(&self, row: &AllergyRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO allergies(id, user_id, name, severity, reaction)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id.to_string(), row.user_id.to_string(), row.name, row.severity, row.reaction],
        )?;
        Ok(())
    }

    fn insert_medication(&self, row: &MedicationRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO medications(id, user_id, name, dosage, frequency, start_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id.to_string(),
                row.user_id.to_string(),
                row.name,
                row.dosage,
                row.frequency,
                optional_rfc3339(row.start_date)?,
            ],
        )?;
        Ok(())
    }

    fn insert_medical_history(&self, row: &MedicalHistoryRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO medical_history(id, user_id, condition, diagnosed_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.id.to_string(),
                row.user_id.to_string(),
                row.condition,
                optional_rfc3339(row.diagnosed_at)?,
                row.notes,
            ],
        )?;
        Ok(())
    }

    fn insert_conversation(&self, row: &ConversationRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conversations(id, patient_id, doctor_id, title, status, priority,
                                       ai_summary, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id.to_string(),
                row.patient_id.to_string(),
                optional_id(row.doctor_id),
                row.title,
                row.status.as_str(),
                row.priority.as_str(),
                row.ai_summary,
                rfc3339(row.created_at)?,
                rfc3339(row.updated_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages(id, conversation_id, sender_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id.to_string(),
                row.conversation_id.to_string(),
                optional_id(row.sender_id),
                row.role.as_str(),
                row.content,
                rfc3339(row.created_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_symptom(&self, row: &SymptomRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO symptoms(id, conversation_id, name, severity, duration, reported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id.to_string(),
                row.conversation_id.to_string(),
                row.name,
                row.severity,
                row.duration,
                rfc3339(row.reported_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_attachment(&self, row: &AttachmentRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO attachments(id, conversation_id, file_name, url, mime_type, size_bytes,
                                     uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id.to_string(),
                row.conversation_id.to_string(),
                row.file_name,
                row.url,
                row.mime_type,
                row.size_bytes,
                rfc3339(row.uploaded_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_prescription(&self, row: &PrescriptionRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO prescriptions(id, conversation_id, patient_id, doctor_id, medication,
                                       dosage, frequency, duration, instructions, prescribed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.id.to_string(),
                row.conversation_id.to_string(),
                row.patient_id.to_string(),
                optional_id(row.doctor_id),
                row.medication,
                row.dosage,
                row.frequency,
                row.duration,
                row.instructions,
                rfc3339(row.prescribed_at)?,
            ],
        )?;
        Ok(())
    }

    fn insert_audit_log(&self, row: &AuditLogRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_logs(id, user_id, action, resource, resource_id, details_json,
                                    ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id.to_string(),
                optional_id(row.user_id),
                row.action,
                row.resource,
                row.resource_id,
                row.details_json,
                row.ip_address,
                row.user_agent,
                rfc3339(row.created_at)?,
            ],
        )?;
        Ok(())
    }
}

impl TargetStore for SqliteTarget {
    fn insert(&mut self, row: &TargetRow) -> Result<(), InsertError> {
        let outcome = match row {
            TargetRow::Account(row) => self.insert_user(row),
            TargetRow::MedicalInfo(row) => self.insert_medical_info(row),
            TargetRow::Allergy(row) => self.insert_allergy(row),
            TargetRow::Medication(row) => self.insert_medication(row),
            TargetRow::MedicalHistory(row) => self.insert_medical_history(row),
            TargetRow::Conversation(row) => self.insert_conversation(row),
            TargetRow::Message(row) => self.insert_message(row),
            TargetRow::Symptom(row) => self.insert_symptom(row),
            TargetRow::Attachment(row) => self.insert_attachment(row),
            TargetRow::Prescription(row) => self.insert_prescription(row),
            TargetRow::AuditLog(row) => self.insert_audit_log(row),
        };
        outcome.map_err(|err| InsertError::new(row.kind(), format!("{err:#}")))
    }

    fn release(self) -> Result<(), ReleaseError> {
        self.conn
            .close()
            .map_err(|(_, err)| ReleaseError { store: "target", message: err.to_string() })
    }
}

fn apply_migration(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
    tx.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, rfc3339(OffsetDateTime::now_utc())?],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
    tracing::debug!(version, "applied target schema migration");
    Ok(())
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn optional_id(value: Option<TargetId>) -> Option<String> {
    value.map(|id| id.to_string())
}

fn optional_rfc3339(value: Option<OffsetDateTime>) -> Result<Option<String>> {
    value.map(rfc3339).transpose()
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
