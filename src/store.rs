use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::app_dirs::AppDirs;
use crate::directory::{RosterProvider, SwimmerDirectory};
use crate::error::StoreError;
use crate::heat::HeatPreset;
use crate::result::{HeatEntry, HeatResult, StoredHeat};

/// Durable destination for finalized heats. Returns the id of the stored heat.
pub trait HeatSink {
    fn store(&mut self, result: &HeatResult) -> Result<i64, StoreError>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS heats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    distance TEXT NOT NULL,
    date TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS heat_swimmers (
    heat_id INTEGER NOT NULL REFERENCES heats(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    stroke TEXT NOT NULL,
    time TEXT NOT NULL,
    feedback TEXT NOT NULL,
    PRIMARY KEY (heat_id, position)
);
CREATE INDEX IF NOT EXISTS idx_heat_swimmers_email ON heat_swimmers(email COLLATE NOCASE);
CREATE TABLE IF NOT EXISTS swimmers (
    name TEXT PRIMARY KEY,
    email TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS heat_presets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    distance TEXT NOT NULL,
    swimmers TEXT NOT NULL,
    strokes TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// SQLite store for heats, the swimmer directory and heat presets
#[derive(Debug)]
pub struct HeatDb {
    conn: Connection,
}

impl HeatDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open the database under the user's state directory
    pub fn open_default() -> Result<Self, StoreError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("heatlog.db"));
        log::debug!("opening heat database at {}", path.display());
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(HeatDb { conn })
    }

    /// Write a heat and all of its entries in one transaction
    pub fn insert_heat(&mut self, result: &HeatResult) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO heats (distance, date) VALUES (?1, ?2)",
            params![result.distance, result.date.to_rfc3339()],
        )?;
        let heat_id = tx.last_insert_rowid();

        for (position, entry) in result.entries.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO heat_swimmers
                (heat_id, position, name, email, stroke, time, feedback)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    heat_id,
                    position as i64,
                    entry.name,
                    entry.email,
                    entry.stroke,
                    entry.time,
                    entry.feedback,
                ],
            )?;
        }

        tx.commit()?;
        log::debug!("stored heat {} with {} entries", heat_id, result.entries.len());
        Ok(heat_id)
    }

    pub fn get_heat(&self, id: i64) -> Result<Option<StoredHeat>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, distance, date, created_at FROM heats WHERE id = ?1",
                [id],
                heat_row,
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut entries = self.load_entries(Some(id))?;
        row.into_stored(entries.remove(&id).unwrap_or_default()).map(Some)
    }

    /// Every stored heat, newest first
    pub fn list_heats(&self) -> Result<Vec<StoredHeat>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, distance, date, created_at FROM heats ORDER BY created_at DESC, id DESC")?;
        let rows = stmt
            .query_map([], heat_row)?
            .collect::<rusqlite::Result<Vec<HeatRow>>>()?;

        let mut entries = self.load_entries(None)?;
        rows.into_iter()
            .map(|row| {
                let heat_entries = entries.remove(&row.id).unwrap_or_default();
                row.into_stored(heat_entries)
            })
            .collect()
    }

    /// Heats a swimmer took part in, each narrowed down to that swimmer's
    /// own entries. Emails compare case-insensitively.
    pub fn heats_for_email(&self, email: &str) -> Result<Vec<StoredHeat>, StoreError> {
        Ok(self
            .list_heats()?
            .iter()
            .filter_map(|heat| heat.narrowed_to_email(email))
            .collect())
    }

    pub fn delete_heat(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.conn.execute("DELETE FROM heats WHERE id = ?1", [id])? > 0)
    }

    fn load_entries(&self, heat_id: Option<i64>) -> Result<HashMap<i64, Vec<HeatEntry>>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT heat_id, name, email, stroke, time, feedback
            FROM heat_swimmers
            WHERE ?1 IS NULL OR heat_id = ?1
            ORDER BY heat_id, position
            "#,
        )?;

        let rows = stmt.query_map([heat_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                HeatEntry {
                    name: row.get(1)?,
                    email: row.get(2)?,
                    stroke: row.get(3)?,
                    time: row.get(4)?,
                    feedback: row.get(5)?,
                },
            ))
        })?;

        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .into_group_map())
    }

    /// Add a swimmer account, or update the email of an existing one
    pub fn register_swimmer(&self, name: &str, email: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO swimmers (name, email) VALUES (?1, ?2) ON CONFLICT(name) DO UPDATE SET email = excluded.email",
            params![name, email],
        )?;
        Ok(())
    }

    pub fn swimmers(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT name, email FROM swimmers ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn save_preset(&self, preset: &HeatPreset) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO heat_presets (distance, swimmers, strokes) VALUES (?1, ?2, ?3)",
            params![
                preset.distance,
                serde_json::to_string(&preset.swimmers)?,
                serde_json::to_string(&preset.strokes)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Saved presets, newest first
    pub fn list_presets(&self) -> Result<Vec<(i64, HeatPreset)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, distance, swimmers, strokes FROM heat_presets ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([], preset_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, distance, swimmers, strokes)| Ok((id, decode_preset(distance, &swimmers, &strokes)?)))
            .collect()
    }

    /// Load a preset and remove it from the store
    pub fn take_preset(&mut self, id: i64) -> Result<Option<HeatPreset>, StoreError> {
        let tx = self.conn.transaction()?;
        let row = tx
            .query_row(
                "SELECT id, distance, swimmers, strokes FROM heat_presets WHERE id = ?1",
                [id],
                preset_row,
            )
            .optional()?;
        let Some((_, distance, swimmers, strokes)) = row else {
            return Ok(None);
        };
        let preset = decode_preset(distance, &swimmers, &strokes)?;
        tx.execute("DELETE FROM heat_presets WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(Some(preset))
    }

    pub fn delete_preset(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.conn.execute("DELETE FROM heat_presets WHERE id = ?1", [id])? > 0)
    }
}

impl HeatSink for HeatDb {
    fn store(&mut self, result: &HeatResult) -> Result<i64, StoreError> {
        self.insert_heat(result)
    }
}

impl SwimmerDirectory for HeatDb {
    fn email_for(&self, name: &str) -> Option<String> {
        self.conn
            .query_row("SELECT email FROM swimmers WHERE name = ?1", [name], |row| row.get(0))
            .optional()
            .unwrap_or_else(|e| {
                log::warn!("swimmer lookup for {} failed - {}", name, e);
                None
            })
    }
}

impl RosterProvider for HeatDb {
    fn roster(&self) -> Vec<String> {
        match self.swimmers() {
            Ok(swimmers) => swimmers.into_iter().map(|(name, _)| name).collect(),
            Err(e) => {
                log::warn!("could not load roster - {}", e);
                Vec::new()
            }
        }
    }
}

struct HeatRow {
    id: i64,
    distance: String,
    date: String,
    created_at: String,
}

impl HeatRow {
    fn into_stored(self, entries: Vec<HeatEntry>) -> Result<StoredHeat, StoreError> {
        let date = DateTime::parse_from_rfc3339(&self.date)
            .map_err(|_| StoreError::InvalidDate(self.date.clone()))?
            .with_timezone(&Utc);
        Ok(StoredHeat {
            id: self.id,
            timestamp: self.created_at,
            result: HeatResult {
                distance: self.distance,
                date,
                entries,
            },
        })
    }
}

fn heat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeatRow> {
    Ok(HeatRow {
        id: row.get(0)?,
        distance: row.get(1)?,
        date: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn preset_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_preset(distance: String, swimmers: &str, strokes: &str) -> Result<HeatPreset, StoreError> {
    Ok(HeatPreset {
        distance,
        swimmers: serde_json::from_str(swimmers)?,
        strokes: serde_json::from_str(strokes)?,
    })
}

#[derive(Serialize)]
struct ExportRow<'a> {
    heat: i64,
    date: String,
    distance: &'a str,
    name: &'a str,
    email: &'a str,
    stroke: &'a str,
    time: &'a str,
    feedback: &'a str,
}

/// Write one CSV row per swimmer entry
pub fn export_csv<W: io::Write>(heats: &[StoredHeat], writer: W) -> Result<(), StoreError> {
    let mut out = csv::Writer::from_writer(writer);
    for heat in heats {
        for entry in &heat.result.entries {
            out.serialize(ExportRow {
                heat: heat.id,
                date: heat.result.date.to_rfc3339(),
                distance: &heat.result.distance,
                name: &entry.name,
                email: entry.email.as_deref().unwrap_or(""),
                stroke: &entry.stroke,
                time: &entry.time,
                feedback: &entry.feedback,
            })?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, email: Option<&str>, time: &str) -> HeatEntry {
        HeatEntry {
            name: name.to_string(),
            email: email.map(str::to_string),
            stroke: "Freestyle".to_string(),
            time: time.to_string(),
            feedback: String::new(),
        }
    }

    fn result(distance: &str, entries: Vec<HeatEntry>) -> HeatResult {
        HeatResult {
            distance: distance.to_string(),
            date: Utc.with_ymd_and_hms(2026, 4, 1, 17, 45, 0).unwrap(),
            entries,
        }
    }

    #[test]
    fn test_store_and_get_heat() {
        let mut db = HeatDb::open_in_memory().unwrap();
        let heat = result(
            "50 m",
            vec![
                entry("Ana", Some("ana@example.com"), "00:35,10"),
                entry("Leo", None, "00:37,02"),
            ],
        );
        let id = db.store(&heat).unwrap();

        let stored = db.get_heat(id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.result, heat);
        assert!(!stored.timestamp.is_empty());
    }

    #[test]
    fn test_get_missing_heat() {
        let db = HeatDb::open_in_memory().unwrap();
        assert!(db.get_heat(42).unwrap().is_none());
    }

    #[test]
    fn test_list_heats_newest_first() {
        let mut db = HeatDb::open_in_memory().unwrap();
        let first = db.store(&result("25 m", vec![entry("Ana", None, "00:15,00")])).unwrap();
        let second = db.store(&result("50 m", vec![entry("Leo", None, "00:33,00")])).unwrap();

        let heats = db.list_heats().unwrap();
        let ids: Vec<i64> = heats.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(heats[0].result.entries[0].name, "Leo");
    }

    #[test]
    fn test_heats_for_email() {
        let mut db = HeatDb::open_in_memory().unwrap();
        db.store(&result(
            "50 m",
            vec![
                entry("Ana", Some("Ana@Example.com"), "00:35,10"),
                entry("Leo", Some("leo@example.com"), "00:36,10"),
            ],
        ))
        .unwrap();
        db.store(&result("100 m", vec![entry("Leo", Some("leo@example.com"), "01:20,00")]))
            .unwrap();

        let ana = db.heats_for_email("ana@example.com").unwrap();
        assert_eq!(ana.len(), 1);
        assert_eq!(ana[0].result.entries.len(), 1);
        assert_eq!(ana[0].result.entries[0].name, "Ana");

        let leo = db.heats_for_email("LEO@example.com").unwrap();
        assert_eq!(leo.len(), 2);
        assert!(db.heats_for_email("mia@example.com").unwrap().is_empty());
    }

    #[test]
    fn test_delete_heat_removes_entries() {
        let mut db = HeatDb::open_in_memory().unwrap();
        let id = db.store(&result("50 m", vec![entry("Ana", None, "00:35,10")])).unwrap();
        assert!(db.delete_heat(id).unwrap());
        assert!(!db.delete_heat(id).unwrap());
        assert!(db.list_heats().unwrap().is_empty());
        assert!(db.load_entries(None).unwrap().is_empty());
    }

    #[test]
    fn test_swimmer_directory() {
        let db = HeatDb::open_in_memory().unwrap();
        db.register_swimmer("Leo", "leo@example.com").unwrap();
        db.register_swimmer("Ana", "ana@old.example.com").unwrap();
        db.register_swimmer("Ana", "ana@example.com").unwrap();

        assert_eq!(db.email_for("Ana").as_deref(), Some("ana@example.com"));
        assert_eq!(db.email_for("Mia"), None);
        assert_eq!(db.roster(), vec!["Ana".to_string(), "Leo".to_string()]);
    }

    #[test]
    fn test_presets_save_list_take() {
        let mut db = HeatDb::open_in_memory().unwrap();
        let preset = HeatPreset {
            distance: "100 m".to_string(),
            swimmers: vec!["Ana".to_string(), "Leo".to_string()],
            strokes: HashMap::from([("Ana".to_string(), "Butterfly".to_string())]),
        };
        let older = db.save_preset(&preset).unwrap();
        let newer = db
            .save_preset(&HeatPreset {
                distance: "25 m".to_string(),
                swimmers: vec!["Mia".to_string()],
                strokes: HashMap::new(),
            })
            .unwrap();

        let listed: Vec<i64> = db.list_presets().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(listed, vec![newer, older]);

        assert_eq!(db.take_preset(older).unwrap(), Some(preset));
        assert_eq!(db.take_preset(older).unwrap(), None);
        assert_eq!(db.list_presets().unwrap().len(), 1);
        assert!(db.delete_preset(newer).unwrap());
    }

    #[test]
    fn test_export_csv() {
        let heat = StoredHeat {
            id: 3,
            timestamp: "2026-04-01 17:45:02".to_string(),
            result: result(
                "50 m",
                vec![
                    entry("Ana", Some("ana@example.com"), "00:35,10"),
                    entry("Leo", None, "00:37,02"),
                ],
            ),
        };
        let mut out = Vec::new();
        export_csv(&[heat], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "heat,date,distance,name,email,stroke,time,feedback");
        assert_eq!(
            lines[1],
            "3,2026-04-01T17:45:00+00:00,50 m,Ana,ana@example.com,Freestyle,\"00:35,10\","
        );
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("heats.db");
        let mut db = HeatDb::open(&path).unwrap();
        db.store(&result("15 m", vec![entry("Ana", None, "00:09,99")])).unwrap();
        drop(db);

        let reopened = HeatDb::open(&path).unwrap();
        assert_eq!(reopened.list_heats().unwrap().len(), 1);
    }
}
