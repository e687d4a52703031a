//! Session log for saving and resuming conversations

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use vnchat_core::SessionSnapshot;

/// Session entry types for JSONL format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// Session metadata, always the first line
    Metadata {
        id: String,
        created_at: i64,
        #[serde(default)]
        updated_at: i64,
        model: String,
        character: String,
        #[serde(default)]
        ip: String,
        #[serde(default)]
        path: String,
        #[serde(default)]
        message_count: usize,
    },
    /// Full session state after a completed turn or edit
    Snapshot {
        snapshot: Box<SessionSnapshot>,
        timestamp: i64,
    },
}

/// JSONL session file holding the metadata line and the latest snapshot.
///
/// Each save rewrites the file through a temporary sibling, so its size
/// follows the session rather than the number of saves.
pub struct SessionLog {
    id: String,
    path: PathBuf,
    created_at: i64,
    model: String,
    character: String,
    ip: String,
    character_path: String,
}

impl SessionLog {
    /// Get the sessions directory
    pub fn sessions_dir() -> PathBuf {
        crate::config::data_dir().join("sessions")
    }

    fn file_in(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.jsonl", id))
    }

    /// Create a new session log in `dir`
    pub fn create(dir: &Path, model: &str, snapshot: &SessionSnapshot) -> std::io::Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        fs::create_dir_all(dir)?;

        let character = &snapshot.character;
        let log = Self {
            path: Self::file_in(dir, &id),
            id,
            created_at: chrono::Utc::now().timestamp_millis(),
            model: model.to_string(),
            character: character.name.clone(),
            ip: character.ip.clone(),
            character_path: character.path.clone(),
        };
        log.write(0, None)?;

        tracing::info!(session = %log.id, "session log created");
        Ok(log)
    }

    /// Open an existing session log and return its latest snapshot
    pub fn open(dir: &Path, id: &str) -> std::io::Result<(Self, Option<SessionSnapshot>)> {
        let path = Self::file_in(dir, id);
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Session not found: {}", id),
            ));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut metadata = None;
        let mut latest = None;
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionEntry>(&line) {
                Ok(SessionEntry::Snapshot { snapshot, .. }) => latest = Some(*snapshot),
                Ok(entry @ SessionEntry::Metadata { .. }) => metadata = Some(entry),
                Err(e) => tracing::warn!("Skipping unreadable session line: {}", e),
            }
        }

        let Some(SessionEntry::Metadata {
            created_at,
            model,
            character,
            ip,
            path: character_path,
            ..
        }) = metadata
        else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Session {} has no metadata line", id),
            ));
        };

        let log = Self {
            id: id.to_string(),
            path,
            created_at,
            model,
            character,
            ip,
            character_path,
        };
        Ok((log, latest))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot with the current session state
    pub fn save_snapshot(&mut self, snapshot: &SessionSnapshot) -> std::io::Result<()> {
        self.write(snapshot.transcript.len(), Some(snapshot))?;
        tracing::debug!(session = %self.id, path = %self.path.display(), "snapshot saved");
        Ok(())
    }

    fn write(&self, message_count: usize, snapshot: Option<&SessionSnapshot>) -> std::io::Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let metadata = SessionEntry::Metadata {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: now,
            model: self.model.clone(),
            character: self.character.clone(),
            ip: self.ip.clone(),
            path: self.character_path.clone(),
            message_count,
        };

        let tmp = self.path.with_extension("jsonl.tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writeln!(writer, "{}", serde_json::to_string(&metadata)?)?;
        if let Some(snapshot) = snapshot {
            let entry = SessionEntry::Snapshot {
                snapshot: Box::new(snapshot.clone()),
                timestamp: now,
            };
            writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &self.path)
    }

    /// List all sessions in `dir`, newest first
    pub fn list(dir: &Path) -> std::io::Result<Vec<SessionInfo>> {
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                if let Some(info) = Self::read_session_info(&path) {
                    sessions.push(info);
                }
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn read_session_info(path: &Path) -> Option<SessionInfo> {
        let reader = BufReader::new(File::open(path).ok()?);
        let first_line = reader.lines().next()?.ok()?;

        let SessionEntry::Metadata {
            id,
            created_at,
            model,
            character,
            ip,
            message_count,
            ..
        } = serde_json::from_str(&first_line).ok()?
        else {
            return None;
        };

        Some(SessionInfo {
            id,
            created_at,
            model,
            character,
            ip,
            message_count,
        })
    }
}

/// Information about a saved session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: i64,
    pub model: String,
    pub character: String,
    pub ip: String,
    pub message_count: usize,
}

impl SessionInfo {
    /// First eight characters of the id, or the whole id if shorter
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Abbreviated session id for display
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnchat_core::{Character, MemorySnapshot, Transcript};

    fn snapshot(context: &str) -> SessionSnapshot {
        let mut transcript = Transcript::new();
        transcript.append_user("hi");
        SessionSnapshot {
            character: Character {
                name: "Ada".into(),
                ip: "lab".into(),
                path: "ada".into(),
                ..Default::default()
            },
            transcript,
            memory: MemorySnapshot::default(),
            context: context.into(),
        }
    }

    #[test]
    fn test_resume_returns_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path(), "llama3", &snapshot("start")).unwrap();
        log.save_snapshot(&snapshot("one")).unwrap();
        log.save_snapshot(&snapshot("two")).unwrap();
        let id = log.id().to_string();
        assert!(log.path().ends_with(format!("{id}.jsonl")));
        drop(log);

        let (mut log, latest) = SessionLog::open(dir.path(), &id).unwrap();
        assert_eq!(latest.unwrap(), snapshot("two"));

        log.save_snapshot(&snapshot("three")).unwrap();
        drop(log);
        let (_, latest) = SessionLog::open(dir.path(), &id).unwrap();
        assert_eq!(latest.unwrap().context, "three");
    }

    #[test]
    fn test_saves_replace_the_stored_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::create(dir.path(), "llama3", &snapshot("start")).unwrap();
        for i in 0..5 {
            log.save_snapshot(&snapshot(&format!("turn {i}"))).unwrap();
        }

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("turn 4"));
        assert!(!content.contains("turn 3"));
        assert!(!log.path().with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_open_without_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(dir.path(), "llama3", &snapshot("start")).unwrap();
        let (_, latest) = SessionLog::open(dir.path(), log.id()).unwrap();
        assert!(latest.is_none());
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionLog::open(dir.path(), "nope").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);

        fs::write(dir.path().join("bare.jsonl"), "").unwrap();
        let err = SessionLog::open(dir.path(), "bare").err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_list_sessions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionLog::list(&dir.path().join("none")).unwrap().is_empty());

        let mut log = SessionLog::create(dir.path(), "llama3", &snapshot("start")).unwrap();
        log.save_snapshot(&snapshot("one")).unwrap();
        fs::write(dir.path().join("junk.jsonl"), "not json\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let sessions = SessionLog::list(dir.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, log.id());
        assert_eq!(sessions[0].character, "Ada");
        assert_eq!(sessions[0].ip, "lab");
        assert_eq!(sessions[0].model, "llama3");
        assert_eq!(sessions[0].message_count, 1);
        assert_eq!(sessions[0].short_id().len(), 8);
        assert_ne!(sessions[0].created_at_display(), "unknown");
    }

    #[test]
    fn test_short_id_handles_short_ids() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }
}
