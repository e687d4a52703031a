//! Character library on disk
//!
//! Characters are JSON files grouped by IP folder:
//! `<root>/<ip>/**/<path>.json`. A character is addressed by its IP and the
//! path relative to the IP folder, without the extension.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use vnchat_core::Character;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Character '{path}' not found in IP '{ip}'")]
    NotFound { ip: String, path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid character file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Character already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Invalid name for {field}: '{value}'")]
    InvalidName { field: &'static str, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

pub struct CharacterLibrary {
    root: PathBuf,
}

impl CharacterLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All IP folders, sorted
    pub fn ips(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ips = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    ips.push(name.to_string());
                }
            }
        }
        ips.sort();
        Ok(ips)
    }

    /// Relative character paths under an IP, sorted, using `/` separators
    pub fn characters(&self, ip: &str) -> Result<Vec<String>> {
        let ip_dir = self.root.join(ip);
        let pattern = ip_dir.join("**").join("*.json");
        let pattern = pattern.to_string_lossy();

        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)?.flatten() {
            let Ok(rel) = entry.strip_prefix(&ip_dir) else {
                continue;
            };
            let rel = rel.with_extension("");
            let parts: Vec<_> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            paths.push(parts.join("/"));
        }
        paths.sort();
        Ok(paths)
    }

    /// Load one character, stamping its IP and path
    pub fn load(&self, ip: &str, path: &str) -> Result<Character> {
        let file = self.root.join(ip).join(format!("{path}.json"));
        if !file.is_file() {
            return Err(LibraryError::NotFound {
                ip: ip.to_string(),
                path: path.to_string(),
            });
        }

        let content = fs::read_to_string(&file)?;
        let mut character: Character =
            serde_json::from_str(&content).map_err(|source| LibraryError::Parse {
                path: file.clone(),
                source,
            })?;
        character.ip = ip.to_string();
        character.path = path.to_string();
        Ok(character)
    }

    /// Write a new character file under `<ip>/[unit/]<Name_With_Underscores>.json`.
    ///
    /// Returns the character's path within the IP. Existing files are never
    /// overwritten.
    pub fn create(&self, ip: &str, unit: Option<&str>, character: &Character) -> Result<String> {
        let ip = valid_segment("ip", ip)?;
        let file_name = character.name.trim().replace(' ', "_");
        let file_name = valid_segment("name", &file_name)?;
        let path = match unit.map(str::trim).filter(|u| !u.is_empty()) {
            Some(unit) => format!("{}/{}", valid_segment("unit", unit)?, file_name),
            None => file_name.to_string(),
        };

        let file = self.root.join(ip).join(format!("{path}.json"));
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut record = character.clone();
        record.ip.clear();
        record.path.clear();
        let json = serde_json::to_string_pretty(&record)?;

        let mut out = match fs::File::options().write(true).create_new(true).open(&file) {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LibraryError::AlreadyExists(file));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(out, "{json}")?;

        tracing::info!(ip, path = %path, "character created");
        Ok(path)
    }

    /// Load every character across all IPs. Unreadable files are skipped.
    pub fn load_all(&self) -> Result<Vec<Character>> {
        let mut all = Vec::new();
        for ip in self.ips()? {
            for path in self.characters(&ip)? {
                match self.load(&ip, &path) {
                    Ok(character) => all.push(character),
                    Err(e) => tracing::warn!("Skipping character {}/{}: {}", ip, path, e),
                }
            }
        }
        Ok(all)
    }
}

/// A single directory or file name component
fn valid_segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty()
        || value.starts_with('.')
        || value.contains(|c| matches!(c, '/' | '\\'))
    {
        return Err(LibraryError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_character(root: &Path, ip: &str, path: &str, json: &str) {
        let file = root.join(ip).join(format!("{path}.json"));
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, json).unwrap();
    }

    fn library() -> (tempfile::TempDir, CharacterLibrary) {
        let dir = tempfile::tempdir().unwrap();
        write_character(
            dir.path(),
            "arknights",
            "rhodes/amiya",
            r#"{"name": "Amiya", "greeting": "*She looks up.*\nDoctor!", "tags": ["leader", "kind"]}"#,
        );
        write_character(
            dir.path(),
            "arknights",
            "texas",
            r#"{"name": "Texas", "tags": ["cool"]}"#,
        );
        write_character(dir.path(), "genshin", "paimon", r#"{"name": "Paimon"}"#);
        write_character(dir.path(), "genshin", "broken", "{not json");
        let library = CharacterLibrary::new(dir.path());
        (dir, library)
    }

    #[test]
    fn test_lists_ips_and_nested_characters() {
        let (_dir, library) = library();
        assert_eq!(library.ips().unwrap(), vec!["arknights", "genshin"]);
        assert_eq!(
            library.characters("arknights").unwrap(),
            vec!["rhodes/amiya", "texas"]
        );
        assert!(library.characters("missing").unwrap().is_empty());
    }

    #[test]
    fn test_load_stamps_location() {
        let (_dir, library) = library();
        let amiya = library.load("arknights", "rhodes/amiya").unwrap();
        assert_eq!(amiya.name, "Amiya");
        assert_eq!(amiya.ip, "arknights");
        assert_eq!(amiya.path, "rhodes/amiya");
        assert_eq!(amiya.visible_greeting(), "Doctor!");
    }

    #[test]
    fn test_load_errors() {
        let (_dir, library) = library();
        assert!(matches!(
            library.load("arknights", "nobody"),
            Err(LibraryError::NotFound { .. })
        ));
        assert!(matches!(
            library.load("genshin", "broken"),
            Err(LibraryError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_all_skips_broken() {
        let (_dir, library) = library();
        let names: Vec<_> = library
            .load_all()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Amiya", "Texas", "Paimon"]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let library = CharacterLibrary::new("/definitely/not/here");
        assert!(library.ips().unwrap().is_empty());
        assert!(library.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_create_writes_loadable_character() {
        let (_dir, library) = library();
        let character = Character {
            name: " Kal'tsit Prime ".into(),
            greeting: "Hm.".into(),
            tags: vec!["doctor".into()],
            ip: "stale".into(),
            ..Default::default()
        };

        let path = library.create("arknights", Some("rhodes"), &character).unwrap();
        assert_eq!(path, "rhodes/Kal'tsit_Prime");
        assert!(library.characters("arknights").unwrap().contains(&path));

        let loaded = library.load("arknights", &path).unwrap();
        assert_eq!(loaded.tags, vec!["doctor"]);
        assert_eq!(loaded.ip, "arknights");

        let solo = Character {
            name: "Solo".into(),
            ..Default::default()
        };
        let path = library.create("newip", None, &solo).unwrap();
        assert_eq!(path, "Solo");
        assert_eq!(library.ips().unwrap(), vec!["arknights", "genshin", "newip"]);
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_names() {
        let (_dir, library) = library();
        let texas = Character {
            name: "texas".into(),
            ..Default::default()
        };
        assert!(matches!(
            library.create("arknights", None, &texas),
            Err(LibraryError::AlreadyExists(_))
        ));
        assert_eq!(library.load("arknights", "texas").unwrap().name, "Texas");

        let blank = Character::default();
        assert!(matches!(
            library.create("arknights", None, &blank),
            Err(LibraryError::InvalidName { field: "name", .. })
        ));
        assert!(matches!(
            library.create("../escape", None, &texas),
            Err(LibraryError::InvalidName { field: "ip", .. })
        ));
        assert!(matches!(
            library.create("arknights", Some("a/b"), &texas),
            Err(LibraryError::InvalidName { field: "unit", .. })
        ));
    }
}
