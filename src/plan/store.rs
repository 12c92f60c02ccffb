//! Serial-numbered persistence of generated plans.
//!
//! `{root}/{project}/{module}/{project}_{module}_{YYYYMMDD}_{NNNN}.md`, where
//! `NNNN` restarts at 0001 each day. Files are created with `create_new`, so
//! two writers racing for the same serial never overwrite each other.
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use super::PlanError;
use crate::config::validate_project_name;

const MAX_SERIAL: u32 = 9999;

#[derive(Debug, Clone)]
pub struct PlanStore {
    root: PathBuf,
}

impl PlanStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn module_dir(&self, project: &str, module: &str) -> PathBuf {
        self.root.join(project).join(module)
    }

    #[must_use]
    pub fn file_name(project: &str, module: &str, date: NaiveDate, serial: u32) -> String {
        format!("{project}_{module}_{}_{serial:04}.md", date.format("%Y%m%d"))
    }

    /// Highest serial already used for `date`, plus one.
    pub fn next_serial(
        &self,
        project: &str,
        module: &str,
        date: NaiveDate,
    ) -> Result<u32, PlanError> {
        let dir = self.module_dir(project, module);
        let pattern = format!(
            r"^{}_{}_{}_(\d{{4,}})\.md$",
            regex::escape(project),
            regex::escape(module),
            date.format("%Y%m%d")
        );
        let Ok(re) = Regex::new(&pattern) else {
            return Ok(1);
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
            Err(source) => return Err(PlanError::io(&dir, source)),
        };

        let mut max = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PlanError::io(&dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(serial) = re
                .captures(name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            {
                max = max.max(serial);
            }
        }
        Ok(max.saturating_add(1))
    }

    /// Write `markdown` under the next free serial for `date`.
    pub fn persist(
        &self,
        project: &str,
        module: &str,
        date: NaiveDate,
        markdown: &str,
    ) -> Result<(u32, PathBuf), PlanError> {
        validate_project_name(project)?;
        validate_project_name(module)?;

        let dir = self.module_dir(project, module);
        fs::create_dir_all(&dir).map_err(|e| PlanError::io(&dir, e))?;

        let mut serial = self.next_serial(project, module, date)?;
        while serial <= MAX_SERIAL {
            let path = dir.join(Self::file_name(project, module, date, serial));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(markdown.as_bytes())
                        .map_err(|e| PlanError::io(&path, e))?;
                    return Ok((serial, path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} taken, trying next serial", path.display());
                    serial += 1;
                }
                Err(e) => return Err(PlanError::io(&path, e)),
            }
        }
        Err(PlanError::SerialsExhausted {
            dir: dir.display().to_string(),
            date: date.format("%Y%m%d").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_serials_increment_per_day() {
        let dir = tempdir().unwrap();
        let store = PlanStore::new(dir.path());

        let (s1, p1) = store.persist("P", "M", day(5), "one").unwrap();
        let (s2, p2) = store.persist("P", "M", day(5), "two").unwrap();
        let (s3, p3) = store.persist("P", "M", day(6), "three").unwrap();

        assert_eq!((s1, s2, s3), (1, 2, 1));
        assert!(p1.ends_with("P/M/P_M_20240305_0001.md"));
        assert!(p2.ends_with("P/M/P_M_20240305_0002.md"));
        assert!(p3.ends_with("P/M/P_M_20240306_0001.md"));
        assert_eq!(fs::read_to_string(p1).unwrap(), "one");
    }

    #[test]
    fn test_gaps_continue_after_max() {
        let dir = tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let module_dir = store.module_dir("P", "M");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("P_M_20240305_0007.md"), "old").unwrap();
        fs::write(module_dir.join("P_M_20240305_0007.xlsx"), "export").unwrap();
        fs::write(module_dir.join("Q_M_20240305_0042.md"), "other").unwrap();

        assert_eq!(store.next_serial("P", "M", day(5)).unwrap(), 8);
    }

    #[test]
    fn test_oversized_serial_is_exhausted() {
        let dir = tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let module_dir = store.module_dir("P", "M");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(module_dir.join("P_M_20240305_4294967295.md"), "huge").unwrap();

        assert_eq!(store.next_serial("P", "M", day(5)).unwrap(), u32::MAX);
        assert!(matches!(
            store.persist("P", "M", day(5), "y"),
            Err(PlanError::SerialsExhausted { .. })
        ));
        // Other days are unaffected.
        assert_eq!(store.persist("P", "M", day(6), "z").unwrap().0, 1);
    }

    #[test]
    fn test_regex_metacharacters_in_names() {
        let dir = tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        let (s1, _) = store.persist("a+b", "m(1)", day(1), "x").unwrap();
        let (s2, _) = store.persist("a+b", "m(1)", day(1), "y").unwrap();
        assert_eq!((s1, s2), (1, 2));
    }

    #[test]
    fn test_invalid_module_rejected() {
        let dir = tempdir().unwrap();
        let store = PlanStore::new(dir.path());
        assert!(matches!(
            store.persist("P", "../M", day(1), "x"),
            Err(PlanError::Config(_))
        ));
    }
}
