use crate::record::LogRecord;
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Appends JSON lines to `{dir}/{app_name}_{YYYY-MM-DD}.json`, one file per
/// local calendar day.
///
/// The file of the current day stays open between writes and is swapped for
/// the next one when the date changes.
#[derive(Debug)]
pub struct DailyFileWriter {
    dir: PathBuf,
    app_name: String,
    current: Option<(NaiveDate, File)>,
}

impl DailyFileWriter {
    /// Create the writer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, app_name: impl Into<String>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DailyFileWriter {
            dir,
            app_name: app_name.into(),
            current: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", self.app_name, date.format("%Y-%m-%d")))
    }

    pub fn current_path(&self) -> PathBuf {
        self.path_for(Local::now().date_naive())
    }

    pub fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        self.write_line(&record.to_json_line())
    }

    pub fn write_records(&mut self, records: &[LogRecord]) -> io::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in records {
            buf.push_str(&record.to_json_line());
            buf.push('\n');
        }
        self.append(buf.as_bytes())
    }

    /// Append one line; a trailing newline is added.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.append(&buf)
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.append_on(Local::now().date_naive(), bytes)
    }

    fn append_on(&mut self, date: NaiveDate, bytes: &[u8]) -> io::Result<()> {
        let stale = !matches!(&self.current, Some((open_date, _)) if *open_date == date);
        if stale {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))?;
            self.current = Some((date, file));
        }

        if let Some((_, file)) = self.current.as_mut() {
            if let Err(e) = file.write_all(bytes) {
                // Reopen on the next write.
                self.current = None;
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Log files under `dir`: every `*.json` file, then every `*.log` file, each
/// group sorted by name. A missing directory yields an error.
pub fn list_log_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut json = Vec::new();
    let mut plain = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => json.push(path),
            Some("log") => plain.push(path),
            _ => {}
        }
    }
    json.sort();
    plain.sort();
    json.extend(plain);
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_records_to_todays_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DailyFileWriter::new(dir.path().join("nested"), "shop").unwrap();

        writer.write_record(&LogRecord::new("INFO", "shop", "first")).unwrap();
        writer
            .write_records(&[LogRecord::new("ERROR", "shop", "second")])
            .unwrap();

        let path = writer.current_path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("shop_"));
        assert!(name.ends_with(".json"));

        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["message"], "second");
    }

    #[test]
    fn file_name_uses_iso_date() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DailyFileWriter::new(dir.path(), "api").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(writer.path_for(date), dir.path().join("api_2024-03-09.json"));
    }

    #[test]
    fn switches_files_when_the_date_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DailyFileWriter::new(dir.path(), "api").unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = monday.succ_opt().unwrap();

        writer.append_on(monday, b"{\"n\":1}\n").unwrap();
        writer.append_on(monday, b"{\"n\":2}\n").unwrap();
        writer.append_on(tuesday, b"{\"n\":3}\n").unwrap();

        let first = fs::read_to_string(writer.path_for(monday)).unwrap();
        let second = fs::read_to_string(writer.path_for(tuesday)).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert_eq!(second, "{\"n\":3}\n");
        assert!(matches!(writer.current, Some((date, _)) if date == tuesday));
    }

    #[test]
    fn lists_json_before_log_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.log", "a.log", "z.json", "notes.txt"] {
            fs::write(dir.path().join(name), "{}\n").unwrap();
        }
        fs::create_dir(dir.path().join("old.json")).unwrap();

        let names: Vec<String> = list_log_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["z.json", "a.log", "b.log"]);
        assert!(list_log_files(&dir.path().join("missing")).is_err());
    }
}
