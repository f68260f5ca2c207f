/* User model, CSV codec, and append-only file persistence.
 *
 * Comment lines (first non-whitespace char `#`) are preserved verbatim —
 * since persistence is strictly append-only, the file's existing bytes
 * (comments included) are never rewritten; appends only ever add lines at
 * the end. The codec itself goes through the `csv` crate so that names
 * containing commas, quotes, and brackets round-trip correctly. */
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::warn;

use crate::user::{User, UserLevel};

fn format_timestamp(ts: Option<DateTime<Local>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn parse_timestamp(field: &str) -> Result<Option<DateTime<Local>>, String> {
    if field.trim().is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(field)
        .map(|dt| Some(dt.with_timezone(&Local)))
        .map_err(|e| format!("bad timestamp {field:?}: {e}"))
}

fn user_to_record(user: &User) -> csv::StringRecord {
    csv::StringRecord::from(vec![
        user.name.clone(),
        user.contact_info.clone(),
        user.user_level.to_string(),
        format_timestamp(user.valid_from),
        format_timestamp(user.valid_to),
        user.sponsor.clone(),
        user.auth_code_hash.clone(),
    ])
}

fn record_to_user(record: &csv::StringRecord) -> Result<User, String> {
    if record.len() != 7 {
        return Err(format!("expected 7 fields, got {}", record.len()));
    }
    let user_level = record[2]
        .parse::<UserLevel>()
        .map_err(|_| format!("unknown user level {:?}", &record[2]))?;
    Ok(User {
        name: record[0].to_string(),
        contact_info: record[1].to_string(),
        user_level,
        valid_from: parse_timestamp(&record[3])?,
        valid_to: parse_timestamp(&record[4])?,
        sponsor: record[5].to_string(),
        auth_code_hash: record[6].to_string(),
    })
}

/* Parse the non-comment, non-blank lines of a CSV users file into `User`s.
 * Comment lines are dropped from the returned list — callers that need to
 * preserve them do so by never rewriting the underlying file. */
pub fn parse_users_csv(content: &str) -> Result<Vec<User>, String> {
    let filtered: String = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(filtered.as_bytes());

    let mut users = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping malformed CSV row: {e}");
                continue;
            }
        };
        match record_to_user(&record) {
            Ok(user) => users.push(user),
            Err(e) => warn!("skipping malformed user record: {e}"),
        }
    }
    Ok(users)
}

/* Encode a single user as one CSV line, terminated with `\n`, suitable for
 * appending to the file as-is. */
pub fn encode_user_line(user: &User) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(&user_to_record(user))?;
    writer.flush()?;
    Ok(String::from_utf8(writer.into_inner().unwrap()).expect("csv writer output is valid utf8"))
}

/* Load the full CSV file from disk. Missing file is treated as an empty
 * store (first run against a fresh install). */
pub fn load_from_path(path: &Path) -> io::Result<Vec<User>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    parse_users_csv(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/* Append one user record to the file, then flush. Caller is responsible
 * for serializing this with any in-memory index update. */
pub fn append_to_path(path: &Path, user: &User) -> io::Result<()> {
    let line = encode_user_line(user).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut file = std::fs::OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.flush()
}

#[allow(dead_code)]
pub fn default_users_path() -> PathBuf {
    PathBuf::from("/var/access/users.csv")
}
