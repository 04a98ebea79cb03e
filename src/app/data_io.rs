use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Serialize, Serializer};
use tracing::info;

use super::dedup::CrawlState;
use super::error::{CrawlError, Result};
use super::types::{CommentAggregates, CommentRecord};

pub const CSV_HEADERS: [&str; 9] = [
    "user",
    "author_id",
    "profile_url",
    "comment_text",
    "timestamp",
    "avatar_url",
    "status",
    "comment_id",
    "extracted_at",
];

/// The JSON export document.
#[derive(Debug, Serialize)]
pub struct CrawlReport<'a> {
    pub profile_url: &'a str,
    pub total_users: usize,
    pub total_comments: usize,
    pub parse_date: String,
    pub data: &'a CommentAggregates,
}

impl<'a> CrawlReport<'a> {
    pub fn new(profile_url: &'a str, state: &'a CrawlState) -> Self {
        Self {
            profile_url,
            total_users: state.aggregates().len(),
            total_comments: state.total_comments(),
            parse_date: Utc::now().to_rfc3339(),
            data: state.aggregates(),
        }
    }
}

/// Destination files for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl ExportPaths {
    pub fn new(output_dir: impl AsRef<Path>, basename: &str) -> Self {
        let dir = output_dir.as_ref();
        Self {
            json: dir.join(format!("{basename}.json")),
            csv: dir.join(format!("{basename}.csv")),
        }
    }
}

fn export_error(path: &Path) -> impl FnOnce(std::io::Error) -> CrawlError + '_ {
    move |source| CrawlError::Export {
        path: path.display().to_string(),
        source,
    }
}

struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn new(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(export_error(path))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS)?;
        Ok(Self { writer })
    }

    fn write_record(&mut self, record: &CommentRecord) -> Result<()> {
        self.writer.write_record([
            record.user.as_str(),
            record.author_id.as_deref().unwrap_or_default(),
            record.profile_url.as_str(),
            record.comment_text.as_str(),
            record.timestamp.as_str(),
            record.avatar_url.as_str(),
            record.status.label(),
            record.comment_id.as_str(),
            record.extracted_at.as_str(),
        ])?;
        Ok(())
    }

    fn finish(mut self, path: &Path) -> Result<()> {
        self.writer.flush().map_err(export_error(path))
    }
}

/// One row per comment, users in discovery order.
pub fn write_csv(path: &Path, aggregates: &CommentAggregates) -> Result<usize> {
    let mut sink = CsvSink::new(path)?;
    let mut rows = 0usize;
    for record in aggregates.records() {
        sink.write_record(record)?;
        rows += 1;
    }
    sink.finish(path)?;
    info!(path = %path.display(), rows, "saved CSV file");
    Ok(rows)
}

/// Pretty-printed report; non-ASCII text is written as-is.
pub fn write_json(path: &Path, report: &CrawlReport<'_>) -> Result<()> {
    let file = File::create(path).map_err(export_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n").map_err(export_error(path))?;
    writer.flush().map_err(export_error(path))?;
    info!(path = %path.display(), "saved JSON file");
    Ok(())
}

/// Creates the output directory and writes both exports.
pub fn export_all(paths: &ExportPaths, profile_url: &str, state: &CrawlState) -> Result<()> {
    for path in [&paths.json, &paths.csv] {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(export_error(dir))?;
        }
    }
    write_json(&paths.json, &CrawlReport::new(profile_url, state))?;
    write_csv(&paths.csv, state.aggregates())?;
    Ok(())
}

/// One commenter in the sample preview: the full count, one comment.
#[derive(Debug, Serialize)]
struct SampleEntry<'a> {
    count: usize,
    comments: &'a [CommentRecord],
}

struct Sample<'a>(Vec<(&'a str, SampleEntry<'a>)>);

impl Serialize for Sample<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(user, entry)| (*user, entry)))
    }
}

/// First comment of the first `users` commenters, for a quick look at the
/// export shape.
pub fn sample_json(aggregates: &CommentAggregates, users: usize) -> Result<String> {
    let entries: Vec<_> = aggregates
        .iter()
        .filter(|(_, aggregate)| !aggregate.comments().is_empty())
        .take(users)
        .map(|(user, aggregate)| {
            let entry = SampleEntry {
                count: aggregate.count(),
                comments: &aggregate.comments()[..1],
            };
            (user, entry)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&Sample(entries))?)
}
