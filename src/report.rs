//! CSV session log export and import
//!
//! ## Format
//!
//! ```text
//! # platform=Linux-x86_64
//! # language=python
//! # mode=terminal
//! # clock_source=std::time::Instant
//! # start_time_utc=2024-05-01T12:00:00.000000Z
//! seq,timestamp_ms,event_timestamp_ms,event_type,keycode,scancode,character,modifiers,is_repeat
//! 1,0.512,0.000,key_down,30,30,a,none,0
//! ```
//!
//! `language=python` is a fixed value kept for compatibility with existing
//! analysis tooling. Character fields containing a comma, quote or line
//! break are quoted with doubled inner quotes; every other field is bare.

use crate::keyboard::{KeyEvent, KeyEventType};
use crate::session::{CaptureMode, SessionMetadata};
use chrono::{DateTime, Utc};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column header line
pub const CSV_HEADER: &str =
    "seq,timestamp_ms,event_timestamp_ms,event_type,keycode,scancode,character,modifiers,is_repeat";

/// Value of the `language` metadata line
pub const LANGUAGE_TAG: &str = "python";

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const FIELD_COUNT: usize = 9;

/// Failure writing the session log
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Failure reading a session log back
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: expected metadata `# {key}=...`")]
    MissingMetadata { line: usize, key: &'static str },

    #[error("unexpected header")]
    BadHeader,

    #[error("line {line}: expected 9 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid {field} `{value}`")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("malformed csv: {0}")]
    Malformed(String),
}

impl From<csv::Error> for ParseError {
    fn from(e: csv::Error) -> Self {
        ParseError::Malformed(e.to_string())
    }
}

/// Serializes a session log
pub struct CsvWriter;

impl CsvWriter {
    /// Write the metadata block, header and rows to `out` and hand it back.
    ///
    /// Metadata lines go to `out` directly; the header and rows go through a
    /// `csv::Writer` that quotes only fields that need it.
    pub fn write_to<W: Write>(
        mut out: W,
        metadata: &SessionMetadata,
        events: &[KeyEvent],
    ) -> Result<W, csv::Error> {
        writeln!(out, "# platform={}", metadata.platform)?;
        writeln!(out, "# language={}", LANGUAGE_TAG)?;
        writeln!(out, "# mode={}", metadata.mode.as_str())?;
        writeln!(out, "# clock_source={}", metadata.clock_source)?;
        writeln!(
            out,
            "# start_time_utc={}",
            metadata.start_time_utc.format(START_TIME_FORMAT)
        )?;

        let mut wtr = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .quote_style(QuoteStyle::Necessary)
            .from_writer(out);
        wtr.write_record(CSV_HEADER.split(','))?;

        for e in events {
            wtr.write_record([
                e.seq.to_string(),
                format!("{:.3}", e.timestamp_ms),
                format!("{:.3}", e.event_timestamp_ms),
                e.event_type.to_string(),
                e.keycode.to_string(),
                e.scancode.to_string(),
                e.character.clone(),
                e.modifiers.clone(),
                u8::from(e.is_repeat).to_string(),
            ])?;
        }

        wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
    }

    /// Render the whole log in memory
    pub fn render(metadata: &SessionMetadata, events: &[KeyEvent]) -> Result<String, csv::Error> {
        let buffer = Vec::with_capacity(256 + events.len() * 64);
        let bytes = Self::write_to(buffer, metadata, events)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write the log to `path`, creating parent directories first.
    pub fn write(
        path: &Path,
        metadata: &SessionMetadata,
        events: &[KeyEvent],
    ) -> Result<(), CsvError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CsvError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let write_err = |source: csv::Error| CsvError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(|e| write_err(e.into()))?;
        let file = Self::write_to(file, metadata, events).map_err(write_err)?;
        file.sync_all().map_err(|e| write_err(e.into()))?;

        log::info!("wrote {} events to {}", events.len(), path.display());
        Ok(())
    }
}

/// Metadata block of a parsed log
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub platform: String,
    pub language: String,
    pub mode: CaptureMode,
    pub clock_source: String,
    pub start_time_utc: DateTime<Utc>,
}

/// A session log read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLog {
    pub header: LogHeader,
    pub events: Vec<KeyEvent>,
}

/// Parses logs written by [`CsvWriter`]
pub struct LogReader;

impl LogReader {
    pub fn read(path: &Path) -> Result<SessionLog, CsvError> {
        let contents = fs::read_to_string(path).map_err(|source| CsvError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents)?)
    }

    pub fn parse(contents: &str) -> Result<SessionLog, ParseError> {
        let header = parse_metadata(contents)?;

        let mut rdr = ReaderBuilder::new()
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(contents.as_bytes());

        if !rdr.headers()?.iter().eq(CSV_HEADER.split(',')) {
            return Err(ParseError::BadHeader);
        }

        let mut events = Vec::new();
        for record in rdr.records() {
            events.push(parse_row(&record?)?);
        }

        Ok(SessionLog { header, events })
    }
}

fn parse_metadata(contents: &str) -> Result<LogHeader, ParseError> {
    let mut lines = contents.lines().enumerate().map(|(i, l)| (i + 1, l));

    let mut meta = |key: &'static str| -> Result<(usize, String), ParseError> {
        let (line, text) = lines.next().ok_or(ParseError::MissingMetadata { line: 0, key })?;
        text.strip_prefix("# ")
            .and_then(|rest| rest.strip_prefix(key))
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| (line, value.to_string()))
            .ok_or(ParseError::MissingMetadata { line, key })
    };

    let (_, platform) = meta("platform")?;
    let (_, language) = meta("language")?;
    let (mode_line, mode) = meta("mode")?;
    let (_, clock_source) = meta("clock_source")?;
    let (start_line, start) = meta("start_time_utc")?;

    let mode = CaptureMode::parse(&mode).ok_or(ParseError::InvalidField {
        line: mode_line,
        field: "mode",
        value: mode,
    })?;
    let start_time_utc = DateTime::parse_from_rfc3339(&start)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidField {
            line: start_line,
            field: "start_time_utc",
            value: start.clone(),
        })?;

    Ok(LogHeader {
        platform,
        language,
        mode,
        clock_source,
        start_time_utc,
    })
}

fn parse_row(record: &StringRecord) -> Result<KeyEvent, ParseError> {
    let line = record.position().map_or(0, |p| p.line() as usize);
    if record.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount {
            line,
            found: record.len(),
        });
    }

    fn num<T: std::str::FromStr>(
        line: usize,
        field: &'static str,
        value: &str,
    ) -> Result<T, ParseError> {
        value.parse().map_err(|_| ParseError::InvalidField {
            line,
            field,
            value: value.to_string(),
        })
    }

    let event_type = KeyEventType::parse(&record[3]).ok_or_else(|| ParseError::InvalidField {
        line,
        field: "event_type",
        value: record[3].to_string(),
    })?;
    let is_repeat = match &record[8] {
        "0" => false,
        "1" => true,
        other => {
            return Err(ParseError::InvalidField {
                line,
                field: "is_repeat",
                value: other.to_string(),
            })
        }
    };

    Ok(KeyEvent {
        seq: num(line, "seq", &record[0])?,
        timestamp_ms: num(line, "timestamp_ms", &record[1])?,
        event_timestamp_ms: num(line, "event_timestamp_ms", &record[2])?,
        event_type,
        keycode: num(line, "keycode", &record[4])?,
        scancode: num(line, "scancode", &record[5])?,
        character: record[6].to_string(),
        modifiers: record[7].to_string(),
        is_repeat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            platform: "Linux-x86_64".to_string(),
            mode: CaptureMode::Terminal,
            clock_source: "std::time::Instant".to_string(),
            start_time_utc: Utc
                .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .expect("valid date")
                + chrono::Duration::microseconds(42),
        }
    }

    fn event(seq: u64, event_type: KeyEventType, character: &str) -> KeyEvent {
        KeyEvent {
            seq,
            timestamp_ms: seq as f64 * 1.25,
            event_timestamp_ms: 0.0,
            event_type,
            keycode: 30,
            scancode: 30,
            character: character.to_string(),
            modifiers: "none".to_string(),
            is_repeat: false,
        }
    }

    #[test]
    fn renders_metadata_block_and_header() {
        let out = CsvWriter::render(&metadata(), &[]).expect("render");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# platform=Linux-x86_64",
                "# language=python",
                "# mode=terminal",
                "# clock_source=std::time::Instant",
                "# start_time_utc=2024-05-01T12:00:00.000042Z",
                CSV_HEADER,
            ]
        );
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn renders_rows_with_fixed_precision() {
        let mut down = event(1, KeyEventType::KeyDown, "a");
        down.timestamp_ms = 12.3456;
        down.event_timestamp_ms = 99.0;
        let mut up = event(2, KeyEventType::KeyUp, "a");
        up.modifiers = "shift+ctrl".to_string();
        up.is_repeat = false;

        let out = CsvWriter::render(&metadata(), &[down, up]).expect("render");
        let rows: Vec<&str> = out.lines().skip(6).collect();
        assert_eq!(
            rows,
            vec![
                "1,12.346,99.000,key_down,30,30,a,none,0",
                "2,2.500,0.000,key_up,30,30,a,shift+ctrl,0",
            ]
        );
    }

    #[test]
    fn quotes_only_characters_that_need_it() {
        let events = [
            event(1, KeyEventType::KeyDown, "a"),
            event(2, KeyEventType::KeyDown, ","),
            event(3, KeyEventType::KeyDown, "\""),
        ];
        let out = CsvWriter::render(&metadata(), &events).expect("render");
        let rows: Vec<&str> = out.lines().skip(6).collect();
        assert_eq!(
            rows,
            vec![
                "1,1.250,0.000,key_down,30,30,a,none,0",
                "2,2.500,0.000,key_down,30,30,\",\",none,0",
                "3,3.750,0.000,key_down,30,30,\"\"\"\",none,0",
            ]
        );
    }

    #[test]
    fn reads_back_line_breaks_inside_quoted_fields() {
        let events = [
            event(1, KeyEventType::KeyDown, "\n"),
            event(2, KeyEventType::KeyUp, "\r\n"),
            event(3, KeyEventType::KeyDown, "b"),
        ];
        let text = CsvWriter::render(&metadata(), &events).expect("render");

        let log = LogReader::parse(&text).expect("parse");
        let chars: Vec<&str> = log.events.iter().map(|e| e.character.as_str()).collect();
        assert_eq!(chars, vec!["\n", "\r\n", "b"]);
        assert_eq!(log.events[2].seq, 3);
    }

    #[test]
    fn reads_back_what_was_written() {
        let mut events = vec![
            event(1, KeyEventType::KeyDown, ","),
            event(2, KeyEventType::KeyDown, ","),
            event(3, KeyEventType::KeyUp, ","),
        ];
        events[1].is_repeat = true;
        let text = CsvWriter::render(&metadata(), &events).expect("render");

        let log = LogReader::parse(&text).expect("parse");
        assert_eq!(log.header.language, "python");
        assert_eq!(log.header.mode, CaptureMode::Terminal);
        assert_eq!(log.header.start_time_utc, metadata().start_time_utc);
        assert_eq!(log.events.len(), 3);
        assert_eq!(log.events[0].character, ",");
        assert!(log.events[1].is_repeat);
        assert_eq!(log.events[2].event_type, KeyEventType::KeyUp);
    }

    #[test]
    fn rejects_missing_metadata() {
        let err = LogReader::parse(CSV_HEADER).expect_err("no metadata");
        assert_eq!(
            err,
            ParseError::MissingMetadata {
                line: 1,
                key: "platform"
            }
        );
    }

    #[test]
    fn rejects_short_rows() {
        let mut text = CsvWriter::render(&metadata(), &[]).expect("render");
        text.push_str("1,0.000,0.000,key_down,30\n");
        let err = LogReader::parse(&text).expect_err("short row");
        assert!(matches!(err, ParseError::FieldCount { found: 5, .. }));
    }

    #[test]
    fn rejects_wrong_header() {
        let text = CsvWriter::render(&metadata(), &[]).expect("render");
        let text = text.replace(CSV_HEADER, "seq,time,type");
        assert_eq!(LogReader::parse(&text), Err(ParseError::BadHeader));
    }

    #[test]
    fn rejects_bad_event_type() {
        let mut text = CsvWriter::render(&metadata(), &[]).expect("render");
        text.push_str("1,0.000,0.000,press,30,0,a,none,0\n");
        let err = LogReader::parse(&text).expect_err("bad type");
        assert!(matches!(
            err,
            ParseError::InvalidField {
                field: "event_type",
                ..
            }
        ));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("log.csv");
        CsvWriter::write(&path, &metadata(), &[event(1, KeyEventType::KeyDown, "a")])
            .expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("1,1.250,0.000,key_down,30,30,a,none,0"));
    }

    #[test]
    fn write_twice_produces_same_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.csv");
        let events = [event(1, KeyEventType::KeyDown, "a")];
        CsvWriter::write(&path, &metadata(), &events).expect("first write");
        let first = fs::read_to_string(&path).expect("read");
        CsvWriter::write(&path, &metadata(), &events).expect("second write");
        assert_eq!(first, fs::read_to_string(&path).expect("read"));
    }

    #[test]
    fn write_reports_unwritable_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").expect("write blocker");
        let path = blocker.join("log.csv");
        let err = CsvWriter::write(&path, &metadata(), &[]).expect_err("must fail");
        assert!(matches!(err, CsvError::CreateDir { .. }));
    }
}
