//! Log file iteration
//!
//! ```text
//! ┌──────────┬──────────┬────────────┬─────┬──────────────────────────────────────┐
//! │ len (BE) │ table id │ event type │ gci │ [attr_id << 16 | bytes][data] ...    │
//! └──────────┴──────────┴────────────┴─────┴──────────────────────────────────────┘
//! ```
//!
//! `len` counts the words that follow it. A zero-length attribute entry is a
//! NULL value. A zero `len` word ends the log. Entries are returned in file
//! order, which is commit order.

use crate::backup_file::{BackupFile, WordOrder};
use crate::decode::{fill_value, DecodeError, RecordCursor};
use crate::format::{padded_len, SectionType};
use crate::metadata::RestoreMetaData;
use restore_core::{LogEntry, LogEntryType, RestoreError, RestoreResult};
use tracing::{debug, trace, warn};

/// Words of a log record before its attribute entries
const LOG_RECORD_HEADER_WORDS: u32 = 3;

enum LogRecord {
    Decoded,
    Skipped { table_id: u32, gci: u32 },
}

fn decode_log_record<'a>(
    meta: &'a RestoreMetaData,
    slot: &mut Option<LogEntry<'a>>,
    payload: &[u8],
    order: WordOrder,
    sequence: u64,
    stop_gcp: Option<u32>,
) -> Result<LogRecord, DecodeError> {
    let mut cursor = RecordCursor::new(payload);
    let table_id = cursor.word("table id")?;
    let code = cursor.word("event type")?;
    let gci = cursor.word("gci")?;

    if let Some(stop) = stop_gcp {
        if gci > stop {
            return Ok(LogRecord::Skipped { table_id, gci });
        }
    }

    let table = meta
        .get_table(table_id)
        .ok_or(DecodeError::UnknownTable(table_id))?;
    let entry_type = LogEntryType::from_code(code).ok_or(DecodeError::BadEventType(code))?;
    let entry = slot.get_or_insert_with(|| LogEntry::new(entry_type, table, gci, sequence));
    entry.reset(entry_type, table, gci, sequence);

    while cursor.remaining() > 0 {
        let header = cursor.word("attribute header")?;
        let attr_id = header >> 16;
        let len = (header & 0xFFFF) as usize;
        let p = table
            .attribute_position(attr_id)
            .ok_or(DecodeError::UnknownAttribute { table_id, attr_id })?;
        let desc = &table[p];
        if entry.value_of(attr_id).is_some() {
            return Err(DecodeError::Duplicate(desc.name().to_string()));
        }
        if len == 0 {
            if !desc.is_nullable() {
                return Err(DecodeError::NullNotAllowed(desc.name().to_string()));
            }
            entry.push_value(desc);
            continue;
        }
        let stored = cursor.take(padded_len(len), "attribute value")?;
        fill_value(desc, entry.push_value(desc), &stored[..len], order)?;
    }

    if entry_type == LogEntryType::Insert {
        for desc in table.attributes() {
            let present = entry
                .value_of(desc.attr_id())
                .map_or(false, |data| !data.is_null());
            if !desc.is_nullable() && !present {
                return Err(DecodeError::Missing(desc.name().to_string()));
            }
        }
    }
    Ok(LogRecord::Decoded)
}

/// Streams operations out of a node's log file
pub struct RestoreLogIterator<'a> {
    meta: &'a RestoreMetaData,
    file: BackupFile,
    entry: Option<LogEntry<'a>>,
    /// Ordinal of the next record in the file
    sequence: u64,
    skipped: u64,
    skip_beyond_stop_gcp: bool,
    finished: bool,
    /// A read failed; the file position can no longer be trusted
    failed: bool,
}

impl<'a> RestoreLogIterator<'a> {
    /// Open the log file of the backup `meta` was loaded from.
    ///
    /// Validates the file header against the control file and checks the
    /// trailing footer before any record is read.
    pub fn new(meta: &'a RestoreMetaData) -> RestoreResult<Self> {
        meta.ensure_loaded()?;
        let mut file = BackupFile::new(meta.config());
        file.set_log_file(meta.file());
        file.read_header()?;
        file.validate_footer()?;

        Ok(RestoreLogIterator {
            meta,
            file,
            entry: None,
            sequence: 0,
            skipped: 0,
            skip_beyond_stop_gcp: meta.config().skip_log_entries_beyond_stop_gcp,
            finished: false,
            failed: false,
        })
    }

    /// Decode the next log entry; `None` at end of log.
    ///
    /// Entries committed after the backup's stop GCP are skipped unless the
    /// configuration says otherwise. The returned entry is overwritten by the
    /// next call; clone it to keep it. Any error stops the iterator and every
    /// later call fails.
    pub fn get_next_log_entry(&mut self) -> RestoreResult<Option<&LogEntry<'a>>> {
        if self.failed {
            return Err(RestoreError::invalid_operation(
                "log file reading stopped after an earlier error",
            ));
        }
        match self.next_entry() {
            Ok(true) => Ok(self.entry.as_ref()),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(
                    path = %self.file.get_filename().display(),
                    error = %e,
                    "Log file reading stopped"
                );
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Decode the next kept record into `self.entry`; `false` at end of log
    fn next_entry(&mut self) -> RestoreResult<bool> {
        let stop_gcp = self.skip_beyond_stop_gcp.then(|| self.meta.get_stop_gcp());
        loop {
            if self.finished {
                return Ok(false);
            }

            let offset = self.file.offset();
            let len = self.file.read_word("log record length")?;
            if len == 0 {
                self.read_end_of_log()?;
                return Ok(false);
            }
            if len < LOG_RECORD_HEADER_WORDS {
                return Err(RestoreError::corrupt(
                    self.file.get_filename(),
                    offset,
                    format!("log record of {} words is shorter than its header", len),
                ));
            }

            let order = self.file.word_order();
            let sequence = self.sequence;
            self.sequence += 1;
            let meta = self.meta;
            let entry = &mut self.entry;
            let decoded = {
                let payload = self.file.read_words(len, "log record")?;
                decode_log_record(meta, entry, payload, order, sequence, stop_gcp)
            };

            match decoded.map_err(|e| e.into_restore(self.file.get_filename(), offset))? {
                LogRecord::Decoded => break,
                LogRecord::Skipped { table_id, gci } => {
                    self.skipped += 1;
                    warn!(
                        table_id,
                        gci,
                        stop_gcp = self.meta.get_stop_gcp(),
                        offset,
                        "Skipping log entry beyond stop GCP"
                    );
                }
            }
        }

        if let Some(entry) = self.entry.as_ref() {
            trace!(
                table_id = entry.table().get_table_id(),
                entry_type = %entry.entry_type(),
                gci = entry.gci(),
                sequence = entry.sequence(),
                "Decoded log entry"
            );
        }
        Ok(true)
    }

    /// Like [`RestoreLogIterator::get_next_log_entry`], returning an owned copy
    pub fn get_next_log_entry_owned(&mut self) -> RestoreResult<Option<LogEntry<'a>>> {
        Ok(self.get_next_log_entry()?.cloned())
    }

    fn read_end_of_log(&mut self) -> RestoreResult<()> {
        let offset = self.file.offset();
        let code = self.file.read_word("file footer")?;
        if code != SectionType::FileFooter.code() {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!(
                    "expected file footer after last log record, found section type {}",
                    code
                ),
            ));
        }
        self.file.finish_footer_section()?;
        self.finished = true;
        debug!(
            path = %self.file.get_filename().display(),
            records = self.sequence,
            skipped = self.skipped,
            "Reached end of log file"
        );
        Ok(())
    }

    /// Records skipped for lying beyond the stop GCP
    pub fn skipped_entries(&self) -> u64 {
        self.skipped
    }

    /// The log file
    pub fn file(&self) -> &BackupFile {
        &self.file
    }
}
