//! Data file iteration
//!
//! A data file is a sequence of fragments, each holding rows of one table:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ FRAGMENT_HEADER             │  [5][4][table id][fragment no]
//! ├─────────────────────────────┤
//! │ [len][row payload]          │
//! │ [len][row payload]          │
//! │ ...                         │
//! │ [0]                         │  end of records
//! ├─────────────────────────────┤
//! │ FRAGMENT_FOOTER             │  [6][6][table id][fragment no][count][crc32]
//! └─────────────────────────────┘
//! ```
//!
//! Drive it with [`RestoreDataIterator::read_fragment_header`], then
//! [`RestoreDataIterator::get_next_tuple`] until it yields `None`, then
//! [`RestoreDataIterator::validate_fragment_footer`].

use crate::backup_file::BackupFile;
use crate::decode::{decode_row, max_row_bytes};
use crate::format::{SectionType, FRAGMENT_FOOTER_WORDS, FRAGMENT_HEADER_WORDS};
use crate::metadata::RestoreMetaData;
use restore_core::{RestoreError, RestoreErrorKind, RestoreResult, TableSchema, Tuple};
use tracing::{debug, trace, warn};

/// Capability invoked before the read-ahead window recycles memory that
/// backed previously returned rows
pub trait ReleaseHook {
    /// Buffered data read so far is about to be discarded
    fn release(&mut self);
}

impl<F: FnMut()> ReleaseHook for F {
    fn release(&mut self) {
        self()
    }
}

/// Outcome of [`RestoreDataIterator::read_fragment_header`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStatus {
    /// A fragment of `table_id` follows
    Available {
        /// Table the fragment's rows belong to
        table_id: u32,
        /// Fragment number within the table
        fragment_no: u32,
    },
    /// No more fragments
    EndOfFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FragmentState {
    AwaitingHeader,
    InFragment,
    RecordsDone,
    Finished,
    /// A read failed; the file position can no longer be trusted
    Failed,
}

fn stopped() -> RestoreError {
    RestoreError::invalid_operation("data file reading stopped after an earlier error")
}

/// Streams rows out of one data file
pub struct RestoreDataIterator<'a> {
    meta: &'a RestoreMetaData,
    file: BackupFile,
    release_hook: Option<Box<dyn ReleaseHook + 'a>>,
    state: FragmentState,
    table: Option<&'a TableSchema>,
    fragment_no: u32,
    tuple: Option<Tuple<'a>>,
    records: u32,
    hasher: crc32fast::Hasher,
    verify_checksums: bool,
}

impl<'a> RestoreDataIterator<'a> {
    /// Open data file 0 of the backup `meta` was loaded from
    pub fn new(
        meta: &'a RestoreMetaData,
        release_hook: Option<Box<dyn ReleaseHook + 'a>>,
    ) -> RestoreResult<Self> {
        Self::with_file_no(meta, release_hook, 0)
    }

    /// Open data file `file_no`.
    ///
    /// Validates the file header against the control file and checks the
    /// trailing footer before any row is read.
    pub fn with_file_no(
        meta: &'a RestoreMetaData,
        release_hook: Option<Box<dyn ReleaseHook + 'a>>,
        file_no: u32,
    ) -> RestoreResult<Self> {
        meta.ensure_loaded()?;
        let mut file = BackupFile::new(meta.config());
        file.set_data_file(meta.file(), file_no);
        file.read_header()?;
        file.validate_footer()?;

        Ok(RestoreDataIterator {
            meta,
            file,
            release_hook,
            state: FragmentState::AwaitingHeader,
            table: None,
            fragment_no: 0,
            tuple: None,
            records: 0,
            hasher: crc32fast::Hasher::new(),
            verify_checksums: meta.config().verify_fragment_checksums,
        })
    }

    /// Stop the iterator on any error other than a call out of sequence
    fn check<T>(&mut self, result: RestoreResult<T>) -> RestoreResult<T> {
        if let Err(e) = &result {
            if e.kind() != RestoreErrorKind::Usage && self.state != FragmentState::Failed {
                warn!(
                    path = %self.file.get_filename().display(),
                    error = %e,
                    "Data file reading stopped"
                );
                self.state = FragmentState::Failed;
            }
        }
        result
    }

    fn prepare_read(&mut self, bytes: usize) {
        if self.file.will_discard(bytes) {
            if let Some(hook) = self.release_hook.as_mut() {
                hook.release();
            }
        }
    }

    /// Read the next fragment header.
    ///
    /// Validates a pending fragment footer first if the previous fragment's
    /// rows were read to the end. After any I/O, format or schema error the
    /// iterator is stopped and every later call fails.
    pub fn read_fragment_header(&mut self) -> RestoreResult<FragmentStatus> {
        let result = self.next_fragment();
        self.check(result)
    }

    fn next_fragment(&mut self) -> RestoreResult<FragmentStatus> {
        match self.state {
            FragmentState::Failed => return Err(stopped()),
            FragmentState::Finished => return Ok(FragmentStatus::EndOfFile),
            FragmentState::InFragment => {
                return Err(RestoreError::invalid_operation(
                    "fragment header requested before the current fragment's rows were read",
                ))
            }
            FragmentState::RecordsDone => self.validate_fragment_footer()?,
            FragmentState::AwaitingHeader => {}
        }

        self.prepare_read(8);
        let offset = self.file.offset();
        let code = self.file.read_word("section type")?;
        if code == SectionType::FileFooter.code() {
            self.file.finish_footer_section()?;
            self.state = FragmentState::Finished;
            debug!(path = %self.file.get_filename().display(), "Reached end of data file");
            return Ok(FragmentStatus::EndOfFile);
        }
        if code != SectionType::FragmentHeader.code() {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!("expected fragment header, found section type {}", code),
            ));
        }

        let len = self.file.read_section_length(SectionType::FragmentHeader)?;
        if len != FRAGMENT_HEADER_WORDS {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!(
                    "fragment header of {} words, expected {}",
                    len, FRAGMENT_HEADER_WORDS
                ),
            ));
        }
        let table_id = self.file.read_word("fragment table id")?;
        let fragment_no = self.file.read_word("fragment number")?;
        let meta = self.meta;
        let table = meta
            .get_table(table_id)
            .ok_or(RestoreError::TableNotFound { table_id })?;

        match self.tuple.as_mut() {
            Some(tuple) => tuple.prepare_record(table),
            None => self.tuple = Some(Tuple::new(table)),
        }
        self.file.create_buffer(max_row_bytes(table));
        self.table = Some(table);
        self.fragment_no = fragment_no;
        self.records = 0;
        self.hasher = crc32fast::Hasher::new();
        self.state = FragmentState::InFragment;

        debug!(
            table_id,
            fragment = fragment_no,
            offset,
            "Reading data fragment"
        );
        Ok(FragmentStatus::Available {
            table_id,
            fragment_no,
        })
    }

    /// Decode the next row of the current fragment.
    ///
    /// Returns `None` once the fragment's rows are exhausted. The returned
    /// row is overwritten by the next call; clone it to keep it. A torn or
    /// malformed row stops the iterator.
    pub fn get_next_tuple(&mut self) -> RestoreResult<Option<&Tuple<'a>>> {
        let result = self.next_row();
        if self.check(result)? {
            Ok(self.tuple.as_ref())
        } else {
            Ok(None)
        }
    }

    /// Decode the next row into `self.tuple`; `false` at end of fragment
    fn next_row(&mut self) -> RestoreResult<bool> {
        match self.state {
            FragmentState::InFragment => {}
            FragmentState::RecordsDone => return Ok(false),
            FragmentState::Failed => return Err(stopped()),
            _ => {
                return Err(RestoreError::invalid_operation(
                    "no fragment header has been read",
                ))
            }
        }
        let table = match self.table {
            Some(table) => table,
            None => return Err(RestoreError::invalid_operation("no current table")),
        };

        self.prepare_read(4);
        let offset = self.file.offset();
        let len = self.file.read_word("record length")?;
        if len == 0 {
            self.state = FragmentState::RecordsDone;
            trace!(
                table_id = table.get_table_id(),
                records = self.records,
                "End of fragment rows"
            );
            return Ok(false);
        }

        self.prepare_read(len as usize * 4);
        let order = self.file.word_order();
        let tuple = match self.tuple.as_mut() {
            Some(tuple) => tuple,
            None => return Err(RestoreError::invalid_operation("no current table")),
        };
        tuple.prepare_record(table);
        let decoded = {
            let payload = self.file.read_words(len, "row record")?;
            self.hasher.update(&len.to_be_bytes());
            self.hasher.update(payload);
            decode_row(table, tuple, payload, order)
        };
        decoded.map_err(|e| e.into_restore(self.file.get_filename(), offset))?;

        self.records += 1;
        trace!(
            table_id = table.get_table_id(),
            fragment = self.fragment_no,
            offset,
            "Decoded row"
        );
        Ok(true)
    }

    /// Like [`RestoreDataIterator::get_next_tuple`], returning an owned copy
    pub fn get_next_tuple_owned(&mut self) -> RestoreResult<Option<Tuple<'a>>> {
        Ok(self.get_next_tuple()?.cloned())
    }

    /// Check the current fragment's footer against the rows read.
    ///
    /// Verifies table id, fragment number, record count and (unless disabled
    /// in the configuration) the CRC32 over the fragment's records. A
    /// rejected footer stops the iterator.
    pub fn validate_fragment_footer(&mut self) -> RestoreResult<()> {
        let result = self.check_footer();
        self.check(result)
    }

    fn check_footer(&mut self) -> RestoreResult<()> {
        if self.state == FragmentState::Failed {
            return Err(stopped());
        }
        if self.state != FragmentState::RecordsDone {
            return Err(RestoreError::invalid_operation(
                "fragment footer validated before the fragment's rows were read",
            ));
        }
        let table_id = self.table.map_or(0, |t| t.get_table_id());

        self.prepare_read(FRAGMENT_FOOTER_WORDS as usize * 4);
        let offset = self.file.offset();
        let len = self.file.read_section(SectionType::FragmentFooter)?;
        if len != FRAGMENT_FOOTER_WORDS {
            return Err(RestoreError::corrupt(
                self.file.get_filename(),
                offset,
                format!(
                    "fragment footer of {} words, expected {}",
                    len, FRAGMENT_FOOTER_WORDS
                ),
            ));
        }
        let footer_table = self.file.read_word("footer table id")?;
        let footer_fragment = self.file.read_word("footer fragment number")?;
        let count = self.file.read_word("footer record count")?;
        let checksum = self.file.read_word("footer checksum")?;

        let problem = if footer_table != table_id || footer_fragment != self.fragment_no {
            Some(format!(
                "footer for table {} fragment {} closes table {} fragment {}",
                footer_table, footer_fragment, table_id, self.fragment_no
            ))
        } else if count != self.records {
            Some(format!("footer counts {} records, {} read", count, self.records))
        } else if self.verify_checksums {
            let computed =
                std::mem::replace(&mut self.hasher, crc32fast::Hasher::new()).finalize();
            (computed != checksum).then(|| {
                format!(
                    "fragment checksum mismatch: footer {:#010x}, computed {:#010x}",
                    checksum, computed
                )
            })
        } else {
            None
        };
        if let Some(reason) = problem {
            warn!(
                table_id,
                fragment = self.fragment_no,
                offset,
                %reason,
                "Fragment footer rejected"
            );
            return Err(RestoreError::corrupt(self.file.get_filename(), offset, reason));
        }

        self.state = FragmentState::AwaitingHeader;
        debug!(table_id, fragment = self.fragment_no, records = count, "Fragment complete");
        Ok(())
    }

    /// Table of the current fragment
    pub fn current_table(&self) -> Option<&'a TableSchema> {
        self.table
    }

    /// Number of the current fragment
    pub fn fragment_no(&self) -> u32 {
        self.fragment_no
    }

    /// Rows read from the current fragment
    pub fn records_in_fragment(&self) -> u32 {
        self.records
    }

    /// The data file
    pub fn file(&self) -> &BackupFile {
        &self.file
    }
}
