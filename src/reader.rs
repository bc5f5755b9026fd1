//! CSV source reading for the registry dump.
//!
//! The dump is plain RFC-4180 CSV with a header row: quoted fields may
//! contain the delimiter, quotes escape by doubling. The reader is strict
//! about column counts, so a short or long record surfaces as a per-record
//! error the pipeline counts as malformed and skips.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{Reader, ReaderBuilder, Trim};

/// Open the registry CSV for a single forward-only pass.
pub fn open_csv(path: &Path) -> Result<Reader<File>> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// True when a csv error means the underlying stream is unreadable and the
/// run cannot continue; anything else is one bad row.
pub fn is_fatal(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::normalization::company::RawCompanyRow;

    fn write_fixture(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn quoted_delimiters_and_doubled_quotes_survive() {
        let f = write_fixture(
            "CIN,COMPANY_NAME,REGISTERED_OFFICE_ADDRESS\n\
             U1,\"Acme, Widgets\",\"12 \"\"A\"\" Road, Pune\"\n",
        );
        let mut rdr = open_csv(f.path()).unwrap();
        let rows: Vec<RawCompanyRow> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].company_name.as_deref(), Some("Acme, Widgets"));
        assert_eq!(
            rows[0].registered_office_address.as_deref(),
            Some("12 \"A\" Road, Pune")
        );
    }

    #[test]
    fn wrong_column_count_errors_without_ending_the_stream() {
        let f = write_fixture(
            "CIN,COMPANY_NAME,STATUS\n\
             U1,First Co,Active\n\
             only-one-field\n\
             U2,Second Co,Active\n",
        );
        let mut rdr = open_csv(f.path()).unwrap();
        let results: Vec<Result<RawCompanyRow, csv::Error>> = rdr.deserialize().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(!is_fatal(err));
        assert!(results[2].is_ok());
    }

    #[test]
    fn missing_file_is_an_open_error() {
        assert!(open_csv(Path::new("/no/such/registry_dump.csv")).is_err());
    }
}
