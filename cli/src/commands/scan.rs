use super::{emit, fail, EXIT_OK};
use clap::Args;
use fixlab_common::scan::{ScanSummary, Scanner};
use std::path::PathBuf;
use tracing::info;

/// Scan log files and print a summary of the FIX messages they hold.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Log file or directory of log files to scan.
    #[arg(long)]
    pub path: PathBuf,
    /// Write the JSON summary to this file instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: ScanArgs) -> i32 {
    let scanner = Scanner::default();
    let mut summary = ScanSummary::default();

    let files = match collect_files(&args.path) {
        Ok(files) => files,
        Err(error) => return fail("Cannot list scan inputs", &error),
    };
    for file in files {
        let iter = match scanner.scan_file(&file) {
            Ok(iter) => iter,
            Err(error) => return fail("Cannot open log file", &error),
        };
        for raw in iter {
            match raw {
                Ok(message) => summary.observe(&message),
                Err(error) => return fail("Scan failed", &error),
            }
        }
    }

    info!(
        messages = summary.message_count,
        sessions = summary.sessions.len(),
        "Scan complete"
    );
    let json = match serde_json::to_string_pretty(&summary) {
        Ok(json) => json,
        Err(error) => return fail("Cannot serialize summary", &error),
    };
    if let Err(error) = emit(args.out.as_deref(), &json) {
        return fail("Cannot write summary", &error);
    }
    EXIT_OK
}

fn collect_files(path: &PathBuf) -> std::io::Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    } else {
        Ok(vec![path.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scan_directory_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = std::fs::File::create(dir.path().join("a.log")).unwrap();
        log.write_all(b"8=FIX.4.4|35=D|49=A|56=B|10=001|\n8=FIX.4.4|35=8|49=B|56=A|10=002|")
            .unwrap();
        let out = dir.path().join("summary.json");

        let code = run(ScanArgs {
            path: dir.path().to_path_buf(),
            out: Some(out.clone()),
        });
        assert_eq!(code, EXIT_OK);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(value["message_count"], 2);
        assert_eq!(value["msg_type_distribution"]["D"], 1);
    }
}
