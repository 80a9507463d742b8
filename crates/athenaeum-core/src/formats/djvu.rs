use std::path::Path;

use crate::error::{Error, Result};

use super::tools::{djvu_cover_command, djvu_metadata_attempts, dispatch, CommandRunner, SystemRunner};
use super::ExtractedMetadata;

pub fn extract(path: &Path) -> Result<ExtractedMetadata> {
    extract_with(&SystemRunner, path)
}

fn extract_with<R: CommandRunner>(runner: &R, path: &Path) -> Result<ExtractedMetadata> {
    let path_str = path.to_string_lossy().to_string();
    let attempts = djvu_metadata_attempts(&path_str);
    let Some(stdout) = dispatch(runner, &attempts, |s| !s.trim().is_empty()) else {
        return Err(Error::ExternalUnavailable(
            "no DJVU metadata tool (djvused/djvudump/djvutxt) available".to_string(),
        ));
    };
    Ok(parse_metadata_text(&stdout))
}

/// `djvused -e print-meta` emits `key "value"` pairs; `djvudump` emits its
/// own freeform layout. Only the quoted-pair shape is reliably parseable.
fn parse_metadata_text(text: &str) -> ExtractedMetadata {
    let mut meta = ExtractedMetadata::default();
    for line in text.lines() {
        let line = line.trim();
        let Some((key, rest)) = line.split_once(' ') else {
            continue;
        };
        let value = rest.trim().trim_matches('"').to_string();
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "title" => meta.title = value,
            "author" => meta.author = value,
            "publisher" => meta.publisher = Some(value),
            "year" => meta.year = Some(value),
            _ => {}
        }
    }
    meta
}

pub fn extract_cover(path: &Path) -> Result<Option<Vec<u8>>> {
    let out_path = tempfile_path()?;
    let (program, args) = djvu_cover_command(path, &out_path);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = std::process::Command::new(program)
        .args(&arg_refs)
        .output()
        .map_err(|e| Error::ExternalUnavailable(format!("ddjvu unavailable: {e}")))?;
    if !output.status.success() {
        return Ok(None);
    }
    match std::fs::read(&out_path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(_) => Ok(None),
    }
}

fn tempfile_path() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("athenaeum-djvu-cover-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("cover.ppm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    struct StubRunner {
        program: &'static str,
        stdout: &'static str,
    }

    impl CommandRunner for StubRunner {
        fn run(&self, program: &str, _args: &[&str]) -> std::io::Result<Output> {
            let ok = program == self.program;
            Ok(Output {
                status: ExitStatus::from_raw(if ok { 0 } else { 1 }),
                stdout: if ok { self.stdout.as_bytes().to_vec() } else { Vec::new() },
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn parses_quoted_key_value_pairs() {
        let text = "title \"Dune\"\nauthor \"Frank Herbert\"\n";
        let meta = parse_metadata_text(text);
        assert_eq!(meta.title, "Dune");
        assert_eq!(meta.author, "Frank Herbert");
    }

    #[test]
    fn extract_errors_when_no_tool_available() {
        let runner = StubRunner { program: "nonexistent", stdout: "" };
        let result = extract_with(&runner, Path::new("book.djvu"));
        assert!(matches!(result, Err(Error::ExternalUnavailable(_))));
    }

    #[test]
    fn extract_uses_first_successful_tool() {
        let runner = StubRunner { program: "djvused", stdout: "title \"Dune\"\n" };
        let meta = extract_with(&runner, Path::new("book.djvu")).unwrap();
        assert_eq!(meta.title, "Dune");
    }
}
