use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

use super::tools::{dispatch, pdf_cover_command, pdf_metadata_attempts, CommandRunner, SystemRunner};
use super::ExtractedMetadata;

pub fn extract(path: &Path) -> Result<ExtractedMetadata> {
    extract_with(&SystemRunner, path)
}

fn extract_with<R: CommandRunner>(runner: &R, path: &Path) -> Result<ExtractedMetadata> {
    let path_str = path.to_string_lossy().to_string();
    let attempts = pdf_metadata_attempts(&path_str);
    let Some(stdout) = dispatch(runner, &attempts, |s| !s.trim().is_empty()) else {
        return Err(Error::ExternalUnavailable(
            "no PDF metadata tool (exiftool/pdfinfo/pdftotext) available".to_string(),
        ));
    };
    Ok(parse_metadata_text(&stdout))
}

/// Parses `Key: Value` line output shared by exiftool and pdfinfo.
fn parse_metadata_text(text: &str) -> ExtractedMetadata {
    let mut meta = ExtractedMetadata::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "title" => meta.title = value,
            "author" | "creator" if meta.author.is_empty() => meta.author = value,
            "producer" | "publisher" if meta.publisher.is_none() => meta.publisher = Some(value),
            "creationdate" | "createdate" => meta.year = Some(extract_year(&value)),
            _ => {}
        }
    }
    meta
}

fn extract_year(value: &str) -> String {
    let re = Regex::new(r"\d{4}").unwrap();
    re.find(value).map(|m| m.as_str().to_string()).unwrap_or_default()
}

pub fn extract_cover(path: &Path) -> Result<Option<Vec<u8>>> {
    let dir = tempfile_dir()?;
    let out_stem = dir.join("cover");
    let (program, args) = pdf_cover_command(path, &out_stem);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = std::process::Command::new(program)
        .args(&arg_refs)
        .output()
        .map_err(|e| Error::ExternalUnavailable(format!("pdftoppm unavailable: {e}")))?;
    if !output.status.success() {
        return Ok(None);
    }
    let produced = out_stem.with_extension("jpg");
    match std::fs::read(&produced) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(_) => Ok(None),
    }
}

fn tempfile_dir() -> Result<std::path::PathBuf> {
    let dir = std::env::temp_dir().join(format!("athenaeum-pdf-cover-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
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
    fn parses_key_value_metadata_lines() {
        let text = "Title: Dune\nAuthor: Frank Herbert\nCreationDate: D:19650801\n";
        let meta = parse_metadata_text(text);
        assert_eq!(meta.title, "Dune");
        assert_eq!(meta.author, "Frank Herbert");
        assert_eq!(meta.year.as_deref(), Some("1965"));
    }

    #[test]
    fn extract_falls_through_tool_chain() {
        let runner = StubRunner { program: "pdfinfo", stdout: "Title: Dune\n" };
        let meta = extract_with(&runner, Path::new("book.pdf")).unwrap();
        assert_eq!(meta.title, "Dune");
    }

    #[test]
    fn extract_errors_when_no_tool_available() {
        let runner = StubRunner { program: "nonexistent", stdout: "" };
        let result = extract_with(&runner, Path::new("book.pdf"));
        assert!(matches!(result, Err(Error::ExternalUnavailable(_))));
    }
}
