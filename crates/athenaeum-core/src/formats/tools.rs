//! External-tool dispatch for PDF/DJVU metadata and cover extraction. Each
//! attempt is a descriptor so the preference chain is testable by stubbing
//! the process runner behind the `CommandRunner` trait, without needing the
//! tools installed.

use std::path::Path;
use std::process::Output;

/// Abstraction over spawning an external process, so dispatch order and
/// fallback behavior are testable without the real binaries on `PATH`.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<Output> {
        std::process::Command::new(program).args(args).output()
    }
}

/// One step in an ordered external-tool preference chain.
pub struct ToolAttempt<'a> {
    pub program: &'a str,
    pub args: Vec<&'a str>,
}

/// Run `attempts` in order against `runner`, returning the first stdout that
/// `accept` considers usable. `None` if every attempt fails or is rejected.
pub fn dispatch<R: CommandRunner>(
    runner: &R,
    attempts: &[ToolAttempt<'_>],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    for attempt in attempts {
        let Ok(output) = runner.run(attempt.program, &attempt.args) else {
            continue;
        };
        if !output.status.success() {
            continue;
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if accept(&stdout) {
            return Some(stdout);
        }
    }
    None
}

pub fn pdf_metadata_attempts<'a>(path: &'a str) -> Vec<ToolAttempt<'a>> {
    vec![
        ToolAttempt {
            program: "exiftool",
            args: vec![path],
        },
        ToolAttempt {
            program: "pdfinfo",
            args: vec![path],
        },
        ToolAttempt {
            program: "pdftotext",
            args: vec![path, "-"],
        },
    ]
}

pub fn djvu_metadata_attempts<'a>(path: &'a str) -> Vec<ToolAttempt<'a>> {
    vec![
        ToolAttempt {
            program: "djvused",
            args: vec![path, "-e", "print-meta"],
        },
        ToolAttempt {
            program: "djvudump",
            args: vec![path],
        },
        ToolAttempt {
            program: "djvutxt",
            args: vec![path],
        },
    ]
}

pub fn pdf_cover_command(path: &Path, out_stem: &Path) -> (&'static str, Vec<String>) {
    (
        "pdftoppm",
        vec![
            "-jpeg".to_string(),
            "-scale-to".to_string(),
            "2000".to_string(),
            "-singlefile".to_string(),
            path.to_string_lossy().to_string(),
            out_stem.to_string_lossy().to_string(),
        ],
    )
}

pub fn djvu_cover_command(path: &Path, out_path: &Path) -> (&'static str, Vec<String>) {
    (
        "ddjvu",
        vec![
            "--page=1".to_string(),
            "--format=ppm".to_string(),
            path.to_string_lossy().to_string(),
            out_path.to_string_lossy().to_string(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    struct StubRunner {
        responses: Vec<(bool, &'static str)>,
    }

    impl CommandRunner for StubRunner {
        fn run(&self, program: &str, _args: &[&str]) -> std::io::Result<Output> {
            let idx = match program {
                "exiftool" => 0,
                "pdfinfo" => 1,
                "pdftotext" => 2,
                _ => unreachable!(),
            };
            let (ok, stdout) = self.responses[idx];
            Ok(Output {
                status: ExitStatus::from_raw(if ok { 0 } else { 1 }),
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn dispatch_falls_through_to_next_tool_on_failure() {
        let runner = StubRunner {
            responses: vec![(false, ""), (true, "Title: Dune"), (true, "unused")],
        };
        let attempts = pdf_metadata_attempts("book.pdf");
        let result = dispatch(&runner, &attempts, |s| s.contains("Title"));
        assert_eq!(result.as_deref(), Some("Title: Dune"));
    }

    #[test]
    fn dispatch_returns_none_when_all_fail() {
        let runner = StubRunner {
            responses: vec![(false, ""), (false, ""), (false, "")],
        };
        let attempts = pdf_metadata_attempts("book.pdf");
        let result = dispatch(&runner, &attempts, |s| s.contains("Title"));
        assert!(result.is_none());
    }
}
