use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories holding the crate's own sources.
const SOURCE_DIRS: [&str; 7] = [
    "harness", "features", "impute", "shared", "cli", "tests", "benches",
];

/// Lines a scan ignores even when the pattern matches.
#[derive(Clone, Copy)]
enum Skip {
    Nothing,
    DocComments,
    CommentsAndStrings,
}

// Collects every matching line of one file so the whole file is reported at once.
struct LineCollector {
    violations: Vec<String>,
    file_path: PathBuf,
    skip: Skip,
}

impl LineCollector {
    fn new(file_path: &Path, skip: Skip) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
            skip,
        }
    }

    fn error_message(&self, what: &str, advice: &str) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {what} in {file_name}:\n",
            self.violations.len()
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {advice}\n"));
        Some(error_msg)
    }
}

impl Sink for LineCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        let skipped = match self.skip {
            Skip::Nothing => false,
            // `**` is markdown emphasis inside doc comments.
            Skip::DocComments => is_doc_comment(line_text),
            Skip::CommentsAndStrings => is_comment(line_text) || string_has_underscore(line_text),
        };
        if skipped {
            return Ok(true);
        }
        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

// File names such as `{label}_results.csv` live inside string literals.
fn string_has_underscore(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS.iter().flat_map(|dir| {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
            .map(|e| e.into_path())
    })
}

fn scan(pattern: &str, skip: Skip, what: &str, advice: &str) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();
    for path in rust_sources() {
        let mut collector = LineCollector::new(&path, skip);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.error_message(what, advice) {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let checks = [
        (
            concat!(
                r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|",
                r"MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)"
            ),
            Skip::Nothing,
            "forbidden comment patterns",
            "Comments describing edits ('FIXED', 'NEW', 'CHANGED', 'UPDATED', ...) \
             are not allowed. Remove them completely.",
        ),
        (
            r"(//|/\*).*\*\*",
            Skip::DocComments,
            "'**' patterns in regular comments",
            "The '**' pattern is only allowed in doc comments.",
        ),
        (
            r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
            Skip::Nothing,
            "#[allow(dead_code)] attributes",
            "#[allow(dead_code)] is not allowed. Either use the code or remove it completely.",
        ),
        (
            r"\b(_[a-zA-Z0-9_]+)\b",
            Skip::CommentsAndStrings,
            "underscore-prefixed identifiers",
            "Underscore-prefixed names hide unused values. Use the value or remove it.",
        ),
    ];

    for (pattern, skip, what, advice) in checks {
        if let Err(e) = scan(pattern, skip, what, advice) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
