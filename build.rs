use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories whose Rust sources must follow the policy below.
const SCANNED_ROOTS: [&str; 2] = ["src", "benches"];

struct Rule {
    name: &'static str,
    pattern: &'static str,
    advice: &'static str,
}

const RULES: [Rule; 3] = [
    Rule {
        name: "allow(dead_code)",
        pattern: r"#\s*!?\[\s*allow\s*\([^)]*\bdead_code\b",
        advice: "Remove unused code instead of silencing the lint.",
    },
    Rule {
        name: "ignored test",
        pattern: r"#\s*\[\s*ignore\b",
        advice: "Fix or delete the test; ignored tests rot silently.",
    },
    Rule {
        name: "debug_assert",
        pattern: r"\bdebug_assert(_eq|_ne)?!\s*\(",
        advice: "Check the condition in all builds or return an error.",
    },
];

// Collects matching lines of one file for one rule.
struct ViolationCollector {
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(file_path: &Path) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn error_message(&self, rule: &Rule) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        Some(format!(
            "❌ {} found in {}:\n{}\n   {}",
            rule.name,
            self.file_path.display(),
            self.violations.join("\n"),
            rule.advice
        ))
    }
}

impl Sink for ViolationCollector {
    type Error = io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        // Mentions in line comments are fine.
        if !line_text.trim_start().starts_with("//") {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn warnings_enabled() -> bool {
    std::env::var_os("FIRST_ORDER_BUILD_WARNINGS").is_some()
}

fn emit_stage_detail(detail: &str) {
    if warnings_enabled() {
        println!("cargo:warning=first_order build: {detail}");
        io::stdout().flush().ok();
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SCANNED_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(Result::ok))
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: &Rule, files: &[PathBuf]) -> Vec<String> {
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern) {
        Ok(matcher) => matcher,
        Err(e) => return vec![format!("Error creating {} regex matcher: {e}", rule.name)],
    };
    let mut searcher = Searcher::new();
    let mut violations = Vec::new();
    for path in files {
        let mut collector = ViolationCollector::new(path);
        if searcher
            .search_path(&matcher, path, &mut collector)
            .is_err()
        {
            continue;
        }
        if let Some(message) = collector.error_message(rule) {
            violations.push(message);
        }
    }
    violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SCANNED_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    if std::env::var_os("FIRST_ORDER_SKIP_LINT_CHECKS").is_some()
        || std::env::var_os("DOCS_RS").is_some()
    {
        emit_stage_detail("skipping lint checks");
        return;
    }

    let files = rust_sources();
    let mut all_violations = Vec::new();
    for rule in &RULES {
        let found = scan(rule, &files);
        emit_stage_detail(&format!(
            "{} scan identified {} violation groups",
            rule.name,
            found.len()
        ));
        all_violations.extend(found);
    }

    if !all_violations.is_empty() {
        eprintln!("\n❌ VALIDATION ERRORS");
        eprintln!("====================");
        let violation_count = all_violations.len();
        for violation in all_violations {
            eprintln!("{violation}");
            eprintln!("--------------------");
        }
        eprintln!(
            "\n⚠️ Found {violation_count} total code quality violations. Fix all issues before committing."
        );
        std::process::exit(1);
    }
}
