use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Only first-party sources are policed.
const SOURCE_DIRS: [&str; 4] = ["mediate", "cli", "tests", "benches"];

const MARKER_WORDS: &str =
    "FIXED|CORRECTED|FIXES|FIX|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

/// A source policy: a line regex plus a filter that decides whether a matched
/// line is really a violation.
struct Rule {
    name: &'static str,
    pattern: String,
    accept: fn(&str) -> bool,
    advice: &'static str,
}

/// Collects the violating lines of one file for one rule.
struct RuleCollector<'a> {
    rule: &'a Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl<'a> RuleCollector<'a> {
    fn new(rule: &'a Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.name,
            self.file_path.display()
        );
        for violation in &self.violations {
            msg.push_str(&format!("   {violation}\n"));
        }
        msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice));
        Some(msg)
    }
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.accept)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn comment_text(line: &str) -> &str {
    let trimmed = line.trim_start();
    trimmed.trim_start_matches('/').trim_start_matches('!').trim()
}

/// Matches outside comments and string literals.
fn underscore_in_code(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn marker_in_comment(line: &str) -> bool {
    is_comment(line)
}

fn stars_outside_docs(line: &str) -> bool {
    is_comment(line) && !is_doc_comment(line)
}

fn shouting_comment(line: &str) -> bool {
    if !is_comment(line) {
        return false;
    }
    let mut letters = comment_text(line).chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "underscore-prefixed variables",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            accept: underscore_in_code,
            advice: "Underscore-prefixed names are not allowed. Use the variable or remove it.",
        },
        Rule {
            name: "forbidden comment markers",
            pattern: format!(r"//.*(?:{MARKER_WORDS})"),
            accept: marker_in_comment,
            advice: "Comments must describe the code, not its edit history.",
        },
        Rule {
            name: "'**' sequences in plain comments",
            pattern: r"//.*\*\*".to_string(),
            accept: stars_outside_docs,
            advice: "Emphasis markup belongs in doc comments only.",
        },
        Rule {
            name: "all-uppercase comments",
            pattern: r"//.*".to_string(),
            accept: shouting_comment,
            advice: "Comments written entirely in capitals are not allowed.",
        },
        Rule {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            accept: |_| true,
            advice: "Use the code or delete it; dead code may not be silenced.",
        },
    ]
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn enforce(rule: &Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = RuleCollector::new(rule, path);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(message) = collector.error_message() {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = source_files();
    for rule in rules() {
        if let Err(e) = enforce(&rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
