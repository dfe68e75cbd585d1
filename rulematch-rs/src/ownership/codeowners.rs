//! Conversion of CODEOWNERS files into `codeowners:` ownership rules.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+").unwrap());

// Syntax CODEOWNERS supports but `codeowners:` matchers do not: character
// classes, escaped whitespace, negation and inline comments.
static UNSUPPORTED_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]^\s]*\]|[\s!#]").unwrap());

static ANCHORED_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/.").unwrap());

/// Maps repository paths (`source_root`) to the paths found in stack traces
/// (`stack_root`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMapping {
    pub source_root: String,
    pub stack_root: String,
}

impl CodeMapping {
    pub fn new(source_root: impl Into<String>, stack_root: impl Into<String>) -> CodeMapping {
        CodeMapping {
            source_root: source_root.into(),
            stack_root: stack_root.into(),
        }
    }
}

/// Owners referenced by a CODEOWNERS file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeownersOwners {
    /// `@org/team` references.
    pub teams: Vec<String>,
    pub usernames: Vec<String>,
    pub emails: Vec<String>,
}

/// Collect every owner of a CODEOWNERS file, classified by kind, in order of
/// appearance.
pub fn parse_code_owners(codeowners: &str) -> CodeownersOwners {
    let mut owners = CodeownersOwners::default();
    for line in rule_lines(codeowners) {
        let Some((_, assignees)) = codeowners_path_and_owners(line) else {
            continue;
        };
        for assignee in assignees {
            let list = if assignee.contains('/') {
                &mut owners.teams
            } else if EMAIL_RE.is_match(assignee) {
                &mut owners.emails
            } else {
                &mut owners.usernames
            };
            list.push(assignee.to_owned());
        }
    }
    owners
}

fn rule_lines(codeowners: &str) -> impl Iterator<Item = &str> {
    codeowners
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
}

/// Split a CODEOWNERS line into its path and owners. Whitespace escaped with a
/// backslash does not separate tokens.
pub fn codeowners_path_and_owners(line: &str) -> Option<(&str, Vec<&str>)> {
    let line = line.trim();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut prev = None;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() && prev != Some('\\') {
            if start < i {
                tokens.push(&line[start..i]);
            }
            start = i + c.len_utf8();
        }
        prev = Some(c);
    }
    if start < line.len() {
        tokens.push(&line[start..]);
    }

    let mut tokens = tokens.into_iter();
    let path = tokens.next()?;
    Some((path, tokens.collect()))
}

/// Convert CODEOWNERS text into ownership rule text.
///
/// `associations` maps CODEOWNERS owner names (`@org/team`, `@user`, emails)
/// to owner names of this system. Owners without an association are dropped,
/// and a line loses its rule only when none of its owners is associated.
/// Lines with unsupported path syntax are skipped. Comments are kept.
pub fn convert_codeowners_syntax(
    codeowners: &str,
    associations: &HashMap<String, String>,
    mapping: &CodeMapping,
) -> String {
    let mut result = String::new();

    for line in codeowners.lines() {
        if line.is_empty() || line.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }
        let Some((path, owners)) = codeowners_path_and_owners(line) else {
            continue;
        };
        if UNSUPPORTED_PATH_RE.is_match(path) {
            debug!(path, "skipping CODEOWNERS line with unsupported path syntax");
            continue;
        }

        let mut assignees = Vec::with_capacity(owners.len());
        for owner in owners {
            match associations.get(owner) {
                Some(assignee) => assignees.push(assignee.as_str()),
                None => debug!(path, owner, "CODEOWNERS owner has no association"),
            }
        }
        if assignees.is_empty() {
            debug!(path, "skipping CODEOWNERS line without associated owners");
            continue;
        }

        let path = if ANCHORED_PATH_RE.is_match(path) {
            flatten_slashes(&path.replacen(&mapping.source_root, &mapping.stack_root, 1))
        } else {
            path.to_owned()
        };
        result.push_str(&format!("codeowners:{path} {}\n", assignees.join(" ")));
    }

    result
}

/// Map a stack trace path back to its repository path. Returns `None` for
/// paths without a directory component.
pub fn source_code_path_from_stacktrace_path(
    stacktrace_path: &str,
    mapping: &CodeMapping,
) -> Option<String> {
    if !ANCHORED_PATH_RE.is_match(stacktrace_path) {
        return None;
    }
    Some(flatten_slashes(&stacktrace_path.replacen(
        &mapping.stack_root,
        &mapping.source_root,
        1,
    )))
}

// Collapse runs of `/` into one, keeping the `//` of a `scheme://` prefix.
fn flatten_slashes(path: &str) -> String {
    let mut flattened = String::with_capacity(path.len());
    let mut run = 0;
    let mut before_run = None;
    for c in path.chars() {
        if c == '/' {
            let limit = if before_run == Some(':') { 2 } else { 1 };
            if run < limit {
                flattened.push('/');
            }
            run += 1;
        } else {
            flattened.push(c);
            before_run = Some(c);
            run = 0;
        }
    }
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEOWNERS: &str = "\
# cool stuff comment
*.js                    @getsentry/frontend @NisanthanNanthakumar
# good comment



docs/*  @getsentry/docs @getsentry/ecosystem
src/sentry/*       @AnotherUser
api/*  nisanthan.nanthakumar@sentry.io
tests/file\\ with\\ spaces/ @NisanthanNanthakumar
";

    fn associations() -> HashMap<String, String> {
        [
            ("@getsentry/frontend", "#frontend"),
            ("@getsentry/docs", "#docs"),
            ("@getsentry/ecosystem", "#ecosystem"),
            ("@NisanthanNanthakumar", "nisanthan.nanthakumar@sentry.io"),
            ("@AnotherUser", "anotheruser@sentry.io"),
            ("nisanthan.nanthakumar@sentry.io", "nisanthan.nanthakumar@sentry.io"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    #[test]
    fn test_parse_code_owners() {
        let owners = parse_code_owners(CODEOWNERS);
        assert_eq!(
            owners.teams,
            vec!["@getsentry/frontend", "@getsentry/docs", "@getsentry/ecosystem"]
        );
        assert_eq!(
            owners.usernames,
            vec!["@NisanthanNanthakumar", "@AnotherUser", "@NisanthanNanthakumar"]
        );
        assert_eq!(owners.emails, vec!["nisanthan.nanthakumar@sentry.io"]);
    }

    #[test]
    fn test_codeowners_path_and_owners() {
        let examples = [
            ("a/b @x @y", Some(("a/b", vec!["@x", "@y"]))),
            ("  a\\ b\t@x  ", Some(("a\\ b", vec!["@x"]))),
            ("lonely", Some(("lonely", vec![]))),
            ("   ", None),
        ];
        for (line, expected) in examples {
            assert_eq!(
                codeowners_path_and_owners(line),
                expected,
                "result mismatch for `{}`",
                line
            );
        }
    }

    #[test]
    fn test_convert_codeowners_syntax() {
        let mapping = CodeMapping::new("", "webpack://docs/");
        assert_eq!(
            convert_codeowners_syntax(CODEOWNERS, &associations(), &mapping),
            "\
# cool stuff comment
codeowners:*.js #frontend nisanthan.nanthakumar@sentry.io
# good comment



codeowners:webpack://docs/docs/* #docs #ecosystem
codeowners:webpack://docs/src/sentry/* anotheruser@sentry.io
codeowners:webpack://docs/api/* nisanthan.nanthakumar@sentry.io
"
        );
    }

    #[test]
    fn test_unmapped_owners_drop_only_their_line() {
        let mut associations = associations();
        associations.remove("@AnotherUser");
        associations.remove("@getsentry/docs");
        let mapping = CodeMapping::default();
        let converted = convert_codeowners_syntax(CODEOWNERS, &associations, &mapping);

        assert!(!converted.contains("src/sentry"));
        assert!(converted.contains("codeowners:docs/* #ecosystem\n"));
        assert!(converted.contains("codeowners:api/* nisanthan.nanthakumar@sentry.io\n"));
    }

    #[test]
    fn test_unsupported_paths_are_skipped() {
        let examples = ["!docs/* @x", "src/[abc].js @x", "a#b @x", "dir\\ name/ @x"];
        let associations = HashMap::from([("@x".to_owned(), "x@example.com".to_owned())]);
        for line in examples {
            assert_eq!(
                convert_codeowners_syntax(line, &associations, &CodeMapping::default()),
                "",
                "result mismatch for `{}`",
                line
            );
        }
    }

    #[test]
    fn test_stack_root_replacement() {
        let associations = HashMap::from([("@x".to_owned(), "#x".to_owned())]);
        let mapping = CodeMapping::new("src/", "app:///");
        assert_eq!(
            convert_codeowners_syntax("/src/ui/ @x\nsrc/ @x\n", &associations, &mapping),
            "codeowners:/app://ui/ #x\ncodeowners:src/ #x\n"
        );
    }

    #[test]
    fn test_source_code_path_from_stacktrace_path() {
        let mapping = CodeMapping::new("src/", "webpack://app/");
        assert_eq!(
            source_code_path_from_stacktrace_path("webpack://app/components/x.js", &mapping),
            Some("src/components/x.js".to_owned())
        );
        assert_eq!(source_code_path_from_stacktrace_path("x.js", &mapping), None);
    }

    #[test]
    fn test_flatten_slashes() {
        let examples = [
            ("a//b///c", "a/b/c"),
            ("webpack://a//b", "webpack://a/b"),
            ("app:///x", "app://x"),
            ("/", "/"),
            ("//lead", "/lead"),
        ];
        for (path, expected) in examples {
            assert_eq!(flatten_slashes(path), expected, "result mismatch for `{}`", path);
        }
    }
}
