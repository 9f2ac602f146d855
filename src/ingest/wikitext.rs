//! Relation-tag extraction from raw entry text.
//!
//! Entries use `{{tag|arg|...}}` double-brace markup. A tag asserts a
//! "form of root X" relation when its name ends in `" of"` and is not on
//! the synonym/antonym/pejorative exclusion list. This is deliberately not
//! a wiki-markup parser: regex tag scanning is enough to find relations,
//! and everything malformed is logged and skipped.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::tree::Relation;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"\{\{[^{]*\}\}").unwrap();
    static ref SECTION_RE: Regex = Regex::new(r"^===[^=]+===").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"<title>(.*?)</title>").unwrap();
}

/// Sections whose tags are linkage noise rather than morphology.
const SKIP_SECTIONS: [&str; 4] = [
    "etymology",
    "pronunciation",
    "related terms",
    "further reading",
];

/// Tag-name substrings that disqualify a `" of"` tag as a relation.
const EXCLUDED_TAG_PARTS: [&str; 3] = ["syn", "antonym", "pejorative"];

/// Result of scanning one entry body for relation tags.
#[derive(Debug, Default)]
pub struct TagScan {
    /// Relations found, in document order.
    pub relations: Vec<Relation>,
    /// Tags that matched the shape but could not be processed.
    pub malformed: u64,
}

/// Recover the plain article title from a `<title>...</title>` line.
pub fn strip_title(line: &str) -> Option<String> {
    TITLE_RE
        .captures(line)
        .map(|cap| cap[1].trim().to_string())
}

/// Scan an entry's lines for form-of relation tags.
///
/// The root argument position depends on whether the tag repeats the
/// language code among its arguments; `&`-joined multi-root values keep
/// only the first alternative.
pub fn scan_relations<'a, I>(lines: I, lang_code: &str) -> TagScan
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scan = TagScan::default();
    let mut section = String::new();

    for line in lines {
        if SECTION_RE.is_match(line) {
            section = line.trim().trim_matches('=').to_lowercase();
        }
        if SKIP_SECTIONS.contains(&section.as_str()) {
            continue;
        }

        for tag_match in TAG_RE.find_iter(line) {
            let code = tag_match.as_str().to_lowercase();
            let code = code.trim_matches(|c| c == '{' || c == '}');
            let args: Vec<&str> = code.split('|').filter(|s| !s.is_empty()).collect();

            let Some(&tag) = args.first() else {
                warn!("malformed tag body: {line:?}");
                scan.malformed += 1;
                continue;
            };
            if !tag.ends_with(" of") {
                continue;
            }
            if EXCLUDED_TAG_PARTS.iter().any(|part| tag.contains(part)) {
                continue;
            }

            let root = if args.contains(&lang_code) {
                // Tag repeats the language code, so the root sits after it.
                match args.get(2) {
                    Some(&root) => root,
                    None => {
                        warn!("cannot process tag: {args:?}");
                        scan.malformed += 1;
                        continue;
                    }
                }
            } else {
                match args.last() {
                    Some(&root) if args.len() > 1 => root,
                    _ => {
                        warn!("tag has no root argument: {args:?}");
                        scan.malformed += 1;
                        continue;
                    }
                }
            };

            // An ampersand joins alternatives; only the first one counts.
            let root = root.split('&').next().unwrap_or(root).trim();
            if root.is_empty() {
                warn!("tag has empty root: {args:?}");
                scan.malformed += 1;
                continue;
            }

            scan.relations.push(Relation {
                root: root.to_string(),
                tag: tag.to_string(),
            });
        }
    }

    scan
}
