//! Semver versions and range expressions as they appear in package
//! registries.
//!
//! [`tokenize`] is total: any input produces either a concrete [`Version`],
//! a [`Range`] predicate, or [`Tokenized::Unknown`]. It never fails. The
//! grammar is the registry dialect: optional leading `v`/`=`, comparators,
//! `~`/`^`, wildcard letters `x`/`X`/`*` in any position, hyphen ranges,
//! `||` alternatives, and juxtaposition for AND.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A parsed semver version.
///
/// Ordering follows registry precedence: numeric compare of
/// `major.minor.patch`, then pre-release tokens compared lexically in
/// order, a version *with* a pre-release sorting below the same triple
/// without one. Build tokens never affect precedence; they only break
/// ties so the total order stays consistent with equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build: Vec<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Compare ignoring build metadata, the precedence used by range
    /// predicates and version selection.
    #[must_use]
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => return Ordering::Equal,
            // A pre-release sorts below the same plain triple.
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        for (a, b) in self.pre.iter().zip(other.pre.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.pre.len().cmp(&other.pre.len())
    }

    /// Parse a lone version, tolerating missing components (`"1.0"` means
    /// `1.0.0`) and wildcard letters (normalized to zero). Returns `None`
    /// for anything that is not version-shaped.
    #[must_use]
    pub fn parse_lenient(input: &str) -> Option<Self> {
        let partial = Partial::parse(input.trim())?;
        Some(partial.zero_filled())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

/// A range is a predicate over versions, built by composing atomic
/// comparator clauses with AND/OR.
#[derive(Clone)]
pub struct Range(Arc<dyn Fn(&Version) -> bool + Send + Sync>);

impl Range {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Version) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        (self.0)(version)
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::new(move |v| self.matches(v) && other.matches(v))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::new(move |v| self.matches(v) || other.matches(v))
    }

    fn eq_to(version: Version) -> Self {
        Self::new(move |v| v.cmp_precedence(&version) == Ordering::Equal)
    }

    fn ge(version: Version) -> Self {
        Self::new(move |v| v.cmp_precedence(&version) != Ordering::Less)
    }

    fn gt(version: Version) -> Self {
        Self::new(move |v| v.cmp_precedence(&version) == Ordering::Greater)
    }

    fn le(version: Version) -> Self {
        Self::new(move |v| v.cmp_precedence(&version) != Ordering::Greater)
    }

    fn lt(version: Version) -> Self {
        Self::new(move |v| v.cmp_precedence(&version) == Ordering::Less)
    }

    /// `[lo, hi)`
    fn half_open(lo: Version, hi: Version) -> Self {
        Self::ge(lo).and(Self::lt(hi))
    }

    fn any() -> Self {
        Self::new(|_| true)
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Range(..)")
    }
}

/// Result of tokenizing a version or range expression.
#[derive(Debug, Clone)]
pub enum Tokenized {
    /// The input was a single concrete version.
    Version(Version),
    /// The input was a range expression.
    Range(Range),
    /// The input was neither; callers treat this as unresolvable.
    Unknown,
}

impl Tokenized {
    #[must_use]
    pub fn is_version(&self) -> bool {
        matches!(self, Self::Version(_))
    }

    #[must_use]
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }
}

/// Which position of a partial version was left unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Wildcard {
    Major,
    Minor,
    Patch,
}

/// A version literal with possibly-missing or wildcarded components.
#[derive(Debug, Clone, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Vec<String>,
    build: Vec<String>,
    wildcard: Option<Wildcard>,
}

impl Partial {
    /// Parse one whitespace-free version lexeme. `None` means the lexeme is
    /// not version-shaped at all.
    fn parse(input: &str) -> Option<Self> {
        let input = input
            .strip_prefix('v')
            .or_else(|| input.strip_prefix('='))
            .unwrap_or(input);
        if input.is_empty() {
            return None;
        }

        // Split off pre-release and build metadata. An embedded `-` starts
        // the pre-release section; hyphen *ranges* are handled by the
        // group parser before we get here.
        let (core, rest) = match input.find(['-', '+']) {
            Some(idx) => (&input[..idx], Some((input.as_bytes()[idx], &input[idx + 1..]))),
            None => (input, None),
        };

        let mut partial = Self::default();
        let mut slots = [&mut partial.major, &mut partial.minor, &mut partial.patch].into_iter();
        let mut position = 0usize;
        for part in core.split('.') {
            let Some(slot) = slots.next() else {
                // "1.2.3.4" and friends
                return None;
            };
            let wildcard_here = part.is_empty() || part.chars().any(|c| matches!(c, 'x' | 'X' | '*'));
            if wildcard_here {
                if part.chars().any(|c| !matches!(c, 'x' | 'X' | '*') && !c.is_ascii_digit()) {
                    return None;
                }
                *slot = Some(normalize_part(part));
                let level = match position {
                    0 => Wildcard::Major,
                    1 => Wildcard::Minor,
                    _ => Wildcard::Patch,
                };
                partial.wildcard = Some(partial.wildcard.map_or(level, |w| w.min(level)));
            } else {
                if !part.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                *slot = Some(part.parse().ok()?);
            }
            position += 1;
        }
        drop(slots);

        if let Some((sep, rest)) = rest {
            let (pre, build) = if sep == b'+' {
                ("", rest)
            } else {
                match rest.split_once('+') {
                    Some((pre, build)) => (pre, build),
                    None => (rest, ""),
                }
            };
            if !pre.is_empty() {
                partial.pre = pre.split('.').map(str::to_string).collect();
            }
            if !build.is_empty() {
                partial.build = build.split('.').map(str::to_string).collect();
            }
            // Metadata pins the version: "1.2-beta" still means 1.2.0-beta.
        } else {
            // Missing trailing components imply a wildcard at the first
            // absent position: "1" floats over minors, "1.2" over patches.
            if partial.minor.is_none() {
                partial.wildcard = Some(partial.wildcard.map_or(Wildcard::Minor, |w| w.min(Wildcard::Minor)));
            } else if partial.patch.is_none() {
                partial.wildcard = Some(partial.wildcard.map_or(Wildcard::Patch, |w| w.min(Wildcard::Patch)));
            }
        }

        Some(partial)
    }

    fn zero_filled(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: self.build.clone(),
        }
    }

    /// Expand an uncomparatored partial into its implied range:
    /// `1` is `[1.0.0, 2.0.0)`, `1.2` is `[1.2.0, 1.3.0)`, a wildcard
    /// major matches everything.
    fn wildcard_range(&self) -> Range {
        let v = self.zero_filled();
        match self.wildcard {
            Some(Wildcard::Major) => Range::any(),
            Some(Wildcard::Minor) => Range::half_open(
                Version::new(v.major, 0, 0),
                Version::new(v.major + 1, 0, 0),
            ),
            Some(Wildcard::Patch) => Range::half_open(
                Version::new(v.major, v.minor, 0),
                Version::new(v.major, v.minor + 1, 0),
            ),
            None => Range::eq_to(v),
        }
    }

    fn caret_range(&self) -> Range {
        let v = self.zero_filled();
        if v.major > 0 {
            Range::half_open(v.clone(), Version::new(v.major + 1, 0, 0))
        } else if v.minor > 0 {
            Range::half_open(v.clone(), Version::new(0, v.minor + 1, 0))
        } else {
            Range::eq_to(v)
        }
    }

    fn tilde_range(&self) -> Range {
        let v = self.zero_filled();
        if self.minor.is_none() || self.wildcard == Some(Wildcard::Minor) {
            Range::half_open(Version::new(v.major, 0, 0), Version::new(v.major + 1, 0, 0))
        } else {
            Range::half_open(v.clone(), Version::new(v.major, v.minor + 1, 0))
        }
    }
}

fn normalize_part(part: &str) -> u64 {
    let digits: String = part.chars().map(|c| if c.is_ascii_digit() { c } else { '0' }).collect();
    digits.parse().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    None,
    Gt,
    Ge,
    Lt,
    Le,
    Tilde,
    Caret,
}

/// Tokenize a version or range expression.
///
/// Idempotent and side-effect free. Common inputs (`*`, `x`, bare small
/// majors, empty) short-circuit through a preparsed table.
#[must_use]
pub fn tokenize(input: &str) -> Tokenized {
    let trimmed = input.trim();

    if let Some(preparsed) = preparsed(trimmed) {
        return preparsed;
    }

    let mut result: Option<Range> = None;
    let mut sole_version: Option<Version> = None;
    let mut groups = 0usize;

    for group in trimmed.split("||") {
        groups += 1;
        match parse_and_group(group.trim()) {
            Some(GroupResult::Plain(version)) => {
                sole_version = Some(version.clone());
                let range = Range::eq_to(version);
                result = Some(match result {
                    Some(acc) => acc.or(range),
                    None => range,
                });
            }
            Some(GroupResult::Range(range)) => {
                sole_version = None;
                result = Some(match result {
                    Some(acc) => acc.or(range),
                    None => range,
                });
            }
            None => return Tokenized::Unknown,
        }
    }

    match (groups, sole_version, result) {
        (1, Some(version), _) => Tokenized::Version(version),
        (_, _, Some(range)) => Tokenized::Range(range),
        _ => Tokenized::Unknown,
    }
}

fn preparsed(input: &str) -> Option<Tokenized> {
    match input {
        "" | "*" | "x" | "X" => Some(Tokenized::Range(Range::any())),
        _ => {
            if input.len() <= 2 && input.bytes().all(|b| b.is_ascii_digit()) {
                let major: u64 = input.parse().ok()?;
                if major <= 10 {
                    return Some(Tokenized::Range(Range::half_open(
                        Version::new(major, 0, 0),
                        Version::new(major + 1, 0, 0),
                    )));
                }
            }
            None
        }
    }
}

enum GroupResult {
    /// A single comparator-free, wildcard-free version literal.
    Plain(Version),
    Range(Range),
}

/// Parse one `||`-alternative: whitespace-separated atoms ANDed together,
/// with `A - B` folding into `>= A && <= B`.
fn parse_and_group(group: &str) -> Option<GroupResult> {
    if group.is_empty() {
        return Some(GroupResult::Range(Range::any()));
    }

    let words: Vec<&str> = group.split_whitespace().collect();
    let mut atoms: Vec<(Op, Partial)> = Vec::new();
    let mut hyphen_after: Vec<bool> = Vec::new();

    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        if word == "-" {
            if atoms.is_empty() {
                return None;
            }
            let last = hyphen_after.last_mut()?;
            *last = true;
            i += 1;
            continue;
        }

        let (op, rest) = split_op(word);
        let lexeme = if rest.is_empty() {
            // Comparator detached from its version: "> 1.2.3".
            i += 1;
            *words.get(i)?
        } else {
            rest
        };
        let partial = Partial::parse(lexeme)?;
        atoms.push((op, partial));
        hyphen_after.push(false);
        i += 1;
    }

    if atoms.is_empty() {
        return None;
    }

    // A group that is exactly one bare full version stays a version.
    if atoms.len() == 1 {
        let (op, partial) = &atoms[0];
        if *op == Op::None && partial.wildcard.is_none() {
            return Some(GroupResult::Plain(partial.zero_filled()));
        }
    }

    let mut acc: Option<Range> = None;
    let mut idx = 0;
    while idx < atoms.len() {
        let range = if hyphen_after[idx] {
            let (lo_op, lo) = &atoms[idx];
            let hi = atoms.get(idx + 1).map(|(_, p)| p)?;
            if *lo_op != Op::None {
                return None;
            }
            idx += 1;
            Range::ge(lo.zero_filled()).and(Range::le(hi.zero_filled()))
        } else {
            let (op, partial) = &atoms[idx];
            atom_range(*op, partial)
        };
        acc = Some(match acc {
            Some(prev) => prev.and(range),
            None => range,
        });
        idx += 1;
    }

    acc.map(GroupResult::Range)
}

fn split_op(word: &str) -> (Op, &str) {
    if let Some(rest) = word.strip_prefix(">=") {
        (Op::Ge, rest.trim_start())
    } else if let Some(rest) = word.strip_prefix("<=") {
        (Op::Le, rest.trim_start())
    } else if let Some(rest) = word.strip_prefix('>') {
        (Op::Gt, rest.trim_start())
    } else if let Some(rest) = word.strip_prefix('<') {
        (Op::Lt, rest.trim_start())
    } else if let Some(rest) = word.strip_prefix('~') {
        (Op::Tilde, rest.trim_start())
    } else if let Some(rest) = word.strip_prefix('^') {
        (Op::Caret, rest.trim_start())
    } else {
        (Op::None, word)
    }
}

fn atom_range(op: Op, partial: &Partial) -> Range {
    match op {
        Op::None => partial.wildcard_range(),
        Op::Caret => partial.caret_range(),
        Op::Tilde => partial.tilde_range(),
        Op::Ge => Range::ge(partial.zero_filled()),
        Op::Gt => Range::gt(partial.zero_filled()),
        Op::Le => Range::le(partial.zero_filled()),
        Op::Lt => Range::lt(partial.zero_filled()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        match tokenize(s) {
            Tokenized::Version(v) => v,
            other => panic!("expected version for {s:?}, got {other:?}"),
        }
    }

    fn r(s: &str) -> Range {
        match tokenize(s) {
            Tokenized::Range(r) => r,
            other => panic!("expected range for {s:?}, got {other:?}"),
        }
    }

    #[test]
    fn plain_versions() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("=1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v(" 1.2.3 "), Version::new(1, 2, 3));
    }

    #[test]
    fn pre_and_build_tokens() {
        let parsed = v("1.2.3-alpha.1+build.5");
        assert_eq!(parsed.pre, vec!["alpha", "1"]);
        assert_eq!(parsed.build, vec!["build", "5"]);
        assert_eq!(parsed.to_string(), "1.2.3-alpha.1+build.5");
    }

    #[test]
    fn display_roundtrip() {
        for s in ["0.0.0", "1.2.3", "10.20.30", "1.0.0-rc.1", "2.0.0+sha.abcdef"] {
            assert_eq!(v(&v(s).to_string()), v(s));
        }
    }

    #[test]
    fn precedence_ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(1, 0, 1));
        assert!(Version::new(1, 9, 0) < Version::new(1, 10, 0));
        // A pre-release sorts below its plain triple.
        assert!(v("1.0.0-alpha") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        // Build metadata does not affect precedence.
        assert_eq!(
            v("1.0.0+a").cmp_precedence(&v("1.0.0+b")),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    fn preparsed_table() {
        for s in ["*", "x", "X", ""] {
            assert!(r(s).matches(&Version::new(0, 0, 1)));
            assert!(r(s).matches(&Version::new(99, 0, 0)));
        }
        let one = r("1");
        assert!(one.matches(&Version::new(1, 9, 9)));
        assert!(!one.matches(&Version::new(2, 0, 0)));
        let ten = r("10");
        assert!(ten.matches(&Version::new(10, 3, 0)));
        assert!(!ten.matches(&Version::new(11, 0, 0)));
    }

    #[test]
    fn wildcard_positions() {
        let minor = r("1.x");
        assert!(minor.matches(&Version::new(1, 0, 0)));
        assert!(minor.matches(&Version::new(1, 99, 2)));
        assert!(!minor.matches(&Version::new(2, 0, 0)));

        let patch = r("1.2.x");
        assert!(patch.matches(&Version::new(1, 2, 0)));
        assert!(patch.matches(&Version::new(1, 2, 99)));
        assert!(!patch.matches(&Version::new(1, 3, 0)));

        let bare_minor = r("1.2");
        assert!(bare_minor.matches(&Version::new(1, 2, 7)));
        assert!(!bare_minor.matches(&Version::new(1, 3, 0)));
    }

    #[test]
    fn caret_rules() {
        let big = r("^1.2.3");
        assert!(big.matches(&Version::new(1, 2, 3)));
        assert!(big.matches(&Version::new(1, 9, 0)));
        assert!(!big.matches(&Version::new(2, 0, 0)));
        assert!(!big.matches(&Version::new(1, 2, 2)));

        let zero_minor = r("^0.2.3");
        assert!(zero_minor.matches(&Version::new(0, 2, 3)));
        assert!(zero_minor.matches(&Version::new(0, 2, 9)));
        assert!(!zero_minor.matches(&Version::new(0, 3, 0)));

        let pinned = r("^0.0.3");
        assert!(pinned.matches(&Version::new(0, 0, 3)));
        assert!(!pinned.matches(&Version::new(0, 0, 4)));
    }

    #[test]
    fn tilde_rules() {
        let t = r("~1.1.2");
        assert!(t.matches(&Version::new(1, 1, 2)));
        assert!(t.matches(&Version::new(1, 1, 99)));
        assert!(!t.matches(&Version::new(1, 2, 0)));
        assert!(!t.matches(&Version::new(1, 1, 1)));

        let major_only = r("~1");
        assert!(major_only.matches(&Version::new(1, 7, 0)));
        assert!(!major_only.matches(&Version::new(2, 0, 0)));
    }

    #[test]
    fn tilde_corpus_is_range() {
        // Sampled from the registry spec corpus that keeps tripping up
        // tolerant parsers.
        for s in ["~1.1.2", "~0.4", "~0.10.x", "~5.1.1", "~0.0.2", "~2.1.24"] {
            assert!(tokenize(s).is_range(), "{s} should be a range");
        }
    }

    #[test]
    fn comparators() {
        let ge = r(">=1.2.3");
        assert!(ge.matches(&Version::new(1, 2, 3)));
        assert!(!ge.matches(&Version::new(1, 2, 2)));

        let spaced = r("> 1.2.3");
        assert!(spaced.matches(&Version::new(1, 2, 4)));
        assert!(!spaced.matches(&Version::new(1, 2, 3)));

        let and = r(">=1.2.0 <1.5.0");
        assert!(and.matches(&Version::new(1, 4, 9)));
        assert!(!and.matches(&Version::new(1, 5, 0)));
    }

    #[test]
    fn or_alternatives() {
        let either = r("^1.20.0||^2.0.0");
        assert!(either.matches(&Version::new(1, 25, 2)));
        assert!(either.matches(&Version::new(2, 42, 2)));
        assert!(!either.matches(&Version::new(1, 19, 0)));
        assert!(!either.matches(&Version::new(3, 0, 0)));

        let majors = r("2 || 3 || 4");
        assert!(majors.matches(&Version::new(3, 1, 0)));
        assert!(!majors.matches(&Version::new(5, 0, 0)));
    }

    #[test]
    fn hyphen_range() {
        let between = r("1.2.3 - 2.3.4");
        assert!(between.matches(&Version::new(1, 2, 3)));
        assert!(between.matches(&Version::new(2, 3, 4)));
        assert!(!between.matches(&Version::new(2, 3, 5)));
        assert!(!between.matches(&Version::new(1, 2, 2)));
    }

    #[test]
    fn garbage_is_unknown() {
        for s in ["not-a-version", "1.2.3.4", "fo.o.b.ar", "owner/repo", "../local"] {
            assert!(
                matches!(tokenize(s), Tokenized::Unknown),
                "{s} should be unknown"
            );
        }
    }

    #[test]
    fn tokenize_is_idempotent_on_version_strings() {
        let first = v("1.2.3-rc.1");
        let second = v(&first.to_string());
        assert_eq!(first, second);
    }

    #[test]
    fn lenient_parse() {
        assert_eq!(Version::parse_lenient("1.0"), Some(Version::new(1, 0, 0)));
        assert_eq!(Version::parse_lenient("v2"), Some(Version::new(2, 0, 0)));
        assert_eq!(
            Version::parse_lenient("1.2.3-beta").map(|v| v.pre),
            Some(vec!["beta".to_string()])
        );
        assert_eq!(Version::parse_lenient("banana"), None);
    }

    #[test]
    fn sorting_is_ascending() {
        let mut versions = vec![
            Version::new(2, 0, 0),
            Version::new(1, 19, 0),
            v("2.0.0-rc.1"),
            Version::new(1, 20, 0),
        ];
        versions.sort();
        assert_eq!(
            versions.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["1.19.0", "1.20.0", "2.0.0-rc.1", "2.0.0"]
        );
    }

    proptest! {
        #[test]
        fn roundtrip_numeric_triples(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let version = Version::new(major, minor, patch);
            prop_assert_eq!(v(&version.to_string()), version);
        }

        #[test]
        fn tokenize_never_panics(input in ".{0,64}") {
            let _ = tokenize(&input);
        }

        #[test]
        fn concrete_version_satisfies_own_equality(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
            let text = format!("{major}.{minor}.{patch}");
            let version = v(&text);
            // The equality range derived from the same input must accept it.
            if let Tokenized::Range(range) = tokenize(&format!("={text} ={text}")) {
                prop_assert!(range.matches(&version));
            }
        }
    }
}
