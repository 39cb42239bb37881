//! A single permission rule's effect at one node of a [`crate::set::PermissionSet`].

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::path::PermissionPath;

/// A rule's effect at the node it is stored on.
///
/// `includes_exact`/`negates_exact` are mutually exclusive, as are
/// `includes_descendants`/`negates_descendants`. Permissions are immutable
/// once constructed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub includes_exact: bool,
    pub negates_exact: bool,
    pub includes_descendants: bool,
    pub negates_descendants: bool,
    pub argument: Option<String>,
    pub argument_for_descendants: Option<String>,
}

impl Permission {
    /// Whether this permission grants access at the node it matched,
    /// `exact` telling whether the match was on the node itself (as
    /// opposed to a strict descendant).
    pub fn allows(&self, exact: bool) -> bool {
        if exact {
            self.includes_exact
        } else {
            self.includes_descendants
        }
    }

    /// The dual of [`Permission::allows`].
    pub fn negates(&self, exact: bool) -> bool {
        if exact {
            self.negates_exact
        } else {
            self.negates_descendants
        }
    }

    /// The argument that applies for a match of the given exactness.
    pub fn argument_for(&self, exact: bool) -> Option<&str> {
        if exact {
            self.argument.as_deref()
        } else {
            self.argument_for_descendants
                .as_deref()
                .or(self.argument.as_deref())
        }
    }
}

/// Splits a permission's head line into its path/wildcard portion and,
/// if present, the `:`-introduced argument.
///
/// Path/wildcard grammar never contains `:`, so the first `:` in the line
/// unambiguously starts the argument.
fn split_head(line: &str) -> (&str, Option<&str>) {
    match line.find(':') {
        Some(idx) => (&line[..idx], Some(&line[idx + 1..])),
        None => (line, None),
    }
}

fn indent_width(s: &str) -> usize {
    s.len() - s.trim_start_matches(' ').len()
}

/// Parses one permission entry: `lines[0]` is the line that introduces the
/// permission (its own leading indentation is taken as the baseline);
/// subsequent entries in `lines` are continuation candidates, consumed for
/// as long as each is indented at least four columns deeper than
/// `lines[0]`'s own indentation.
///
/// Returns the parsed path/permission pair together with the number of
/// entries of `lines` that were consumed (always at least 1).
pub(crate) fn parse_entry_lines(lines: &[&str]) -> Result<(PermissionPath, Permission, usize), Error> {
    let raw = lines.first().ok_or_else(|| Error::InvalidPermission(String::new()))?;
    let starter_indent = indent_width(raw);
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Err(Error::InvalidPermission(raw.to_string()));
    }

    let (head, first_arg) = split_head(trimmed);

    let mut consumed = 1;
    let mut argument = first_arg.map(|s| s.to_string());

    if argument.is_some() {
        let strip = starter_indent + 4;
        for line in &lines[1..] {
            let this_indent = indent_width(line);
            if line.trim().is_empty() || this_indent < strip {
                break;
            }
            let continuation = if line.len() >= strip { &line[strip..] } else { "" };
            let buf = argument.get_or_insert_with(String::new);
            buf.push('\n');
            buf.push_str(continuation);
            consumed += 1;
        }
    }

    let permission = build_permission(head, argument, raw)?;
    Ok((permission.0, permission.1, consumed))
}

fn build_permission(
    head: &str,
    argument: Option<String>,
    original: &str,
) -> Result<(PermissionPath, Permission), Error> {
    if head.is_empty() || head == "-" {
        return Err(Error::InvalidPermission(original.to_string()));
    }

    let (negated, rest) = match head.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, head),
    };

    if rest.contains('*') && !rest.ends_with(".*") {
        return Err(Error::InvalidPermission(original.to_string()));
    }
    if rest.contains('-') {
        return Err(Error::InvalidPermission(original.to_string()));
    }

    let (path_str, is_wildcard) = match rest.strip_suffix(".*") {
        Some(base) => (base, true),
        None => (rest, false),
    };

    let path = PermissionPath::parse(path_str).map_err(|_| Error::InvalidPermission(original.to_string()))?;

    let mut permission = Permission::default();
    match (is_wildcard, negated) {
        (false, false) => {
            permission.includes_exact = true;
            permission.includes_descendants = true;
        }
        (false, true) => {
            permission.negates_exact = true;
            permission.negates_descendants = true;
        }
        (true, false) => {
            permission.includes_descendants = true;
        }
        (true, true) => {
            permission.negates_descendants = true;
        }
    }

    if let Some(arg) = argument {
        permission.argument = Some(arg.clone());
        permission.argument_for_descendants = Some(arg);
    }

    Ok((path, permission))
}

/// Parses a single permission string as a caller would hand it to
/// [`crate::set::PermissionSet::set`] directly: `["-"] PATH ["." "*"]
/// [":" ARG]`, where `ARG` may itself already contain embedded `\n`
/// continuation lines indented at least four columns deeper than the
/// string's own first line.
pub fn parse_permission_string(s: &str) -> Result<(PermissionPath, Permission), Error> {
    let lines: Vec<&str> = s.split('\n').collect();
    let (path, permission, consumed) = parse_entry_lines(&lines)?;
    if consumed != lines.len() {
        return Err(Error::InvalidPermission(s.to_string()));
    }
    Ok((path, permission))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(s: &str) -> Permission {
        parse_permission_string(s).unwrap().1
    }

    #[test]
    fn plain_permission_grants_exact_and_descendants() {
        let p = perm("first.second");
        assert!(p.includes_exact);
        assert!(p.includes_descendants);
        assert!(!p.negates_exact);
        assert!(!p.negates_descendants);
    }

    #[test]
    fn negated_permission_negates_both() {
        let p = perm("-first.second");
        assert!(p.negates_exact);
        assert!(p.negates_descendants);
        assert!(!p.includes_exact);
    }

    #[test]
    fn wildcard_grants_descendants_only() {
        let p = perm("first.second.*");
        assert!(p.includes_descendants);
        assert!(!p.includes_exact);
    }

    #[test]
    fn negated_wildcard_negates_descendants_only() {
        let p = perm("-first.second.*");
        assert!(p.negates_descendants);
        assert!(!p.negates_exact);
    }

    #[test]
    fn argument_applies_to_exact_and_descendants_by_default() {
        let p = perm("greet:hello world");
        assert_eq!(p.argument.as_deref(), Some("hello world"));
        assert_eq!(p.argument_for_descendants.as_deref(), Some("hello world"));
    }

    #[test]
    fn rejects_lone_star() {
        assert!(parse_permission_string("*").is_err());
        assert!(parse_permission_string("first.*.second").is_err());
    }

    #[test]
    fn rejects_dash_outside_leading_position() {
        assert!(parse_permission_string("first-second").is_err());
        assert!(parse_permission_string("first.sec-ond").is_err());
    }

    #[test]
    fn rejects_non_alphanumeric_path() {
        assert!(parse_permission_string("first/second").is_err());
    }

    #[test]
    fn multiline_argument_joins_with_forced_indent_stripped() {
        let (_, permission, consumed) =
            parse_entry_lines(&["poem:roses are red", "    violets are blue"]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(permission.argument.as_deref(), Some("roses are red\nviolets are blue"));
    }

    #[test]
    fn continuation_requires_enough_indentation() {
        let (_, permission, consumed) =
            parse_entry_lines(&["poem:roses are red", "  not enough indent"]).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(permission.argument.as_deref(), Some("roses are red"));
    }

    #[test]
    fn continuation_only_applies_when_an_argument_was_opened() {
        let (_, permission, consumed) = parse_entry_lines(&["first.second", "        stray line"]).unwrap();
        assert_eq!(consumed, 1);
        assert!(permission.argument.is_none());
    }
}
