//! The indentation-aware line reader and save-string writer shared by
//! [`crate::registry::Registry`] and [`crate::set::PermissionSet`].
//!
//! `str::lines()` already strips a trailing `\r`, so splitting text into
//! physical lines falls out of the standard library; what this module adds
//! is grouping those physical lines into entity blocks (header line + its
//! indented body) the way the save format nests them.

pub(crate) fn indent_width(s: &str) -> usize {
    s.len() - s.trim_start_matches(' ').len()
}

/// One entity's header line and its raw (still-indented) body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
    pub header: String,
    pub body: Vec<String>,
}

/// Splits file text into entity blocks: a header line has no leading
/// space; every following line with at least one leading space belongs to
/// that header's body; blank lines separate entities without carrying
/// information of their own.
pub(crate) fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if indent_width(line) == 0 {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(Block { header: line.to_string(), body: Vec::new() });
        } else if let Some(block) = current.as_mut() {
            block.body.push(line.to_string());
        }
        // A body line with no preceding header is malformed input; the
        // registry's caller controls what it writes, so we simply drop it
        // rather than fail the whole file over stray whitespace.
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    blocks
}

/// Splits a header line `name[: priority] [#group]` into its name (with
/// an optional trailing priority string) and an optional referenced group
/// name.
pub(crate) fn split_header(header: &str) -> (&str, Option<&str>) {
    match header.rfind('#') {
        Some(idx) => (header[..idx].trim_end(), Some(header[idx + 1..].trim())),
        None => (header.trim_end(), None),
    }
}

/// Splits a header's name portion into the entity name and an optional
/// priority string (`name: priority`).
pub(crate) fn split_name_and_priority(name_part: &str) -> (&str, Option<&str>) {
    match name_part.find(':') {
        Some(idx) => (name_part[..idx].trim(), Some(name_part[idx + 1..].trim())),
        None => (name_part.trim(), None),
    }
}

/// One rendered entity (a group or a user), ready to be joined with its
/// neighbours. `single_line` groups (no permissions, exactly one
/// reference) are separated from their neighbours by a single blank line;
/// anything else gets a double blank line.
pub(crate) struct RenderedEntity {
    pub lines: Vec<String>,
    pub single_line: bool,
}

/// Joins rendered entities with the blank-line spacing the save format
/// requires.
pub(crate) fn join_entities(entities: Vec<RenderedEntity>) -> String {
    let mut out = String::new();
    for (idx, entity) in entities.iter().enumerate() {
        if idx > 0 {
            let prev_single = entities[idx - 1].single_line;
            let sep = if prev_single && entity.single_line { "\n\n" } else { "\n\n\n" };
            out.push_str(sep);
        }
        out.push_str(&entity.lines.join("\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_blocks_on_header_lines_and_blanks() {
        let text = "groupa\n    perm.one\n\ngroupb: 10 #groupa\n    perm.two\n";
        let blocks = parse_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].header, "groupa");
        assert_eq!(blocks[0].body, vec!["    perm.one".to_string()]);
        assert_eq!(blocks[1].header, "groupb: 10 #groupa");
        assert_eq!(blocks[1].body, vec!["    perm.two".to_string()]);
    }

    #[test]
    fn splits_header_name_priority_and_reference() {
        let (name_part, ref_name) = split_header("groupb: 10 #groupa");
        assert_eq!(name_part, "groupb: 10");
        assert_eq!(ref_name, Some("groupa"));

        let (name, priority) = split_name_and_priority(name_part);
        assert_eq!(name, "groupb");
        assert_eq!(priority, Some("10"));
    }

    #[test]
    fn header_without_reference_or_priority() {
        let (name_part, ref_name) = split_header("solo");
        assert_eq!(name_part, "solo");
        assert_eq!(ref_name, None);
        let (name, priority) = split_name_and_priority(name_part);
        assert_eq!(name, "solo");
        assert_eq!(priority, None);
    }

    #[test]
    fn join_entities_uses_single_blank_between_single_line_groups() {
        let a = RenderedEntity { lines: vec!["a #b".to_string()], single_line: true };
        let b = RenderedEntity { lines: vec!["c #d".to_string()], single_line: true };
        assert_eq!(join_entities(vec![a, b]), "a #b\n\nc #d");
    }

    #[test]
    fn join_entities_uses_double_blank_around_multiline_groups() {
        let a = RenderedEntity { lines: vec!["a".to_string(), "    perm".to_string()], single_line: false };
        let b = RenderedEntity { lines: vec!["b #c".to_string()], single_line: true };
        assert_eq!(join_entities(vec![a, b]), "a\n    perm\n\n\nb #c");
    }
}
