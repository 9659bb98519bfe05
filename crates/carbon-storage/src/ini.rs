//! A minimal `[section] key = value` reader for the resolver rule files.
//!
//! The grammar is deliberately small: section headers in `[brackets]`,
//! `key = value` pairs below them, `#` and `;` line comments, blank lines
//! ignored. Order is preserved because rule files are scanned top-to-bottom
//! and the first matching pattern wins.

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse an ini-like document into ordered sections.
///
/// Anything before the first `[section]` header is collected into an
/// implicit section named `"default"`, mirroring the behaviour of the
/// `goconfig` library this grammar is modeled on (`Sections()[1:]` always
/// skips that implicit leading section).
pub fn parse(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section {
        name: "default".to_string(),
        entries: Vec::new(),
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            sections.push(current);
            current = Section {
                name: name.trim().to_string(),
                entries: Vec::new(),
            };
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            current
                .entries
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    sections.push(current);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_in_order() {
        let text = "\
[coarse]
pattern = ^stats\\.
retentions = 1m:30d

[fine]
pattern = ^high\\.
retentions = 1s:1h
";
        let sections = parse(text);
        assert_eq!(sections.len(), 3); // implicit default + two
        assert_eq!(sections[0].name, "default");
        assert_eq!(sections[1].name, "coarse");
        assert_eq!(sections[1].get("pattern"), Some("^stats\\."));
        assert_eq!(sections[2].name, "fine");
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let text = "; a comment\n# another\n\n[a]\nkey = value\n";
        let sections = parse(text);
        assert_eq!(sections[1].get("key"), Some("value"));
    }
}
