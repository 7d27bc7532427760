//! Order-preserving INI document model (§4.2).
//!
//! Game.ini/GameUserSettings.ini files are parsed and merged by Ark itself
//! based on section and key order, so the in-memory representation has to
//! preserve insertion order on both axes. There is no section-ordered map
//! in the dependency stack, so this is a small hand-rolled `Vec`-backed
//! structure rather than a `BTreeMap`/`HashMap`.

use std::fmt::Write as _;

use crate::util::Error;

/// An ordered `key = value` list within one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Replaces the first occurrence of `key`, or appends if absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    /// Appends `key = value` even if the key is already present, matching
    /// Ark's own treatment of repeatable keys (e.g. `ConfigOverrideItemMaxQuantity`).
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn remove_all(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An ordered list of `[section]` blocks, each with an ordered key list.
///
/// The region before the first `[section]` header (if any) is kept under
/// the empty-string section name rather than under a sentinel key, since
/// nothing downstream ever needs to distinguish "no section yet" from
/// "explicit empty section name".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    sections: Vec<(String, Section)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut doc = Document::new();
        let mut current = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = name.to_string();
                doc.section_mut(&current);
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::ConfigParse(format!("malformed line (expected `key=value`): {line:?}")));
            };
            doc.section_mut(&current).append(key.trim(), value.trim());
        }
        Ok(doc)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            if !name.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                let _ = writeln!(out, "[{name}]");
            }
            for (key, value) in section.iter() {
                let _ = writeln!(out, "{key}={value}");
            }
        }
        out
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        if let Some(idx) = self.sections.iter().position(|(n, _)| n == name) {
            &mut self.sections[idx].1
        } else {
            self.sections.push((name.to_string(), Section::default()));
            &mut self.sections.last_mut().unwrap().1
        }
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|(_, s)| s.is_empty())
    }

    /// Merges `child` on top of `parent`: sections are unioned in the order
    /// parent-first-then-new-child-sections, and within a section keys from
    /// `child` override same-named keys from `parent` but otherwise keep
    /// each side's own relative ordering (§4.2, commutative on disjoint
    /// keysets, right-biased on overlap — see scenario E).
    pub fn merge(parent: &Document, child: &Document, warn: impl Fn(&str)) -> Document {
        let mut result = parent.clone();
        for (name, child_section) in &child.sections {
            let merged = result.section_mut(name);
            for (key, value) in child_section.iter() {
                if let Some(existing) = merged.get(key) {
                    if existing != value {
                        warn(&format!(
                            "[{name}] {key} overridden: {existing:?} -> {value:?}"
                        ));
                    }
                }
                merged.set(key, value);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_keys_in_order() {
        let doc = Document::parse(
            "[ServerSettings]\nDifficultyOffset=1.0\n\n[SessionSettings]\nSessionName=Test\n",
        )
        .unwrap();
        let names: Vec<_> = doc.section_names().collect();
        assert_eq!(names, vec!["ServerSettings", "SessionSettings"]);
        assert_eq!(
            doc.section("ServerSettings").unwrap().get("DifficultyOffset"),
            Some("1.0")
        );
    }

    #[test]
    fn leading_keys_land_in_the_empty_section() {
        let doc = Document::parse("GlobalFlag=1\n[ServerSettings]\nX=2\n").unwrap();
        assert_eq!(doc.section("").unwrap().get("GlobalFlag"), Some("1"));
    }

    #[test]
    fn merge_is_right_biased_on_overlap() {
        let parent = Document::parse("[ServerSettings]\nDifficultyOffset=1.0\nX=old\n").unwrap();
        let child = Document::parse("[ServerSettings]\nX=new\nY=added\n").unwrap();
        let merged = Document::merge(&parent, &child, |_| {});
        let section = merged.section("ServerSettings").unwrap();
        assert_eq!(section.get("DifficultyOffset"), Some("1.0"));
        assert_eq!(section.get("X"), Some("new"));
        assert_eq!(section.get("Y"), Some("added"));
    }

    #[test]
    fn merge_is_commutative_on_disjoint_keys() {
        let parent = Document::parse("[A]\nK1=1\n").unwrap();
        let child = Document::parse("[A]\nK2=2\n").unwrap();
        let merged_a = Document::merge(&parent, &child, |_| {});
        let merged_b = Document::merge(&child, &parent, |_| {});
        assert_eq!(merged_a.section("A").unwrap().get("K1"), merged_b.section("A").unwrap().get("K1"));
        assert_eq!(merged_a.section("A").unwrap().get("K2"), merged_b.section("A").unwrap().get("K2"));
    }

    #[test]
    fn render_round_trips() {
        let text = "[ServerSettings]\nDifficultyOffset=1.0\n";
        let doc = Document::parse(text).unwrap();
        assert_eq!(Document::parse(&doc.render()).unwrap(), doc);
    }

    #[test]
    fn malformed_line_is_a_parse_error() {
        let err = Document::parse("[ServerSettings]\nNotAKeyValueLine\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
