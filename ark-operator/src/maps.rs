//! Map selector grammar and map name/slug derivation (§4.3).

use ark_types::{ActiveVolume as _, CLUB_MAP_ID, OFFICIAL_MAP_ORDER};
use std::collections::{BTreeMap, BTreeSet};

use crate::util::Error;

/// Canonical (non-Club) maps that ship in every default cluster. Notably
/// excludes `TheCenter_WP`, which is official but not canonical.
const ALL_CANONICAL: &[&str] = &["TheIsland_WP", "ScorchedEarth_WP", "Aberration_WP", "Extinction_WP"];

const ERROR_NO_ALL: &str = "@all can only be used if a list of all maps is passed in.";

lazy_static::lazy_static! {
    static ref MAP_NAME_LOOKUP: BTreeMap<&'static str, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert("Aberration_WP", "Aberration");
        m.insert("BobsMissions_WP", "Club Ark");
        m.insert("Extinction_WP", "Extinction");
        m.insert("ScorchedEarth_WP", "Scorched Earth");
        m.insert("TheCenter_WP", "The Center");
        m.insert("TheIsland_WP", "The Island");
        m
    };
}

fn official_with_club() -> Vec<&'static str> {
    let mut v = vec![CLUB_MAP_ID];
    v.extend(OFFICIAL_MAP_ORDER.iter().copied());
    v
}

fn shorthand(key: &str) -> Option<Vec<&'static str>> {
    match key {
        "@canonical" => {
            let mut v = vec![CLUB_MAP_ID];
            v.extend(ALL_CANONICAL.iter().copied());
            Some(v)
        }
        "@canonicalNoClub" => Some(ALL_CANONICAL.to_vec()),
        "@official" => Some(official_with_club()),
        "@officialNoClub" => Some(OFFICIAL_MAP_ORDER.to_vec()),
        _ => None,
    }
}

/// Expands the `server.maps` selector grammar into a concrete, ordered,
/// deduplicated list of map ids (§4.3).
///
/// Grammar: entries are either a literal map id, a `@group` alias, `@all`
/// (which requires `all_maps` to be supplied, or the whole expansion
/// fails), or a `-`-prefixed removal of a literal map id. Removals are
/// matched literally against the expanded set, not re-expanded as groups
/// themselves -- `-@official` removes nothing unless `"@official"` is
/// itself one of the expanded ids (it never is).
pub fn expand_selector(entries: &[String], all_maps: Option<&[String]>) -> Result<Vec<String>, Error> {
    let mut expanded: BTreeSet<String> = BTreeSet::new();
    let mut remove: BTreeSet<String> = BTreeSet::new();

    for entry in entries {
        if entry == "@all" {
            let Some(all_maps) = all_maps else {
                return Err(Error::UserInput(ERROR_NO_ALL.to_string()));
            };
            expanded.extend(all_maps.iter().cloned());
        } else if let Some(rest) = entry.strip_prefix('-') {
            remove.insert(rest.to_string());
        } else if let Some(group) = shorthand(entry) {
            expanded.extend(group.into_iter().map(String::from));
        } else {
            expanded.insert(entry.clone());
        }
    }

    for id in &remove {
        expanded.remove(id);
    }

    Ok(order_maps(expanded.into_iter().collect()))
}

/// Orders a set of map ids: official maps (Club Ark first, then release
/// order) come first, everything else follows alphabetically.
pub fn order_maps(ids: Vec<String>) -> Vec<String> {
    let mut remaining = ids;
    let mut ordered = Vec::new();
    for map_id in official_with_club() {
        if let Some(pos) = remaining.iter().position(|m| m == map_id) {
            ordered.push(remaining.remove(pos));
        }
    }
    remaining.sort();
    ordered.extend(remaining);
    ordered
}

fn lstrip_chars(s: &str, chars: &str) -> String {
    s.trim_start_matches(|c| chars.contains(c)).to_string()
}

fn rstrip_chars(s: &str, chars: &str) -> String {
    s.trim_end_matches(|c| chars.contains(c)).to_string()
}

/// Inserts a space before an uppercase letter that starts a new camelCase
/// word: either it follows a lowercase letter, or it isn't the first
/// character and is itself followed by a lowercase letter.
fn camel_space(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let prev_lower = i > 0 && chars[i - 1].is_lowercase();
        let next_lower = i + 1 < chars.len() && chars[i + 1].is_lowercase();
        if c.is_uppercase() && (prev_lower || (i != 0 && next_lower)) {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Title-cases every maximal run of alphabetic characters in `s`,
/// matching Python's `str.title()`.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Human-readable display name for a map id. Known maps use a curated
/// lookup; unknown (typically modded) ids fall back to stripping a
/// leading `M_`/`_SOTF` marker or trailing `_WP`, camel-case word
/// splitting, and title-casing what's left (§4.3).
pub fn get_map_name(map_id: &str) -> String {
    if let Some(name) = MAP_NAME_LOOKUP.get(map_id) {
        return (*name).to_string();
    }

    let stripped = lstrip_chars(map_id, "M_");
    let name = if stripped.ends_with("_SOTF") {
        let body = rstrip_chars(&stripped, "_SOTF");
        let body = camel_space(&body);
        format!("The Survival of the Fittest ({body})")
    } else {
        let body = rstrip_chars(&stripped, "WP");
        let body = rstrip_chars(&body, "_");
        camel_space(&body)
    };

    title_case(&name.replace('_', ""))
}

/// Short slug used in resource names (PVC/Service/Pod suffixes), budgeted
/// at 11 characters so it composes with the cluster-id prefix under the
/// 63-character DNS label limit. Derived from [`get_map_name`]: lowercase,
/// `the `-stripped, space-joined-by-hyphen, collapsing to per-word
/// initials if that's still over budget (§4.3).
pub fn get_map_slug(map_id: &str) -> String {
    get_map_slug_budgeted(map_id, 11)
}

fn get_map_slug_budgeted(map_id: &str, max_length: usize) -> String {
    let name = get_map_name(map_id)
        .to_lowercase()
        .replace("survival of the fittest", "sotf")
        .replace("heim", "");
    let no_the = name
        .replace("the ", "")
        .replace('(', "")
        .replace(')', "")
        .trim()
        .to_string();
    let slug = no_the.replace(' ', "-");
    if slug.chars().count() > max_length {
        no_the.split(' ').filter_map(|word| word.chars().next()).collect()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_alias_excludes_the_center() {
        let maps = expand_selector(&["@canonical".to_string()], None).unwrap();
        assert!(maps.contains(&"TheIsland_WP".to_string()));
        assert!(!maps.contains(&"TheCenter_WP".to_string()));
        assert!(!maps.contains(&CLUB_MAP_ID.to_string()));
    }

    #[test]
    fn official_alias_includes_club_map() {
        let maps = expand_selector(&["@official".to_string()], None).unwrap();
        assert!(maps.contains(&CLUB_MAP_ID.to_string()));
        assert!(maps.contains(&"TheCenter_WP".to_string()));
    }

    #[test]
    fn at_all_without_universe_is_an_error() {
        let err = expand_selector(&["@all".to_string()], None).unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));
    }

    #[test]
    fn at_all_with_universe_expands_it() {
        let universe = vec!["SomeModded_WP".to_string()];
        let maps = expand_selector(&["@all".to_string()], Some(&universe)).unwrap();
        assert_eq!(maps, vec!["SomeModded_WP".to_string()]);
    }

    #[test]
    fn negation_only_matches_literal_ids() {
        let a = expand_selector(&["@official".to_string(), "-TheIsland_WP".to_string()], None).unwrap();
        let b = expand_selector(&["-TheIsland_WP".to_string(), "@official".to_string()], None).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains(&"TheIsland_WP".to_string()));
    }

    #[test]
    fn order_maps_puts_club_then_official_first() {
        let ordered = order_maps(vec![
            "Extinction_WP".to_string(),
            CLUB_MAP_ID.to_string(),
            "TheIsland_WP".to_string(),
        ]);
        assert_eq!(
            ordered,
            vec![CLUB_MAP_ID.to_string(), "TheIsland_WP".to_string(), "Extinction_WP".to_string()]
        );
    }

    #[test]
    fn known_map_slugs_stay_within_budget() {
        for id in MAP_NAME_LOOKUP.keys() {
            assert!(get_map_slug(id).len() <= 11, "{id} slug too long");
        }
    }

    #[test]
    fn scorched_earth_collapses_to_initials_when_over_budget() {
        assert_eq!(get_map_slug("ScorchedEarth_WP"), "se");
    }

    #[test]
    fn the_island_drops_the_leading_article() {
        assert_eq!(get_map_slug("TheIsland_WP"), "island");
    }

    #[test]
    fn unknown_map_name_falls_back_to_camel_split() {
        assert_eq!(get_map_name("CrystalIsles_WP"), "Crystal Isles");
    }

    #[test]
    fn sotf_marker_expands_to_full_title() {
        assert_eq!(get_map_name("M_Ragnarok_SOTF"), "The Survival Of The Fittest (Ragnarok)");
    }
}
