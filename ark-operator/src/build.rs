//! Build checker (§4.6): compares the build id baked into an installed
//! SteamCMD app manifest against the build id Steam currently serves, so
//! the reconciler knows when an update Job needs to run.

use crate::util::Error;

/// Ark: Survival Ascended's SteamCMD app id.
pub const APP_ID: u32 = 2430930;

/// Extracts `"buildid"` from a SteamCMD `appmanifest_<appid>.acf` file.
///
/// The format is Valve's KeyValues (VDF) text format: nested
/// `"Key" { ... }` blocks with quoted `"key" "value"` pairs. Only the
/// fields this operator cares about are parsed; everything else is
/// skipped rather than modeled.
pub fn parse_installed_buildid(manifest: &str) -> Result<u64, Error> {
    find_quoted_value(manifest, "buildid")
        .ok_or_else(|| Error::ConfigParse("appmanifest missing buildid".to_string()))?
        .parse::<u64>()
        .map_err(|_| Error::ConfigParse("appmanifest buildid is not numeric".to_string()))
}

fn find_quoted_value(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let pos = text.find(&needle)?;
    let rest = &text[pos + needle.len()..];
    let start = rest.find('"')? + 1;
    let end = rest[start..].find('"')? + start;
    Some(rest[start..end].to_string())
}

/// Queries Steam's public app-info endpoint for the build id currently
/// being served for `APP_ID`, used to decide whether an update is
/// available (§4.6, scenario D).
pub async fn latest_buildid(client: &reqwest::Client) -> Result<u64, Error> {
    #[derive(serde::Deserialize)]
    struct AppInfoResponse {
        data: std::collections::BTreeMap<String, AppInfoEntry>,
    }
    #[derive(serde::Deserialize)]
    struct AppInfoEntry {
        depots: AppInfoDepots,
    }
    #[derive(serde::Deserialize)]
    struct AppInfoDepots {
        branches: std::collections::BTreeMap<String, AppInfoBranch>,
    }
    #[derive(serde::Deserialize)]
    struct AppInfoBranch {
        buildid: String,
    }

    let url = format!("https://api.steamcmd.net/v1/info/{APP_ID}");
    let response: AppInfoResponse = client.get(url).send().await?.json().await?;
    let entry = response
        .data
        .get(&APP_ID.to_string())
        .ok_or_else(|| Error::ConfigParse("steamcmd info missing app entry".to_string()))?;
    let branch = entry
        .depots
        .branches
        .get("public")
        .ok_or_else(|| Error::ConfigParse("steamcmd info missing public branch".to_string()))?;
    branch
        .buildid
        .parse::<u64>()
        .map_err(|_| Error::ConfigParse("steamcmd info buildid is not numeric".to_string()))
}

/// `true` when `latest` is strictly newer than `active` — a purely
/// numeric comparison, since build ids are monotonically increasing but
/// not contiguous.
pub fn is_update_available(active: Option<u64>, latest: u64) -> bool {
    match active {
        Some(active) => latest > active,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
"AppState"
{
    "appid"     "2430930"
    "Universe"  "1"
    "buildid"   "12345678"
    "name"      "ARK: Survival Ascended Dedicated Server"
}
"#;

    #[test]
    fn parses_buildid_from_manifest() {
        assert_eq!(parse_installed_buildid(SAMPLE).unwrap(), 12345678);
    }

    #[test]
    fn missing_buildid_is_an_error() {
        assert!(parse_installed_buildid("\"AppState\" { \"appid\" \"1\" }").is_err());
    }

    #[test]
    fn update_available_only_when_strictly_newer() {
        assert!(is_update_available(Some(10), 11));
        assert!(!is_update_available(Some(11), 11));
        assert!(!is_update_available(Some(12), 11));
        assert!(is_update_available(None, 1));
    }
}
