//! Config composer (§4.8): turns `globalSettings` plus a map's own
//! overlay into the environment variables and managed INI overlay a
//! server Pod is started with.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use ark_types::{ArkClusterSpec, CLUB_MAP_ID};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use tokio::sync::Mutex;

use crate::ini::Document;
use crate::maps::get_map_name;
use crate::util::Error;

/// Reads a ConfigMap's `data` map, returning an empty map if the
/// ConfigMap doesn't exist (unconfigured clusters have no global/per-map
/// overlay at all).
pub async fn read_configmap_envs(client: Client, namespace: &str, name: &str) -> Result<BTreeMap<String, String>, Error> {
    let cm = crate::client::get_opt::<ConfigMap>(client, namespace, name).await?;
    Ok(cm.and_then(|cm| cm.data).unwrap_or_default())
}

/// Config keys the operator itself manages; a user-supplied `params`/`opts`
/// entry that collides with one of these is rejected rather than silently
/// overridden, so a stale CR doesn't quietly fight the operator forever.
const RESERVED_PARAMS: &[&str] = &["SessionName", "Port", "QueryPort", "RCONPort", "RCONEnabled"];
const RESERVED_OPTS: &[&str] = &["MaxPlayers", "ServerPassword", "ServerAdminPassword"];

/// Default time-to-live for the cached global-envs configmap read.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    value: BTreeMap<String, String>,
    fetched_at: Instant,
}

/// Caches the global-envs configmap for `ttl` so composing per-map env
/// vars during a reconcile burst doesn't hit the API server once per map.
pub struct EnvCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl EnvCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: Mutex::new(None) }
    }

    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<BTreeMap<String, String>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<BTreeMap<String, String>, Error>>,
    {
        let mut guard = self.entry.lock().await;
        if let Some(entry) = guard.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }
        let value = fetch().await?;
        *guard = Some(CacheEntry { value: value.clone(), fetched_at: Instant::now() });
        Ok(value)
    }
}

impl Default for EnvCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Composes the environment variables for one map's server container
/// (§4.8): start from the derived defaults (session name, player count,
/// cluster id, ...), overlay the cached `{cluster}-global-envs` ConfigMap
/// (global wins over derived), then overlay the uncached
/// `{cluster}-map-envs-{slug}` ConfigMap (the per-map overlay wins over
/// everything). The club map's `params`/`opts`/`mods` are always stripped
/// since Club ARK doesn't take user mods (§9), regardless of which layer
/// tried to set them.
pub fn compose_env(
    spec: &ArkClusterSpec,
    map_id: &str,
    global_envs: &BTreeMap<String, String>,
    map_envs: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let settings = &spec.global_settings;
    let mut env = BTreeMap::new();

    let session_name = settings
        .session_name_format
        .replace("{map_name}", &get_map_name(map_id));
    env.insert("ARK_SERVER_SESSION_NAME".to_string(), session_name);
    env.insert("ARK_SERVER_MAX_PLAYERS".to_string(), settings.max_players.to_string());
    env.insert("ARK_SERVER_CLUSTER_ID".to_string(), settings.cluster_id.clone());
    env.insert("ARK_SERVER_BATTLEYE".to_string(), settings.battleye.to_string());
    env.insert("ARK_SERVER_WHITELIST".to_string(), settings.whitelist.to_string());

    if let Some(ip) = &settings.multihome_ip {
        env.insert("ARK_SERVER_MULTIHOME".to_string(), ip.clone());
    }

    let allowed: Vec<String> = settings.allowed_platforms.iter().map(|p| p.to_string()).collect();
    env.insert("ARK_SERVER_ALLOWED_PLATFORMS".to_string(), allowed.join(","));

    if map_id != CLUB_MAP_ID {
        if !settings.params.is_empty() {
            env.insert("ARK_SERVER_PARAMS".to_string(), settings.params.join("?"));
        }
        if !settings.opts.is_empty() {
            env.insert("ARK_SERVER_OPTS".to_string(), settings.opts.join("?"));
        }
        if !settings.mods.is_empty() {
            let mods: Vec<String> = settings.mods.iter().map(i64::to_string).collect();
            env.insert("ARK_SERVER_MODS".to_string(), mods.join(","));
        }
    }

    for (key, value) in global_envs {
        env.insert(key.clone(), value.clone());
    }
    for (key, value) in map_envs {
        env.insert(key.clone(), value.clone());
    }

    if map_id == CLUB_MAP_ID {
        env.remove("ARK_SERVER_PARAMS");
        env.remove("ARK_SERVER_OPTS");
        env.remove("ARK_SERVER_MODS");
    }

    env
}

/// `true` only when a CurseForge API key is actually configured; a blank
/// or absent env var must never be treated as "auth present" (§9).
pub fn has_curseforge_auth(env: &BTreeMap<String, String>) -> bool {
    env.get("ARK_OP_CURSEFORGE_API_KEY")
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

/// Validates that none of `params`/`opts` collide with an operator-managed
/// key before they're merged into a map's rendered INI overlay.
pub fn validate_managed_keys(section: &str, keys: &[String]) -> Result<(), Error> {
    let reserved: &[&str] = match section {
        "params" => RESERVED_PARAMS,
        "opts" => RESERVED_OPTS,
        _ => &[],
    };
    for key in keys {
        let name = key.split('=').next().unwrap_or(key);
        if reserved.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            return Err(Error::ManagedCollision {
                section: section.to_string(),
                key: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Overlays the operator-managed keys onto the user's `Game.ini`/
/// `GameUserSettings.ini` document, warning on any collision rather than
/// failing -- the managed value always wins (§4.2, §4.8).
pub fn apply_managed_overlay(base: &Document, managed: &Document, warn: impl Fn(&str)) -> Document {
    Document::merge(base, managed, warn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curseforge_auth_requires_non_empty_key() {
        let mut env = BTreeMap::new();
        assert!(!has_curseforge_auth(&env));
        env.insert("ARK_OP_CURSEFORGE_API_KEY".to_string(), "   ".to_string());
        assert!(!has_curseforge_auth(&env));
        env.insert("ARK_OP_CURSEFORGE_API_KEY".to_string(), "abc123".to_string());
        assert!(has_curseforge_auth(&env));
    }

    #[test]
    fn reserved_param_key_is_rejected() {
        let err = validate_managed_keys("params", &["SessionName=Foo".to_string()]).unwrap_err();
        assert!(matches!(err, Error::ManagedCollision { .. }));
    }

    #[test]
    fn unreserved_param_key_is_accepted() {
        assert!(validate_managed_keys("params", &["MaxStructuresInRange=10000".to_string()]).is_ok());
    }

    #[test]
    fn global_envs_win_over_derived_defaults() {
        let spec = ArkClusterSpec::default();
        let mut global = BTreeMap::new();
        global.insert("ARK_SERVER_MAX_PLAYERS".to_string(), "10".to_string());
        let env = compose_env(&spec, "TheIsland_WP", &global, &BTreeMap::new());
        assert_eq!(env.get("ARK_SERVER_MAX_PLAYERS"), Some(&"10".to_string()));
    }

    #[test]
    fn map_envs_win_over_global_envs() {
        let spec = ArkClusterSpec::default();
        let mut global = BTreeMap::new();
        global.insert("ARK_SERVER_MAX_PLAYERS".to_string(), "10".to_string());
        let mut map_envs = BTreeMap::new();
        map_envs.insert("ARK_SERVER_MAX_PLAYERS".to_string(), "20".to_string());
        let env = compose_env(&spec, "TheIsland_WP", &global, &map_envs);
        assert_eq!(env.get("ARK_SERVER_MAX_PLAYERS"), Some(&"20".to_string()));
    }

    #[test]
    fn club_map_never_gets_mods_even_from_overlay() {
        let mut spec = ArkClusterSpec::default();
        spec.global_settings.mods = vec![123];
        let mut map_envs = BTreeMap::new();
        map_envs.insert("ARK_SERVER_MODS".to_string(), "456".to_string());
        let env = compose_env(&spec, CLUB_MAP_ID, &BTreeMap::new(), &map_envs);
        assert!(!env.contains_key("ARK_SERVER_MODS"));
    }

    #[test]
    fn non_club_map_keeps_derived_mods() {
        let mut spec = ArkClusterSpec::default();
        spec.global_settings.mods = vec![123, 456];
        let env = compose_env(&spec, "TheIsland_WP", &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(env.get("ARK_SERVER_MODS"), Some(&"123,456".to_string()));
    }
}
