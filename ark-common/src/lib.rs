pub mod shutdown;

pub mod annotations {
    pub const STABLE_ID: &str = "mort.is/stable-id";
    pub const CREATED_BY: &str = "mort.is/created-by";
    pub const SPEC_HASH: &str = "mort.is/spec-hash";
}

pub mod labels {
    pub const INSTANCE: &str = "app.kubernetes.io/instance";
    pub const PART_OF: &str = "app.kubernetes.io/part-of";
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const VERSION: &str = "app.kubernetes.io/version";
    pub const COMPONENT: &str = "app.kubernetes.io/component";
    pub const NAME: &str = "app.kubernetes.io/name";

    pub const PART_OF_VALUE: &str = "ark-operator";
    pub const MANAGED_BY_VALUE: &str = "ark-operator";
}

/// Process-wide setup: colored output override and the panic hook that
/// exits the process non-zero so the container gets restarted.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
}

/// Writes the readiness marker file consumed by the container's readiness
/// probe.
pub fn signal_ready() {
    let _ = std::fs::write("/etc/ready", b"ready");
}

/// Operator version string with `+` rewritten to `-`, used for the
/// `app.kubernetes.io/version` label (`+` is not a valid label character).
pub fn label_version() -> String {
    env!("CARGO_PKG_VERSION").replace('+', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_version_has_no_plus() {
        assert!(!label_version().contains('+'));
    }
}
