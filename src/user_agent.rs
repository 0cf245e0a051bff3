//! User-Agent string for outgoing fetches.

/// Default User-Agent for fetch and transfer requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_identifies_tool_and_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("asset-bundler/"), "{ua}");
        assert!(ua.ends_with(env!("CARGO_PKG_VERSION")), "{ua}");
    }
}
