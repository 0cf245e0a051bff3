//! Skips wiremock tests in sandboxes that cannot bind a localhost socket.
//!
//! Set `ASSET_BUNDLER_REQUIRE_SOCKET_TESTS=1` in CI to turn the skip into a
//! failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "ASSET_BUNDLER_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` after logging why the caller is
/// being skipped.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let caller = Location::caller();
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();

    async move {
        if bindable {
            return Some(MockServer::start().await);
        }
        let message = format!(
            "[socket-guard] {}:{} needs a localhost socket and none can be bound",
            caller.file(),
            caller.line()
        );
        assert!(!sockets_required(), "{message} ({REQUIRE_ENV} is set)");
        eprintln!("{message}; skipping");
        None
    }
}

/// Value a skipped test returns.
pub fn socket_skip_return() {}
