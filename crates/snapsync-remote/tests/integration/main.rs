//! Integration tests for snapsync-remote
//!
//! Uses wiremock to simulate the photo backend and verifies the token
//! refresh policy of the HttpExecutor and the REST operations of PicsClient.

mod common;

mod test_api;
mod test_retry;
