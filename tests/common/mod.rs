//! Shared harness for the end-to-end suites
//!
//! Spawns the reference server and builds client pipelines pointed at it.
//! Suites import from here rather than from the submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, USER_1_ID, USER_1_TOKEN};
//!
//! #[tokio::test]
//! async fn test_connect() {
//!     let server = TestServer::spawn().await;
//!     let pipeline = server.pipeline();
//!     pipeline
//!         .manager
//!         .connect(Some(server.credential(USER_1_TOKEN)))
//!         .await
//!         .unwrap();
//! }
//! ```

#[allow(dead_code)]
mod constants;
#[allow(dead_code)]
mod server;

#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use server::{eventually, new_notification, wait_until, Pipeline, TestServer};
