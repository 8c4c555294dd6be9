//! Test utilities for Ember projects.
//!
//! This crate provides testing infrastructure for `ember-assets`:
//!
//! - [`JsonAssetHandler`] - A multi-type handler that stores payloads as JSON and
//!   records every call it receives
//! - [`RecordingListener`] - An [`AssetListener`](ember_assets::AssetListener) that
//!   records every notification
//! - [`LogCounter`] - A `tracing-subscriber` layer counting warnings and errors
//! - [`TestAssets`] - A manager wired to an in-memory streamer and catalog
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ember_assets::prelude::*;
//! use ember_test_utils::*;
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct Value {
//!     data: i32,
//! }
//!
//! impl AssetPayload for Value {
//!     const ASSET_TYPE: AssetType = AssetType::from_u128(0x5A1);
//! }
//!
//! impl JsonAsset for Value {}
//!
//! let assets = TestAssets::new(1, JsonAssetHandler::new().with_type::<Value>());
//! let id = AssetId::random();
//! assets.add_json(id, &Value { data: 7 });
//!
//! let value: Asset<Value> = assets.manager.get_asset(id, &LoadSettings::default());
//! assert!(pump_until(&assets.manager, Duration::from_secs(5), || value.is_ready()));
//! assert_eq!(value.get().unwrap().data, 7);
//! ```

pub mod capture;
pub mod fixture;
pub mod json_handler;
pub mod listener;
pub mod wait;

pub use capture::LogCounter;
pub use fixture::TestAssets;
pub use json_handler::{HandlerCall, JsonAsset, JsonAssetHandler};
pub use listener::{Received, RecordingListener};
pub use wait::{pump_until, settle, wait_until};
