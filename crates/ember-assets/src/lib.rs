//! Ember Assets - reference-counted, dependency-aware asset management
//!
//! This crate keeps exactly one live instance per [`AssetId`] and loads it
//! asynchronously:
//! - Handles ([`Asset<T>`], [`UntypedAsset`]) share the instance and keep it alive
//! - Handlers create, load, save and destroy payloads per [`AssetType`]
//! - Catalogs map ids to streams; stream providers open them
//! - Loads run on a worker pool and may resolve nested references
//! - Notifications are delivered from [`AssetManager::dispatch_events`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ember_assets::prelude::*;
//!
//! #[derive(Default)]
//! struct Note(String);
//!
//! impl AssetPayload for Note {
//!     const ASSET_TYPE: AssetType = AssetType::from_u128(0x4E07E);
//! }
//!
//! struct NoteHandler;
//!
//! impl PayloadHandler for NoteHandler {
//!     type Payload = Note;
//!
//!     fn load(&self, stream: &mut AssetStream, _ctx: &LoadContext<'_>) -> AssetResult<Note> {
//!         Ok(Note(stream.read_to_string()?))
//!     }
//! }
//!
//! # fn main() -> AssetResult<()> {
//! let manager = AssetManager::new(AssetManagerDescriptor::default())?;
//! let catalog = Arc::new(SimpleCatalog::new());
//! manager.register_handler(Arc::new(TypedHandler::new(NoteHandler)), Note::ASSET_TYPE);
//! manager.register_catalog(catalog.clone(), Note::ASSET_TYPE);
//!
//! let id = AssetId::random();
//! catalog.insert(id, "notes/hello.txt");
//!
//! let note: Asset<Note> = manager.get_asset(id, &LoadSettings::default().blocking(true));
//! if let Some(note) = note.get() {
//!     println!("{}", note.0);
//! }
//!
//! // Once per frame: deliver notifications and destroy released assets
//! manager.dispatch_events();
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **profiling** (default): puffin scopes around loads, saves and dispatch

pub mod catalog;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod event;
pub mod handle;
pub mod handler;
pub mod id;
pub mod io;
pub mod manager;
pub mod settings;
pub mod state;

mod inflight;
mod job;
mod registry;

pub use catalog::{AssetCatalog, AssetStreamInfo, OpenMode, SimpleCatalog};
pub use config::AssetManagerDescriptor;
pub use context::LoadContext;
pub use data::{AssetData, AssetPayload, ErasedPayload};
pub use error::{AssetError, AssetResult};
pub use event::{
    AssetCallbacks, AssetEvent, AssetEventMask, AssetListener, ListenerFilter, ListenerId,
};
pub use handle::{Asset, UntypedAsset};
pub use handler::{AssetHandler, PayloadHandler, TypedHandler};
pub use id::{AssetId, AssetType};
pub use io::{AssetStream, AssetWriter, FileStreamer, MemoryStreamer, StreamProvider};
pub use manager::AssetManager;
pub use settings::{
    AssetFilter, AssetFilterInfo, AssetLoadBehavior, LoadSettings, asset_filter_no_asset_loading,
    filter_fn,
};
pub use state::AssetStatus;

pub mod prelude {
    pub use crate::{
        Asset, AssetCallbacks, AssetCatalog, AssetData, AssetError, AssetEvent, AssetEventMask,
        AssetFilter, AssetHandler, AssetId, AssetListener, AssetLoadBehavior, AssetManager,
        AssetManagerDescriptor, AssetPayload, AssetResult, AssetStatus, AssetStream,
        AssetStreamInfo, AssetType, FileStreamer, ListenerFilter, LoadContext, LoadSettings,
        MemoryStreamer, PayloadHandler, SimpleCatalog, StreamProvider, TypedHandler, UntypedAsset,
    };
}
