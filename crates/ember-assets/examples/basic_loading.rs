//! Basic asset loading example demonstrating the asset manager.
//!
//! This example shows:
//! - Creating an asset manager over a directory
//! - Registering handlers and a catalog
//! - Loading an asset whose payload references other assets
//! - Listening for notifications
//! - Releasing assets and watching them unload

use std::io::Write;
use std::sync::Arc;

use ember_assets::prelude::*;
#[cfg(feature = "profiling")]
use ember_core::profiling::{ProfilingBackend, init_profiling};
use serde::{Deserialize, Serialize};

/// Texture stored as "width height" text.
#[derive(Debug, Default)]
struct Texture {
    width: u32,
    height: u32,
}

impl AssetPayload for Texture {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0x3C1B_7A00_0000_4000_8000_0000_0000_0001);
}

struct TextureHandler;

impl PayloadHandler for TextureHandler {
    type Payload = Texture;

    fn load(&self, stream: &mut AssetStream, ctx: &LoadContext<'_>) -> AssetResult<Texture> {
        let text = stream.read_to_string()?;
        let mut parts = text.split_whitespace().map(str::parse::<u32>);
        match (parts.next(), parts.next()) {
            (Some(Ok(width)), Some(Ok(height))) => Ok(Texture { width, height }),
            _ => Err(AssetError::Serialization {
                id: ctx.asset_id(),
                message: format!("expected \"width height\", got {text:?}"),
            }),
        }
    }
}

/// Material stored as JSON, referencing its textures by id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Material {
    name: String,
    albedo: Asset<Texture>,
    normal: Asset<Texture>,
}

impl AssetPayload for Material {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0x3C1B_7A00_0000_4000_8000_0000_0000_0002);
}

struct MaterialHandler;

impl PayloadHandler for MaterialHandler {
    type Payload = Material;

    fn load(&self, stream: &mut AssetStream, ctx: &LoadContext<'_>) -> AssetResult<Material> {
        let mut material: Material =
            serde_json::from_slice(&stream.read_to_vec()?).map_err(|e| AssetError::Serialization {
                id: ctx.asset_id(),
                message: e.to_string(),
            })?;
        ctx.resolve(&mut material.albedo);
        ctx.resolve(&mut material.normal);
        Ok(material)
    }

    fn save(&self, material: &Material, writer: &mut dyn Write) -> AssetResult<()> {
        serde_json::to_writer_pretty(writer, material).map_err(|e| AssetError::Other(e.to_string()))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    ember_core::logging::init();
    #[cfg(feature = "profiling")]
    init_profiling(ProfilingBackend::PuffinHttp);

    // Create a temporary directory for our test assets
    let temp_dir = tempfile::tempdir()?;
    let assets_path = temp_dir.path();
    println!("Created temp directory: {}", assets_path.display());

    let albedo_id = AssetId::random();
    let normal_id = AssetId::random();
    let material_id = AssetId::random();
    std::fs::write(assets_path.join("albedo.tex"), "512 512")?;
    std::fs::write(assets_path.join("normal.tex"), "256 256")?;

    let catalog = Arc::new(SimpleCatalog::new());
    catalog.insert(albedo_id, "albedo.tex");
    catalog.insert(normal_id, "normal.tex");
    catalog.insert(material_id, "materials/brick.json");

    // Create the manager with the temp directory as its root
    let manager = AssetManager::new(
        AssetManagerDescriptor::default()
            .with_max_worker_threads(2)
            .with_streamer(Arc::new(FileStreamer::new(assets_path))),
    )?;
    manager.register_handler(Arc::new(TypedHandler::new(TextureHandler)), Texture::ASSET_TYPE);
    manager.register_handler(Arc::new(TypedHandler::new(MaterialHandler)), Material::ASSET_TYPE);
    manager.register_catalog(catalog.clone(), Texture::ASSET_TYPE);
    manager.register_catalog(catalog, Material::ASSET_TYPE);

    let callbacks = Arc::new(AssetCallbacks::new());
    callbacks.set_callbacks(
        Some(Box::new(|asset: &UntypedAsset| println!("Ready:    {}", asset.id()))),
        None,
        None,
        Some(Box::new(|asset: &UntypedAsset, ok: bool| {
            println!("Saved:    {} ({ok})", asset.id())
        })),
        Some(Box::new(|id: AssetId, _: AssetType| println!("Unloaded: {id}"))),
        Some(Box::new(|asset: &UntypedAsset, message: &str| {
            println!("Error:    {} {message}", asset.id())
        })),
    );
    manager.add_request_listener(callbacks, ListenerFilter::all());

    println!("\n=== Saving ===\n");

    // Author the material in memory and write it out through its handler
    let material = manager.create_asset::<Material>(material_id);
    {
        let mut payload = material.get_mut().ok_or("material has no payload")?;
        payload.name = "brick".into();
        payload.albedo = Asset::reference(albedo_id).with_hint("albedo.tex");
        payload.normal = Asset::reference(normal_id).with_hint("normal.tex");
    }
    if manager.save_asset(&material) {
        while manager.pending_event_count() == 0 {
            std::thread::yield_now();
        }
    }
    manager.dispatch_events();
    drop(material);
    manager.dispatch_events();

    println!("\n=== Loading ===\n");

    let material: Asset<Material> =
        manager.get_asset(material_id, &LoadSettings::default().blocking(true));
    println!("Material status: {:?}", material.status());
    if let Some(material) = material.get() {
        for texture in [&material.albedo, &material.normal] {
            if let Some(tex) = texture.get() {
                println!("{} ({}): {}x{}", texture.id(), texture.hint(), tex.width, tex.height);
            }
        }
    }
    manager.dispatch_events();
    ember_core::profiling::new_frame();

    println!("\n=== Releasing ===\n");

    drop(material);
    manager.dispatch_events();
    println!("Assets still registered: {}", manager.asset_count());

    manager.shutdown();
    println!("\n=== Done ===");

    Ok(())
}
