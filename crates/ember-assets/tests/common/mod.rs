//! Payload types shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use ember_assets::prelude::*;
use ember_test_utils::JsonAsset;
use serde::{Deserialize, Serialize};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A payload without references.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Leaf {
    pub data: i32,
}

impl AssetPayload for Leaf {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0x1EAF_0000_0000_0000_0000_0000_0000_0001);
}

impl JsonAsset for Leaf {}

/// A payload referencing another node, for chains and cycles.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Node {
    pub data: i32,
    pub next: Asset<Node>,
}

impl AssetPayload for Node {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0x2ADE_0000_0000_0000_0000_0000_0000_0002);
}

impl JsonAsset for Node {
    fn resolve(&mut self, ctx: &LoadContext<'_>) {
        ctx.resolve(&mut self.next);
    }
}

/// A payload with many leaf children.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Root {
    pub children: Vec<Asset<Leaf>>,
}

impl AssetPayload for Root {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0x2007_0000_0000_0000_0000_0000_0000_0003);
}

impl JsonAsset for Root {
    fn resolve(&mut self, ctx: &LoadContext<'_>) {
        for child in &mut self.children {
            ctx.resolve(child);
        }
    }
}

pub fn id(n: u128) -> AssetId {
    AssetId::from_u128(0xA55E_7000_0000_0000_0000_0000_0000_0000 | n, 0)
}

pub fn node(data: i32, next: Option<AssetId>) -> Node {
    Node {
        data,
        next: next.map(Asset::reference).unwrap_or_default(),
    }
}
