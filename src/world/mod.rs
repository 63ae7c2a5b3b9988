//! Platform world
//!
//! - **platform**: descriptors, live platforms and the below-player query
//! - **generator**: background chunk generation behind `ChunkSource`
//! - **streamer**: copy-on-write live set, generation trigger, eviction
//! - **background**: screen-space backdrop

pub mod background;
pub mod error;
pub mod generator;
pub mod platform;
pub mod streamer;

pub use background::Background;
pub use generator::{generate_chunk, ChunkGenerator, ChunkSource};
pub use platform::{
    find_platform_below, Platform, PlatformDescriptor, PlatformKind, PlatformQuery, PlatformSnapshot,
    MIN_PLATFORM_EXTENT,
};
pub use streamer::{render_platforms, WorldStreamer};
