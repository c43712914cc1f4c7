#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod frame;
pub mod renderer;
pub mod scene;

pub use errors::KilnError;
pub use frame::{
    CameraState, DebugFlags, FrameState, ProceduralSky, SkyMode, Spotlight, ToneOperator,
    UpscaleMode, ViewportState,
};
pub use renderer::passes::overlay::{NullOverlay, OverlayRenderer};
pub use renderer::timing::TimingValue;
pub use renderer::{MAX_LIGHTS, MAX_SHADOW_VIEWS, Renderer};
pub use scene::{MaterialSource, MeshSource, SceneSource, TextureSource, Vertex};
