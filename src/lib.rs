//! Tegaki: the raster pipeline of a layered painting application.
//!
//! Layers live on the CPU as straight-alpha images and are mirrored into
//! supersampled, premultiplied textures.  Brush strokes are stamped directly
//! into those textures, composited with per-layer blend modes, resolved to
//! the display and pulled back into the CPU buffers at stroke end.
//!
//! Two interchangeable backends implement [`DrawingBackend`]: a CPU emulation
//! of the GL pipeline ([`SoftwareBackend`]) and a wgpu one ([`WgpuBackend`]).

#![allow(clippy::too_many_arguments)]

pub mod backend;
pub mod brush;
pub mod canvas;
pub mod cli;
pub mod config;
pub mod coords;
pub mod dirty;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod logger;
pub mod raster;
pub mod resample;
pub mod stroke;
pub mod sync;

pub use backend::{BackendKind, DrawingBackend, PresentFilter, Readback};
pub use brush::{Brush, BrushMode, ConstantPressure, GammaPressure, LinearPressure, PressureCurve};
pub use canvas::{BlendMode, Layer, LayerId, LayerSnapshot};
pub use config::EngineConfig;
pub use dirty::{DirtyRect, PixelRect};
pub use engine::{init_engine, Engine, EngineStatus};
pub use error::{EngineError, EngineResult};
pub use gpu::WgpuBackend;
pub use raster::SoftwareBackend;
pub use stroke::StrokePhase;
