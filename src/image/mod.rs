//! Image management module
//!
//! Turns manifest sources into runnable images: prebuilt images are used as
//! is, Dockerfile and git sources are staged and built locally.

pub mod builder;
pub mod git;

pub use builder::{image_ref, BuildContext, ImageBuilder};
