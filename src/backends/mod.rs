// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! The scan session never talks to hardware directly. It goes through the
//! [`camera::CameraPlatform`] trait, which a concrete backend (V4L2 on Linux)
//! or a test double implements.
//!
//! # Modules
//!
//! - [`camera`]: Camera platform trait, stream types and the V4L2 backend

pub mod camera;
