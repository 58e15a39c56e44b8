#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
// Allow acronyms like GDL and MDP
#![allow(clippy::upper_case_acronyms)]

//! # scanplane: hardware plane scanout for fixed-function display engines
//!
//! This crate drives display pipelines made of a fixed set of overlay
//! planes. Each repaint cycle it decides which client views can be scanned
//! out directly by a plane and which ones have to be composited into a
//! framebuffer, programs the planes, and releases client buffers once the
//! hardware confirms they left the screen.
//!
//! ## Structure of the crate
//!
//! - [`backend::scanout`] holds everything shared by the backends: the
//!   clip and scale checks, plane pools, the per-plane commit state machine,
//!   the assignment walk and vblank delivery.
//! - [`backend::ice`] drives Intel CE media processors through GDL.
//! - [`backend::qcom`] drives Qualcomm MDP through the framebuffer device.
//! - [`utils`] contains geometry, region and clock helpers.
//!
//! Hardware access always goes through a device trait, so the vendor
//! libraries stay outside of this crate.
//!
//! ### The event loop
//!
//! Like the rest of the compositor, the backends are driven by [`calloop`].
//! Every method of an output is expected to be called from the event loop
//! thread. The only other thread is the vblank worker, which hands
//! timestamps to the loop through a channel.
//!
//! ### Logging
//!
//! The crate logs through [`tracing`]. Every output carries a span naming
//! the backend and the output, rejections of individual views are logged
//! at trace level.

pub mod backend;
pub mod utils;
