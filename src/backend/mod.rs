//! Display backends
//!
//! Both backends share the [`scanout`] core and only differ in how they
//! talk to their display engine:
//!
//! - [`ice`]: Intel CE, planes programmed one by one and flipped
//!   asynchronously, completion detected by polling after each vblank
//! - [`qcom`]: Qualcomm MDP, every layer committed at once, completion
//!   signaled by vsync events and release fences

pub mod scanout;

#[cfg(feature = "backend_ice")]
pub mod ice;
#[cfg(feature = "backend_qcom")]
pub mod qcom;
