//! Always-on wake-word voice client for the Alexa Voice Service.
//!
//! The crate is built around two lock-free SPSC ring buffers bridged by
//! real-time cpal callbacks. A three-state capture gate decides what the
//! microphone callback writes; the dialog orchestrator consumes the
//! capture ring, talks to the cloud, and feeds decoded answers back into
//! the playback ring.

pub mod audio;
pub mod avs;
pub mod config;
pub mod detector;
pub mod orchestrator;
