//! Media-control facade over an OS media transport session (SMTC, MPRIS,
//! Now Playing), plus the host daemon and local-socket bridge behind it.
//!
//! Applications own a [`controls::MediaControls`] built on any
//! [`bridge::HostBridge`]: [`bridge::LocalBridge`] for an in-process
//! [`host::Host`], or [`ipc::IpcBridge`] for the `smtc-bridge` daemon.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod controls;
pub mod daemon;
pub mod host;
pub mod ipc;
pub mod models;
