//! Presence Reporter - command-line status reporter.
//!
//! This crate provides the reporter companion of the Presence server: a thin
//! CLI that posts one report per invocation to the service's ingestion
//! endpoints, with bounded retry and backoff on server errors. It stands in
//! for the phone-shortcut channel and for scripted reporting; the
//! platform-specific desktop window poller is a separate client.

pub mod config;
pub mod sender;
