//! Suraksha - personal-safety alerting from a few taps.
//!
//! # Overview
//!
//! A burst of taps on the screen (or a trigger from a paired wearable) is
//! classified into an emergency category. The category decides who is
//! alerted, whether a number is dialed and what evidence is captured. Every
//! channel is best-effort: a failed server submission still leaves the SMS
//! compose and the dial handoff.
//!
//! # Honesty
//!
//! An alert never presents a made-up position. Without a fix the message says
//! "Location unavailable"; a cached fix is labeled with its age.
//!
//! # Modules
//!
//! - [`alerting`]: tap accumulation, classification, location, dispatch, evidence
//! - [`platform`]: device capability traits the alert core is driven through
//! - [`client`]: HTTP client for the remote store
//! - [`geocode`]: reverse geocoding for place names
//! - [`api`]: HTTP handlers of the remote store
//! - [`storage`]: SQLite storage for contacts and alerts
//! - [`relay`]: outbound SMS relay used by the server
//! - [`model`]: shared data types
//! - [`config`]: environment configuration

pub mod alerting;
pub mod api;
pub mod client;
pub mod config;
pub mod geocode;
pub mod model;
pub mod platform;
pub mod relay;
pub mod storage;
