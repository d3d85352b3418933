//! Dithered-image renderer and section content backend for a zine-style
//! portfolio site.

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod dither;
pub mod error_codes;
pub mod media;
pub mod object_store;
