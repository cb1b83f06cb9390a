//! Bala - backend for an early-childhood education platform
//!
//! Serves articles, checklists and paid video courses. Users sign in with a
//! cookie-borne token, and admins grant them access to individual courses.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
