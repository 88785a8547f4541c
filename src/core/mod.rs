//! Core domain kernel.
//!
//! This module contains the fundamental data structures and primitives
//! that are independent of any collaborator implementation.

pub mod crypto;
pub mod errors;
pub mod models;
pub mod resilience;
