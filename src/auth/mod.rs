// Signing keys, token lifecycle and revocation

pub mod blacklist;
pub mod key_registry;
pub mod token_service;
