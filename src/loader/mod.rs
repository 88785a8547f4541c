// Security rule loading

pub mod rule_loader;
