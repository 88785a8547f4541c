// Risk tracking, threat patterns and threshold rules

pub mod risk_tracker;
pub mod rule_engine;
pub mod threat_detector;
