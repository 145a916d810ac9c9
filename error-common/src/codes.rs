// Error codes implementation
// Stable codes surfaced in logs and persisted run documents

pub mod configuration {
    pub const INVALID_TABLE: &str = "CONFIG_1001";
    pub const LOAD_FAILED: &str = "CONFIG_1002";
}

pub mod detector {
    pub const UNAVAILABLE: &str = "DETECTOR_2001";
}

pub mod data {
    pub const INTEGRITY: &str = "DATA_3001";
    pub const EXCLUSION_LIMIT: &str = "DATA_3002";
}

pub mod calibration {
    pub const INSUFFICIENT_SAMPLE: &str = "SAMPLE_4001";
}

pub mod system {
    pub const SERIALIZATION: &str = "SYS_5001";
    pub const IO: &str = "SYS_5002";
    pub const INTERNAL: &str = "SYS_5003";
}
