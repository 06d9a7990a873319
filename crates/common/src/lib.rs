// coedit-common: shared types and wire protocol for the coedit workspace

pub mod protocol;
pub mod types;
