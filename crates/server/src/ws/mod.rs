pub mod handler;
pub mod session;

/// Server ping cadence.
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
/// Disconnect when no pong arrives within this window after a ping.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
/// 256 KiB ceiling on a single websocket frame.
pub const MAX_FRAME_BYTES: u32 = 262_144;
