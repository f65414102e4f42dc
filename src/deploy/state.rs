// ABOUTME: Rollout state markers for the type state pattern.
// ABOUTME: Zero-sized types keep the swap steps in order at compile time.

/// Old containers located, nothing started yet.
/// Available actions: `start()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Prepared;

/// New container running next to the old ones.
/// Available actions: `health_check()`, `discard()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Started;

/// New container reported healthy.
/// Available actions: `retire_old()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Healthy;

/// Old containers stopped and removed.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Completed;
