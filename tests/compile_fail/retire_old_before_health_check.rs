// ABOUTME: Compile-fail test verifying old containers cannot be retired before a health check.
// ABOUTME: This test should fail to compile, validating the rollout state machine.

use skiff::deploy::{Rollout, Started};
use skiff::executor::RemoteExecutor;
use std::time::Duration;

async fn retire_unchecked(rollout: Rollout<Started>, exec: &mut RemoteExecutor) {
    // ERROR: retire_old() only exists on Rollout<Healthy>
    let _ = rollout.retire_old(exec, Duration::from_secs(10)).await;
}

fn main() {}
