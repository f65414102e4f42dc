// ABOUTME: Compile-fail test verifying a rollout cannot report completion before it starts.
// ABOUTME: This test should fail to compile, validating the rollout state machine.

use skiff::deploy::{Prepared, Rollout};

fn report_unstarted(rollout: Rollout<Prepared>) {
    // ERROR: finish() only exists on Rollout<Completed>
    let _ = rollout.finish();
}

fn main() {}
