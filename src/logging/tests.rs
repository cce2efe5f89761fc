// ============================================================================
// Logging initialization tests
// ============================================================================

use super::*;

#[test]
fn init_twice_reports_instead_of_panicking() {
    let settings = LoggingSettings::default();
    let first = init(&settings);
    let second = init(&settings);
    // One of them loses the race for the global subscriber; the loser
    // must surface an error, not abort the process.
    assert!(first.is_ok() || second.is_err());
}
