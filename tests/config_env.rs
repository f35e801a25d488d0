//! Environment overrides for `EngineConfig::load`
//!
//! Kept in its own test binary: the process environment is shared by every
//! test in a binary, and this is the only test here that touches it.

use bucket_alloc::{EngineConfig, Error, Result};

#[test]
fn test_env_overrides_defaults_and_file() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("bucket_alloc_env_{}", std::process::id()));
    std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
    let path = dir.join("engine.toml");
    std::fs::write(
        &path,
        "capacities = [9, 9]\nallow_overflow = false\nzero_on_free = true\n",
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    std::env::set_var("BUCKET_ALLOC_CAPACITIES", "4,0,2");
    std::env::set_var("BUCKET_ALLOC_ALLOW_OVERFLOW", "true");

    let from_env = EngineConfig::load(None);
    let layered = EngineConfig::load(Some(&path));

    std::env::remove_var("BUCKET_ALLOC_CAPACITIES");
    std::env::remove_var("BUCKET_ALLOC_ALLOW_OVERFLOW");
    let without_env = EngineConfig::load(Some(&path));
    std::fs::remove_dir_all(&dir).ok();

    // env alone, everything else from defaults
    let from_env = from_env?;
    assert_eq!(from_env.capacities, vec![4, 0, 2]);
    assert!(from_env.allow_overflow);
    assert!(!from_env.zero_on_free);
    assert!(from_env.record_stats);

    // env wins over the file; keys only the file sets survive
    let layered = layered?;
    assert_eq!(layered.capacities, vec![4, 0, 2]);
    assert!(layered.allow_overflow);
    assert!(layered.zero_on_free);

    // file alone once the overrides are gone
    let without_env = without_env?;
    assert_eq!(without_env.capacities, vec![9, 9]);
    assert!(!without_env.allow_overflow);
    Ok(())
}
