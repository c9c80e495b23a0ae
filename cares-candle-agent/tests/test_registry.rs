use anyhow::Result;
use cares_candle_agent::{registry::Registry, Device};
use cares_core::CaresError;
use std::{fs::File, io::Write};
use tempdir::TempDir;

#[test]
fn test_default_names() {
    let registry = Registry::default();
    assert_eq!(registry.names(), vec!["DynaSAC_NS_IW", "LA3PSAC"]);
}

#[test]
fn test_unknown_algorithm() {
    let registry = Registry::default();
    let err = registry
        .build("NoSuchAlgorithm", 3, 1, &serde_yaml::Value::Null, Device::Cpu)
        .err();
    let err = err.as_ref().and_then(|e| e.downcast_ref::<CaresError>());
    assert_eq!(
        err,
        Some(&CaresError::UnknownAlgorithm("NoSuchAlgorithm".to_string()))
    );
}

#[test]
fn test_build_from_path() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = Registry::default();
    let dir = TempDir::new("registry")?;

    let path = dir.path().join("la3p.yaml");
    let mut file = File::create(&path)?;
    file.write_all(b"algorithm: LA3PSAC\nprioritized_fraction: 0.25\nper_alpha: 0.6\n")?;
    let agent = registry.build_from_path(&path, 4, 2, Device::Cpu)?;
    assert!(!agent.is_model_based());

    let path = dir.path().join("dyna.yaml");
    let mut file = File::create(&path)?;
    file.write_all(
        b"algorithm: DynaSAC_NS_IW\nhorizon: 1\nreward: Gripper\nworld_model_config:\n  num_models: 2\n",
    )?;
    let mut agent = registry.build_from_path(&path, 6, 2, Device::Cpu)?;
    assert!(agent.is_model_based());
    assert_eq!(agent.select_action(&[0.0; 6], true, 0.0)?.len(), 2);

    let path = dir.path().join("none.yaml");
    let mut file = File::create(&path)?;
    file.write_all(b"horizon: 1\n")?;
    assert!(registry.build_from_path(&path, 6, 2, Device::Cpu).is_err());
    Ok(())
}
