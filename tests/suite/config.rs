//! Config files feeding the engine and the checker.

use std::io::Write;

use sam::puzzle::{EMPTY, TRANSFER};
use sam_checker::CheckOptions;
use sam_config::SamConfig;

#[test]
fn checker_section_becomes_search_options() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[engine]
instance_name = "dieharder"
asynchronous_actions = false

[checker]
depth_max = 6
no_duplicate_action = true
do_not_start_with = ["empty", "transfer", "  "]
"#,
    )
    .unwrap();

    let config = SamConfig::load_from(file.path()).unwrap().unwrap();
    let options = CheckOptions::from(config.checker());
    assert_eq!(options.depth_max, 6);
    assert!(options.no_duplicate_action);
    assert_eq!(options.do_not_start_with, [EMPTY, TRANSFER]);

    let engine = config.engine();
    assert_eq!(engine.instance_name, "dieharder");
    assert!(!engine.asynchronous_actions);
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SamConfig::load_from(&dir.path().join("config.toml"))
        .unwrap()
        .unwrap_or_default();
    assert_eq!(CheckOptions::from(config.checker()), CheckOptions::default());
    assert_eq!(config.engine().instance_name, "global");
}
