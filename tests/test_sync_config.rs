use std::env::var;

use sync_lib::sync_config;

#[test]
fn test_sync_config_new() {
    let home_dir = var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    let default_tokenfile = format!("{}/.fitbit_tokens", home_dir);

    let sc = sync_config::SyncConfig::new();

    assert_eq!(sc.fitbit_clientid.as_str(), "");
    assert_eq!(sc.fitbit_tokenfile.as_str(), default_tokenfile.as_str());
    assert_eq!(sc.weight_log_time.as_str(), "23:59:59");
    assert!(sc.sync_steps);
    assert!(sc.sync_activities);
}

#[test]
fn test_sync_config_get_config() {
    let test_fname = "tests/data/test.env";

    let sc = sync_config::SyncConfig::get_config(Some(test_fname)).unwrap();

    assert_eq!(sc.fitbit_clientid.as_str(), "TESTID");
    assert_eq!(sc.fitbit_clientsecret.as_str(), "TESTSECRET");
    assert_eq!(sc.fitbit_tokenfile.as_str(), "/tmp/fitbit_tokens");
    assert_eq!(sc.start_date.as_str(), "2019-07-01");
    assert_eq!(sc.weight_log_time.as_str(), "12:00:00");
    assert!(!sc.sync_sleep);
    assert!(sc.sync_steps);
}
