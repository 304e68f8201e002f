use std::time::Duration;

use demo_janitor::{
    config::{Config, DemoCredentials},
    demo::{DEMO_LOGIN_PAGE, DEMO_USER},
    identity, plugin, SweepPolicy,
};

fn config(tmp: &tempfile::TempDir, password: &str) -> Config {
    Config {
        db_path: tmp.path().join("nested").join("demo.db"),
        interval: Duration::from_secs(3600),
        policy: SweepPolicy::default(),
        demo: DemoCredentials {
            username: "demo".into(),
            password: password.into(),
        },
        logging_enabled: true,
    }
}

#[test]
fn prepare_provisions_and_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let janitor = plugin::prepare(&config(&tmp, "demo")).unwrap();
    let store = janitor.store();
    let user = store.lookup(DEMO_USER).unwrap();
    assert!(user.is_some());
    assert!(store.lookup(DEMO_LOGIN_PAGE).unwrap().is_some());
    assert_eq!(identity::check_username_pw(store, "demo", "demo").unwrap(), user);
    drop(janitor);

    // second start reuses the same rows and picks up a changed password
    let janitor = plugin::prepare(&config(&tmp, "changed")).unwrap();
    let store = janitor.store();
    assert_eq!(store.lookup(DEMO_USER).unwrap(), user);
    assert_eq!(identity::check_username_pw(store, "demo", "demo").unwrap(), None);
    assert_eq!(
        identity::check_username_pw(store, "demo", "changed").unwrap(),
        user
    );
    assert_eq!(janitor.periodic_cleanup().unwrap().deleted, 0);
}
