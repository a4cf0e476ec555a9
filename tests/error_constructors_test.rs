use automedon::error::AutomedonError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        AutomedonError::config("x"),
        AutomedonError::Config { .. }
    ));
    assert!(matches!(AutomedonError::auth("x"), AutomedonError::Auth { .. }));
    assert!(matches!(
        AutomedonError::session("x"),
        AutomedonError::Session { .. }
    ));
    assert!(matches!(AutomedonError::web("x"), AutomedonError::Web { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = AutomedonError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, AutomedonError::Serialization { .. }));
    assert!(matches!(AutomedonError::io("x"), AutomedonError::Io { .. }));
    assert!(matches!(
        AutomedonError::network("x"),
        AutomedonError::Network { .. }
    ));
    assert!(matches!(AutomedonError::api("x"), AutomedonError::Api { .. }));
    assert!(matches!(AutomedonError::sink("x"), AutomedonError::Sink { .. }));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(
        AutomedonError::validation("f", "m"),
        AutomedonError::Validation { .. }
    ));
    assert!(matches!(
        AutomedonError::timeout("x"),
        AutomedonError::Timeout { .. }
    ));
    assert!(matches!(
        AutomedonError::partial_fetch("odometer", "boom"),
        AutomedonError::PartialFetch { .. }
    ));
    assert!(matches!(
        AutomedonError::generic("x"),
        AutomedonError::Generic { .. }
    ));
}

#[test]
fn display_messages() {
    let e = AutomedonError::validation("field", "bad");
    assert!(format!("{}", e).contains("Validation error"));

    let e = AutomedonError::partial_fetch("location", "503");
    assert_eq!(format!("{}", e), "Partial fetch error during location: 503");
}
