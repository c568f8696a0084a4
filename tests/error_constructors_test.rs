use cvl_optimizer::error::{CvlError, FailureKind};

#[test]
fn error_constructors() {
    assert!(matches!(CvlError::config("x"), CvlError::Config { .. }));
    assert!(matches!(CvlError::dbus("x"), CvlError::DBus { .. }));
    assert!(matches!(CvlError::timeout("x"), CvlError::Timeout { .. }));
    assert!(matches!(CvlError::missing("/Soc"), CvlError::MissingValue { .. }));
    assert!(matches!(
        CvlError::invalid("/Soc", "bad"),
        CvlError::InvalidValue { .. }
    ));
    assert!(matches!(
        CvlError::computation("x"),
        CvlError::Computation { .. }
    ));
    assert!(matches!(
        CvlError::rejected("/Settings/SystemSetup/MaxChargeVoltage", 1),
        CvlError::WriteRejected { code: 1, .. }
    ));
    assert!(matches!(
        CvlError::validation("f", "m"),
        CvlError::Validation { .. }
    ));
    assert!(matches!(CvlError::io("x"), CvlError::Io { .. }));
}

#[test]
fn tick_failures_are_classified() {
    assert_eq!(CvlError::dbus("x").kind(), FailureKind::ConnectionUnavailable);
    assert_eq!(
        CvlError::timeout("x").kind(),
        FailureKind::ConnectionUnavailable
    );
    assert_eq!(CvlError::missing("/Soc").kind(), FailureKind::MissingField);
    assert_eq!(
        CvlError::invalid("/Soc", "bad").kind(),
        FailureKind::InvalidValue
    );
    assert_eq!(CvlError::computation("x").kind(), FailureKind::Computation);
    assert_eq!(
        CvlError::rejected("/p", 2).kind(),
        FailureKind::WriteRejected
    );
    assert_eq!(CvlError::config("x").kind(), FailureKind::Other);
}

#[test]
fn display_messages() {
    let e = CvlError::validation("field", "bad");
    assert!(format!("{}", e).contains("Validation error"));
    assert_eq!(FailureKind::MissingField.to_string(), "missing_field");
    let io: CvlError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(io, CvlError::Io { .. }));
}
