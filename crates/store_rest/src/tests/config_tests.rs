use super::*;

#[test]
fn integer_timeout_in_file_is_applied() {
    let mut settings = RestSettings::default();
    apply_file_settings(
        &mut settings,
        "base_url = \"http://example.test\"\nrequest_timeout_seconds = 30\n",
    );
    assert_eq!(settings.base_url, "http://example.test");
    assert_eq!(settings.request_timeout_seconds, 30);
}

#[test]
fn partial_file_keeps_defaults_for_absent_keys() {
    let mut settings = RestSettings::default();
    apply_file_settings(&mut settings, "base_url = \"http://example.test\"\n");
    assert_eq!(settings.base_url, "http://example.test");
    assert_eq!(
        settings.request_timeout_seconds,
        RestSettings::default().request_timeout_seconds
    );
}

#[test]
fn malformed_file_keeps_all_defaults() {
    let mut settings = RestSettings::default();
    apply_file_settings(&mut settings, "base_url = [not toml");
    assert_eq!(settings.base_url, RestSettings::default().base_url);
    assert_eq!(
        settings.request_timeout_seconds,
        RestSettings::default().request_timeout_seconds
    );
}

#[test]
fn string_timeout_fails_the_parse_and_keeps_defaults() {
    let mut settings = RestSettings::default();
    apply_file_settings(&mut settings, "request_timeout_seconds = \"ten\"\n");
    assert_eq!(
        settings.request_timeout_seconds,
        RestSettings::default().request_timeout_seconds
    );
}
