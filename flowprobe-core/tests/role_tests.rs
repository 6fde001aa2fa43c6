use std::path::PathBuf;

use rstest::rstest;

use flowprobe_core::{
    CoreError, DaemonRole, LaunchOptions, PatternSet, RoleProfile, StagingLayout,
};

fn layout_for(profile: &RoleProfile) -> StagingLayout {
    let mut layout = StagingLayout::new("/stage");
    for name in &profile.directories {
        layout.insert(name.clone(), PathBuf::from("/stage").join(name));
    }
    layout
}

fn value_after<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    argv.iter()
        .position(|arg| arg == flag)
        .and_then(|index| argv.get(index + 1))
        .map(String::as_str)
}

#[test]
fn every_builtin_profile_compiles() {
    for role in DaemonRole::ALL {
        let profile = role.profile();
        assert_eq!(profile.role, role);
        PatternSet::compile(&profile.patterns).expect("built-in patterns compile");
        assert!(profile.directories.iter().any(|d| d == "log"));
        assert_eq!(role.as_str().parse::<DaemonRole>().expect("round trip"), role);
    }
}

#[rstest]
#[case(DaemonRole::Flowpack, "x: /data/in/f1: 500 recs", Some(500))]
#[case(DaemonRole::Flowpack, "x: /data/in/f1: 0 recs", Some(0))]
#[case(DaemonRole::Flowpack, "x: data: 500 recs", None)]
#[case(DaemonRole::Flowappend, "Oct 19 rwflowappend: APPEND OK /r/f", Some(1))]
#[case(DaemonRole::Flowcap, "Closing file /d/x: 3 seconds, 120 records, 4096 bytes", Some(120))]
fn progress_lines_per_role(
    #[case] role: DaemonRole,
    #[case] line: &str,
    #[case] expected: Option<u64>,
) {
    let set = PatternSet::compile(&role.profile().patterns).expect("compile");
    assert_eq!(set.progress_count(line), expected);
}

#[test]
fn flowcap_ready_marker_requires_quoted_probe_name() {
    let set = PatternSet::compile(&DaemonRole::Flowcap.profile().patterns).expect("compile");
    assert!(set.is_ready("'P0': Reader thread started"));
    assert!(!set.is_ready("Reader thread started"));
}

#[test]
fn flowpack_argv_places_program_and_extra_args_first() {
    let profile = DaemonRole::Flowpack.profile();
    let options = LaunchOptions {
        extra_args: vec!["--pack-interfaces".to_string()],
        ..Default::default()
    };
    let argv = profile
        .daemon_argv("valgrind ./rwflowpack", &options, &layout_for(&profile))
        .expect("argv");

    assert_eq!(&argv[..3], ["valgrind", "./rwflowpack", "--pack-interfaces"]);
    assert_eq!(value_after(&argv, "--flush-timeout"), Some("10"));
    assert_eq!(value_after(&argv, "--log-dest"), Some("stderr"));
    assert_eq!(value_after(&argv, "--log-level"), Some("info"));
    assert!(argv.iter().any(|arg| arg == "--no-daemon"));
    assert_eq!(value_after(&argv, "--root-directory"), Some("/stage/root"));
    assert_eq!(value_after(&argv, "--incoming-directory"), None);
}

#[test]
fn flowpack_argv_follows_input_and_output_modes() {
    let profile = DaemonRole::Flowpack.profile();
    let options = LaunchOptions {
        input_mode: Some("fcfiles".to_string()),
        output_mode: Some("sending".to_string()),
        sensor_configuration: Some(PathBuf::from("/stage/sensor.conf")),
        ..Default::default()
    };
    let argv = profile
        .daemon_argv("rwflowpack", &options, &layout_for(&profile))
        .expect("argv");

    assert_eq!(value_after(&argv, "--incoming-directory"), Some("/stage/incoming"));
    assert_eq!(value_after(&argv, "--sender-directory"), Some("/stage/sender"));
    assert_eq!(
        value_after(&argv, "--incremental-directory"),
        Some("/stage/incremental")
    );
    assert_eq!(value_after(&argv, "--root-directory"), None);
    assert_eq!(value_after(&argv, "--input-mode"), Some("fcfiles"));
    assert_eq!(value_after(&argv, "--output-mode"), Some("sending"));
    assert_eq!(
        value_after(&argv, "--sensor-configuration"),
        Some("/stage/sensor.conf")
    );
}

#[test]
fn flowcap_argv_uses_timeout_and_destination() {
    let profile = DaemonRole::Flowcap.profile();
    let options = LaunchOptions {
        role_timeout: 3,
        log_level: "debug".to_string(),
        ..Default::default()
    };
    let argv = profile
        .daemon_argv("./flowcap", &options, &layout_for(&profile))
        .expect("argv");
    assert_eq!(value_after(&argv, "--timeout"), Some("3"));
    assert_eq!(value_after(&argv, "--log-level"), Some("debug"));
    assert_eq!(
        value_after(&argv, "--destination-directory"),
        Some("/stage/destination")
    );
}

#[test]
fn argv_fails_when_layout_lacks_a_role_directory() {
    let profile = DaemonRole::Flowappend.profile();
    let err = profile
        .daemon_argv("./rwflowappend", &LaunchOptions::default(), &StagingLayout::new("/s"))
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownDirectory { name } if name == "root"));
}

#[test]
fn expected_count_for_flowappend_ignores_limit() {
    let profile = DaemonRole::Flowappend.profile();
    assert_eq!(profile.expected_count(Some(99), 4), Some(4));
    let profile = DaemonRole::Flowpack.profile();
    assert_eq!(profile.expected_count(Some(99), 4), Some(99));
    assert_eq!(profile.expected_count(None, 4), None);
}

#[rstest]
#[case(DaemonRole::Flowpack)]
#[case(DaemonRole::Flowcap)]
fn zero_limit_means_no_limit(#[case] role: DaemonRole) {
    assert_eq!(role.profile().expected_count(Some(0), 0), None);
}

#[test]
fn explicit_program_wins_over_environment() {
    let profile = DaemonRole::Flowcap.profile();
    assert_eq!(profile.resolve_program(Some("/opt/flowcap")), "/opt/flowcap");
}

#[test]
fn roles_parse_case_insensitively() {
    assert_eq!("RwFlowPack".parse::<DaemonRole>().unwrap(), DaemonRole::Flowpack);
    assert!(matches!(
        "rwsender".parse::<DaemonRole>(),
        Err(CoreError::UnknownRole(_))
    ));
}

#[test]
fn profile_round_trips_through_yaml() {
    let profile = DaemonRole::Flowpack.profile();
    let yaml = serde_yaml::to_string(&profile).expect("serialize");
    assert!(yaml.contains("Starting flush timer"));
    let back: RoleProfile = serde_yaml::from_str(&yaml).expect("deserialize");
    assert_eq!(back, profile);
}
